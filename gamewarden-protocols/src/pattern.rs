//! Ordered regex tables for line-oriented sub-protocols.
//!
//! The first matching pattern wins. Entries without a handler are known
//! lines that are deliberately ignored; lines matching nothing are reported
//! as [`Route::Unmatched`] so the caller can surface them.

use regex::{Captures, Regex};

pub struct PatternTable<T> {
    entries: Vec<(Regex, Option<T>)>,
}

#[derive(Debug)]
pub enum Route<'a, T> {
    Handled(&'a T, Captures<'a>),
    /// Index of the matching no-op entry.
    Ignored(usize),
    Unmatched,
}

impl<T> PatternTable<T> {
    pub fn new<'p, I>(entries: I) -> Result<Self, regex::Error>
    where
        I: IntoIterator<Item = (&'p str, Option<T>)>,
    {
        let entries = entries
            .into_iter()
            .map(|(pattern, handler)| Ok((Regex::new(pattern)?, handler)))
            .collect::<Result<Vec<_>, regex::Error>>()?;
        Ok(Self { entries })
    }

    pub fn route<'a>(&'a self, line: &'a str) -> Route<'a, T> {
        for (idx, (regex, handler)) in self.entries.iter().enumerate() {
            if let Some(caps) = regex.captures(line) {
                return match handler {
                    Some(handler) => Route::Handled(handler, caps),
                    None => Route::Ignored(idx),
                };
            }
        }
        Route::Unmatched
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
