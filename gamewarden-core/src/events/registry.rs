//! Process-wide table of event kinds.
//!
//! Ids are dense, start at 1 and follow registration order. They are never
//! reused for the lifetime of the registry. Registration happens while the
//! agent starts up; once [`EventRegistry::seal`] is called new names are
//! rejected and the table is read-only for the dispatch and adapter threads.

use std::collections::HashMap;
use std::fmt;

use parking_lot::RwLock;
use tracing::{debug, trace};

use super::kinds;
use crate::error::EventError;

/// Dense numeric handle for a registered event kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventKind(u32);

impl EventKind {
    #[inline]
    pub fn id(self) -> u32 {
        self.0
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

struct Entry {
    name: String,
    label: String,
}

#[derive(Default)]
struct Table {
    by_name: HashMap<String, EventKind>,
    entries: Vec<Entry>,
    sealed: bool,
}

pub struct EventRegistry {
    table: RwLock<Table>,
}

impl Default for EventRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl EventRegistry {
    /// Creates a registry holding the core kinds from [`kinds::CORE`].
    pub fn new() -> Self {
        let mut table = Table::default();
        for (name, label) in kinds::CORE {
            Self::insert(&mut table, name, Some(*label));
        }
        Self {
            table: RwLock::new(table),
        }
    }

    /// Registers `name`, returning its kind. Registering an existing name
    /// returns the existing kind and keeps the first label.
    pub fn register(&self, name: &str, label: Option<&str>) -> Result<EventKind, EventError> {
        if let Some(kind) = self.table.read().by_name.get(name) {
            trace!(name, "Event kind already registered");
            return Ok(*kind);
        }

        let mut table = self.table.write();
        if let Some(kind) = table.by_name.get(name) {
            return Ok(*kind);
        }
        if table.sealed {
            return Err(EventError::RegistrySealed(name.to_string()));
        }
        let kind = Self::insert(&mut table, name, label);
        debug!(name, id = kind.id(), "Registered event kind");
        Ok(kind)
    }

    fn insert(table: &mut Table, name: &str, label: Option<&str>) -> EventKind {
        // entries.len() + 1 always fits: a registry never holds u32::MAX kinds
        let kind = EventKind(table.entries.len() as u32 + 1);
        let label = match label {
            Some(label) => label.to_string(),
            None => format!("Unnamed({name})"),
        };
        table.entries.push(Entry {
            name: name.to_string(),
            label,
        });
        table.by_name.insert(name.to_string(), kind);
        kind
    }

    pub fn id_of(&self, name: &str) -> Result<EventKind, EventError> {
        self.table
            .read()
            .by_name
            .get(name)
            .copied()
            .ok_or_else(|| EventError::UnknownEventKind(name.to_string()))
    }

    pub fn name_of(&self, kind: EventKind) -> Result<String, EventError> {
        self.entry(kind, |entry| entry.name.clone())
    }

    pub fn label_of(&self, name: &str) -> Result<String, EventError> {
        let kind = self.id_of(name)?;
        self.entry(kind, |entry| entry.label.clone())
    }

    fn entry<T>(&self, kind: EventKind, f: impl FnOnce(&Entry) -> T) -> Result<T, EventError> {
        let table = self.table.read();
        kind.0
            .checked_sub(1)
            .and_then(|idx| table.entries.get(idx as usize))
            .map(f)
            .ok_or(EventError::UnknownEventId(kind.0))
    }

    /// Resolves a raw id, failing for ids never handed out.
    pub fn kind(&self, id: u32) -> Result<EventKind, EventError> {
        let kind = EventKind(id);
        self.entry(kind, |_| kind)
    }

    /// Ends the registration phase.
    pub fn seal(&self) {
        self.table.write().sealed = true;
        debug!(kinds = self.len(), "Event registry sealed");
    }

    pub fn is_sealed(&self) -> bool {
        self.table.read().sealed
    }

    pub fn len(&self) -> usize {
        self.table.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of `(kind, name)` pairs in id order.
    pub fn kinds(&self) -> Vec<(EventKind, String)> {
        self.table
            .read()
            .entries
            .iter()
            .enumerate()
            .map(|(idx, entry)| (EventKind(idx as u32 + 1), entry.name.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_core_kinds_are_preregistered() {
        let registry = EventRegistry::new();
        assert_eq!(registry.len(), kinds::CORE.len());
        assert_eq!(registry.id_of(kinds::EXIT).unwrap().id(), 1);
        assert_eq!(registry.label_of(kinds::CLIENT_SAY).unwrap(), "Say");
    }

    #[test]
    fn test_double_registration_keeps_first_label() {
        let registry = EventRegistry::new();
        let first = registry.register("client_squad_change", Some("Squad Change")).unwrap();
        let second = registry.register("client_squad_change", Some("Other")).unwrap();
        assert_eq!(first, second);
        assert_eq!(registry.label_of("client_squad_change").unwrap(), "Squad Change");
    }

    #[test]
    fn test_default_label() {
        let registry = EventRegistry::new();
        registry.register("client_spawn", None).unwrap();
        assert_eq!(registry.label_of("client_spawn").unwrap(), "Unnamed(client_spawn)");
    }

    #[test]
    fn test_unknown_lookups_fail() {
        let registry = EventRegistry::new();
        assert_eq!(
            registry.id_of("nope"),
            Err(EventError::UnknownEventKind("nope".into()))
        );
        assert_eq!(registry.kind(0), Err(EventError::UnknownEventId(0)));
        assert_eq!(registry.kind(10_000), Err(EventError::UnknownEventId(10_000)));
    }

    #[test]
    fn test_sealed_registry_rejects_new_names() {
        let registry = EventRegistry::new();
        registry.seal();
        assert!(registry.is_sealed());
        assert!(registry.register(kinds::CLIENT_KICK, None).is_ok());
        assert_eq!(
            registry.register("late_kind", None),
            Err(EventError::RegistrySealed("late_kind".into()))
        );
    }

    proptest! {
        #[test]
        fn prop_name_id_round_trip(names in proptest::collection::vec("[a-z_]{1,16}", 1..40)) {
            let registry = EventRegistry::new();
            for name in &names {
                let kind = registry.register(name, None).unwrap();
                prop_assert_eq!(registry.id_of(name).unwrap(), kind);
                prop_assert_eq!(registry.name_of(kind).unwrap(), name.clone());
                prop_assert_eq!(registry.register(name, None).unwrap(), kind);
            }
            for (kind, name) in registry.kinds() {
                prop_assert_eq!(registry.id_of(&name).unwrap(), kind);
            }
        }
    }
}
