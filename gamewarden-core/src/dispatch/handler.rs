use std::collections::HashSet;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use crate::events::{Event, EventKind};

/// What a handler wants to happen to the event after it returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// Stop delivering this event to later handlers.
    Veto,
}

pub type HandlerResult = anyhow::Result<Flow>;

pub trait EventHandler: Send {
    fn handle(&mut self, event: &Event) -> HandlerResult;
}

impl<F> EventHandler for F
where
    F: FnMut(&Event) -> HandlerResult + Send,
{
    fn handle(&mut self, event: &Event) -> HandlerResult {
        self(event)
    }
}

pub(crate) struct Registration {
    pub owner: String,
    pub interests: HashSet<EventKind>,
    pub enabled: Arc<AtomicBool>,
    pub handler: Box<dyn EventHandler>,
}

impl Registration {
    #[inline]
    pub fn wants(&self, kind: EventKind) -> bool {
        self.interests.contains(&kind)
    }
}
