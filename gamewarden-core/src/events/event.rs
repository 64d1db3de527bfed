//! Immutable event values passed from adapters to handlers.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::Utc;

use super::registry::EventKind;

/// A connected player (or other actor) an event refers to.
///
/// The dispatch core only carries actors around. Adapters hand out their own
/// session type and handlers recover it through [`Actor::as_any`].
pub trait Actor: Send + Sync + fmt::Debug {
    /// Session-scoped identifier (slot, name or client id depending on the game).
    fn actor_id(&self) -> String;

    fn display_name(&self) -> String;

    fn as_any(&self) -> &dyn Any;
}

pub type ActorRef = Arc<dyn Actor>;

/// Kind-specific event data.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Payload {
    #[default]
    Empty,
    Text(String),
    Number(i64),
    Words(Vec<String>),
    Fields(BTreeMap<String, String>),
}

impl Payload {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Payload::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<i64> {
        match self {
            Payload::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_words(&self) -> Option<&[String]> {
        match self {
            Payload::Words(words) => Some(words),
            _ => None,
        }
    }

    pub fn field(&self, key: &str) -> Option<&str> {
        match self {
            Payload::Fields(fields) => fields.get(key).map(String::as_str),
            _ => None,
        }
    }

    pub fn words<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Payload::Words(words.into_iter().map(Into::into).collect())
    }

    pub fn fields<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Payload::Fields(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Payload::Text(text.to_string())
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Payload::Text(text)
    }
}

impl From<i64> for Payload {
    fn from(n: i64) -> Self {
        Payload::Number(n)
    }
}

#[derive(Debug, Clone)]
pub struct Event {
    kind: EventKind,
    timestamp: i64,
    payload: Payload,
    source: Option<ActorRef>,
    target: Option<ActorRef>,
}

impl Event {
    /// Creates an event stamped with the current time in whole seconds.
    pub fn new(kind: EventKind, payload: impl Into<Payload>) -> Self {
        Self {
            kind,
            timestamp: Utc::now().timestamp(),
            payload: payload.into(),
            source: None,
            target: None,
        }
    }

    pub fn with_source(mut self, source: ActorRef) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_target(mut self, target: ActorRef) -> Self {
        self.target = Some(target);
        self
    }

    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = timestamp;
        self
    }

    #[inline]
    pub fn kind(&self) -> EventKind {
        self.kind
    }

    #[inline]
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    #[inline]
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn source(&self) -> Option<&ActorRef> {
        self.source.as_ref()
    }

    pub fn target(&self) -> Option<&ActorRef> {
        self.target.as_ref()
    }

    /// Downcasts the source actor to the adapter's concrete session type.
    pub fn source_as<T: 'static>(&self) -> Option<&T> {
        self.source.as_ref()?.as_any().downcast_ref::<T>()
    }

    pub fn target_as<T: 'static>(&self) -> Option<&T> {
        self.target.as_ref()?.as_any().downcast_ref::<T>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{kinds, EventRegistry};

    #[derive(Debug)]
    struct Dummy(&'static str);

    impl Actor for Dummy {
        fn actor_id(&self) -> String {
            self.0.to_string()
        }

        fn display_name(&self) -> String {
            self.0.to_uppercase()
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[test]
    fn test_event_carries_actors() {
        let registry = EventRegistry::new();
        let kind = registry.id_of(kinds::CLIENT_KILL).unwrap();
        let event = Event::new(kind, Payload::words(["100", "M16A4", "head"]))
            .with_source(Arc::new(Dummy("attacker")))
            .with_target(Arc::new(Dummy("victim")));

        assert_eq!(event.kind(), kind);
        assert_eq!(event.payload().as_words().unwrap()[1], "M16A4");
        assert_eq!(event.source_as::<Dummy>().unwrap().0, "attacker");
        assert_eq!(event.target().unwrap().display_name(), "VICTIM");
        assert!(event.timestamp() > 0);
    }

    #[test]
    fn test_payload_accessors() {
        let payload = Payload::fields([("slot", "3"), ("task", "pb_sv_update")]);
        assert_eq!(payload.field("task"), Some("pb_sv_update"));
        assert_eq!(payload.as_text(), None);
        assert_eq!(Payload::from(7).as_number(), Some(7));
        assert_eq!(Payload::from("hi").as_text(), Some("hi"));
    }
}
