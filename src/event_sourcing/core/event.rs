use std::any::Any;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::attributes::{AttrValue, Attributes, FromAttr, IntoAttr};
use super::errors::AttributeError;

// ============================================================================
// Domain Events & Entities
// ============================================================================
//
// Events expose their whole state as attributes and can be rebuilt from
// that state by a raw-state factory that skips creation-time validation.
// Static type information (module, qualified name, encryption policy)
// lives on the `EventType` / `EntityType` traits and is recorded once in
// the type registry at startup.
//
// ============================================================================

/// Attribute holding the owning entity's id.
pub const ENTITY_ID_ATTR: &str = "entity_id";

/// Attribute holding the event occurrence id.
pub const DOMAIN_EVENT_ID_ATTR: &str = "domain_event_id";

/// Opaque, totally ordered identifier of one event occurrence.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(String);

impl EventId {
    /// Time-ordered id (UUIDv7); later ids sort after earlier ones.
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EventId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for EventId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<Uuid> for EventId {
    fn from(id: Uuid) -> Self {
        Self(id.to_string())
    }
}

impl IntoAttr for EventId {
    fn into_attr(self) -> AttrValue {
        AttrValue::Str(self.0)
    }
}

impl FromAttr for EventId {
    fn from_attr(value: AttrValue) -> Result<Self, AttributeError> {
        String::from_attr(value).map(EventId)
    }
}

/// Upcast helper so trait objects can be downcast to their concrete type.
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
    fn into_any(self: Box<Self>) -> Box<dyn Any>;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

/// An immutable record of one occurrence in an entity's history.
pub trait DomainEvent: AsAny + fmt::Debug + Send + Sync {
    fn entity_id(&self) -> &str;

    fn domain_event_id(&self) -> &EventId;

    /// Full state, identity attributes included.
    fn state(&self) -> Attributes;
}

/// Static description of a concrete event type.
pub trait EventType: DomainEvent + Sized {
    /// Defining module, usually `module_path!()`.
    const MODULE: &'static str;

    /// Dot-separated qualified name, outermost name first (`Order.Created`).
    const QUALNAME: &'static str;

    /// Events of this type are never stored in plaintext.
    const ALWAYS_ENCRYPT: bool = false;

    /// Rebuild from stored state without re-running creation-time checks.
    fn from_state(state: Attributes) -> Result<Self, AttributeError>;
}

/// An entity whose state can be captured and restored as attributes.
pub trait DomainEntity: AsAny + fmt::Debug + Send + Sync {
    fn id(&self) -> &str;

    fn state(&self) -> Attributes;
}

pub trait EntityType: DomainEntity + Sized {
    const MODULE: &'static str;
    const QUALNAME: &'static str;

    fn from_state(state: Attributes) -> Result<Self, AttributeError>;
}

/// Downcast a reconstructed event to its concrete type.
pub fn downcast_event<E: EventType>(event: Box<dyn DomainEvent>) -> Option<E> {
    event.into_any().downcast::<E>().ok().map(|boxed| *boxed)
}

/// Downcast a reconstructed entity to its concrete type.
pub fn downcast_entity<E: EntityType>(entity: Box<dyn DomainEntity>) -> Option<E> {
    entity.into_any().downcast::<E>().ok().map(|boxed| *boxed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Pinged {
        entity_id: String,
        domain_event_id: EventId,
    }

    impl DomainEvent for Pinged {
        fn entity_id(&self) -> &str {
            &self.entity_id
        }

        fn domain_event_id(&self) -> &EventId {
            &self.domain_event_id
        }

        fn state(&self) -> Attributes {
            Attributes::new()
                .with(ENTITY_ID_ATTR, self.entity_id.clone())
                .with(DOMAIN_EVENT_ID_ATTR, self.domain_event_id.clone())
        }
    }

    impl EventType for Pinged {
        const MODULE: &'static str = module_path!();
        const QUALNAME: &'static str = "Pinger.Pinged";

        fn from_state(mut state: Attributes) -> Result<Self, AttributeError> {
            Ok(Self {
                entity_id: state.take(ENTITY_ID_ATTR)?,
                domain_event_id: state.take(DOMAIN_EVENT_ID_ATTR)?,
            })
        }
    }

    #[test]
    fn test_event_ids_are_time_ordered() {
        let first = EventId::new();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let second = EventId::new();
        assert!(first < second);
    }

    #[test]
    fn test_event_id_accepts_caller_tokens() {
        let id = EventId::from("ev-1");
        assert_eq!(id.as_str(), "ev-1");
        assert_eq!(EventId::from_attr(id.clone().into_attr()).unwrap(), id);
    }

    #[test]
    fn test_event_id_serializes_transparently() {
        let json = serde_json::to_string(&EventId::from("ev-9")).unwrap();
        assert_eq!(json, "\"ev-9\"");
    }

    #[test]
    fn test_downcast_event() {
        let event: Box<dyn DomainEvent> = Box::new(Pinged {
            entity_id: "p1".to_string(),
            domain_event_id: EventId::from("e1"),
        });

        let pinged = downcast_event::<Pinged>(event).unwrap();
        assert_eq!(pinged.entity_id, "p1");
    }

    #[test]
    fn test_state_round_trips_through_from_state() {
        let event = Pinged {
            entity_id: "p1".to_string(),
            domain_event_id: EventId::from("e1"),
        };
        assert_eq!(Pinged::from_state(event.state()).unwrap(), event);
    }
}
