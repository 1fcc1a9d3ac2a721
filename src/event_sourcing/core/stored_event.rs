use serde::{Deserialize, Serialize};

use super::event::{EntityType, EventId, EventType};

// ============================================================================
// Stored Event - storage-neutral record
// ============================================================================

/// The flat record a persistence backend writes verbatim.
///
/// `event_attrs` is plaintext JSON or, when encryption applies, cipher text.
/// Storage never interprets it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEvent {
    pub event_id: EventId,
    pub stored_entity_id: String,
    pub event_topic: String,
    pub event_attrs: String,
}

/// Pairs an entity version with the event that produced it. Used by storage
/// for optimistic concurrency.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityVersion {
    pub entity_version_id: String,
    pub event_id: EventId,
}

impl EntityVersion {
    pub fn new(stored_entity_id: &str, version: u64, event_id: EventId) -> Self {
        Self {
            entity_version_id: make_entity_version_id(stored_entity_id, version),
            event_id,
        }
    }
}

// ============================================================================
// Identifier Helpers
// ============================================================================

pub fn make_stored_entity_id(id_prefix: &str, entity_id: &str) -> String {
    format!("{}::{}", id_prefix, entity_id)
}

pub fn make_entity_version_id(stored_entity_id: &str, version: u64) -> String {
    format!("{}::version::{}", stored_entity_id, version)
}

/// Outermost name of a dot-separated qualified name.
pub fn id_prefix_from_qualname(qualname: &str) -> &str {
    qualname.split('.').next().unwrap_or(qualname)
}

pub fn id_prefix_from_event_type<E: EventType>() -> &'static str {
    id_prefix_from_qualname(E::QUALNAME)
}

pub fn id_prefix_from_entity_type<E: EntityType>() -> &'static str {
    id_prefix_from_qualname(E::QUALNAME)
}

/// Topic string for a module and qualified name: `<module>#<qualname>`.
pub fn make_topic(module: &str, qualname: &str) -> String {
    format!("{}#{}", module, qualname)
}

pub fn topic_from_event_type<E: EventType>() -> String {
    make_topic(E::MODULE, E::QUALNAME)
}

pub fn topic_from_entity_type<E: EntityType>() -> String {
    make_topic(E::MODULE, E::QUALNAME)
}
