// ============================================================================
// Event Sourcing Core - Data Model
// ============================================================================
//
// Attribute values, domain event/entity traits, stored-event records and
// identifier helpers. Nothing here knows about JSON, ciphers or storage.
//
// ============================================================================

pub mod attributes;
pub mod errors;
pub mod event;
pub mod ndarray;
pub mod stored_event;

pub use attributes::{
    reconstruct_object, AttrValue, Attributes, FromAttr, IntoAttr, ObjectValue, ValueObject,
};
pub use errors::{AttributeError, TranscodingError};
pub use event::{
    downcast_entity, downcast_event, AsAny, DomainEntity, DomainEvent, EntityType, EventId,
    EventType, DOMAIN_EVENT_ID_ATTR, ENTITY_ID_ATTR,
};
pub use ndarray::NumericArray;
pub use stored_event::{
    id_prefix_from_entity_type, id_prefix_from_event_type, id_prefix_from_qualname,
    make_entity_version_id, make_stored_entity_id, make_topic, topic_from_entity_type,
    topic_from_event_type, EntityVersion, StoredEvent,
};
