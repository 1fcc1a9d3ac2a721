// ============================================================================
// Event Sourcing Store - Stored-Event Persistence
// ============================================================================
//
// Storage treats StoredEvent records as opaque: it reads and writes them by
// stored_entity_id and version, never looking inside event_attrs.
//
// ============================================================================

pub mod event_store;

pub use event_store::{EventStore, StoredEventRepository};
