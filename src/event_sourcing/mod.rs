// ============================================================================
// Event Sourcing Infrastructure
// ============================================================================
//
// Generic, reusable transcoding infrastructure.
// Domain-specific code is in src/domain/
//
// ============================================================================

// Data model: attributes, events, stored records, identifiers
pub mod core;
// Stored event <-> domain event conversion
pub mod transcoding;
// In-memory stored-event repository
pub mod store;

// Re-export core infrastructure
pub use self::core::*;
pub use self::store::*;
pub use self::transcoding::*;
