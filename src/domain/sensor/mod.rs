// ============================================================================
// Sensor Domain - numeric sample streams
// ============================================================================

pub mod events;

pub use events::*;
