// ============================================================================
// Order Domain - events and state for the Order entity
// ============================================================================
//
// This module contains ALL Order-specific code:
// - Value objects (OrderItem, ShippingAddress, OrderStatus)
// - Events (OrderCreated, OrderShipped, etc.)
// - Errors (OrderError enum)
// - Entity (Order snapshot state)
//
// This is completely separate from the generic event sourcing infrastructure.
//
// ============================================================================

pub mod value_objects;
pub mod events;
pub mod errors;
pub mod entity;

// Re-export for convenience
pub use value_objects::*;
pub use events::*;
pub use errors::*;
pub use entity::*;
