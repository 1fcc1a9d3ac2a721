// ============================================================================
// Domain Layer - Event Types
// ============================================================================
//
// Each entity kind has its own subdirectory with:
// - Value objects
// - Events
// - Errors
// - Entity state
//
// `type_registry()` registers every type here with the transcoding layer.
//
// ============================================================================

use chrono::{DateTime, SubsecRound, Utc};

use crate::event_sourcing::{TranscodingError, TypeRegistry};

pub mod order;
pub mod sensor;

/// Current time at the precision stored events keep (microseconds).
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Registry of every event, entity and value-object type in the domain.
pub fn type_registry() -> Result<TypeRegistry, TranscodingError> {
    let mut builder = TypeRegistry::builder();
    builder
        .register_event::<order::OrderCreated>()?
        .register_event::<order::OrderItemsUpdated>()?
        .register_event::<order::OrderShipped>()?
        .register_event::<order::OrderPaymentRecorded>()?
        .register_event::<order::OrderCancelled>()?
        .register_event::<sensor::SensorReadingsRecorded>()?
        .register_entity::<order::Order>()?
        .register_value_object::<order::OrderItem>()?
        .register_value_object::<order::ShippingAddress>()?;
    Ok(builder.build())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_sourcing::TopicResolver;

    #[test]
    fn test_type_registry_builds() {
        let registry = type_registry().unwrap();
        assert_eq!(registry.event_topics().count(), 6);
        assert!(registry
            .type_for("event_transcoding::domain::order::events#Order.PaymentRecorded")
            .unwrap()
            .always_encrypt);
        assert!(registry
            .resolve_class("event_transcoding::domain::order::value_objects", "OrderItem")
            .is_ok());
    }

    #[test]
    fn test_now_has_microsecond_precision() {
        assert_eq!(now().timestamp_subsec_nanos() % 1_000, 0);
    }
}
