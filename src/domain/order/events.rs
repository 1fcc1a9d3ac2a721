use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::event_sourcing::core::{
    AttributeError, Attributes, DomainEvent, EventId, EventType, DOMAIN_EVENT_ID_ATTR, ENTITY_ID_ATTR,
};
use super::errors::OrderError;
use super::value_objects::{OrderItem, ShippingAddress};
use crate::domain::now;

// ============================================================================
// Order Events - Domain Events for the Order entity
// ============================================================================
//
// Each event has a validating constructor for the application layer and a
// raw `from_state` factory used only when replaying stored events. All topics
// share the `Order` prefix so one order's events land in one stream.
//
// ============================================================================

/// Order Created - Initial event in order lifecycle
#[derive(Debug, Clone, PartialEq)]
pub struct OrderCreated {
    pub entity_id: String,
    pub domain_event_id: EventId,
    pub customer_id: Uuid,
    pub items: Vec<OrderItem>,
    pub created_at: DateTime<Utc>,
}

impl OrderCreated {
    pub fn new(order_id: &str, customer_id: Uuid, items: Vec<OrderItem>) -> Result<Self, OrderError> {
        if items.is_empty() {
            return Err(OrderError::EmptyItems);
        }
        Ok(Self {
            entity_id: order_id.to_string(),
            domain_event_id: EventId::new(),
            customer_id,
            items,
            created_at: now(),
        })
    }
}

impl DomainEvent for OrderCreated {
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
            .with("customer_id", self.customer_id)
            .with("items", self.items.clone())
            .with("created_at", self.created_at)
    }
}

impl EventType for OrderCreated {
    const MODULE: &'static str = module_path!();
    const QUALNAME: &'static str = "Order.Created";

    fn from_state(mut state: Attributes) -> Result<Self, AttributeError> {
        Ok(Self {
            entity_id: state.take(ENTITY_ID_ATTR)?,
            domain_event_id: state.take(DOMAIN_EVENT_ID_ATTR)?,
            customer_id: state.take("customer_id")?,
            items: state.take("items")?,
            created_at: state.take("created_at")?,
        })
    }
}

/// Order Items Updated - Order contents modified
#[derive(Debug, Clone, PartialEq)]
pub struct OrderItemsUpdated {
    pub entity_id: String,
    pub domain_event_id: EventId,
    pub items: Vec<OrderItem>,
    pub reason: Option<String>,
}

impl OrderItemsUpdated {
    pub fn new(order_id: &str, items: Vec<OrderItem>, reason: Option<String>) -> Result<Self, OrderError> {
        if items.is_empty() {
            return Err(OrderError::EmptyItems);
        }
        Ok(Self {
            entity_id: order_id.to_string(),
            domain_event_id: EventId::new(),
            items,
            reason,
        })
    }
}

impl DomainEvent for OrderItemsUpdated {
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
            .with("items", self.items.clone())
            .with("reason", self.reason.clone())
    }
}

impl EventType for OrderItemsUpdated {
    const MODULE: &'static str = module_path!();
    const QUALNAME: &'static str = "Order.ItemsUpdated";

    fn from_state(mut state: Attributes) -> Result<Self, AttributeError> {
        Ok(Self {
            entity_id: state.take(ENTITY_ID_ATTR)?,
            domain_event_id: state.take(DOMAIN_EVENT_ID_ATTR)?,
            items: state.take("items")?,
            reason: state.take("reason")?,
        })
    }
}

/// Order Shipped - Order dispatched to customer
#[derive(Debug, Clone, PartialEq)]
pub struct OrderShipped {
    pub entity_id: String,
    pub domain_event_id: EventId,
    pub tracking_number: String,
    pub carrier: String,
    pub shipped_at: DateTime<Utc>,
    pub expected_delivery: NaiveDate,
    pub address: ShippingAddress,
}

impl OrderShipped {
    pub fn new(
        order_id: &str,
        tracking_number: &str,
        carrier: &str,
        expected_delivery: NaiveDate,
        address: ShippingAddress,
    ) -> Self {
        Self {
            entity_id: order_id.to_string(),
            domain_event_id: EventId::new(),
            tracking_number: tracking_number.to_string(),
            carrier: carrier.to_string(),
            shipped_at: now(),
            expected_delivery,
            address,
        }
    }
}

impl DomainEvent for OrderShipped {
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
            .with("tracking_number", self.tracking_number.clone())
            .with("carrier", self.carrier.clone())
            .with("shipped_at", self.shipped_at)
            .with("expected_delivery", self.expected_delivery)
            .with("address", self.address.clone())
    }
}

impl EventType for OrderShipped {
    const MODULE: &'static str = module_path!();
    const QUALNAME: &'static str = "Order.Shipped";

    fn from_state(mut state: Attributes) -> Result<Self, AttributeError> {
        Ok(Self {
            entity_id: state.take(ENTITY_ID_ATTR)?,
            domain_event_id: state.take(DOMAIN_EVENT_ID_ATTR)?,
            tracking_number: state.take("tracking_number")?,
            carrier: state.take("carrier")?,
            shipped_at: state.take("shipped_at")?,
            expected_delivery: state.take("expected_delivery")?,
            address: state.take("address")?,
        })
    }
}

/// Order Payment Recorded - card details, never stored in plaintext
#[derive(Debug, Clone, PartialEq)]
pub struct OrderPaymentRecorded {
    pub entity_id: String,
    pub domain_event_id: EventId,
    pub amount_cents: i64,
    pub card_last4: String,
    pub paid_at: DateTime<Utc>,
}

impl OrderPaymentRecorded {
    pub fn new(order_id: &str, amount_cents: i64, card_last4: &str) -> Result<Self, OrderError> {
        if amount_cents <= 0 {
            return Err(OrderError::InvalidAmount(amount_cents));
        }
        if card_last4.len() != 4 || !card_last4.chars().all(|c| c.is_ascii_digit()) {
            return Err(OrderError::InvalidCardDigits(card_last4.to_string()));
        }
        Ok(Self {
            entity_id: order_id.to_string(),
            domain_event_id: EventId::new(),
            amount_cents,
            card_last4: card_last4.to_string(),
            paid_at: now(),
        })
    }
}

impl DomainEvent for OrderPaymentRecorded {
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
            .with("amount_cents", self.amount_cents)
            .with("card_last4", self.card_last4.clone())
            .with("paid_at", self.paid_at)
    }
}

impl EventType for OrderPaymentRecorded {
    const MODULE: &'static str = module_path!();
    const QUALNAME: &'static str = "Order.PaymentRecorded";
    const ALWAYS_ENCRYPT: bool = true;

    fn from_state(mut state: Attributes) -> Result<Self, AttributeError> {
        Ok(Self {
            entity_id: state.take(ENTITY_ID_ATTR)?,
            domain_event_id: state.take(DOMAIN_EVENT_ID_ATTR)?,
            amount_cents: state.take("amount_cents")?,
            card_last4: state.take("card_last4")?,
            paid_at: state.take("paid_at")?,
        })
    }
}

/// Order Cancelled - Order lifecycle ended
#[derive(Debug, Clone, PartialEq)]
pub struct OrderCancelled {
    pub entity_id: String,
    pub domain_event_id: EventId,
    pub reason: Option<String>,
    pub cancelled_by: Option<Uuid>,
}

impl OrderCancelled {
    pub fn new(order_id: &str, reason: Option<String>, cancelled_by: Option<Uuid>) -> Self {
        Self {
            entity_id: order_id.to_string(),
            domain_event_id: EventId::new(),
            reason,
            cancelled_by,
        }
    }
}

impl DomainEvent for OrderCancelled {
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
            .with("reason", self.reason.clone())
            .with("cancelled_by", self.cancelled_by)
    }
}

impl EventType for OrderCancelled {
    const MODULE: &'static str = module_path!();
    const QUALNAME: &'static str = "Order.Cancelled";

    fn from_state(mut state: Attributes) -> Result<Self, AttributeError> {
        Ok(Self {
            entity_id: state.take(ENTITY_ID_ATTR)?,
            domain_event_id: state.take(DOMAIN_EVENT_ID_ATTR)?,
            reason: state.take("reason")?,
            cancelled_by: state.take("cancelled_by")?,
        })
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_sourcing::core::{id_prefix_from_event_type, topic_from_event_type};

    #[test]
    fn test_order_events_share_prefix() {
        assert_eq!(id_prefix_from_event_type::<OrderCreated>(), "Order");
        assert_eq!(id_prefix_from_event_type::<OrderShipped>(), "Order");
        assert_eq!(id_prefix_from_event_type::<OrderCancelled>(), "Order");
    }

    #[test]
    fn test_topic_includes_module() {
        assert_eq!(
            topic_from_event_type::<OrderCreated>(),
            "event_transcoding::domain::order::events#Order.Created"
        );
    }

    #[test]
    fn test_created_requires_items() {
        assert!(matches!(
            OrderCreated::new("o1", Uuid::new_v4(), vec![]),
            Err(OrderError::EmptyItems)
        ));
    }

    #[test]
    fn test_payment_validation() {
        assert!(OrderPaymentRecorded::new("o1", 0, "4242").is_err());
        assert!(OrderPaymentRecorded::new("o1", 100, "42x2").is_err());
        assert!(OrderPaymentRecorded::new("o1", 100, "4242").is_ok());
        assert!(OrderPaymentRecorded::ALWAYS_ENCRYPT);
    }

    #[test]
    fn test_from_state_skips_constructor_rules() {
        // An empty item list is refused by `new` but must still replay.
        let state = Attributes::new()
            .with(ENTITY_ID_ATTR, "o1")
            .with(DOMAIN_EVENT_ID_ATTR, "ev-1")
            .with("items", Vec::<OrderItem>::new())
            .with("reason", None::<String>);

        let event = OrderItemsUpdated::from_state(state).unwrap();
        assert!(event.items.is_empty());
        assert_eq!(event.reason, None);
    }

    #[test]
    fn test_state_round_trip() {
        let event = OrderCancelled::new("o1", Some("duplicate".to_string()), Some(Uuid::new_v4()));
        assert_eq!(OrderCancelled::from_state(event.state()).unwrap(), event);
    }
}
