use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::event_sourcing::core::{AttributeError, Attributes, DomainEntity, EntityType};
use super::events::OrderCreated;
use super::value_objects::{OrderItem, OrderStatus};

// ============================================================================
// Order Entity - snapshot-able order state
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub id: String,
    pub customer_id: Uuid,
    pub items: Vec<OrderItem>,
    pub status: OrderStatus,
    pub tracking_number: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Order {
    pub fn from_created(event: &OrderCreated) -> Self {
        Self {
            id: event.entity_id.clone(),
            customer_id: event.customer_id,
            items: event.items.clone(),
            status: OrderStatus::Created,
            tracking_number: None,
            created_at: event.created_at,
        }
    }
}

impl DomainEntity for Order {
    fn id(&self) -> &str {
        &self.id
    }

    fn state(&self) -> Attributes {
        Attributes::new()
            .with("id", self.id.clone())
            .with("customer_id", self.customer_id)
            .with("items", self.items.clone())
            .with("status", self.status)
            .with("tracking_number", self.tracking_number.clone())
            .with("created_at", self.created_at)
    }
}

impl EntityType for Order {
    const MODULE: &'static str = module_path!();
    const QUALNAME: &'static str = "Order";

    fn from_state(mut state: Attributes) -> Result<Self, AttributeError> {
        Ok(Self {
            id: state.take("id")?,
            customer_id: state.take("customer_id")?,
            items: state.take("items")?,
            status: state.take("status")?,
            tracking_number: state.take("tracking_number")?,
            created_at: state.take("created_at")?,
        })
    }
}
