use std::fmt;

use uuid::Uuid;

use crate::event_sourcing::core::{AttrValue, AttributeError, Attributes, FromAttr, IntoAttr, ValueObject};
use super::errors::OrderError;

// ============================================================================
// Order Value Objects
// ============================================================================

/// One line of an order.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderItem {
    pub product_id: Uuid,
    pub quantity: i32,
}

impl OrderItem {
    pub fn new(product_id: Uuid, quantity: i32) -> Result<Self, OrderError> {
        if quantity <= 0 {
            return Err(OrderError::InvalidQuantity(quantity));
        }
        Ok(Self { product_id, quantity })
    }
}

impl ValueObject for OrderItem {
    const MODULE: &'static str = module_path!();
    const QUALNAME: &'static str = "OrderItem";

    fn attributes(&self) -> Attributes {
        Attributes::new()
            .with("product_id", self.product_id)
            .with("quantity", self.quantity)
    }

    fn construct(mut args: Attributes) -> Result<Self, AttributeError> {
        let product_id = args.take("product_id")?;
        let quantity = args.take("quantity")?;
        if let Some(name) = args.keys().next() {
            return Err(AttributeError::UnknownAttribute(name.to_string()));
        }
        Self::new(product_id, quantity).map_err(|e| AttributeError::Invalid {
            name: "quantity".to_string(),
            reason: e.to_string(),
        })
    }

    fn bare() -> Self {
        Self {
            product_id: Uuid::nil(),
            quantity: 0,
        }
    }

    fn assign(&mut self, name: &str, value: AttrValue) -> Result<(), AttributeError> {
        match name {
            "product_id" => self.product_id = Uuid::from_attr(value)?,
            "quantity" => self.quantity = i32::from_attr(value)?,
            other => return Err(AttributeError::UnknownAttribute(other.to_string())),
        }
        Ok(())
    }
}

crate::impl_value_object_attr!(OrderItem);

/// Where an order is sent.
#[derive(Debug, Clone, PartialEq)]
pub struct ShippingAddress {
    pub street: String,
    pub city: String,
    pub postal_code: String,
    pub country: String,
}

impl ValueObject for ShippingAddress {
    const MODULE: &'static str = module_path!();
    const QUALNAME: &'static str = "ShippingAddress";

    fn attributes(&self) -> Attributes {
        Attributes::new()
            .with("street", self.street.clone())
            .with("city", self.city.clone())
            .with("postal_code", self.postal_code.clone())
            .with("country", self.country.clone())
    }

    fn construct(mut args: Attributes) -> Result<Self, AttributeError> {
        let country: String = args.take("country")?;
        if country.len() != 2 {
            return Err(AttributeError::Invalid {
                name: "country".to_string(),
                reason: format!("expected a two-letter country code, got '{}'", country),
            });
        }
        let address = Self {
            street: args.take("street")?,
            city: args.take("city")?,
            postal_code: args.take("postal_code")?,
            country,
        };
        if let Some(name) = args.keys().next() {
            return Err(AttributeError::UnknownAttribute(name.to_string()));
        }
        Ok(address)
    }

    fn bare() -> Self {
        Self {
            street: String::new(),
            city: String::new(),
            postal_code: String::new(),
            country: String::new(),
        }
    }

    fn assign(&mut self, name: &str, value: AttrValue) -> Result<(), AttributeError> {
        let value = String::from_attr(value)?;
        match name {
            "street" => self.street = value,
            "city" => self.city = value,
            "postal_code" => self.postal_code = value,
            "country" => self.country = value,
            other => return Err(AttributeError::UnknownAttribute(other.to_string())),
        }
        Ok(())
    }
}

crate::impl_value_object_attr!(ShippingAddress);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderStatus {
    Created,
    Shipped,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Created => "created",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = OrderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(OrderStatus::Created),
            "shipped" => Ok(OrderStatus::Shipped),
            "cancelled" => Ok(OrderStatus::Cancelled),
            other => Err(OrderError::UnknownStatus(other.to_string())),
        }
    }
}

impl IntoAttr for OrderStatus {
    fn into_attr(self) -> AttrValue {
        AttrValue::Str(self.as_str().to_string())
    }
}

impl FromAttr for OrderStatus {
    fn from_attr(value: AttrValue) -> Result<Self, AttributeError> {
        String::from_attr(value)?
            .parse()
            .map_err(|e: OrderError| AttributeError::Invalid {
                name: String::new(),
                reason: e.to_string(),
            })
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
