// ============================================================================
// Order Business Rule Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    #[error("Order items cannot be empty")]
    EmptyItems,

    #[error("Invalid item quantity: {0}")]
    InvalidQuantity(i32),

    #[error("Invalid payment amount: {0} cents")]
    InvalidAmount(i64),

    #[error("Card number must end in four digits, got '{0}'")]
    InvalidCardDigits(String),

    #[error("Unknown order status: {0}")]
    UnknownStatus(String),
}
