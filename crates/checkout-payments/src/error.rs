//! Payment Error Types

use checkout_core::CheckoutError;
use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, PaymentError>;

/// Payment-related errors
#[derive(Error, Debug)]
pub enum PaymentError {
    /// Gateway unreachable or returned something unusable
    #[error("Gateway error: {0}")]
    Gateway(String),

    /// Transaction was declined (`ok: false`)
    #[error("Transaction declined: {0}")]
    Declined(String),

    /// `ok: true` without order or transaction id
    #[error("Incomplete checkout response: {0}")]
    IncompleteResponse(String),

    /// Request failed validation before reaching the gateway
    #[error("Invalid checkout request: {0}")]
    InvalidRequest(String),

    /// Nothing selected to purchase
    #[error("No items selected for purchase")]
    EmptyCart,

    /// A pair is missing its colour or size
    #[error("Selection incomplete: {0}")]
    IncompleteSelection(String),

    /// Scratch storage error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Checkout endpoint unreachable
    #[error("Network error: {0}")]
    Network(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Checkout(#[from] CheckoutError),
}

impl PaymentError {
    /// Check if this error is retryable
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Gateway(_) | Self::Network(_) | Self::Storage(_))
    }

    /// Get user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            Self::Declined(reason) => format!("Payment was declined: {reason}"),
            Self::IncompleteResponse(_) => {
                "Checkout succeeded but failed to get order details.".into()
            }
            Self::InvalidRequest(_) => "Missing required payment information".into(),
            Self::EmptyCart => "No items selected for purchase".into(),
            Self::IncompleteSelection(_) => "Please select a color and size for every pair.".into(),
            Self::Gateway(_) | Self::Network(_) => {
                "Payment processing failed. Please try again.".into()
            }
            Self::Config(_) => "Service configuration error.".into(),
            Self::Checkout(e) => e.user_message(),
            _ => "An unexpected error occurred".into(),
        }
    }
}
