//! Error Types

use thiserror::Error;

/// Result type alias for checkout operations
pub type Result<T> = std::result::Result<T, CheckoutError>;

/// Checkout error types
#[derive(Error, Debug)]
pub enum CheckoutError {
    /// Token endpoint unreachable, non-2xx, or body without a token
    #[error("Network error: {0}")]
    Network(String),

    /// Device fingerprint collection failed
    #[error("Device data collection failed: {0}")]
    Collection(String),

    /// Hosted fields could not be created
    #[error("Hosted fields initialization failed: {0}")]
    Initialization(String),

    /// Provider rejected the tokenize request
    #[error("Tokenization failed: {0}")]
    Tokenization(String),

    /// Local field-level check failed
    #[error("Invalid {field}: {message}")]
    Validation { field: String, message: String },

    /// Controller has already been torn down
    #[error("Payment form is no longer mounted")]
    Unmounted,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Other/unknown error
    #[error("{0}")]
    Other(String),
}

impl CheckoutError {
    /// Check if the controller may retry after this error
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::Initialization(_) | Self::Tokenization(_)
        )
    }

    /// Convert to a user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            Self::Network(_) | Self::Initialization(_) => {
                "Failed to initialize payment system. Please refresh and try again.".into()
            }
            Self::Tokenization(_) => {
                "Payment processing failed. Please check your card details and try again.".into()
            }
            Self::Validation { message, .. } => message.clone(),
            Self::Unmounted => "The payment form is no longer available. Please refresh.".into(),
            _ => "An unexpected error occurred.".into(),
        }
    }
}

impl From<anyhow::Error> for CheckoutError {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
