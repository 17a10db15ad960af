//! # checkout-runtime
//!
//! Concrete providers for the checkout system.
//!
//! ## Providers
//!
//! - **HTTP** (default): [`GatewayApiClient`] fetches client tokens from and
//!   submits checkouts to the storefront's checkout backend
//! - **Sandbox**: in-process hosted fields and device-data collector for local
//!   runs and tests
//!
//! ## Usage
//!
//! ```rust,ignore
//! use checkout_runtime::{GatewayApiClient, SandboxDeviceCollector, SandboxFieldsFactory};
//!
//! let api = Arc::new(GatewayApiClient::from_env()?);
//! let provider = PaymentProvider::new(
//!     api.clone(),
//!     Arc::new(SandboxDeviceCollector::new()),
//!     Arc::new(SandboxFieldsFactory::new()),
//! );
//! let handle = TokenizationController::new(provider).mount();
//! ```

#[cfg(feature = "http")]
pub mod http;
pub mod sandbox;

#[cfg(feature = "http")]
pub use http::{ApiConfig, GatewayApiClient};
pub use sandbox::{SandboxDeviceCollector, SandboxFieldsFactory, SandboxHostedFields};

// Re-export core types for convenience
pub use checkout_core::{
    CheckoutError, ControllerHandle, ControllerState, HostCallbacks, PaymentProvider, Result,
    TokenizationController, TokenizedPayment,
};
