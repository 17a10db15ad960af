//! Application State

use std::sync::Arc;

use checkout_payments::{GatewayEnvironment, PaymentGateway};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Gateway that issues client tokens and runs sales
    pub gateway: Arc<dyn PaymentGateway>,

    pub environment: GatewayEnvironment,
}
