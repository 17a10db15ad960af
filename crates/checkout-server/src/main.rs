//! Footwear checkout HTTP server
//!
//! Axum-based backend for the storefront's payment form: issues client tokens
//! for the hosted card fields and charges the nonces they produce.

mod handlers;
mod state;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use checkout_payments::{GatewayConfig, GatewayEnvironment, SandboxGateway};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::handlers::{checkout, client_token, health_check};
use crate::state::AppState;

fn app(state: AppState) -> Router {
    // The storefront is served from a different origin
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/client_token", get(client_token))
        .route("/checkout", post(checkout))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment
    dotenvy::dotenv().ok();

    let config = GatewayConfig::from_env()?;
    if config.environment == GatewayEnvironment::Production {
        anyhow::bail!("GATEWAY_ENVIRONMENT=production but only the sandbox gateway is available");
    }
    if config.merchant_id.is_empty() {
        tracing::warn!("GATEWAY_MERCHANT_ID not set - sandbox tokens will be anonymous");
    }

    let state = AppState {
        environment: config.environment,
        gateway: Arc::new(SandboxGateway::new(config)),
    };

    let addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("checkout server running on http://{}", addr);
    tracing::info!("  GET  /health        - Health check");
    tracing::info!("  GET  /client_token  - Issue a hosted fields client token");
    tracing::info!("  POST /checkout      - Charge a payment method nonce");

    axum::serve(listener, app(state)).await?;

    Ok(())
}
