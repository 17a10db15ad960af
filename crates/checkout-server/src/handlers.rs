//! HTTP Handlers

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Json,
};
use checkout_payments::{
    CheckoutRequest, CheckoutResponse, GatewayEnvironment, TransactionOutcome,
    TransactionRequest,
};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::state::AppState;

// ============================================================================
// Response Types
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub environment: GatewayEnvironment,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientTokenResponse {
    pub client_token: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub message: String,
}

type CheckoutResult = Result<Json<CheckoutResponse>, (StatusCode, Json<CheckoutResponse>)>;

fn checkout_failure(
    status: StatusCode,
    error: impl Into<String>,
    message: Option<&str>,
) -> (StatusCode, Json<CheckoutResponse>) {
    (
        status,
        Json(CheckoutResponse {
            ok: false,
            error: Some(error.into()),
            message: message.map(Into::into),
            ..Default::default()
        }),
    )
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        environment: state.environment,
    })
}

/// Issue a client token for the hosted fields
pub async fn client_token(
    State(state): State<AppState>,
) -> Result<Json<ClientTokenResponse>, (StatusCode, Json<ErrorResponse>)> {
    match state.gateway.generate_client_token().await {
        Ok(client_token) => Ok(Json(ClientTokenResponse { client_token })),
        Err(e) => {
            tracing::error!(error = %e, "Client token generation failed");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    message: "Error generating client token".into(),
                }),
            ))
        }
    }
}

/// Charge a tokenized card
pub async fn checkout(
    State(state): State<AppState>,
    payload: Result<Json<CheckoutRequest>, JsonRejection>,
) -> CheckoutResult {
    let Json(request) = payload.map_err(|rejection| {
        tracing::warn!(error = %rejection, "Unreadable checkout body");
        checkout_failure(StatusCode::BAD_REQUEST, rejection.body_text(), None)
    })?;

    if request.payment_method_nonce.is_empty() || request.amount <= Decimal::ZERO {
        return Err(checkout_failure(
            StatusCode::BAD_REQUEST,
            "Missing required payment information",
            None,
        ));
    }

    let order_id = format!("order-{}", uuid::Uuid::new_v4());
    let transaction = TransactionRequest::from_checkout(&request, &order_id);
    tracing::info!(%order_id, amount = %transaction.amount, "Processing sale");

    match state.gateway.sale(transaction).await {
        Ok(TransactionOutcome::Approved { transaction_id }) => {
            tracing::info!(%order_id, %transaction_id, "Sale approved");
            Ok(Json(CheckoutResponse {
                ok: true,
                order_id: Some(order_id),
                transaction_id: Some(transaction_id),
                message: Some("Payment processed successfully".into()),
                ..Default::default()
            }))
        }
        Ok(TransactionOutcome::Declined { message }) => {
            tracing::warn!(%order_id, reason = %message, "Sale declined");
            Err(checkout_failure(
                StatusCode::BAD_REQUEST,
                message,
                Some("Payment processing failed"),
            ))
        }
        Err(e) => {
            tracing::error!(%order_id, error = %e, "Checkout error");
            Err(checkout_failure(
                StatusCode::INTERNAL_SERVER_ERROR,
                e.to_string(),
                Some("An unexpected error occurred"),
            ))
        }
    }
}
