//! Checkout API Client
//!
//! `reqwest` implementation of the two calls the storefront makes against its
//! checkout backend: `GET /client_token` and `POST /checkout`.

use std::time::Duration;

use async_trait::async_trait;
use checkout_core::{
    error::{CheckoutError, Result},
    model::ClientToken,
    provider::TokenFetcher,
};
use checkout_payments::{
    checkout::{CheckoutRequest, CheckoutResponse, CheckoutSubmitter},
    PaymentError,
};
use serde::Deserialize;

/// Checkout backend configuration
#[derive(Clone, Debug)]
pub struct ApiConfig {
    /// Base URL, without trailing slash
    pub base_url: String,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".into(),
            timeout_secs: 30,
        }
    }
}

impl ApiConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            ..Default::default()
        }
    }

    pub fn from_env() -> Self {
        let base_url = std::env::var("CHECKOUT_API_BASE")
            .unwrap_or_else(|_| "http://localhost:3000".into());
        let timeout_secs = std::env::var("CHECKOUT_API_TIMEOUT_SECS")
            .ok()
            .and_then(|t| t.parse().ok())
            .unwrap_or(30);

        Self {
            timeout_secs,
            ..Self::new(base_url)
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClientTokenResponse {
    client_token: Option<String>,
}

/// HTTP client for the checkout backend
#[derive(Clone)]
pub struct GatewayApiClient {
    client: reqwest::Client,
    config: ApiConfig,
}

impl GatewayApiClient {
    pub fn from_config(config: ApiConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| CheckoutError::Config(format!("HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_config(ApiConfig::from_env())
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }
}

#[async_trait]
impl TokenFetcher for GatewayApiClient {
    async fn fetch_token(&self) -> Result<ClientToken> {
        let response = self
            .client
            .get(self.config.url("/client_token"))
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .send()
            .await
            .map_err(|e| CheckoutError::Network(e.to_string()))?;

        if !response.status().is_success() {
            tracing::warn!(status = %response.status(), "Client token request rejected");
            return Err(CheckoutError::Network("Failed to fetch client token".into()));
        }

        let body: ClientTokenResponse = response
            .json()
            .await
            .map_err(|e| CheckoutError::Network(e.to_string()))?;

        match body.client_token {
            Some(token) if !token.is_empty() => Ok(ClientToken::new(token)),
            _ => Err(CheckoutError::Network("No client token in response".into())),
        }
    }
}

#[async_trait]
impl CheckoutSubmitter for GatewayApiClient {
    async fn submit(&self, request: &CheckoutRequest) -> checkout_payments::Result<CheckoutResponse> {
        let response = self
            .client
            .post(self.config.url("/checkout"))
            .json(request)
            .send()
            .await
            .map_err(|e| PaymentError::Network(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| PaymentError::Network(e.to_string()))?;

        // Declines arrive as 4xx with a JSON body worth reading
        serde_json::from_str(&body).map_err(|e| {
            tracing::warn!(%status, error = %e, "Unreadable checkout response");
            PaymentError::Gateway(format!("unreadable checkout response ({status})"))
        })
    }
}
