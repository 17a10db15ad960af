//! Payment Gateway
//!
//! Server-side half of the flow: client-token generation and the sale
//! transaction that consumes a nonce.

use std::str::FromStr;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::checkout::CheckoutRequest;
use crate::error::{PaymentError, Result};
use crate::model::AddressData;

/// Nonces with this prefix are approved by [`SandboxGateway`]
pub const SANDBOX_VALID_NONCE_PREFIX: &str = "fake-valid";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum GatewayEnvironment {
    #[default]
    Sandbox,
    Production,
}

impl FromStr for GatewayEnvironment {
    type Err = PaymentError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "" | "sandbox" => Ok(Self::Sandbox),
            "production" => Ok(Self::Production),
            other => Err(PaymentError::Config(format!(
                "unknown gateway environment: {other}"
            ))),
        }
    }
}

/// Merchant credentials
#[derive(Clone, Default)]
pub struct GatewayConfig {
    pub environment: GatewayEnvironment,
    pub merchant_id: String,
    pub public_key: String,
    pub private_key: String,
}

impl std::fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("environment", &self.environment)
            .field("merchant_id", &self.merchant_id)
            .field("public_key", &self.public_key)
            .field("private_key", &"<redacted>")
            .finish()
    }
}

impl GatewayConfig {
    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        let var = |name: &str| std::env::var(name).unwrap_or_default();
        let config = Self {
            environment: var("GATEWAY_ENVIRONMENT").parse()?,
            merchant_id: var("GATEWAY_MERCHANT_ID"),
            public_key: var("GATEWAY_PUBLIC_KEY"),
            private_key: var("GATEWAY_PRIVATE_KEY"),
        };
        config.validate()?;
        Ok(config)
    }

    /// Production needs the full credential set
    pub fn validate(&self) -> Result<()> {
        if self.environment == GatewayEnvironment::Production {
            for (name, value) in [
                ("GATEWAY_MERCHANT_ID", &self.merchant_id),
                ("GATEWAY_PUBLIC_KEY", &self.public_key),
                ("GATEWAY_PRIVATE_KEY", &self.private_key),
            ] {
                if value.is_empty() {
                    return Err(PaymentError::Config(format!("{name} not set")));
                }
            }
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayCustomer {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayAddress {
    pub first_name: String,
    pub last_name: String,
    pub street_address: String,
    pub extended_address: String,
    pub locality: String,
    pub region: String,
    pub postal_code: String,
    pub country_code_alpha2: String,
}

impl From<&AddressData> for GatewayAddress {
    fn from(address: &AddressData) -> Self {
        Self {
            first_name: address.first_name.clone(),
            last_name: address.last_name.clone(),
            street_address: address.address1.clone(),
            extended_address: address.address2.clone().unwrap_or_default(),
            locality: address.city.clone(),
            region: address.state.clone(),
            postal_code: address.zip_code.clone(),
            country_code_alpha2: address.country.clone(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionOptions {
    pub submit_for_settlement: bool,
}

/// Sale request as sent to the gateway
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRequest {
    /// Fixed to two decimal places
    pub amount: String,
    pub order_id: String,
    pub payment_method_nonce: String,
    pub customer: GatewayCustomer,
    pub billing: GatewayAddress,
    pub shipping: GatewayAddress,
    pub options: TransactionOptions,
}

impl TransactionRequest {
    pub fn from_checkout(request: &CheckoutRequest, order_id: &str) -> Self {
        let (first_name, last_name) = request
            .name
            .split_once(' ')
            .unwrap_or((request.name.as_str(), ""));
        let billing = request
            .billing_address
            .as_ref()
            .unwrap_or(&request.shipping_address);

        Self {
            amount: format!("{:.2}", request.amount.round_dp(2)),
            order_id: order_id.to_string(),
            payment_method_nonce: request.payment_method_nonce.clone(),
            customer: GatewayCustomer {
                first_name: first_name.to_string(),
                last_name: last_name.to_string(),
                email: request.email.clone(),
                phone: request.phone.clone(),
            },
            billing: billing.into(),
            shipping: (&request.shipping_address).into(),
            options: TransactionOptions {
                submit_for_settlement: true,
            },
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransactionOutcome {
    Approved { transaction_id: String },
    Declined { message: String },
}

/// Gateway operations the checkout server needs
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn generate_client_token(&self) -> Result<String>;

    async fn sale(&self, request: TransactionRequest) -> Result<TransactionOutcome>;
}

/// Settled sale kept by the sandbox
#[derive(Clone, Debug)]
pub struct SandboxTransaction {
    pub id: String,
    pub request: TransactionRequest,
    pub created_at: DateTime<Utc>,
}

/// In-memory gateway for local runs and tests
pub struct SandboxGateway {
    config: GatewayConfig,
    transactions: RwLock<Vec<SandboxTransaction>>,
}

impl SandboxGateway {
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            config,
            transactions: RwLock::new(Vec::new()),
        }
    }

    pub fn transactions(&self) -> Vec<SandboxTransaction> {
        self.transactions
            .read()
            .map(|t| t.clone())
            .unwrap_or_default()
    }
}

impl Default for SandboxGateway {
    fn default() -> Self {
        Self::new(GatewayConfig::default())
    }
}

#[async_trait]
impl PaymentGateway for SandboxGateway {
    async fn generate_client_token(&self) -> Result<String> {
        Ok(format!(
            "sandbox_{}_{}",
            self.config.merchant_id,
            uuid::Uuid::new_v4().simple()
        ))
    }

    async fn sale(&self, request: TransactionRequest) -> Result<TransactionOutcome> {
        if !request
            .payment_method_nonce
            .starts_with(SANDBOX_VALID_NONCE_PREFIX)
        {
            tracing::info!(order_id = %request.order_id, "Sandbox declined sale");
            return Ok(TransactionOutcome::Declined {
                message: "Processor Declined".into(),
            });
        }

        let id = uuid::Uuid::new_v4().simple().to_string()[..8].to_string();
        let mut transactions = self
            .transactions
            .write()
            .map_err(|_| PaymentError::Gateway("sandbox ledger poisoned".into()))?;
        transactions.push(SandboxTransaction {
            id: id.clone(),
            request,
            created_at: Utc::now(),
        });

        Ok(TransactionOutcome::Approved { transaction_id: id })
    }
}
