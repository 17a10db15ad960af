//! Tokenization Provider Strategy Pattern
//!
//! The hosted-fields SDK, its fraud-signal collector, and the token endpoint
//! are black boxes. The controller works exclusively through these traits, so
//! a provider can be swapped without touching the state machine.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use checkout_core::provider::{FieldConfig, HostedFieldsFactory};
//!
//! let fields = factory.create(&token, &FieldConfig::default()).await?;
//! let id = fields.subscribe(Box::new(|event| println!("{event:?}")));
//! let nonce = fields.tokenize().await?;
//! fields.unsubscribe(id);
//! fields.teardown().await?;
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::Result;
use crate::model::{ClientToken, DeviceFingerprint, FieldEvent, Nonce};

/// Options for a single hosted field
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldOptions {
    /// Container selector the provider renders into
    pub selector: String,

    pub placeholder: String,

    #[serde(default, skip_serializing_if = "Option::is_none", rename = "maxlength")]
    pub max_length: Option<u8>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefill: Option<String>,
}

impl FieldOptions {
    pub fn new(selector: impl Into<String>, placeholder: impl Into<String>) -> Self {
        Self {
            selector: selector.into(),
            placeholder: placeholder.into(),
            max_length: None,
            prefill: None,
        }
    }
}

/// Field set handed to the provider on creation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldConfig {
    pub number: FieldOptions,
    pub cvv: FieldOptions,
    pub expiration_date: FieldOptions,

    /// Provider-specific CSS for the isolated inputs
    #[serde(default)]
    pub styles: serde_json::Value,
}

impl Default for FieldConfig {
    fn default() -> Self {
        Self {
            number: FieldOptions {
                prefill: Some(String::new()),
                ..FieldOptions::new("#card-number", "Card Number")
            },
            cvv: FieldOptions {
                max_length: Some(4),
                ..FieldOptions::new("#cvv", "CVV")
            },
            expiration_date: FieldOptions::new("#expiration-date", "MM/YY"),
            styles: serde_json::json!({
                "input": {
                    "color": "#333",
                    "font-size": "16px",
                    "font-family": "system-ui, sans-serif",
                    "padding": "0.75rem",
                    "font-weight": "600"
                },
                "input.invalid": { "color": "#E53935" },
                "input.focused": { "color": "#1976D2" }
            }),
        }
    }
}

/// Handle returned by [`HostedFields::subscribe`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// Callback invoked for every field event
pub type FieldListener = Box<dyn Fn(FieldEvent) + Send + Sync>;

/// Fetches the authorization token used to initialize the widget
#[async_trait]
pub trait TokenFetcher: Send + Sync {
    /// One outbound call, no retry of its own
    async fn fetch_token(&self) -> Result<ClientToken>;
}

/// Fraud-signal collection; failures are never fatal to checkout
#[async_trait]
pub trait DeviceDataCollector: Send + Sync {
    async fn collect(&self, token: &ClientToken) -> Result<DeviceFingerprint>;

    /// Release collector resources (default: nothing to release)
    async fn teardown(&self) -> Result<()> {
        Ok(())
    }
}

/// A live set of rendered card-entry fields
#[async_trait]
pub trait HostedFields: Send + Sync {
    /// Register a listener for validity and focus events
    fn subscribe(&self, listener: FieldListener) -> SubscriptionId;

    /// Remove a listener; unknown ids are ignored
    fn unsubscribe(&self, id: SubscriptionId);

    /// Exchange the entered card for a single-use nonce
    async fn tokenize(&self) -> Result<Nonce>;

    /// Release rendered field resources. Must be idempotent.
    async fn teardown(&self) -> Result<()>;
}

/// Creates hosted field instances (the provider SDK entry point)
#[async_trait]
pub trait HostedFieldsFactory: Send + Sync {
    async fn create(
        &self,
        token: &ClientToken,
        config: &FieldConfig,
    ) -> Result<Arc<dyn HostedFields>>;
}

/// The three provider capabilities the controller orchestrates
#[derive(Clone)]
pub struct PaymentProvider {
    pub token_fetcher: Arc<dyn TokenFetcher>,
    pub collector: Arc<dyn DeviceDataCollector>,
    pub fields: Arc<dyn HostedFieldsFactory>,
}

impl PaymentProvider {
    pub fn new(
        token_fetcher: Arc<dyn TokenFetcher>,
        collector: Arc<dyn DeviceDataCollector>,
        fields: Arc<dyn HostedFieldsFactory>,
    ) -> Self {
        Self {
            token_fetcher,
            collector,
            fields,
        }
    }
}
