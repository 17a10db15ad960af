//! Checkout Submission
//!
//! Turns a tokenized payment plus the checkout form into a `/checkout`
//! request, interprets the response, and records the completed order.
//!
//! ```rust,ignore
//! let service = CheckoutService::new(api_client, Arc::new(MemoryScratchStore::new()));
//! let receipt = service.process_payment(&payload, &tokenized).await?;
//! println!("Order {}", receipt.order_id);
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use checkout_core::TokenizedPayment;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{PaymentError, Result};
use crate::model::{AddressData, CheckoutPayload, OrderRecord, ShoeSelection};
use crate::order::OrderBook;
use crate::store::ScratchStore;

/// Body of `POST /checkout`
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CheckoutRequest {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub shipping_address: AddressData,
    pub billing_address: Option<AddressData>,
    pub order_details: Vec<ShoeSelection>,
    #[serde(rename = "payment_method_nonce")]
    pub payment_method_nonce: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    pub device_data: String,
}

impl CheckoutRequest {
    pub fn new(payload: &CheckoutPayload, payment: &TokenizedPayment) -> Self {
        let shipping = &payload.shipping_address;
        Self {
            name: shipping.full_name(),
            email: payload.email.clone(),
            phone: shipping.phone.clone().unwrap_or_default(),
            shipping_address: shipping.clone(),
            billing_address: payload.billing_address.clone(),
            order_details: payload.items.clone(),
            payment_method_nonce: payment.nonce.as_str().to_string(),
            amount: payload.total_amount,
            device_data: payment
                .device_data
                .as_ref()
                .map(|d| d.as_str().to_string())
                .unwrap_or_default(),
        }
    }
}

/// Response of `POST /checkout`, on success and failure alike
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Identifiers of a completed order
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutReceipt {
    pub order_id: String,
    pub transaction_id: String,
}

impl CheckoutResponse {
    pub fn into_receipt(self) -> Result<CheckoutReceipt> {
        if !self.ok {
            let reason = match (self.error, self.message) {
                (Some(error), _) => format!("error: {error}"),
                (None, Some(message)) => message,
                (None, None) => "Checkout failed".into(),
            };
            return Err(PaymentError::Declined(reason));
        }

        match (self.order_id, self.transaction_id) {
            (Some(order_id), Some(transaction_id))
                if !order_id.is_empty() && !transaction_id.is_empty() =>
            {
                Ok(CheckoutReceipt {
                    order_id,
                    transaction_id,
                })
            }
            _ => Err(PaymentError::IncompleteResponse(
                "missing order or transaction id".into(),
            )),
        }
    }
}

/// Transport for the checkout endpoint
#[async_trait]
pub trait CheckoutSubmitter: Send + Sync {
    /// Returns the parsed body whatever the HTTP status
    async fn submit(&self, request: &CheckoutRequest) -> Result<CheckoutResponse>;
}

/// Submits tokenized payments and keeps the order book current
pub struct CheckoutService<S: ScratchStore> {
    submitter: Arc<dyn CheckoutSubmitter>,
    orders: OrderBook<S>,
}

impl<S: ScratchStore> CheckoutService<S> {
    pub fn new(submitter: Arc<dyn CheckoutSubmitter>, store: Arc<S>) -> Self {
        Self {
            submitter,
            orders: OrderBook::new(store),
        }
    }

    pub fn orders(&self) -> &OrderBook<S> {
        &self.orders
    }

    pub async fn process_payment(
        &self,
        payload: &CheckoutPayload,
        payment: &TokenizedPayment,
    ) -> Result<CheckoutReceipt> {
        payload.validate()?;

        let request = CheckoutRequest::new(payload, payment);
        tracing::info!(
            items = request.order_details.len(),
            amount = %request.amount,
            has_device_data = !request.device_data.is_empty(),
            "Submitting checkout"
        );

        let receipt = self.submitter.submit(&request).await?.into_receipt()?;

        // Charge already captured: storage errors are logged only
        if let Err(e) =
            self.orders
                .store_order(payload, &receipt.order_id, &receipt.transaction_id)
        {
            tracing::warn!(error = %e, order_id = %receipt.order_id, "Failed to store order record");
        }

        tracing::info!(order_id = %receipt.order_id, "Checkout completed");
        Ok(receipt)
    }

    /// Confirmation page hand-off: read the order, then drop the cart
    pub fn complete_order(&self) -> Result<Option<OrderRecord>> {
        let record = self.orders.order_data()?;
        self.orders.clear_checkout_data()?;
        Ok(record)
    }
}
