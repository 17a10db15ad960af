//! Order Records
//!
//! Persists the completed order for the confirmation page and clears checkout
//! scratch state once the customer is done with it.

use std::sync::Arc;

use chrono::Utc;

use crate::cart::{parse_selections, total_for};
use crate::error::Result;
use crate::model::{CheckoutPayload, OrderRecord, OrderStatus};
use crate::store::{
    ScratchStore, ORDER_COMPLETED_AT_KEY, ORDER_DATA_KEY, QUANTITY_KEY, SELECTIONS_KEY,
    SHOE_SELECTION_KEY,
};

const CHECKOUT_KEYS: [&str; 3] = [QUANTITY_KEY, SELECTIONS_KEY, SHOE_SELECTION_KEY];
const ORDER_KEYS: [&str; 2] = [ORDER_DATA_KEY, ORDER_COMPLETED_AT_KEY];

/// Order storage over the scratch store
pub struct OrderBook<S: ScratchStore> {
    store: Arc<S>,
}

impl<S: ScratchStore> Clone for OrderBook<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: ScratchStore> OrderBook<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Write `order-data` and `order-completed-at`
    pub fn store_order(
        &self,
        payload: &CheckoutPayload,
        order_id: &str,
        transaction_id: &str,
    ) -> Result<OrderRecord> {
        let now = Utc::now();
        let record = OrderRecord {
            order_id: order_id.to_string(),
            transaction_id: Some(transaction_id.to_string()),
            items: payload.items.clone(),
            shipping_address: Some(payload.shipping_address.clone()),
            billing_address: payload.billing_address.clone(),
            email: Some(payload.email.clone()),
            total_amount: payload.total_amount,
            order_date: now,
            status: OrderStatus::Confirmed,
        };

        self.store
            .set(ORDER_DATA_KEY, &serde_json::to_string(&record)?)?;
        self.store
            .set(ORDER_COMPLETED_AT_KEY, &now.timestamp_millis().to_string())?;

        tracing::debug!(order_id, "Stored order record");
        Ok(record)
    }

    /// Last completed order.
    ///
    /// Without a stored record, an order is reconstructed from the current
    /// selections under a generated `ORD-{millis}` id so the confirmation
    /// page still has something to show.
    pub fn order_data(&self) -> Result<Option<OrderRecord>> {
        if let Some(raw) = self.store.get(ORDER_DATA_KEY)? {
            return match serde_json::from_str(&raw) {
                Ok(record) => Ok(Some(record)),
                Err(e) => {
                    tracing::warn!(error = %e, "Malformed order record in scratch storage");
                    Ok(None)
                }
            };
        }

        let selections = self.store.get(SELECTIONS_KEY)?;
        let quantity = self.store.get(QUANTITY_KEY)?;
        let (Some(selections), Some(quantity)) = (selections, quantity) else {
            return Ok(None);
        };
        let Some(items) = parse_selections(&selections) else {
            return Ok(None);
        };
        let quantity = quantity.trim().parse().unwrap_or(0);

        let now = Utc::now();
        Ok(Some(OrderRecord {
            order_id: format!("ORD-{}", now.timestamp_millis()),
            transaction_id: None,
            items,
            shipping_address: None,
            billing_address: None,
            email: None,
            total_amount: total_for(quantity),
            order_date: now,
            status: OrderStatus::Confirmed,
        }))
    }

    /// Remove the cart keys after a successful order
    pub fn clear_checkout_data(&self) -> Result<()> {
        CHECKOUT_KEYS
            .iter()
            .try_for_each(|key| self.store.remove(key))?;
        tracing::debug!("Checkout data cleared");
        Ok(())
    }

    /// Remove the stored order when a new order starts
    pub fn clear_order_data(&self) -> Result<()> {
        ORDER_KEYS.iter().try_for_each(|key| self.store.remove(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::fixtures;
    use crate::store::MemoryScratchStore;
    use rust_decimal_macros::dec;

    fn book() -> (Arc<MemoryScratchStore>, OrderBook<MemoryScratchStore>) {
        let store = Arc::new(MemoryScratchStore::new());
        (store.clone(), OrderBook::new(store))
    }

    #[test]
    fn test_store_and_read_order() {
        let (store, book) = book();
        let stored = book
            .store_order(&fixtures::payload(), "order-1", "txn-1")
            .unwrap();

        let read = book.order_data().unwrap().unwrap();
        assert_eq!(read, stored);
        assert_eq!(read.transaction_id.as_deref(), Some("txn-1"));
        assert!(store.get(ORDER_COMPLETED_AT_KEY).unwrap().is_some());

        let json: serde_json::Value =
            serde_json::from_str(&store.get(ORDER_DATA_KEY).unwrap().unwrap()).unwrap();
        assert_eq!(json["orderId"], "order-1");
        assert_eq!(json["status"], "confirmed");
    }

    #[test]
    fn test_fallback_reconstructs_from_selections() {
        let (store, book) = book();
        assert!(book.order_data().unwrap().is_none());

        store
            .set(SELECTIONS_KEY, r#"[{"color":"black","size":"10"},{"color":"tan","size":"9"}]"#)
            .unwrap();
        store.set(QUANTITY_KEY, "2").unwrap();

        let record = book.order_data().unwrap().unwrap();
        assert!(record.order_id.starts_with("ORD-"));
        assert_eq!(record.transaction_id, None);
        assert_eq!(record.items.len(), 2);
        assert_eq!(record.total_amount, dec!(109.98));
    }

    #[test]
    fn test_clearing() {
        let (store, book) = book();
        store.set(SELECTIONS_KEY, "[]").unwrap();
        store.set(QUANTITY_KEY, "1").unwrap();
        store.set(SHOE_SELECTION_KEY, "{}").unwrap();
        book.store_order(&fixtures::payload(), "order-1", "txn-1")
            .unwrap();

        book.clear_checkout_data().unwrap();
        assert!(CHECKOUT_KEYS
            .iter()
            .all(|k| store.get(k).unwrap().is_none()));
        assert!(book.order_data().unwrap().is_some());

        book.clear_order_data().unwrap();
        assert!(book.order_data().unwrap().is_none());
    }
}
