//! Ephemeral Scratch Storage
//!
//! Key-value scratch space shared by the storefront pages (selections,
//! quantity, the last completed order). Nothing here is durable.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::{PaymentError, Result};

/// Selected colours and sizes (JSON array of `{color, size}`)
pub const SELECTIONS_KEY: &str = "selections";
/// Number of pairs chosen on the quantity step
pub const QUANTITY_KEY: &str = "selectedQuantity";
/// Confirmed selection written when the customer moves on to payment
pub const SHOE_SELECTION_KEY: &str = "shoeSelection";
/// Last completed order
pub const ORDER_DATA_KEY: &str = "order-data";
/// Completion time of the last order (epoch millis)
pub const ORDER_COMPLETED_AT_KEY: &str = "order-completed-at";

/// Scratch storage trait
pub trait ScratchStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;

    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Removing a missing key is not an error
    fn remove(&self, key: &str) -> Result<()>;
}

/// In-memory scratch store
pub struct MemoryScratchStore {
    entries: RwLock<HashMap<String, String>>,
}

impl Default for MemoryScratchStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryScratchStore {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

fn poisoned<T>(_: T) -> PaymentError {
    PaymentError::Storage("scratch store lock poisoned".into())
}

impl ScratchStore for MemoryScratchStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self.entries.read().map_err(poisoned)?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.write().map_err(poisoned)?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.write().map_err(poisoned)?;
        entries.remove(key);
        Ok(())
    }
}
