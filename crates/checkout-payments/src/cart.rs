//! Cart & Pricing
//!
//! Reads the customer's selections out of scratch storage and prices them by
//! quantity tier. Both lookups are memoised for a short TTL since the billing
//! page re-reads them on every render.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::{PaymentError, Result};
use crate::model::ShoeSelection;
use crate::store::{ScratchStore, QUANTITY_KEY, SELECTIONS_KEY, SHOE_SELECTION_KEY};

const SELECTIONS_TTL: Duration = Duration::from_secs(5);
const PRICE_TTL: Duration = Duration::from_secs(60);

/// Per-quantity pricing
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceTier {
    pub quantity: u32,
    pub price_per_pair: Decimal,
    pub original_price: Decimal,
    pub save_percentage: u32,
}

const PRICE_TIERS: [PriceTier; 4] = [
    PriceTier {
        quantity: 1,
        price_per_pair: dec!(59.99),
        original_price: dec!(89.99),
        save_percentage: 33,
    },
    PriceTier {
        quantity: 2,
        price_per_pair: dec!(54.99),
        original_price: dec!(89.99),
        save_percentage: 39,
    },
    PriceTier {
        quantity: 3,
        price_per_pair: dec!(49.99),
        original_price: dec!(89.99),
        save_percentage: 44,
    },
    PriceTier {
        quantity: 4,
        price_per_pair: dec!(44.99),
        original_price: dec!(89.99),
        save_percentage: 50,
    },
];

/// Tier for a quantity; anything off the table prices as a single pair
pub fn price_tier(quantity: u32) -> PriceTier {
    PRICE_TIERS
        .iter()
        .find(|tier| tier.quantity == quantity)
        .copied()
        .unwrap_or(PRICE_TIERS[0])
}

/// `quantity × pricePerPair` for the matching tier
pub fn total_for(quantity: u32) -> Decimal {
    Decimal::from(quantity) * price_tier(quantity).price_per_pair
}

/// `$109.98`
pub fn format_price(amount: Decimal) -> String {
    format!("${}", amount.round_dp(2))
}

/// Line items and totals for the order summary panel
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderSummary {
    pub items: Vec<ShoeSelection>,
    pub quantity: u32,
    pub tier: PriceTier,
    pub subtotal: Decimal,
    pub savings: Decimal,
    pub total: Decimal,
}

/// Small TTL memo; entries go stale after `ttl`
pub struct MemoCache<K, V> {
    ttl: Duration,
    entries: RwLock<HashMap<K, (V, Instant)>>,
}

impl<K: Eq + Hash, V: Clone> MemoCache<K, V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// A poisoned lock reads as a miss
    pub fn get(&self, key: &K) -> Option<V> {
        let entries = self.entries.read().ok()?;
        let (value, stored_at) = entries.get(key)?;
        (stored_at.elapsed() <= self.ttl).then(|| value.clone())
    }

    pub fn set(&self, key: K, value: V) {
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(key, (value, Instant::now()));
        }
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.write() {
            entries.clear();
        }
    }
}

#[derive(Deserialize)]
struct StoredSelection {
    color: String,
    size: String,
}

/// Parse the `selections` entry; `None` when missing or malformed
pub(crate) fn parse_selections(raw: &str) -> Option<Vec<ShoeSelection>> {
    match serde_json::from_str::<Vec<StoredSelection>>(raw) {
        Ok(stored) => Some(
            stored
                .into_iter()
                .map(|s| ShoeSelection::new(s.color, s.size))
                .collect(),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "Malformed selections in scratch storage");
            None
        }
    }
}

/// Cart view over the scratch store
pub struct Cart<S: ScratchStore> {
    store: Arc<S>,
    selections: MemoCache<&'static str, Vec<ShoeSelection>>,
    prices: MemoCache<u32, Decimal>,
}

impl<S: ScratchStore> Cart<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            selections: MemoCache::new(SELECTIONS_TTL),
            prices: MemoCache::new(PRICE_TTL),
        }
    }

    /// Stored quantity; missing or unparsable reads as zero
    pub fn quantity(&self) -> Result<u32> {
        Ok(self
            .store
            .get(QUANTITY_KEY)?
            .and_then(|raw| raw.trim().parse().ok())
            .unwrap_or(0))
    }

    /// One entry per selected pair, each with quantity 1
    pub fn selected_items(&self) -> Result<Vec<ShoeSelection>> {
        if let Some(cached) = self.selections.get(&SELECTIONS_KEY) {
            return Ok(cached);
        }

        let quantity = self.quantity()?;
        let items = match self.store.get(SELECTIONS_KEY)? {
            Some(raw) if quantity > 0 => parse_selections(&raw).unwrap_or_default(),
            _ => Vec::new(),
        };

        self.selections.set(SELECTIONS_KEY, items.clone());
        Ok(items)
    }

    /// Persist the colour/size picker state
    pub fn save_selections(&self, selections: &[ShoeSelection], quantity: u32) -> Result<()> {
        let stored: Vec<_> = selections
            .iter()
            .map(|s| serde_json::json!({ "color": s.color, "size": s.size }))
            .collect();
        self.store
            .set(SELECTIONS_KEY, &serde_json::to_string(&stored)?)?;
        self.store.set(QUANTITY_KEY, &quantity.to_string())?;
        self.selections.clear();
        Ok(())
    }

    /// Record the selection the customer proceeds to payment with
    pub fn confirm_selection(&self, selection: &ShoeSelection) -> Result<()> {
        if !selection.is_complete() {
            return Err(PaymentError::IncompleteSelection(
                "choose a color and size".into(),
            ));
        }
        self.store
            .set(SHOE_SELECTION_KEY, &serde_json::to_string(selection)?)
    }

    /// Price for `quantity` pairs
    pub fn total_amount(&self, quantity: u32) -> Decimal {
        if let Some(cached) = self.prices.get(&quantity) {
            return cached;
        }
        let total = total_for(quantity);
        self.prices.set(quantity, total);
        total
    }

    pub fn summary(&self) -> Result<OrderSummary> {
        let quantity = self.quantity()?;
        let tier = price_tier(quantity);
        let total = self.total_amount(quantity);
        let subtotal = Decimal::from(quantity) * tier.original_price;

        Ok(OrderSummary {
            items: self.selected_items()?,
            quantity,
            tier,
            subtotal,
            savings: subtotal - total,
            total,
        })
    }

    /// Drop memoised reads after the store changes underneath us
    pub fn invalidate(&self) {
        self.selections.clear();
        self.prices.clear();
    }
}
