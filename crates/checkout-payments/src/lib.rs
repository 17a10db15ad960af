//! # checkout-payments
//!
//! Cart pricing, order records, and checkout submission for the footwear
//! storefront.
//!
//! ## Flow
//!
//! ```text
//! ┌──────────┐   nonce + device data   ┌─────────────────┐   POST /checkout   ┌──────────────┐
//! │   Cart   │───────────────────────▶│ CheckoutService │───────────────────▶│ checkout API │
//! │ (scratch)│                         └────────┬────────┘                    │  (gateway)   │
//! └──────────┘                                  │ order-data                  └──────────────┘
//!                                               ▼
//!                                        ┌────────────┐
//!                                        │ OrderBook  │
//!                                        └────────────┘
//! ```
//!
//! The server side of the same exchange lives in [`gateway`]: a
//! [`PaymentGateway`] generates client tokens and runs the sale.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use checkout_payments::{Cart, CheckoutService, MemoryScratchStore};
//!
//! let store = Arc::new(MemoryScratchStore::new());
//! let cart = Cart::new(store.clone());
//! let total = cart.total_amount(cart.quantity()?);
//!
//! let service = CheckoutService::new(api_client, store);
//! let receipt = service.process_payment(&payload, &tokenized).await?;
//! ```

pub mod cart;
pub mod checkout;
pub mod error;
pub mod gateway;
pub mod model;
pub mod order;
pub mod store;

pub use cart::{format_price, price_tier, Cart, OrderSummary, PriceTier};
pub use checkout::{
    CheckoutReceipt, CheckoutRequest, CheckoutResponse, CheckoutService, CheckoutSubmitter,
};
pub use error::{PaymentError, Result};
pub use gateway::{
    GatewayConfig, GatewayEnvironment, PaymentGateway, SandboxGateway, TransactionOutcome,
    TransactionRequest,
};
pub use model::{AddressData, CheckoutPayload, OrderRecord, OrderStatus, ShoeSelection};
pub use order::OrderBook;
pub use store::{MemoryScratchStore, ScratchStore};
