//! # checkout-core
//!
//! Client-side payment tokenization for the footwear storefront checkout.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                    TokenizationController                         │
//! │  ┌──────────────┐  ┌─────────────────────┐  ┌──────────────────┐  │
//! │  │ TokenFetcher │─▶│ DeviceDataCollector │─▶│ HostedFields     │  │
//! │  │  (required)  │  │   (best effort)     │  │ (retried, 3 max) │  │
//! │  └──────────────┘  └─────────────────────┘  └──────────────────┘  │
//! │          validity (debounced) ──▶ host form                       │
//! │          submit ──▶ tokenize ──▶ on_tokenize / payment-tokenized  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The provider traits in [`provider`] keep the controller independent of any
//! particular hosted-fields SDK.

pub mod controller;
pub mod error;
pub mod events;
pub mod model;
pub mod provider;
pub mod retry;
pub mod timer;
pub mod validation;

pub use controller::{
    ControllerConfig, ControllerHandle, ControllerState, ControllerStatus, HostCallbacks,
    SubmitPolicy, TokenizationController,
};
pub use error::{CheckoutError, Result};
pub use events::{PageEvent, PageEvents};
pub use model::{
    ClientToken, DeviceFingerprint, FieldEvent, FieldName, FieldState, FieldStates, Nonce,
    TokenizedPayment,
};
pub use provider::{
    DeviceDataCollector, FieldConfig, HostedFields, HostedFieldsFactory, PaymentProvider,
    TokenFetcher,
};
pub use retry::RetryPolicy;
