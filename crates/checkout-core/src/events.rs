//! Page-level Signals
//!
//! A broadcast bus standing in for document-level events. The payment form
//! listens for `tokenize-payment` and publishes `payment-tokenized` and
//! `show-global-error`, so surrounding page logic never needs a direct handle
//! on the controller.

use tokio::sync::broadcast;

use crate::model::TokenizedPayment;

const CHANNEL_CAPACITY: usize = 64;

/// Signals exchanged on the page bus
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PageEvent {
    /// External request to submit the payment form
    TokenizePayment,

    /// Tokenization succeeded and no host callback was registered
    PaymentTokenized(TokenizedPayment),

    /// User-facing message for failures outside the form itself
    ShowGlobalError { message: String },
}

impl PageEvent {
    /// Event name as seen by page scripts
    pub const fn name(&self) -> &'static str {
        match self {
            Self::TokenizePayment => "tokenize-payment",
            Self::PaymentTokenized(_) => "payment-tokenized",
            Self::ShowGlobalError { .. } => "show-global-error",
        }
    }
}

/// Cloneable handle onto the page bus
#[derive(Clone, Debug)]
pub struct PageEvents {
    tx: broadcast::Sender<PageEvent>,
}

impl Default for PageEvents {
    fn default() -> Self {
        Self::new()
    }
}

impl PageEvents {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Publish an event; having no listeners is not an error
    pub fn dispatch(&self, event: PageEvent) {
        tracing::debug!(
            event = event.name(),
            listeners = self.listener_count(),
            "Dispatching page event"
        );
        let _ = self.tx.send(event);
    }

    pub fn show_global_error(&self, message: impl Into<String>) {
        self.dispatch(PageEvent::ShowGlobalError {
            message: message.into(),
        });
    }

    /// Ask any mounted payment form to submit
    pub fn request_tokenize(&self) {
        self.dispatch(PageEvent::TokenizePayment);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PageEvent> {
        self.tx.subscribe()
    }

    pub fn listener_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
