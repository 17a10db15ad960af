//! Sandbox Provider
//!
//! In-process stand-ins for the hosted card fields and the device-data
//! collector. Card input is driven programmatically through
//! [`SandboxHostedFields::enter`], and a valid card tokenizes to a nonce the
//! [`SandboxGateway`](checkout_payments::SandboxGateway) approves.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use checkout_core::{
    error::{CheckoutError, Result},
    model::{ClientToken, DeviceFingerprint, FieldEvent, FieldName, FieldState, FieldStates, Nonce},
    provider::{
        DeviceDataCollector, FieldConfig, FieldListener, HostedFields, HostedFieldsFactory,
        SubscriptionId,
    },
    validation::FieldRule,
};

/// Nonce issued for a valid sandbox card
pub const SANDBOX_NONCE: &str = "fake-valid-nonce";

type SharedListener = Arc<dyn Fn(FieldEvent) + Send + Sync>;

#[derive(Default)]
struct FieldsInner {
    values: HashMap<FieldName, String>,
    focused: Option<FieldName>,
    listeners: HashMap<u64, SharedListener>,
    next_id: u64,
    torn_down: bool,
}

impl FieldsInner {
    fn states(&self) -> FieldStates {
        FieldName::ALL.into_iter().fold(FieldStates::new(), |states, field| {
            let value = self.values.get(&field).map(String::as_str).unwrap_or("");
            let mut state = field_state(field, value);
            state.is_focused = self.focused == Some(field);
            states.with(field, state)
        })
    }
}

fn field_state(field: FieldName, value: &str) -> FieldState {
    let compact: String = value.chars().filter(|c| !c.is_whitespace()).collect();
    let all_digits = compact.chars().all(|c| c.is_ascii_digit());

    let (is_valid, is_potentially_valid) = match field {
        FieldName::Number => (
            FieldRule::CardNumber.is_valid(&compact),
            all_digits && compact.len() <= 19,
        ),
        FieldName::Cvv => (
            all_digits && (3..=4).contains(&compact.len()),
            all_digits && compact.len() <= 4,
        ),
        FieldName::ExpirationDate => (
            valid_expiration(&compact),
            compact.len() <= 5 && compact.chars().all(|c| c.is_ascii_digit() || c == '/'),
        ),
    };

    FieldState {
        is_valid,
        is_potentially_valid: is_valid || is_potentially_valid,
        is_empty: compact.is_empty(),
        is_focused: false,
    }
}

/// `MM/YY` with a real month
fn valid_expiration(value: &str) -> bool {
    let Some((month, year)) = value.split_once('/') else {
        return false;
    };
    let month_ok = month.len() == 2 && matches!(month.parse::<u8>(), Ok(1..=12));
    let year_ok = year.len() == 2 && year.chars().all(|c| c.is_ascii_digit());
    month_ok && year_ok
}

/// Card fields rendered by the sandbox
pub struct SandboxHostedFields {
    config: FieldConfig,
    inner: Mutex<FieldsInner>,
}

impl SandboxHostedFields {
    fn new(config: FieldConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(FieldsInner::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, FieldsInner> {
        // Listener panics can poison the lock; the field data is still usable
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn config(&self) -> &FieldConfig {
        &self.config
    }

    /// Type into a field and notify listeners of the new validity
    pub fn enter(&self, field: FieldName, value: &str) {
        let (listeners, states) = {
            let mut inner = self.lock();
            if inner.torn_down {
                return;
            }
            inner.values.insert(field, value.to_string());
            (inner.listeners.values().cloned().collect::<Vec<_>>(), inner.states())
        };
        for listener in listeners {
            listener(FieldEvent::ValidityChange(states.clone()));
        }
    }

    /// Move focus to a field
    pub fn focus(&self, field: FieldName) {
        let listeners = {
            let mut inner = self.lock();
            if inner.torn_down {
                return;
            }
            inner.focused = Some(field);
            inner.listeners.values().cloned().collect::<Vec<_>>()
        };
        for listener in listeners {
            listener(FieldEvent::Focus(field));
        }
    }

    /// Fill all three fields with a card the sandbox accepts
    pub fn enter_test_card(&self) {
        self.enter(FieldName::Number, "4111 1111 1111 1111");
        self.enter(FieldName::Cvv, "123");
        self.enter(FieldName::ExpirationDate, "12/30");
    }

    pub fn listener_count(&self) -> usize {
        self.lock().listeners.len()
    }

    pub fn is_torn_down(&self) -> bool {
        self.lock().torn_down
    }
}

#[async_trait]
impl HostedFields for SandboxHostedFields {
    fn subscribe(&self, listener: FieldListener) -> SubscriptionId {
        let mut inner = self.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.listeners.insert(id, Arc::from(listener));
        SubscriptionId(id)
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.lock().listeners.remove(&id.0);
    }

    async fn tokenize(&self) -> Result<Nonce> {
        let inner = self.lock();
        if inner.torn_down {
            return Err(CheckoutError::Tokenization("hosted fields were torn down".into()));
        }
        if !inner.states().is_form_valid() {
            return Err(CheckoutError::Tokenization(
                "Some payment input fields are invalid.".into(),
            ));
        }
        Ok(Nonce::new(SANDBOX_NONCE))
    }

    async fn teardown(&self) -> Result<()> {
        let mut inner = self.lock();
        inner.torn_down = true;
        inner.listeners.clear();
        inner.values.clear();
        Ok(())
    }
}

/// Creates [`SandboxHostedFields`] and keeps a handle to the latest instance
#[derive(Default)]
pub struct SandboxFieldsFactory {
    failures_left: AtomicU32,
    current: Mutex<Option<Arc<SandboxHostedFields>>>,
}

impl SandboxFieldsFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `count` creations
    #[must_use]
    pub fn failing(self, count: u32) -> Self {
        self.failures_left.store(count, Ordering::SeqCst);
        self
    }

    /// Fields from the most recent successful creation
    pub fn fields(&self) -> Option<Arc<SandboxHostedFields>> {
        self.current
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl HostedFieldsFactory for SandboxFieldsFactory {
    async fn create(
        &self,
        token: &ClientToken,
        config: &FieldConfig,
    ) -> Result<Arc<dyn HostedFields>> {
        if token.as_str().is_empty() {
            return Err(CheckoutError::Initialization("empty client token".into()));
        }
        let failed = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(CheckoutError::Initialization("sandbox fields unavailable".into()));
        }

        let fields = Arc::new(SandboxHostedFields::new(config.clone()));
        *self.current.lock().unwrap_or_else(|e| e.into_inner()) = Some(Arc::clone(&fields));
        tracing::debug!(selector = %config.number.selector, "Sandbox hosted fields rendered");
        Ok(fields)
    }
}

/// Device-data collector returning a fresh sandbox session each time
#[derive(Default)]
pub struct SandboxDeviceCollector {
    unavailable: bool,
    teardowns: AtomicU32,
}

impl SandboxDeviceCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// A collector whose every collection fails
    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::default()
        }
    }

    pub fn teardown_count(&self) -> u32 {
        self.teardowns.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DeviceDataCollector for SandboxDeviceCollector {
    async fn collect(&self, _token: &ClientToken) -> Result<DeviceFingerprint> {
        if self.unavailable {
            return Err(CheckoutError::Collection("data collector unavailable".into()));
        }
        let data = serde_json::json!({
            "device_session_id": uuid::Uuid::new_v4().simple().to_string(),
            "correlation_id": uuid::Uuid::new_v4().simple().to_string(),
        });
        Ok(DeviceFingerprint::new(data.to_string()))
    }

    async fn teardown(&self) -> Result<()> {
        self.teardowns.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
