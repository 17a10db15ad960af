//! Tokenization Controller
//!
//! Orchestrates the token fetcher, device data collector, and hosted fields
//! for one mounted payment form.
//!
//! ```text
//!                 ┌──────────── retry (base × 2^n) ───────────┐
//!                 ▼                                           │
//!  Uninitialized ──▶ Initializing ──── failure (< max) ───────┘
//!                        │    └─────── failure (= max) ──▶ InitFailed
//!                        ▼ success
//!                      Ready ◀──────────────┐
//!                        │ submit           │ done / failed
//!                        ▼                  │
//!                    Submitting ────────────┘
//! ```
//!
//! The controller runs as a single task that owns every piece of mutable
//! state. Network calls run as child tasks and report back through the
//! command channel, so a second submit arriving while tokenize is pending is
//! observed in `Submitting` and dropped. Results that arrive after unmount
//! find the channel closed and are discarded.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender, WeakUnboundedSender};
use tokio::sync::{broadcast, oneshot, watch};

use crate::error::{CheckoutError, Result};
use crate::events::{PageEvent, PageEvents};
use crate::model::{
    ClientToken, DeviceFingerprint, FieldEvent, FieldStates, Nonce, TokenizedPayment,
};
use crate::provider::{FieldConfig, FieldListener, HostedFields, PaymentProvider, SubscriptionId};
use crate::retry::{RetryDecision, RetryPolicy, RetryState};
use crate::timer::PendingTimer;

/// Shown once initialization has exhausted its retries
pub const INIT_FAILED_MESSAGE: &str =
    "Failed to initialize payment system. Please refresh and try again.";

/// Shown when the provider rejects a tokenize request
pub const TOKENIZE_FAILED_MESSAGE: &str =
    "Payment processing failed. Please check your card details and try again.";

/// What to do when tokenize fails at submit time
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SubmitPolicy {
    /// Surface the failure immediately; the user resubmits
    #[default]
    FailFast,

    /// Retry with the same backoff as initialization before surfacing
    RetryWithBackoff,
}

/// Controller configuration
#[derive(Clone, Debug)]
pub struct ControllerConfig {
    /// Backoff for initialization (and submission under `RetryWithBackoff`)
    pub retry: RetryPolicy,

    /// Quiet period before validity is propagated to the host
    pub debounce: Duration,

    pub submit_policy: SubmitPolicy,

    /// Fields handed to the provider on creation
    pub fields: FieldConfig,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            debounce: Duration::from_millis(300),
            submit_policy: SubmitPolicy::default(),
            fields: FieldConfig::default(),
        }
    }
}

/// Lifecycle of a mounted payment form
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ControllerState {
    #[default]
    Uninitialized,
    Initializing,
    Ready,
    Submitting,
    InitFailed,
    Unmounted,
}

/// Snapshot published after every state change
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ControllerStatus {
    pub state: ControllerState,

    /// A network call is outstanding
    pub loading: bool,

    /// Message currently displayed inside the form
    pub error: Option<String>,

    /// Last validity propagated to the host
    pub is_valid: bool,

    /// Consecutive initialization failures
    pub retry_count: u32,

    pub device_data: DeviceFingerprint,
}

pub type ValidityCallback = Arc<dyn Fn(bool) + Send + Sync>;
pub type TokenizeCallback = Arc<dyn Fn(TokenizedPayment) + Send + Sync>;

/// Callbacks supplied by the surrounding checkout form
#[derive(Clone, Default)]
pub struct HostCallbacks {
    on_validity_change: Option<ValidityCallback>,
    on_tokenize: Option<TokenizeCallback>,
}

impl HostCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn on_validity_change(mut self, f: impl Fn(bool) + Send + Sync + 'static) -> Self {
        self.on_validity_change = Some(Arc::new(f));
        self
    }

    /// Without this callback, tokenized payments are broadcast as
    /// `payment-tokenized` page events instead.
    #[must_use]
    pub fn on_tokenize(mut self, f: impl Fn(TokenizedPayment) + Send + Sync + 'static) -> Self {
        self.on_tokenize = Some(Arc::new(f));
        self
    }
}

impl std::fmt::Debug for HostCallbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostCallbacks")
            .field("on_validity_change", &self.on_validity_change.is_some())
            .field("on_tokenize", &self.on_tokenize.is_some())
            .finish()
    }
}

enum Command {
    Submit,
    Unmount(oneshot::Sender<()>),
    Field(FieldEvent),
    DebounceElapsed(u64),
    RetryElapsed(u64),
    InitFinished(InitReport),
    TokenizeFinished(Result<Nonce>),
}

enum Collection {
    /// A fingerprint was already held from an earlier attempt
    Skipped,
    Collected(DeviceFingerprint),
    Failed,
}

struct InitReport {
    /// Token fetched during this attempt, if any
    token: Option<ClientToken>,
    collection: Collection,
    outcome: Result<Arc<dyn HostedFields>>,
}

/// Builder for a mounted [`ControllerHandle`]
pub struct TokenizationController {
    provider: PaymentProvider,
    config: ControllerConfig,
    callbacks: HostCallbacks,
    page: PageEvents,
    client_token: Option<ClientToken>,
}

impl TokenizationController {
    pub fn new(provider: PaymentProvider) -> Self {
        Self {
            provider,
            config: ControllerConfig::default(),
            callbacks: HostCallbacks::default(),
            page: PageEvents::new(),
            client_token: None,
        }
    }

    #[must_use]
    pub fn config(mut self, config: ControllerConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn callbacks(mut self, callbacks: HostCallbacks) -> Self {
        self.callbacks = callbacks;
        self
    }

    /// Page bus used for `tokenize-payment`, `payment-tokenized`, and
    /// `show-global-error`
    #[must_use]
    pub fn page_events(mut self, page: PageEvents) -> Self {
        self.page = page;
        self
    }

    /// Token supplied by the host page; skips the fetch step
    #[must_use]
    pub fn client_token(mut self, token: ClientToken) -> Self {
        self.client_token = Some(token);
        self
    }

    /// Mount the form and start initialization.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn mount(self) -> ControllerHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(ControllerStatus::default());

        // Subscribe before spawning so an immediate tokenize-payment is not lost
        let page_rx = self.page.subscribe();

        let retry = self.config.retry;
        let actor = Controller {
            provider: self.provider,
            config: self.config,
            callbacks: self.callbacks,
            page: self.page,
            tx: tx.downgrade(),
            status: status_tx,
            state: ControllerState::Uninitialized,
            loading: false,
            token: self.client_token,
            device_data: None,
            collector_active: false,
            fields: None,
            subscription: None,
            latest_validity: FieldStates::new(),
            is_valid: false,
            error: None,
            init_retry: RetryState::new(retry),
            submit_retry: RetryState::new(retry),
            debounce: PendingTimer::new(),
            retry_timer: PendingTimer::new(),
        };

        tokio::spawn(actor.run(rx, page_rx));

        ControllerHandle {
            tx,
            status: status_rx,
        }
    }
}

/// Handle onto a mounted payment form.
///
/// Dropping every handle unmounts the form once outstanding network calls
/// have settled.
#[derive(Clone)]
pub struct ControllerHandle {
    tx: UnboundedSender<Command>,
    status: watch::Receiver<ControllerStatus>,
}

impl ControllerHandle {
    /// Request tokenize-and-submit. A no-op while not ready or already submitting.
    pub fn submit(&self) -> Result<()> {
        self.tx
            .send(Command::Submit)
            .map_err(|_| CheckoutError::Unmounted)
    }

    /// Tear the form down and wait for cleanup to finish. Idempotent.
    pub async fn unmount(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.tx.send(Command::Unmount(ack_tx)).is_ok() {
            let _ = ack_rx.await;
        }
    }

    pub fn status(&self) -> ControllerStatus {
        self.status.borrow().clone()
    }

    pub fn state(&self) -> ControllerState {
        self.status.borrow().state
    }

    /// Receiver that observes every published status
    pub fn watch(&self) -> watch::Receiver<ControllerStatus> {
        self.status.clone()
    }

    /// Wait until the published status satisfies `predicate`
    pub async fn wait_for(
        &self,
        predicate: impl FnMut(&ControllerStatus) -> bool,
    ) -> Result<ControllerStatus> {
        let mut rx = self.status.clone();
        let status = rx
            .wait_for(predicate)
            .await
            .map_err(|_| CheckoutError::Unmounted)?;
        Ok((*status).clone())
    }
}

struct Controller {
    provider: PaymentProvider,
    config: ControllerConfig,
    callbacks: HostCallbacks,
    page: PageEvents,
    tx: WeakUnboundedSender<Command>,
    status: watch::Sender<ControllerStatus>,

    state: ControllerState,
    loading: bool,
    token: Option<ClientToken>,
    device_data: Option<DeviceFingerprint>,
    collector_active: bool,
    fields: Option<Arc<dyn HostedFields>>,
    subscription: Option<SubscriptionId>,
    latest_validity: FieldStates,
    is_valid: bool,
    error: Option<String>,

    init_retry: RetryState,
    submit_retry: RetryState,
    debounce: PendingTimer,
    retry_timer: PendingTimer,
}

impl Controller {
    async fn run(
        mut self,
        mut commands: UnboundedReceiver<Command>,
        mut page_rx: broadcast::Receiver<PageEvent>,
    ) {
        self.start_init_attempt();

        let mut page_open = true;
        let ack = loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Unmount(ack)) => break Some(ack),
                    Some(command) => self.handle(command),
                    None => break None,
                },
                event = page_rx.recv(), if page_open => match event {
                    Ok(PageEvent::TokenizePayment) => self.begin_submit(),
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Payment form lagged behind page events");
                    }
                    Err(broadcast::error::RecvError::Closed) => page_open = false,
                },
            }
        };

        drop(page_rx);
        self.teardown().await;

        // Late reports from child tasks are discarded with the receiver
        drop(commands);

        if let Some(ack) = ack {
            let _ = ack.send(());
        }
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Submit => self.begin_submit(),
            Command::Field(FieldEvent::ValidityChange(states)) => {
                self.latest_validity = states;
                tracing::trace!(
                    replaced = self.debounce.is_pending(),
                    "Debouncing validity change"
                );
                self.debounce
                    .schedule(self.config.debounce, self.tx.clone(), Command::DebounceElapsed);
            }
            Command::Field(FieldEvent::Focus(field)) => {
                tracing::trace!(field = field.as_str(), "Field focused");
                if self.error.take().is_some() {
                    self.publish();
                }
            }
            Command::DebounceElapsed(seq) => {
                if self.debounce.fire(seq) {
                    self.propagate_validity();
                }
            }
            Command::RetryElapsed(seq) => {
                if self.retry_timer.fire(seq) {
                    match self.state {
                        ControllerState::Initializing => self.start_init_attempt(),
                        ControllerState::Submitting => self.start_tokenize(),
                        _ => {}
                    }
                }
            }
            Command::InitFinished(report) => self.finish_init_attempt(report),
            Command::TokenizeFinished(result) => self.finish_tokenize(result),
            // Handled by the run loop
            Command::Unmount(_) => {}
        }
    }

    fn publish(&self) {
        self.status.send_replace(ControllerStatus {
            state: self.state,
            loading: self.loading,
            error: self.error.clone(),
            is_valid: self.is_valid,
            retry_count: self.init_retry.failures(),
            device_data: self.device_data.clone().unwrap_or_default(),
        });
    }

    fn start_init_attempt(&mut self) {
        let Some(tx) = self.tx.upgrade() else {
            return;
        };

        self.state = ControllerState::Initializing;
        self.loading = true;
        self.publish();

        tracing::debug!(
            attempt = self.init_retry.failures() + 1,
            cached_token = self.token.is_some(),
            "Initializing hosted fields"
        );

        let provider = self.provider.clone();
        let token = self.token.clone();
        let need_device_data = self.device_data.is_none();
        let fields = self.config.fields.clone();

        tokio::spawn(async move {
            let report = initialize(&provider, token, need_device_data, &fields).await;
            if let Err(mpsc::error::SendError(Command::InitFinished(report))) =
                tx.send(Command::InitFinished(report))
            {
                // Unmounted while we were creating the fields
                if let Ok(fields) = report.outcome {
                    if let Err(e) = fields.teardown().await {
                        tracing::warn!(error = %e, "Teardown of orphaned hosted fields failed");
                    }
                }
            }
        });
    }

    fn finish_init_attempt(&mut self, report: InitReport) {
        if let Some(token) = report.token {
            self.token = Some(token);
        }
        match report.collection {
            Collection::Skipped => {}
            Collection::Collected(data) => {
                self.device_data = Some(data);
                self.collector_active = true;
            }
            Collection::Failed => self.device_data = Some(DeviceFingerprint::empty()),
        }

        self.loading = false;

        match report.outcome {
            Ok(fields) => {
                if let Some(previous) = self.fields.take() {
                    self.release_fields(previous);
                }

                let listener = forward_events(self.tx.clone());
                self.subscription = Some(fields.subscribe(listener));
                self.fields = Some(fields);

                self.init_retry.reset();
                self.error = None;
                self.state = ControllerState::Ready;
                tracing::info!("Hosted fields ready");
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to initialize hosted fields");

                match self.init_retry.record_failure() {
                    RetryDecision::Retry { attempt, delay } => {
                        let max = self.init_retry.policy().max_retries;
                        tracing::info!(attempt, max, ?delay, "Retrying hosted fields initialization");
                        self.error = Some(format!(
                            "Payment form failed to load. Retrying ({attempt}/{max})..."
                        ));
                        self.retry_timer
                            .schedule(delay, self.tx.clone(), Command::RetryElapsed);
                    }
                    RetryDecision::GiveUp { attempts } => {
                        tracing::error!(attempts, "Giving up on hosted fields initialization");
                        self.state = ControllerState::InitFailed;
                        self.error = Some(INIT_FAILED_MESSAGE.into());
                        self.page.show_global_error(INIT_FAILED_MESSAGE);
                    }
                }
            }
        }

        self.publish();
    }

    fn propagate_validity(&mut self) {
        let valid = self.latest_validity.is_form_valid();
        self.is_valid = valid;
        self.publish();

        tracing::debug!(valid, "Propagating field validity");
        if let Some(callback) = &self.callbacks.on_validity_change {
            callback(valid);
        }
    }

    fn begin_submit(&mut self) {
        if self.fields.is_none() || self.state != ControllerState::Ready {
            tracing::debug!(state = ?self.state, "Submit ignored");
            return;
        }

        self.state = ControllerState::Submitting;
        self.loading = true;
        self.publish();
        self.start_tokenize();
    }

    fn start_tokenize(&mut self) {
        let (Some(fields), Some(tx)) = (self.fields.clone(), self.tx.upgrade()) else {
            return;
        };

        tokio::spawn(async move {
            let result = fields.tokenize().await;
            let _ = tx.send(Command::TokenizeFinished(result));
        });
    }

    fn finish_tokenize(&mut self, result: Result<Nonce>) {
        if self.state != ControllerState::Submitting {
            return;
        }

        match result {
            Ok(nonce) => {
                self.error = None;
                self.submit_retry.reset();

                let device_data = self.device_data.clone().unwrap_or_default();
                tracing::info!(
                    device_data = !device_data.is_empty(),
                    "Payment tokenized"
                );

                let payment = TokenizedPayment::new(nonce, &device_data);
                match &self.callbacks.on_tokenize {
                    Some(callback) => callback(payment),
                    None => self.page.dispatch(PageEvent::PaymentTokenized(payment)),
                }
                self.finish_submit();
            }
            Err(e) => {
                tracing::error!(error = %e, "Payment tokenization failed");

                match self.config.submit_policy {
                    SubmitPolicy::FailFast => {
                        self.surface_submit_failure();
                        self.finish_submit();
                    }
                    SubmitPolicy::RetryWithBackoff => match self.submit_retry.record_failure() {
                        RetryDecision::Retry { attempt, delay } => {
                            let max = self.submit_retry.policy().max_retries;
                            self.error =
                                Some(format!("Payment failed. Retrying ({attempt}/{max})..."));
                            self.retry_timer
                                .schedule(delay, self.tx.clone(), Command::RetryElapsed);
                            self.publish();
                        }
                        RetryDecision::GiveUp { .. } => {
                            self.submit_retry.reset();
                            self.surface_submit_failure();
                            self.finish_submit();
                        }
                    },
                }
            }
        }
    }

    fn surface_submit_failure(&mut self) {
        self.error = Some(TOKENIZE_FAILED_MESSAGE.into());
        self.page.show_global_error(TOKENIZE_FAILED_MESSAGE);
    }

    fn finish_submit(&mut self) {
        self.state = ControllerState::Ready;
        self.loading = false;
        self.publish();
    }

    fn release_fields(&mut self, fields: Arc<dyn HostedFields>) {
        if let Some(id) = self.subscription.take() {
            fields.unsubscribe(id);
        }
        tokio::spawn(async move {
            if let Err(e) = fields.teardown().await {
                tracing::warn!(error = %e, "Hosted fields teardown failed");
            }
        });
    }

    async fn teardown(&mut self) {
        self.state = ControllerState::Unmounted;
        self.loading = false;
        self.debounce.cancel();
        self.retry_timer.cancel();

        if let Some(fields) = self.fields.take() {
            if let Some(id) = self.subscription.take() {
                fields.unsubscribe(id);
            }
            if let Err(e) = fields.teardown().await {
                tracing::warn!(error = %e, "Hosted fields teardown failed");
            }
        }

        if self.collector_active {
            self.collector_active = false;
            if let Err(e) = self.provider.collector.teardown().await {
                tracing::warn!(error = %e, "Device data collector teardown failed");
            }
        }

        self.publish();
        tracing::info!("Payment form unmounted");
    }
}

/// Listener that feeds provider events into the controller's queue
fn forward_events(tx: WeakUnboundedSender<Command>) -> FieldListener {
    Box::new(move |event| {
        if let Some(tx) = tx.upgrade() {
            let _ = tx.send(Command::Field(event));
        }
    })
}

/// One initialization attempt: token, then device data, then fields
async fn initialize(
    provider: &PaymentProvider,
    token: Option<ClientToken>,
    need_device_data: bool,
    fields: &FieldConfig,
) -> InitReport {
    let (token, fetched) = match token {
        Some(token) => (token, false),
        None => match provider.token_fetcher.fetch_token().await {
            Ok(token) => (token, true),
            Err(e) => {
                return InitReport {
                    token: None,
                    collection: Collection::Skipped,
                    outcome: Err(e),
                };
            }
        },
    };

    let collection = if need_device_data {
        match provider.collector.collect(&token).await {
            Ok(data) => {
                tracing::info!(collected = !data.is_empty(), "Device data collected");
                Collection::Collected(data)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Device data collector failed; continuing without it");
                Collection::Failed
            }
        }
    } else {
        Collection::Skipped
    };

    let outcome = provider.fields.create(&token, fields).await;

    InitReport {
        token: fetched.then_some(token),
        collection,
        outcome,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FieldName, FieldState};
    use crate::provider::{DeviceDataCollector, HostedFieldsFactory, TokenFetcher};
    use async_trait::async_trait;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
    use tokio::sync::Notify;
    use tokio::time::sleep;

    struct FakeTokenFetcher {
        token: String,
        failures: usize,
        calls: AtomicUsize,
    }

    impl FakeTokenFetcher {
        fn new(token: &str, failures: usize) -> Arc<Self> {
            Arc::new(Self {
                token: token.into(),
                failures,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TokenFetcher for FakeTokenFetcher {
        async fn fetch_token(&self) -> Result<ClientToken> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                Err(CheckoutError::Network("connection refused".into()))
            } else {
                Ok(ClientToken::new(self.token.clone()))
            }
        }
    }

    struct FakeCollector {
        data: Option<String>,
        teardowns: AtomicUsize,
    }

    impl FakeCollector {
        fn new(data: Option<&str>) -> Arc<Self> {
            Arc::new(Self {
                data: data.map(String::from),
                teardowns: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl DeviceDataCollector for FakeCollector {
        async fn collect(&self, _token: &ClientToken) -> Result<DeviceFingerprint> {
            self.data
                .clone()
                .map(DeviceFingerprint::new)
                .ok_or_else(|| CheckoutError::Collection("blocked by extension".into()))
        }

        async fn teardown(&self) -> Result<()> {
            self.teardowns.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeFields {
        listeners: Mutex<HashMap<u64, FieldListener>>,
        next_id: AtomicU64,
        results: Mutex<VecDeque<Result<Nonce>>>,
        gate: Mutex<Option<Arc<Notify>>>,
        tokenize_calls: AtomicUsize,
        teardowns: AtomicUsize,
        fail_teardown: AtomicBool,
    }

    impl FakeFields {
        fn emit(&self, event: FieldEvent) {
            for listener in self.listeners.lock().unwrap().values() {
                listener(event.clone());
            }
        }

        fn queue(&self, result: Result<Nonce>) {
            self.results.lock().unwrap().push_back(result);
        }

        fn hold_tokenize(&self) -> Arc<Notify> {
            let gate = Arc::new(Notify::new());
            *self.gate.lock().unwrap() = Some(gate.clone());
            gate
        }

        fn tokenize_calls(&self) -> usize {
            self.tokenize_calls.load(Ordering::SeqCst)
        }

        fn teardowns(&self) -> usize {
            self.teardowns.load(Ordering::SeqCst)
        }

        fn listener_count(&self) -> usize {
            self.listeners.lock().unwrap().len()
        }

        fn fail_teardown(&self) {
            self.fail_teardown.store(true, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl HostedFields for FakeFields {
        fn subscribe(&self, listener: FieldListener) -> SubscriptionId {
            let id = self.next_id.fetch_add(1, Ordering::SeqCst);
            self.listeners.lock().unwrap().insert(id, listener);
            SubscriptionId(id)
        }

        fn unsubscribe(&self, id: SubscriptionId) {
            self.listeners.lock().unwrap().remove(&id.0);
        }

        async fn tokenize(&self) -> Result<Nonce> {
            self.tokenize_calls.fetch_add(1, Ordering::SeqCst);
            let gate = self.gate.lock().unwrap().clone();
            if let Some(gate) = gate {
                gate.notified().await;
            }
            self.results
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(Nonce::new("nonce_123")))
        }

        async fn teardown(&self) -> Result<()> {
            self.teardowns.fetch_add(1, Ordering::SeqCst);
            if self.fail_teardown.load(Ordering::SeqCst) {
                return Err(CheckoutError::Other("iframe already detached".into()));
            }
            Ok(())
        }
    }

    struct FakeFactory {
        fields: Arc<FakeFields>,
        failures: usize,
        calls: AtomicUsize,
        tokens: Mutex<Vec<String>>,
        gate: Option<Arc<Notify>>,
    }

    impl FakeFactory {
        fn new(fields: Arc<FakeFields>) -> Self {
            Self {
                fields,
                failures: 0,
                calls: AtomicUsize::new(0),
                tokens: Mutex::new(Vec::new()),
                gate: None,
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl HostedFieldsFactory for FakeFactory {
        async fn create(
            &self,
            token: &ClientToken,
            config: &FieldConfig,
        ) -> Result<Arc<dyn HostedFields>> {
            assert_eq!(config.cvv.max_length, Some(4));
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            self.tokens.lock().unwrap().push(token.as_str().to_string());
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            if call < self.failures {
                return Err(CheckoutError::Initialization("provider rejected config".into()));
            }
            Ok(self.fields.clone())
        }
    }

    struct Harness {
        fetcher: Arc<FakeTokenFetcher>,
        collector: Arc<FakeCollector>,
        fields: Arc<FakeFields>,
        factory: Arc<FakeFactory>,
        page: PageEvents,
        validity: Arc<Mutex<Vec<bool>>>,
        tokenized: Arc<Mutex<Vec<TokenizedPayment>>>,
    }

    impl Harness {
        fn new() -> Self {
            Self::with(FakeTokenFetcher::new("tok_abc", 0), FakeCollector::new(Some("dd_456")), |f| f)
        }

        fn with(
            fetcher: Arc<FakeTokenFetcher>,
            collector: Arc<FakeCollector>,
            factory: impl FnOnce(FakeFactory) -> FakeFactory,
        ) -> Self {
            let fields = Arc::new(FakeFields::default());
            let factory = Arc::new(factory(FakeFactory::new(fields.clone())));
            Self {
                fetcher,
                collector,
                fields,
                factory,
                page: PageEvents::new(),
                validity: Arc::default(),
                tokenized: Arc::default(),
            }
        }

        fn controller(&self) -> TokenizationController {
            let provider = PaymentProvider::new(
                self.fetcher.clone(),
                self.collector.clone(),
                self.factory.clone(),
            );
            TokenizationController::new(provider).page_events(self.page.clone())
        }

        fn callbacks(&self) -> HostCallbacks {
            let validity = self.validity.clone();
            let tokenized = self.tokenized.clone();
            HostCallbacks::new()
                .on_validity_change(move |valid| validity.lock().unwrap().push(valid))
                .on_tokenize(move |payment| tokenized.lock().unwrap().push(payment))
        }

        fn mount(&self) -> ControllerHandle {
            self.controller().callbacks(self.callbacks()).mount()
        }

        fn validity(&self) -> Vec<bool> {
            self.validity.lock().unwrap().clone()
        }

        fn tokenized(&self) -> Vec<TokenizedPayment> {
            self.tokenized.lock().unwrap().clone()
        }
    }

    async fn ready(handle: &ControllerHandle) -> ControllerStatus {
        handle
            .wait_for(|s| s.state == ControllerState::Ready)
            .await
            .unwrap()
    }

    fn global_errors(rx: &mut broadcast::Receiver<PageEvent>) -> Vec<String> {
        let mut messages = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let PageEvent::ShowGlobalError { message } = event {
                messages.push(message);
            }
        }
        messages
    }

    #[tokio::test(start_paused = true)]
    async fn test_validity_propagates_after_debounce() {
        let harness = Harness::new();
        let handle = harness.mount();
        ready(&handle).await;

        assert_eq!(*harness.factory.tokens.lock().unwrap(), vec!["tok_abc"]);

        harness
            .fields
            .emit(FieldEvent::ValidityChange(FieldStates::all_valid()));

        sleep(Duration::from_millis(299)).await;
        assert!(harness.validity().is_empty());

        sleep(Duration::from_millis(2)).await;
        assert_eq!(harness.validity(), vec![true]);
        assert!(handle.status().is_valid);
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_propagates_only_last_event() {
        let harness = Harness::new();
        let handle = harness.mount();
        ready(&handle).await;

        let partial = FieldStates::new().with(FieldName::Number, FieldState::valid());
        harness.fields.emit(FieldEvent::ValidityChange(partial));
        sleep(Duration::from_millis(100)).await;
        harness
            .fields
            .emit(FieldEvent::ValidityChange(FieldStates::all_valid()));
        sleep(Duration::from_millis(250)).await;
        let invalid = FieldStates::all_valid().with(FieldName::Cvv, FieldState::invalid());
        harness.fields.emit(FieldEvent::ValidityChange(invalid));

        sleep(Duration::from_secs(1)).await;
        assert_eq!(harness.validity(), vec![false]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_init_retries_until_success() {
        let harness = Harness::with(
            FakeTokenFetcher::new("tok_abc", 2),
            FakeCollector::new(Some("dd_456")),
            |f| f,
        );
        let handle = harness.mount();

        handle.wait_for(|s| s.retry_count == 1).await.unwrap();
        assert!(handle.status().error.unwrap().contains("Retrying (1/3)"));

        let status = ready(&handle).await;
        assert_eq!(harness.fetcher.calls(), 3);
        assert_eq!(harness.factory.calls(), 1);
        assert_eq!(status.retry_count, 0);
        assert_eq!(status.error, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_delays_between_attempts() {
        let harness = Harness::with(
            FakeTokenFetcher::new("tok_abc", 2),
            FakeCollector::new(Some("dd_456")),
            |f| f,
        );
        let start = tokio::time::Instant::now();
        let handle = harness.mount();

        handle.wait_for(|s| s.retry_count == 1).await.unwrap();
        sleep(Duration::from_millis(990)).await;
        assert_eq!(harness.fetcher.calls(), 1);

        ready(&handle).await;
        assert_eq!(harness.fetcher.calls(), 3);
        assert!(start.elapsed() >= Duration::from_millis(3000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_init_gives_up_after_three_failures() {
        let harness = Harness::with(
            FakeTokenFetcher::new("tok_abc", usize::MAX),
            FakeCollector::new(Some("dd_456")),
            |f| f,
        );
        let mut page_rx = harness.page.subscribe();
        let handle = harness.mount();

        let status = handle
            .wait_for(|s| s.state == ControllerState::InitFailed)
            .await
            .unwrap();
        assert_eq!(status.error.as_deref(), Some(INIT_FAILED_MESSAGE));

        sleep(Duration::from_secs(60)).await;
        assert_eq!(harness.fetcher.calls(), 3);
        assert_eq!(harness.factory.calls(), 0);
        assert_eq!(global_errors(&mut page_rx), vec![INIT_FAILED_MESSAGE.to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_widget_failure_reuses_fetched_token() {
        let harness = Harness::with(
            FakeTokenFetcher::new("tok_abc", 0),
            FakeCollector::new(Some("dd_456")),
            |mut f| {
                f.failures = 1;
                f
            },
        );
        let handle = harness.mount();
        ready(&handle).await;

        assert_eq!(harness.fetcher.calls(), 1);
        assert_eq!(harness.factory.calls(), 2);
        assert_eq!(*harness.factory.tokens.lock().unwrap(), vec!["tok_abc", "tok_abc"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_collector_failure_does_not_block_fields() {
        let harness = Harness::with(
            FakeTokenFetcher::new("tok_abc", 0),
            FakeCollector::new(None),
            |f| f,
        );
        let handle = harness.mount();
        let status = ready(&handle).await;

        assert_eq!(status.device_data.as_str(), "");
        assert_eq!(harness.factory.calls(), 1);

        handle.submit().unwrap();
        sleep(Duration::from_millis(10)).await;
        assert_eq!(
            harness.tokenized(),
            vec![TokenizedPayment {
                nonce: Nonce::new("nonce_123"),
                device_data: None,
            }]
        );

        handle.unmount().await;
        assert_eq!(harness.collector.teardowns.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokenize_hands_off_nonce_and_device_data() {
        let harness = Harness::new();
        let handle = harness.mount();
        ready(&handle).await;

        handle.submit().unwrap();
        sleep(Duration::from_millis(10)).await;

        assert_eq!(
            harness.tokenized(),
            vec![TokenizedPayment {
                nonce: Nonce::new("nonce_123"),
                device_data: Some(DeviceFingerprint::new("dd_456")),
            }]
        );
        let status = handle.status();
        assert_eq!(status.state, ControllerState::Ready);
        assert!(!status.loading);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_submit_while_in_flight_is_ignored() {
        let harness = Harness::new();
        let handle = harness.mount();
        ready(&handle).await;

        let gate = harness.fields.hold_tokenize();
        handle.submit().unwrap();
        handle.submit().unwrap();
        harness.page.request_tokenize();
        sleep(Duration::from_millis(10)).await;

        assert_eq!(harness.fields.tokenize_calls(), 1);
        assert_eq!(handle.state(), ControllerState::Submitting);

        gate.notify_one();
        ready(&handle).await;
        assert_eq!(harness.fields.tokenize_calls(), 1);
        assert_eq!(harness.tokenized().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit_before_ready_is_ignored() {
        let harness = Harness::with(
            FakeTokenFetcher::new("tok_abc", 1),
            FakeCollector::new(Some("dd_456")),
            |f| f,
        );
        let handle = harness.mount();

        handle.submit().unwrap();
        ready(&handle).await;
        sleep(Duration::from_millis(10)).await;
        assert_eq!(harness.fields.tokenize_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_page_signal_triggers_submit_and_broadcast_fallback() {
        let harness = Harness::new();
        let mut page_rx = harness.page.subscribe();
        let handle = harness.controller().mount();
        ready(&handle).await;

        harness.page.request_tokenize();
        sleep(Duration::from_millis(10)).await;

        let mut tokenized = Vec::new();
        while let Ok(event) = page_rx.try_recv() {
            if let PageEvent::PaymentTokenized(payment) = event {
                tokenized.push(payment);
            }
        }
        assert_eq!(tokenized.len(), 1);
        assert_eq!(tokenized[0].nonce.as_str(), "nonce_123");
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokenize_failure_fails_fast() {
        let harness = Harness::new();
        let mut page_rx = harness.page.subscribe();
        let handle = harness.mount();
        ready(&handle).await;

        harness
            .fields
            .queue(Err(CheckoutError::Tokenization("card declined".into())));
        handle.submit().unwrap();
        sleep(Duration::from_secs(10)).await;

        assert_eq!(harness.fields.tokenize_calls(), 1);
        assert!(harness.tokenized().is_empty());
        let status = handle.status();
        assert_eq!(status.state, ControllerState::Ready);
        assert_eq!(status.error.as_deref(), Some(TOKENIZE_FAILED_MESSAGE));
        assert_eq!(global_errors(&mut page_rx), vec![TOKENIZE_FAILED_MESSAGE.to_string()]);

        // Focusing a field clears the displayed error
        harness.fields.emit(FieldEvent::Focus(FieldName::Number));
        handle.wait_for(|s| s.error.is_none()).await.unwrap();

        // The user can resubmit
        handle.submit().unwrap();
        sleep(Duration::from_millis(10)).await;
        assert_eq!(harness.tokenized().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokenize_retry_policy() {
        let harness = Harness::new();
        let handle = harness
            .controller()
            .callbacks(harness.callbacks())
            .config(ControllerConfig {
                submit_policy: SubmitPolicy::RetryWithBackoff,
                ..Default::default()
            })
            .mount();
        ready(&handle).await;

        harness
            .fields
            .queue(Err(CheckoutError::Tokenization("gateway timeout".into())));
        harness
            .fields
            .queue(Err(CheckoutError::Tokenization("gateway timeout".into())));
        handle.submit().unwrap();

        handle
            .wait_for(|s| s.error.as_deref() == Some("Payment failed. Retrying (1/3)..."))
            .await
            .unwrap();
        assert_eq!(handle.state(), ControllerState::Submitting);

        sleep(Duration::from_secs(10)).await;
        assert_eq!(harness.fields.tokenize_calls(), 3);
        assert_eq!(harness.tokenized().len(), 1);
        assert_eq!(handle.state(), ControllerState::Ready);
        assert_eq!(handle.status().error, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokenize_retry_gives_up_and_resets() {
        let harness = Harness::new();
        let mut page_rx = harness.page.subscribe();
        let handle = harness
            .controller()
            .callbacks(harness.callbacks())
            .config(ControllerConfig {
                submit_policy: SubmitPolicy::RetryWithBackoff,
                ..Default::default()
            })
            .mount();
        ready(&handle).await;

        for _ in 0..6 {
            harness
                .fields
                .queue(Err(CheckoutError::Tokenization("gateway timeout".into())));
        }
        handle.submit().unwrap();
        sleep(Duration::from_secs(10)).await;

        assert_eq!(harness.fields.tokenize_calls(), 3);
        assert!(harness.tokenized().is_empty());
        let status = handle.status();
        assert_eq!(status.state, ControllerState::Ready);
        assert!(!status.loading);
        assert_eq!(status.error.as_deref(), Some(TOKENIZE_FAILED_MESSAGE));
        assert_eq!(global_errors(&mut page_rx), vec![TOKENIZE_FAILED_MESSAGE.to_string()]);

        // A manual resubmit gets a fresh set of attempts
        handle.submit().unwrap();
        handle
            .wait_for(|s| s.error.as_deref() == Some("Payment failed. Retrying (1/3)..."))
            .await
            .unwrap();
        sleep(Duration::from_secs(10)).await;

        assert_eq!(harness.fields.tokenize_calls(), 6);
        assert_eq!(handle.state(), ControllerState::Ready);
        assert_eq!(global_errors(&mut page_rx), vec![TOKENIZE_FAILED_MESSAGE.to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unmount_cancels_pending_retry() {
        let harness = Harness::with(
            FakeTokenFetcher::new("tok_abc", usize::MAX),
            FakeCollector::new(Some("dd_456")),
            |f| f,
        );
        let handle = harness.mount();
        handle.wait_for(|s| s.retry_count == 1).await.unwrap();

        handle.unmount().await;
        sleep(Duration::from_secs(60)).await;

        assert_eq!(harness.fetcher.calls(), 1);
        assert_eq!(handle.state(), ControllerState::Unmounted);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unmount_tears_everything_down() {
        let harness = Harness::new();
        let handle = harness.mount();
        ready(&handle).await;
        assert_eq!(harness.fields.listener_count(), 1);

        harness
            .fields
            .emit(FieldEvent::ValidityChange(FieldStates::all_valid()));
        handle.unmount().await;
        sleep(Duration::from_secs(1)).await;

        assert!(harness.validity().is_empty());
        assert_eq!(harness.fields.listener_count(), 0);
        assert_eq!(harness.fields.teardowns(), 1);
        assert_eq!(harness.collector.teardowns.load(Ordering::SeqCst), 1);
        assert!(matches!(handle.submit(), Err(CheckoutError::Unmounted)));

        // Idempotent
        handle.unmount().await;
        assert_eq!(harness.fields.teardowns(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unmount_continues_after_fields_teardown_error() {
        let harness = Harness::new();
        let handle = harness.mount();
        ready(&handle).await;

        harness.fields.fail_teardown();
        handle.unmount().await;

        assert_eq!(harness.fields.teardowns(), 1);
        assert_eq!(harness.fields.listener_count(), 0);
        assert_eq!(harness.collector.teardowns.load(Ordering::SeqCst), 1);
        assert_eq!(handle.state(), ControllerState::Unmounted);
        assert!(!handle.status().loading);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fields_created_after_unmount_are_discarded() {
        let gate = Arc::new(Notify::new());
        let factory_gate = gate.clone();
        let harness = Harness::with(
            FakeTokenFetcher::new("tok_abc", 0),
            FakeCollector::new(Some("dd_456")),
            move |mut f| {
                f.gate = Some(factory_gate);
                f
            },
        );
        let handle = harness.mount();
        sleep(Duration::from_millis(10)).await;
        assert_eq!(harness.factory.calls(), 1);

        handle.unmount().await;
        gate.notify_one();
        sleep(Duration::from_millis(10)).await;

        assert_eq!(harness.fields.listener_count(), 0);
        assert_eq!(harness.fields.teardowns(), 1);
        assert_eq!(handle.state(), ControllerState::Unmounted);
    }

    #[tokio::test(start_paused = true)]
    async fn test_host_supplied_token_skips_fetch() {
        let harness = Harness::new();
        let handle = harness
            .controller()
            .client_token(ClientToken::new("tok_host"))
            .mount();
        ready(&handle).await;

        assert_eq!(harness.fetcher.calls(), 0);
        assert_eq!(*harness.factory.tokens.lock().unwrap(), vec!["tok_host"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_handles_unmounts() {
        let harness = Harness::new();
        let handle = harness.mount();
        ready(&handle).await;

        drop(handle);
        sleep(Duration::from_millis(10)).await;
        assert_eq!(harness.fields.teardowns(), 1);
    }
}
