//! Cancellable scheduled tasks
//!
//! A [`PendingTimer`] owns at most one scheduled wake-up. Scheduling again
//! cancels the previous one, and every wake-up carries a sequence number so a
//! timer that already fired before being cancelled can be recognised as stale.

use std::time::Duration;

use tokio::sync::mpsc::WeakUnboundedSender;
use tokio::task::AbortHandle;

#[derive(Debug, Default)]
pub struct PendingTimer {
    seq: u64,
    handle: Option<AbortHandle>,
}

impl PendingTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Send `make(seq)` to `tx` after `delay`, replacing any pending wake-up.
    ///
    /// The sender is weak so an outstanding timer never keeps its receiver
    /// alive on its own.
    pub fn schedule<C, F>(&mut self, delay: Duration, tx: WeakUnboundedSender<C>, make: F)
    where
        C: Send + 'static,
        F: FnOnce(u64) -> C + Send + 'static,
    {
        self.cancel();
        self.seq = self.seq.wrapping_add(1);
        let seq = self.seq;

        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(tx) = tx.upgrade() {
                let _ = tx.send(make(seq));
            }
        });
        self.handle = Some(task.abort_handle());
    }

    /// Cancel the pending wake-up, if any
    pub fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    /// Consume a wake-up. Returns false for stale or cancelled timers.
    pub fn fire(&mut self, seq: u64) -> bool {
        if self.handle.is_some() && seq == self.seq {
            self.handle = None;
            true
        } else {
            false
        }
    }

    pub const fn is_pending(&self) -> bool {
        self.handle.is_some()
    }
}

impl Drop for PendingTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}
