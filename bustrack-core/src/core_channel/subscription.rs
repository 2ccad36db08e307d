//! Live per-channel position stream handed out by [`LocationStore::subscribe`]
//!
//! [`LocationStore::subscribe`]: super::LocationStore::subscribe

use crate::core_model::{ChannelKey, Position};
use crate::metrics::{STORE_SUBSCRIPTIONS_ACTIVE, STORE_DELIVERIES_SKIPPED};
use metrics::{counter, gauge};
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tracing::{debug, warn};

/// One listener registration on a channel
///
/// Yields the channel's current position (if any) first, then every later
/// write in the order the store accepted it. The stream never ends on its
/// own; call [`Subscription::unsubscribe`] or drop it to release the listener.
pub struct Subscription {
    key: ChannelKey,
    initial: Option<Position>,
    rx: Option<broadcast::Receiver<Position>>,
    skipped: u64,
    on_release: Option<ReleaseHook>,
}

/// Run once after the listener's receiver is dropped
pub(super) type ReleaseHook = Box<dyn FnOnce() + Send>;

impl Subscription {
    pub(super) fn new(
        key: ChannelKey,
        initial: Option<Position>,
        rx: broadcast::Receiver<Position>,
        on_release: ReleaseHook,
    ) -> Self {
        gauge!(STORE_SUBSCRIPTIONS_ACTIVE).increment(1.0);
        Subscription {
            key,
            initial,
            rx: Some(rx),
            skipped: 0,
            on_release: Some(on_release),
        }
    }

    pub fn key(&self) -> &ChannelKey {
        &self.key
    }

    /// Whether the channel had a position when this subscription registered
    /// and it has not been consumed yet
    pub fn has_initial(&self) -> bool {
        self.initial.is_some()
    }

    /// Positions this listener missed because it fell behind the buffer
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    pub fn is_active(&self) -> bool {
        self.rx.is_some()
    }

    /// Wait for the next position
    ///
    /// Returns `None` only after [`unsubscribe`](Self::unsubscribe) or if the
    /// store itself was dropped.
    pub async fn next(&mut self) -> Option<Position> {
        if let Some(position) = self.initial.take() {
            return Some(position);
        }

        loop {
            let rx = self.rx.as_mut()?;
            match rx.recv().await {
                Ok(position) => return Some(position),
                Err(RecvError::Lagged(n)) => self.record_lag(n),
                Err(RecvError::Closed) => {
                    self.release();
                    return None;
                }
            }
        }
    }

    /// Non-blocking variant of [`next`](Self::next)
    pub fn try_next(&mut self) -> Option<Position> {
        if let Some(position) = self.initial.take() {
            return Some(position);
        }

        loop {
            let rx = self.rx.as_mut()?;
            match rx.try_recv() {
                Ok(position) => return Some(position),
                Err(TryRecvError::Lagged(n)) => self.record_lag(n),
                Err(TryRecvError::Empty) => return None,
                Err(TryRecvError::Closed) => {
                    self.release();
                    return None;
                }
            }
        }
    }

    /// Stop delivery and release the listener. Idempotent.
    pub fn unsubscribe(&mut self) {
        self.initial = None;
        if self.release() {
            debug!(key = %self.key, "Listener unsubscribed");
        }
    }

    fn release(&mut self) -> bool {
        let Some(rx) = self.rx.take() else {
            return false;
        };
        drop(rx);
        gauge!(STORE_SUBSCRIPTIONS_ACTIVE).decrement(1.0);
        if let Some(on_release) = self.on_release.take() {
            on_release();
        }
        true
    }

    fn record_lag(&mut self, n: u64) {
        self.skipped += n;
        counter!(STORE_DELIVERIES_SKIPPED).increment(n);
        warn!(key = %self.key, skipped = n, "Listener fell behind, oldest positions skipped");
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("key", &self.key)
            .field("active", &self.is_active())
            .field("skipped", &self.skipped)
            .finish()
    }
}
