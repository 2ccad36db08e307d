//! Subscriber - turns a channel's write stream into a path for display
//!
//! [`Subscriber::track`] registers a listener and hands back a [`PathView`].
//! A background task pumps the listener into the view's accumulator; the UI
//! reads snapshots from the view at any time.
//!
//! Stopping (or dropping) the view guarantees that no position is appended
//! after `stop` returns: the pump checks the stop flag under the same lock it
//! appends with.

use super::accumulator::{PathAccumulator, PathState};
use crate::config::TrackerConfig;
use crate::core_channel::{LocationStore, Subscription};
use crate::core_model::{ChannelKey, Position};
use crate::error::{TrackError, TrackResult};
use crate::metrics::{TRACKER_POSITIONS_IGNORED, TRACKER_NO_DATA};
use metrics::counter;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace};

struct Shared {
    path: RwLock<PathAccumulator>,
    stopped: AtomicBool,
    accepted_tx: watch::Sender<u64>,
}

impl Shared {
    /// Returns false once the view is stopped
    fn append(&self, key: &ChannelKey, position: Position) -> bool {
        let Ok(mut path) = self.path.write() else {
            return false;
        };
        if self.stopped.load(Ordering::Acquire) {
            return false;
        }
        if path.offer(position) {
            self.accepted_tx.send_replace(path.accepted());
            trace!(key = %key, timestamp = position.timestamp, "Path extended");
        } else {
            counter!(TRACKER_POSITIONS_IGNORED).increment(1);
            debug!(
                key = %key,
                timestamp = position.timestamp,
                last = ?path.last_timestamp(),
                "Stale position ignored"
            );
        }
        true
    }
}

/// Live view of one tracked channel
pub struct PathView {
    key: ChannelKey,
    shared: Arc<Shared>,
    pump: Option<JoinHandle<()>>,
}

impl PathView {
    pub fn key(&self) -> &ChannelKey {
        &self.key
    }

    /// Newest accepted position
    pub fn current_position(&self) -> Option<Position> {
        self.read(|path| path.current()).flatten()
    }

    /// Snapshot of the path so far, oldest first
    pub fn path(&self) -> Vec<Position> {
        self.read(|path| path.snapshot()).unwrap_or_default()
    }

    pub fn state(&self) -> PathState {
        self.read(|path| path.state()).unwrap_or(PathState::Empty)
    }

    pub fn len(&self) -> usize {
        self.read(|path| path.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total positions accepted into this view
    pub fn accepted(&self) -> u64 {
        *self.shared.accepted_tx.borrow()
    }

    /// Positions ignored as duplicate or out of order
    pub fn rejected(&self) -> u64 {
        self.read(|path| path.rejected()).unwrap_or(0)
    }

    /// Length of the retained path in meters
    pub fn distance_meters(&self) -> f64 {
        self.read(|path| path.distance_meters()).unwrap_or(0.0)
    }

    /// Wait until at least `count` positions have been accepted
    ///
    /// Returns false on timeout. A stopped view never reaches a new count.
    pub async fn wait_for_accepted(&self, count: u64, timeout: Duration) -> bool {
        let mut rx = self.shared.accepted_tx.subscribe();
        let reached = tokio::time::timeout(timeout, async move {
            let reached = rx.wait_for(|accepted| *accepted >= count).await.is_ok();
            reached
        })
        .await;
        reached.unwrap_or(false)
    }

    pub fn is_stopped(&self) -> bool {
        self.shared.stopped.load(Ordering::Acquire)
    }

    /// End the subscription. Idempotent; nothing is appended after this returns.
    pub fn stop(&mut self) {
        {
            // Taking the write lock waits out an in-flight append
            let _path = self.shared.path.write();
            self.shared.stopped.store(true, Ordering::Release);
        }
        if let Some(pump) = self.pump.take() {
            pump.abort();
            debug!(key = %self.key, "Tracking stopped");
        }
    }

    fn read<T>(&self, f: impl FnOnce(&PathAccumulator) -> T) -> Option<T> {
        self.shared.path.read().ok().map(|path| f(&path))
    }
}

impl Drop for PathView {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for PathView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PathView")
            .field("key", &self.key)
            .field("len", &self.len())
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

/// Tracks channels from the location store
pub struct Subscriber {
    store: Arc<LocationStore>,
    config: TrackerConfig,
}

impl Subscriber {
    pub fn new(store: Arc<LocationStore>, config: &TrackerConfig) -> Self {
        Subscriber {
            store,
            config: config.clone(),
        }
    }

    /// Start tracking `key`, waiting up to the configured first-fix timeout
    /// for an initial position
    pub async fn track(&self, key: &str) -> TrackResult<PathView> {
        self.track_with_timeout(key, self.config.first_fix_timeout)
            .await
    }

    /// Start tracking `key`
    ///
    /// Fails with `InvalidInput` for an empty key and with `NoData` when the
    /// channel has no position and none arrives within `timeout` (a zero
    /// timeout fails immediately). Must be called from a Tokio runtime.
    pub async fn track_with_timeout(&self, key: &str, timeout: Duration) -> TrackResult<PathView> {
        let key = ChannelKey::new(key)?;
        let mut subscription = self.store.subscribe(&key)?;

        let first = if subscription.has_initial() {
            subscription.try_next()
        } else if timeout.is_zero() {
            None
        } else {
            tokio::time::timeout(timeout, subscription.next())
                .await
                .ok()
                .flatten()
        };

        let Some(first) = first else {
            subscription.unsubscribe();
            counter!(TRACKER_NO_DATA).increment(1);
            info!(key = %key, "No location data for channel");
            return Err(TrackError::NoData(key));
        };

        let mut path = match self.config.max_path_len {
            Some(max) => PathAccumulator::bounded(max),
            None => PathAccumulator::new(),
        };
        path.offer(first);

        let (accepted_tx, _) = watch::channel(path.accepted());
        let shared = Arc::new(Shared {
            path: RwLock::new(path),
            stopped: AtomicBool::new(false),
            accepted_tx,
        });

        let pump = tokio::spawn(pump(key.clone(), subscription, shared.clone()));
        info!(key = %key, "Tracking started");

        Ok(PathView {
            key,
            shared,
            pump: Some(pump),
        })
    }
}

async fn pump(key: ChannelKey, mut subscription: Subscription, shared: Arc<Shared>) {
    while let Some(position) = subscription.next().await {
        if !shared.append(&key, position) {
            break;
        }
    }
    subscription.unsubscribe();
}

#[cfg(test)]
mod tests {
    use super::*;

    const WAIT: Duration = Duration::from_secs(2);

    fn setup() -> (Arc<LocationStore>, Subscriber) {
        let store = Arc::new(LocationStore::new());
        let subscriber = Subscriber::new(
            store.clone(),
            &TrackerConfig {
                first_fix_timeout: Duration::ZERO,
                max_path_len: None,
            },
        );
        (store, subscriber)
    }

    #[tokio::test]
    async fn test_empty_key_rejected() {
        let (_store, subscriber) = setup();
        assert!(matches!(
            subscriber.track("").await,
            Err(TrackError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_no_data_is_reported_and_listener_released() {
        let (store, subscriber) = setup();
        let err = subscriber.track("ghost").await.unwrap_err();
        assert!(matches!(err, TrackError::NoData(_)));
        assert!(err.is_retryable());

        let key = ChannelKey::new("ghost").unwrap();
        assert_eq!(store.listener_count(&key).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_first_fix_timeout_waits_for_publisher() {
        let (store, subscriber) = setup();
        let key = ChannelKey::new("bus42").unwrap();

        let writer = {
            let store = store.clone();
            let key = key.clone();
            tokio::spawn(async move {
                while store.listener_count(&key).unwrap() == 0 {
                    tokio::task::yield_now().await;
                }
                store.write(&key, Position::new(1.0, 1.0, 1)).unwrap();
            })
        };

        let view = subscriber
            .track_with_timeout("bus42", WAIT)
            .await
            .unwrap();
        writer.await.unwrap();
        assert_eq!(view.current_position(), Some(Position::new(1.0, 1.0, 1)));
        assert_eq!(view.state(), PathState::HasCurrent);
    }

    #[tokio::test]
    async fn test_path_follows_writes() {
        let (store, subscriber) = setup();
        let key = ChannelKey::new("bus42").unwrap();
        store.write(&key, Position::new(37.0, -122.0, 1000)).unwrap();

        let view = subscriber.track("bus42").await.unwrap();
        assert_eq!(view.current_position(), Some(Position::new(37.0, -122.0, 1000)));

        store.write(&key, Position::new(37.001, -122.001, 2000)).unwrap();
        assert!(view.wait_for_accepted(2, WAIT).await);

        assert_eq!(
            view.path(),
            vec![
                Position::new(37.0, -122.0, 1000),
                Position::new(37.001, -122.001, 2000)
            ]
        );
        assert!(view.distance_meters() > 100.0);
    }

    #[tokio::test]
    async fn test_wait_for_accepted_already_reached() {
        let (store, subscriber) = setup();
        let key = ChannelKey::new("bus42").unwrap();
        store.write(&key, Position::new(1.0, 1.0, 1)).unwrap();

        let view = subscriber.track("bus42").await.unwrap();
        assert_eq!(view.current_position(), Some(Position::new(1.0, 1.0, 1)));
        assert!(view.wait_for_accepted(1, Duration::ZERO).await);
        assert!(!view.wait_for_accepted(2, Duration::from_millis(20)).await);
    }

    #[tokio::test]
    async fn test_stale_positions_ignored() {
        let (store, subscriber) = setup();
        let key = ChannelKey::new("bus42").unwrap();
        store.write(&key, Position::new(1.0, 1.0, 10)).unwrap();

        let view = subscriber.track("bus42").await.unwrap();
        store.write(&key, Position::new(2.0, 2.0, 5)).unwrap();
        store.write(&key, Position::new(3.0, 3.0, 20)).unwrap();
        assert!(view.wait_for_accepted(2, WAIT).await);

        let timestamps: Vec<i64> = view.path().iter().map(|p| p.timestamp).collect();
        assert_eq!(timestamps, vec![10, 20]);
        assert_eq!(view.rejected(), 1);
    }

    #[tokio::test]
    async fn test_stop_freezes_path() {
        let (store, subscriber) = setup();
        let key = ChannelKey::new("bus42").unwrap();
        store.write(&key, Position::new(1.0, 1.0, 1)).unwrap();

        let mut view = subscriber.track("bus42").await.unwrap();
        view.stop();
        view.stop();
        assert!(view.is_stopped());

        store.write(&key, Position::new(2.0, 2.0, 2)).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(view.path(), vec![Position::new(1.0, 1.0, 1)]);
        assert!(!view.wait_for_accepted(2, Duration::from_millis(50)).await);
    }

    #[tokio::test]
    async fn test_bounded_path() {
        let store = Arc::new(LocationStore::new());
        let subscriber = Subscriber::new(
            store.clone(),
            &TrackerConfig {
                first_fix_timeout: Duration::ZERO,
                max_path_len: Some(2),
            },
        );
        let key = ChannelKey::new("bus42").unwrap();
        store.write(&key, Position::new(0.0, 0.0, 1)).unwrap();

        let view = subscriber.track("bus42").await.unwrap();
        for t in 2..=4 {
            store.write(&key, Position::new(0.0, 0.0, t)).unwrap();
        }
        assert!(view.wait_for_accepted(4, WAIT).await);

        let timestamps: Vec<i64> = view.path().iter().map(|p| p.timestamp).collect();
        assert_eq!(timestamps, vec![3, 4]);
        assert_eq!(view.current_position().unwrap().timestamp, 4);
    }
}
