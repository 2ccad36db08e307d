/*
    store.rs - Keyed last-writer-wins location store

    Each channel key owns one slot holding the latest position, a version
    counter and a broadcast sender feeding its listeners.

    Ordering:
    - Writes to one key are serialized by that key's mutex, and the broadcast
      send happens under the same lock, so every listener sees writes in the
      order they were accepted.
    - Subscribing reads `current` and registers the receiver under the same
      lock, so a new listener gets exactly "latest + everything after".
    - Different keys never contend beyond the brief map lookup.

    A slot created by a subscription alone is removed again when its last
    listener leaves without anything having been written.
*/

use super::policy::{AccessPolicy, OpenAccess};
use super::subscription::{ReleaseHook, Subscription};
use crate::config::StoreConfig;
use crate::core_model::{ChannelKey, Position};
use crate::core_session::Credentials;
use crate::error::{handle_poison, TrackResult};
use crate::metrics::{STORE_WRITES_ACCEPTED, STORE_WRITES_REJECTED};
use metrics::counter;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::broadcast;
use tracing::{debug, trace, warn};

/// Snapshot of one channel
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Channel {
    pub current: Option<Position>,
    pub version: u64,
}

type ChannelMap = RwLock<HashMap<ChannelKey, Arc<Mutex<ChannelSlot>>>>;

struct ChannelSlot {
    current: Option<Position>,
    version: u64,
    tx: broadcast::Sender<Position>,
}

impl ChannelSlot {
    fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        ChannelSlot {
            current: None,
            version: 0,
            tx,
        }
    }
}

/// Location channel store
///
/// Shared between publishers and subscribers behind an `Arc`. All methods take
/// `&self` and are safe to call from any thread or task.
pub struct LocationStore {
    channels: Arc<ChannelMap>,
    policy: Arc<dyn AccessPolicy>,
    listener_buffer: usize,
}

impl LocationStore {
    /// Create a store with default configuration and open access
    pub fn new() -> Self {
        Self::with_config(&StoreConfig::default())
    }

    /// Create a store from configuration
    pub fn with_config(config: &StoreConfig) -> Self {
        LocationStore {
            channels: Arc::new(RwLock::new(HashMap::new())),
            policy: Arc::new(OpenAccess),
            listener_buffer: config.listener_buffer.max(1),
        }
    }

    /// Replace the access policy
    pub fn with_policy(mut self, policy: Arc<dyn AccessPolicy>) -> Self {
        self.policy = policy;
        self
    }

    /// Write the latest position for `key`
    ///
    /// Replaces the channel's current position, bumps its version and pushes
    /// the position to every active listener. Never waits on listeners.
    /// Returns the new version.
    pub fn write(&self, key: &ChannelKey, position: Position) -> TrackResult<u64> {
        self.write_as(key, position, None)
    }

    /// Write on behalf of a publisher presenting `credentials`
    pub fn write_as(
        &self,
        key: &ChannelKey,
        position: Position,
        credentials: Option<&Credentials>,
    ) -> TrackResult<u64> {
        if let Err(e) = position.validate() {
            counter!(STORE_WRITES_REJECTED).increment(1);
            debug!(key = %key, error = %e, "Write rejected");
            return Err(e);
        }
        if let Err(e) = self.policy.authorize_write(key, credentials) {
            counter!(STORE_WRITES_REJECTED).increment(1);
            warn!(key = %key, error = %e, "Write refused by access policy");
            return Err(e);
        }

        let slot = self.slot(key)?;
        let mut channel = slot.lock().map_err(handle_poison)?;
        channel.current = Some(position);
        channel.version += 1;
        // Err only means no listener is registered right now
        let delivered = channel.tx.send(position).unwrap_or(0);
        let version = channel.version;
        drop(channel);

        counter!(STORE_WRITES_ACCEPTED).increment(1);
        trace!(key = %key, version, delivered, "Position written");
        Ok(version)
    }

    /// Register a listener on `key`
    ///
    /// Never blocks. The returned stream starts with the current position when
    /// the channel has one.
    pub fn subscribe(&self, key: &ChannelKey) -> TrackResult<Subscription> {
        self.policy.authorize_read(key)?;

        let slot = self.slot(key)?;
        let channel = slot.lock().map_err(handle_poison)?;
        let rx = channel.tx.subscribe();
        let initial = channel.current;
        drop(channel);

        debug!(key = %key, has_current = initial.is_some(), "Listener subscribed");
        Ok(Subscription::new(key.clone(), initial, rx, self.prune_hook(key)))
    }

    /// Release a listener. Idempotent; equivalent to [`Subscription::unsubscribe`].
    pub fn unsubscribe(&self, subscription: &mut Subscription) {
        subscription.unsubscribe();
    }

    /// Point-in-time view of a channel; `None` until the first write
    pub fn channel(&self, key: &ChannelKey) -> TrackResult<Option<Channel>> {
        let channels = self.channels.read().map_err(handle_poison)?;
        let Some(slot) = channels.get(key) else {
            return Ok(None);
        };
        let channel = slot.lock().map_err(handle_poison)?;
        if channel.version == 0 {
            return Ok(None);
        }
        Ok(Some(Channel {
            current: channel.current,
            version: channel.version,
        }))
    }

    /// Latest position written to `key`
    pub fn current(&self, key: &ChannelKey) -> TrackResult<Option<Position>> {
        Ok(self.channel(key)?.and_then(|c| c.current))
    }

    /// Number of accepted writes to `key`
    pub fn version(&self, key: &ChannelKey) -> TrackResult<Option<u64>> {
        Ok(self.channel(key)?.map(|c| c.version))
    }

    /// Number of live listeners on `key`
    pub fn listener_count(&self, key: &ChannelKey) -> TrackResult<usize> {
        let channels = self.channels.read().map_err(handle_poison)?;
        match channels.get(key) {
            Some(slot) => Ok(slot.lock().map_err(handle_poison)?.tx.receiver_count()),
            None => Ok(0),
        }
    }

    /// Number of channels that have received at least one write
    pub fn channel_count(&self) -> TrackResult<usize> {
        let channels = self.channels.read().map_err(handle_poison)?;
        let mut count = 0;
        for slot in channels.values() {
            if slot.lock().map_err(handle_poison)?.version > 0 {
                count += 1;
            }
        }
        Ok(count)
    }

    fn prune_hook(&self, key: &ChannelKey) -> ReleaseHook {
        let channels = Arc::downgrade(&self.channels);
        let key = key.clone();
        Box::new(move || {
            if let Some(channels) = channels.upgrade() {
                prune_idle(&channels, &key);
            }
        })
    }

    fn slot(&self, key: &ChannelKey) -> TrackResult<Arc<Mutex<ChannelSlot>>> {
        if let Some(slot) = self.channels.read().map_err(handle_poison)?.get(key) {
            return Ok(slot.clone());
        }

        let mut channels = self.channels.write().map_err(handle_poison)?;
        let capacity = self.listener_buffer;
        Ok(channels
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(ChannelSlot::new(capacity))))
            .clone())
    }
}

/// Remove `key`'s slot if it was never written and has no listener left
fn prune_idle(channels: &ChannelMap, key: &ChannelKey) {
    let Ok(mut channels) = channels.write() else {
        return;
    };
    let idle = channels.get(key).is_some_and(|slot| {
        // Clones only exist while a write or subscribe is working on the slot,
        // and new ones are only handed out under the map lock held here
        Arc::strong_count(slot) == 1
            && slot
                .lock()
                .map(|c| c.version == 0 && c.tx.receiver_count() == 0)
                .unwrap_or(false)
    });
    if idle {
        channels.remove(key);
        trace!(key = %key, "Idle channel slot released");
    }
}

impl Default for LocationStore {
    fn default() -> Self {
        Self::new()
    }
}
