//! Publisher - forwards fixes from a fix source into one channel
//!
//! # Relaunch
//!
//! The OS may evict the host process and later relaunch it only to deliver a
//! background fix. Nothing is in memory at that point, so the relaunch entry
//! point [`Publisher::on_background_fix`] resolves the channel key from the
//! session guard. [`Publisher::resume`] restarts regular forwarding from the
//! same stored session.

use super::fix_source::{FixOptions, FixSource};
use crate::config::PublisherConfig;
use crate::core_channel::LocationStore;
use crate::core_model::{ChannelKey, Position};
use crate::core_session::{Session, SessionGuard};
use crate::error::{handle_poison, TrackError, TrackResult};
use crate::metrics::{PUBLISHER_FIXES_FORWARDED, PUBLISHER_FIXES_DROPPED};
use metrics::counter;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Handle to a running share, returned by [`Publisher::start`]
#[derive(Clone)]
pub struct PublishHandle {
    id: u64,
    key: ChannelKey,
    running: Arc<AtomicBool>,
}

impl PublishHandle {
    pub fn key(&self) -> &ChannelKey {
        &self.key
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for PublishHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PublishHandle")
            .field("id", &self.id)
            .field("key", &self.key)
            .field("running", &self.is_running())
            .finish()
    }
}

struct ActiveShare {
    id: u64,
    session: Session,
    running: Arc<AtomicBool>,
    source: Arc<dyn FixSource>,
}

/// State reachable from fix callbacks
struct Forwarder {
    store: Arc<LocationStore>,
    guard: Arc<dyn SessionGuard>,
    active: Mutex<Option<ActiveShare>>,
}

impl Forwarder {
    fn resolve_session(&self) -> TrackResult<Option<Session>> {
        let in_memory = self
            .active
            .lock()
            .map_err(handle_poison)?
            .as_ref()
            .map(|share| share.session.clone());
        match in_memory {
            Some(session) => Ok(Some(session)),
            None => Ok(self.guard.load()?),
        }
    }

    fn forward(&self, fix: Position) -> TrackResult<u64> {
        let Some(session) = self.resolve_session()? else {
            counter!(PUBLISHER_FIXES_DROPPED).increment(1);
            warn!(
                latitude = fix.latitude,
                longitude = fix.longitude,
                "Fix arrived with no recoverable session, dropping"
            );
            return Err(TrackError::DroppedUninitialized);
        };

        let version =
            self.store
                .write_as(&session.channel_key, fix, Some(&session.credentials))?;
        counter!(PUBLISHER_FIXES_FORWARDED).increment(1);
        Ok(version)
    }
}

/// Binds a fix source to one channel
pub struct Publisher {
    forwarder: Arc<Forwarder>,
    options: FixOptions,
    next_id: AtomicU64,
}

impl Publisher {
    pub fn new(
        store: Arc<LocationStore>,
        guard: Arc<dyn SessionGuard>,
        config: &PublisherConfig,
    ) -> Self {
        Self::with_options(store, guard, FixOptions::from(config))
    }

    /// Create a publisher requesting explicit fix source thresholds
    pub fn with_options(
        store: Arc<LocationStore>,
        guard: Arc<dyn SessionGuard>,
        options: FixOptions,
    ) -> Self {
        Publisher {
            forwarder: Arc::new(Forwarder {
                store,
                guard,
                active: Mutex::new(None),
            }),
            options,
            next_id: AtomicU64::new(1),
        }
    }

    /// Start sharing fixes from `source` under `session.channel_key`
    ///
    /// The session is persisted to the guard so a relaunched process can keep
    /// forwarding. A share already running on this publisher is stopped and
    /// forgotten first, whether or not the new one starts.
    pub fn start(&self, session: Session, source: Arc<dyn FixSource>) -> TrackResult<PublishHandle> {
        session.validate()?;

        if let Some(previous) = self.take_active()? {
            info!(key = %previous.session.channel_key, "Replacing running share");
            previous.running.store(false, Ordering::Release);
            previous.source.stop();
            // A replaced share must not come back through a relaunch, even if
            // starting its successor fails below
            self.forwarder.guard.clear()?;
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let running = Arc::new(AtomicBool::new(true));
        let key = session.channel_key.clone();

        *self.forwarder.active.lock().map_err(handle_poison)? = Some(ActiveShare {
            id,
            session: session.clone(),
            running: running.clone(),
            source: source.clone(),
        });

        let forwarder = self.forwarder.clone();
        let gate = running.clone();
        source.on_fix(Arc::new(move |fix| {
            if !gate.load(Ordering::Acquire) {
                return;
            }
            match forwarder.forward(fix) {
                Ok(_) => {}
                Err(TrackError::InvalidInput(reason)) => {
                    warn!(%reason, "Invalid fix skipped");
                }
                Err(e) => warn!(error = %e, "Failed to forward fix"),
            }
        }));

        if let Err(e) = source.start(&self.options) {
            running.store(false, Ordering::Release);
            self.clear_active_if(id)?;
            warn!(key = %key, error = %e, "Fix source unavailable");
            return Err(e);
        }

        if let Err(e) = self.forwarder.guard.save(&session) {
            running.store(false, Ordering::Release);
            source.stop();
            self.clear_active_if(id)?;
            return Err(e.into());
        }

        info!(key = %key, "Sharing started");
        Ok(PublishHandle { id, key, running })
    }

    /// Stop forwarding for `handle` and forget its stored session. Idempotent.
    pub fn stop(&self, handle: &PublishHandle) -> TrackResult<()> {
        if !handle.running.swap(false, Ordering::AcqRel) {
            return Ok(());
        }

        if let Some(share) = self.clear_active_if(handle.id)? {
            share.source.stop();
            self.forwarder.guard.clear()?;
        }
        info!(key = %handle.key, "Sharing stopped");
        Ok(())
    }

    /// Restart forwarding from the session stored by a previous process
    ///
    /// Returns `None` when no session is stored.
    pub fn resume(&self, source: Arc<dyn FixSource>) -> TrackResult<Option<PublishHandle>> {
        match self.forwarder.guard.load()? {
            Some(session) => {
                debug!(key = %session.channel_key, "Resuming stored session");
                self.start(session, source).map(Some)
            }
            None => Ok(None),
        }
    }

    /// Relaunch entry point for a fix delivered by the OS
    ///
    /// Works before any share was started in this process by recovering the
    /// key from the session guard. Fails with `DroppedUninitialized` when no
    /// session is stored; the fix is lost.
    pub fn on_background_fix(&self, fix: Position) -> TrackResult<u64> {
        self.forwarder.forward(fix)
    }

    /// Key of the share running in this process, if any
    pub fn active_key(&self) -> Option<ChannelKey> {
        self.forwarder
            .active
            .lock()
            .ok()
            .and_then(|active| active.as_ref().map(|share| share.session.channel_key.clone()))
    }

    pub fn is_sharing(&self) -> bool {
        self.active_key().is_some()
    }

    fn take_active(&self) -> TrackResult<Option<ActiveShare>> {
        Ok(self.forwarder.active.lock().map_err(handle_poison)?.take())
    }

    fn clear_active_if(&self, id: u64) -> TrackResult<Option<ActiveShare>> {
        let mut active = self.forwarder.active.lock().map_err(handle_poison)?;
        if active.as_ref().map(|share| share.id) == Some(id) {
            Ok(active.take())
        } else {
            Ok(None)
        }
    }
}
