//! Fix source interface
//!
//! A fix source is the device location API: it produces timestamped positions
//! at a configured cadence, possibly while the host process is backgrounded or
//! after the OS relaunched it. It does not know which channel its fixes belong
//! to; the publisher resolves that.

use crate::config::PublisherConfig;
use crate::core_model::Position;
use crate::error::{handle_poison, TrackError, TrackResult};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, trace};

/// Callback invoked for every delivered fix
pub type FixCallback = Arc<dyn Fn(Position) + Send + Sync>;

/// Delivery thresholds requested from the fix source
#[derive(Debug, Clone, PartialEq)]
pub struct FixOptions {
    /// Minimum time between two delivered fixes
    pub min_interval: Duration,
    /// Minimum movement between two delivered fixes
    pub min_distance_meters: f64,
    /// Keep delivering while the host process is in the background
    pub allow_background: bool,
}

impl FixOptions {
    /// Deliver every fix
    pub fn unfiltered() -> Self {
        FixOptions {
            min_interval: Duration::ZERO,
            min_distance_meters: 0.0,
            allow_background: true,
        }
    }
}

impl Default for FixOptions {
    fn default() -> Self {
        Self::from(&PublisherConfig::default())
    }
}

impl From<&PublisherConfig> for FixOptions {
    fn from(config: &PublisherConfig) -> Self {
        FixOptions {
            min_interval: config.min_interval,
            min_distance_meters: config.min_distance_meters,
            allow_background: config.allow_background,
        }
    }
}

/// Device location capability
pub trait FixSource: Send + Sync {
    /// Register the callback receiving fixes; replaces any previous one
    fn on_fix(&self, callback: FixCallback);

    /// Begin delivering fixes. Fails with `PermissionDenied` when the location
    /// capability is unavailable.
    fn start(&self, options: &FixOptions) -> TrackResult<()>;

    /// Stop delivering fixes. Idempotent.
    fn stop(&self);
}

#[derive(Default)]
struct SimState {
    callback: Option<FixCallback>,
    options: Option<FixOptions>,
    last_delivered: Option<Position>,
    permission_denied: bool,
    backgrounded: bool,
}

/// In-process fix source driven by [`SimulatedFixSource::emit`]
///
/// Applies the same thresholds a device would: a fix is delivered only once
/// both `min_interval` has elapsed and `min_distance_meters` has been covered
/// since the last delivered fix.
#[derive(Clone, Default)]
pub struct SimulatedFixSource {
    state: Arc<Mutex<SimState>>,
}

impl SimulatedFixSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// A source whose `start` fails as if location permission was refused
    pub fn without_permission() -> Self {
        let source = Self::new();
        source.set_permission(false);
        source
    }

    pub fn set_permission(&self, granted: bool) {
        if let Ok(mut state) = self.state.lock() {
            state.permission_denied = !granted;
        }
    }

    /// Simulate the host process moving to or from the background
    pub fn set_backgrounded(&self, backgrounded: bool) {
        if let Ok(mut state) = self.state.lock() {
            state.backgrounded = backgrounded;
        }
    }

    pub fn is_running(&self) -> bool {
        self.state
            .lock()
            .map(|state| state.options.is_some())
            .unwrap_or(false)
    }

    /// Offer a raw fix; returns whether it was delivered to the callback
    pub fn emit(&self, fix: Position) -> TrackResult<bool> {
        let callback = {
            let mut state = self.state.lock().map_err(handle_poison)?;
            let Some(options) = state.options.as_ref() else {
                return Ok(false);
            };
            if state.backgrounded && !options.allow_background {
                trace!("Fix suppressed while backgrounded");
                return Ok(false);
            }
            if let Some(last) = state.last_delivered {
                // A fix stamped before the last one is late, not too soon
                let elapsed_ms = fix.timestamp.saturating_sub(last.timestamp);
                let min_interval_ms =
                    i64::try_from(options.min_interval.as_millis()).unwrap_or(i64::MAX);
                let too_soon = elapsed_ms >= 0 && elapsed_ms < min_interval_ms;
                let too_close = last.distance_to(&fix) < options.min_distance_meters;
                if too_soon || too_close {
                    trace!(too_soon, too_close, "Fix below delivery threshold");
                    return Ok(false);
                }
            }
            let Some(callback) = state.callback.clone() else {
                return Ok(false);
            };
            state.last_delivered = Some(fix);
            callback
        };

        // Invoked outside the lock so the callback may call back into the source
        callback(fix);
        Ok(true)
    }
}

impl FixSource for SimulatedFixSource {
    fn on_fix(&self, callback: FixCallback) {
        if let Ok(mut state) = self.state.lock() {
            state.callback = Some(callback);
        }
    }

    fn start(&self, options: &FixOptions) -> TrackResult<()> {
        let mut state = self.state.lock().map_err(handle_poison)?;
        if state.permission_denied {
            return Err(TrackError::PermissionDenied(
                "location permission is required to share your location".to_string(),
            ));
        }
        state.options = Some(options.clone());
        state.last_delivered = None;
        debug!(?options, "Simulated fix source started");
        Ok(())
    }

    fn stop(&self) {
        if let Ok(mut state) = self.state.lock() {
            if state.options.take().is_some() {
                debug!("Simulated fix source stopped");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_source() -> (SimulatedFixSource, Arc<AtomicUsize>) {
        let source = SimulatedFixSource::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        source.on_fix(Arc::new(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        }));
        (source, count)
    }

    #[test]
    fn test_nothing_delivered_before_start() {
        let (source, count) = counting_source();
        assert!(!source.emit(Position::new(0.0, 0.0, 1)).unwrap());
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_permission_denied() {
        let source = SimulatedFixSource::without_permission();
        let err = source.start(&FixOptions::unfiltered()).unwrap_err();
        assert!(matches!(err, TrackError::PermissionDenied(_)));
        assert!(!source.is_running());

        source.set_permission(true);
        source.start(&FixOptions::unfiltered()).unwrap();
        assert!(source.is_running());
    }

    #[test]
    fn test_thresholds_filter_fixes() {
        let (source, count) = counting_source();
        source
            .start(&FixOptions {
                min_interval: Duration::from_secs(5),
                min_distance_meters: 10.0,
                allow_background: true,
            })
            .unwrap();

        assert!(source.emit(Position::new(37.0, -122.0, 0)).unwrap());
        // Too soon
        assert!(!source.emit(Position::new(37.01, -122.0, 1_000)).unwrap());
        // Late enough but has not moved
        assert!(!source.emit(Position::new(37.0, -122.0, 10_000)).unwrap());
        // Both thresholds met (~1.1 km north)
        assert!(source.emit(Position::new(37.01, -122.0, 10_000)).unwrap());
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_unfiltered_delivers_late_and_repeated_fixes() {
        let (source, count) = counting_source();
        source.start(&FixOptions::unfiltered()).unwrap();

        assert!(source.emit(Position::new(1.0, 1.0, 2000)).unwrap());
        assert!(source.emit(Position::new(1.0, 1.0, 1500)).unwrap());
        assert!(source.emit(Position::new(1.0, 1.0, 1500)).unwrap());
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_huge_interval_does_not_wrap() {
        let (source, count) = counting_source();
        source
            .start(&FixOptions {
                min_interval: Duration::MAX,
                ..FixOptions::unfiltered()
            })
            .unwrap();

        assert!(source.emit(Position::new(1.0, 1.0, 0)).unwrap());
        assert!(!source.emit(Position::new(1.0, 1.0, i64::MAX - 1)).unwrap());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_background_delivery_follows_options() {
        let (source, count) = counting_source();
        source
            .start(&FixOptions {
                allow_background: false,
                ..FixOptions::unfiltered()
            })
            .unwrap();

        source.set_backgrounded(true);
        assert!(!source.emit(Position::new(1.0, 1.0, 1)).unwrap());
        source.set_backgrounded(false);
        assert!(source.emit(Position::new(1.0, 1.0, 2)).unwrap());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_stop_is_idempotent() {
        let (source, count) = counting_source();
        source.start(&FixOptions::unfiltered()).unwrap();
        source.stop();
        source.stop();
        assert!(!source.emit(Position::new(1.0, 1.0, 1)).unwrap());
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
