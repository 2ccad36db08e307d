//! Error types for the location core
//!
//! Every fallible operation in the store, publisher and tracker returns a
//! [`TrackResult`]. Nothing in the core terminates the process; the caller
//! decides whether to alert the end user.

use crate::core_model::ChannelKey;
use crate::core_session::SessionError;
use std::sync::PoisonError;
use thiserror::Error;

/// Result type for location core operations
pub type TrackResult<T> = Result<T, TrackError>;

/// Errors surfaced by the location core
#[derive(Debug, Error)]
pub enum TrackError {
    /// Empty key or out-of-range coordinates. Never retried automatically.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The fix source could not be acquired
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// No publisher has written to the channel yet
    #[error("No location data for channel {0}")]
    NoData(ChannelKey),

    /// A background fix arrived but no session could be recovered; the fix is discarded
    #[error("Fix dropped: no active session")]
    DroppedUninitialized,

    /// Rejected by a non-default access policy
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Session guard failure
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// Internal error (lock poisoned)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl TrackError {
    /// Whether the caller may reasonably retry the same call later
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TrackError::NoData(_) | TrackError::PermissionDenied(_) | TrackError::Session(_)
        )
    }
}

/// Helper to convert poison errors into TrackError
pub(crate) fn handle_poison<T>(_err: PoisonError<T>) -> TrackError {
    TrackError::Internal("Lock poisoned: a thread panicked while holding the lock".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_track_error_display() {
        let err = TrackError::InvalidInput("latitude 200 outside [-90, 90]".to_string());
        assert_eq!(
            err.to_string(),
            "Invalid input: latitude 200 outside [-90, 90]"
        );

        let key = ChannelKey::new("bus42").unwrap();
        assert_eq!(
            TrackError::NoData(key).to_string(),
            "No location data for channel bus42"
        );
    }

    #[test]
    fn test_retryable_classification() {
        let key = ChannelKey::new("bus42").unwrap();
        assert!(TrackError::NoData(key).is_retryable());
        assert!(TrackError::PermissionDenied("gps off".into()).is_retryable());
        assert!(!TrackError::InvalidInput("empty".into()).is_retryable());
        assert!(!TrackError::DroppedUninitialized.is_retryable());
    }

    #[test]
    fn test_session_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk gone");
        let err: TrackError = SessionError::from(io).into();
        assert!(matches!(err, TrackError::Session(_)));
    }
}
