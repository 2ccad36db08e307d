//! Session guard
//!
//! Holds the driver's share key and credentials across process restarts so a
//! publisher relaunched by the OS can resolve which channel a background fix
//! belongs to before any UI exists.
//!
//! The credentials are stored but never checked against the channel store.

use crate::core_model::ChannelKey;
use crate::error::{TrackError, TrackResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

pub mod file_guard;
pub mod memory_guard;

pub use file_guard::FileSessionGuard;
pub use memory_guard::MemorySessionGuard;

/// Session guard errors
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Corrupted session: {0}")]
    Corrupted(String),

    #[error("Other error: {0}")]
    Other(String),
}

impl From<serde_json::Error> for SessionError {
    fn from(err: serde_json::Error) -> Self {
        SessionError::Serialization(err.to_string())
    }
}

/// Share password and secret key entered by the driver
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct Credentials {
    password: String,
    secret_key: String,
}

impl Credentials {
    pub fn new(password: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Credentials {
            password: password.into(),
            secret_key: secret_key.into(),
        }
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    pub fn secret_key(&self) -> &str {
        &self.secret_key
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("password", &"<redacted>")
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

/// A driver's active share
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub channel_key: ChannelKey,
    pub credentials: Credentials,
}

impl Session {
    /// Create a session; every field is required
    pub fn new(
        channel_key: impl AsRef<str>,
        password: impl Into<String>,
        secret_key: impl Into<String>,
    ) -> TrackResult<Self> {
        let session = Session {
            channel_key: ChannelKey::new(channel_key.as_ref())?,
            credentials: Credentials::new(password, secret_key),
        };
        session.validate()?;
        Ok(session)
    }

    /// Check that key, password and secret key are all present
    pub fn validate(&self) -> TrackResult<()> {
        if self.credentials.password.is_empty() {
            return Err(TrackError::InvalidInput(
                "share password must not be empty".to_string(),
            ));
        }
        if self.credentials.secret_key.is_empty() {
            return Err(TrackError::InvalidInput(
                "secret key must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Durable, device-scoped storage of the active session
pub trait SessionGuard: Send + Sync {
    /// Persist the session, replacing any previous one
    fn save(&self, session: &Session) -> Result<(), SessionError>;

    /// Load the stored session, if any
    fn load(&self) -> Result<Option<Session>, SessionError>;

    /// Forget the stored session. Clearing an empty guard is not an error.
    fn clear(&self) -> Result<(), SessionError>;
}
