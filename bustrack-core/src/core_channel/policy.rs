//! Pluggable access policy for channel reads and writes
//!
//! The store never verifies who owns a key. [`OpenAccess`] reproduces that
//! behaviour and is the default; deployments that need ownership checks can
//! install their own policy without changing the store.

use crate::core_model::ChannelKey;
use crate::core_session::Credentials;
use crate::error::TrackResult;

/// Decides whether a write or subscription on a channel is allowed
pub trait AccessPolicy: Send + Sync {
    /// Called before every write. `credentials` is `None` for anonymous writes.
    fn authorize_write(
        &self,
        key: &ChannelKey,
        credentials: Option<&Credentials>,
    ) -> TrackResult<()>;

    /// Called before every subscription
    fn authorize_read(&self, key: &ChannelKey) -> TrackResult<()>;
}

/// Allows everything
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenAccess;

impl AccessPolicy for OpenAccess {
    fn authorize_write(&self, _key: &ChannelKey, _credentials: Option<&Credentials>) -> TrackResult<()> {
        Ok(())
    }

    fn authorize_read(&self, _key: &ChannelKey) -> TrackResult<()> {
        Ok(())
    }
}
