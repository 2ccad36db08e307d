//! In-memory session guard (non-persistent, for tests and single-process use)

use super::{Session, SessionError, SessionGuard};
use std::sync::{Arc, PoisonError, RwLock};

fn handle_poison<T>(_err: PoisonError<T>) -> SessionError {
    SessionError::Other("Lock poisoned: a thread panicked while holding the lock".to_string())
}

/// Session guard backed by process memory
///
/// Clones share the same slot, so a "relaunched" publisher built from a clone
/// sees what the previous instance saved.
#[derive(Clone, Default)]
pub struct MemorySessionGuard {
    slot: Arc<RwLock<Option<Session>>>,
}

impl MemorySessionGuard {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionGuard for MemorySessionGuard {
    fn save(&self, session: &Session) -> Result<(), SessionError> {
        *self.slot.write().map_err(handle_poison)? = Some(session.clone());
        Ok(())
    }

    fn load(&self) -> Result<Option<Session>, SessionError> {
        Ok(self.slot.read().map_err(handle_poison)?.clone())
    }

    fn clear(&self) -> Result<(), SessionError> {
        *self.slot.write().map_err(handle_poison)? = None;
        Ok(())
    }
}
