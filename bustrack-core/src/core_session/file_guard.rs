//! File-backed session guard
//!
//! File format (JSON):
//! ```text
//! {"version": 1, "session": {"channel_key": "...", "credentials": {...}}}
//! ```
//!
//! Writes go to a sibling temp file which is then renamed over the target, so
//! a process killed mid-write leaves either the old session or the new one.

use super::{Session, SessionError, SessionGuard};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Current session file format version
const FORMAT_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct SessionFile {
    version: u32,
    session: Session,
}

/// Session guard persisted to a single file
pub struct FileSessionGuard {
    path: PathBuf,
}

impl FileSessionGuard {
    /// Create a guard storing its session at `path`; parent directories are
    /// created on demand
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, SessionError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        Ok(FileSessionGuard { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_atomic(&self, data: &[u8]) -> Result<(), SessionError> {
        let temp_path = self.path.with_extension("tmp");
        fs::write(&temp_path, data)?;
        restrict_permissions(&temp_path)?;
        fs::rename(&temp_path, &self.path)?;
        Ok(())
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<(), SessionError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    Ok(())
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<(), SessionError> {
    Ok(())
}

impl SessionGuard for FileSessionGuard {
    fn save(&self, session: &Session) -> Result<(), SessionError> {
        let file = SessionFile {
            version: FORMAT_VERSION,
            session: session.clone(),
        };
        let data = serde_json::to_vec_pretty(&file)?;
        self.write_atomic(&data)?;
        debug!(path = %self.path.display(), key = %session.channel_key, "Session saved");
        Ok(())
    }

    fn load(&self) -> Result<Option<Session>, SessionError> {
        let data = match fs::read(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let file: SessionFile = serde_json::from_slice(&data)
            .map_err(|e| SessionError::Corrupted(e.to_string()))?;

        if file.version != FORMAT_VERSION {
            return Err(SessionError::Corrupted(format!(
                "Unsupported version: {}",
                file.version
            )));
        }

        file.session
            .validate()
            .map_err(|e| SessionError::Corrupted(e.to_string()))?;

        Ok(Some(file.session))
    }

    fn clear(&self) -> Result<(), SessionError> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                debug!(path = %self.path.display(), "Session cleared");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
