//! Errors raised while loading or checking the BusTrack configuration

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot write config file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Cannot render config as TOML: {0}")]
    Render(#[from] toml::ser::Error),

    /// A `BUSTRACK_*` override could not be parsed
    #[error("{var}={value:?} is not valid: {reason}")]
    Env {
        var: String,
        value: String,
        reason: String,
    },

    #[error("Invalid config: {0}")]
    Invalid(String),
}
