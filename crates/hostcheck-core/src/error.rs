//! Error types for configuration and hostname-list loading.

use std::path::PathBuf;

use thiserror::Error;

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("cannot use {0} threads")]
    InvalidThreads(i64),

    #[error("invalid timeout: {0} seconds")]
    InvalidTimeout(f64),

    #[error("invalid config: {0}")]
    Invalid(String),
}
