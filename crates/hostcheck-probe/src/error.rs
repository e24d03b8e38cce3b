//! Probe error types.

use std::time::Duration;

use thiserror::Error;

/// Why a probe produced no HTTP response.
///
/// Only [`ProbeError::Proxy`] is considered transient: the path through the
/// forward proxy failed, which says nothing about the target host.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProbeError {
    #[error("proxy error: {0}")]
    Proxy(String),

    #[error("invalid url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("invalid proxy {url}: {reason}")]
    InvalidProxy { url: String, reason: String },

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("connect timed out after {0:?}")]
    ConnectTimeout(Duration),

    #[error("tls error: {0}")]
    Tls(String),

    #[error("request failed: {0}")]
    Http(String),

    #[error("probe task failed: {0}")]
    Task(String),
}

impl ProbeError {
    /// Whether the failure belongs to the retryable proxy-layer class.
    pub fn is_proxy_failure(&self) -> bool {
        matches!(self, ProbeError::Proxy(_))
    }
}
