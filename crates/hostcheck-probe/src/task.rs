//! Unit of probing work.

use std::time::Duration;

use hostcheck_core::to_url;

/// One host to probe. Built once per hostname and resubmitted unchanged
/// when a proxy-layer failure is retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeTask {
    hostname: String,
    url: String,
    timeout: Duration,
}

impl ProbeTask {
    pub fn new(hostname: &str, timeout: Duration) -> Self {
        Self {
            hostname: hostname.to_string(),
            url: to_url(hostname),
            timeout,
        }
    }

    /// Hostname exactly as it appeared in the input list; the store key.
    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}
