//! hostcheck.toml configuration parser.
//!
//! Every field has a built-in default, so an empty file (or no file at all)
//! yields a usable configuration. Command-line flags are layered on top by
//! the binary.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{ConfigError, ConfigResult};

/// Proxy used when neither the config file nor the CLI names one.
pub const DEFAULT_PROXY: &str = "http://127.0.0.1:4444";

/// Store file used when neither the config file nor the CLI names one.
pub const DEFAULT_STORE_PATH: &str = "hosts.db";

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct HostcheckConfig {
    pub probe: ProbeConfig,
    pub proxy: ProxyConfig,
    pub store: StoreConfig,
    pub writer: WriterConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProbeConfig {
    /// Number of probes allowed in flight at once.
    pub threads: i64,
    /// Per-probe timeout in seconds (connect and response are bounded separately).
    pub timeout_secs: f64,
    /// Resubmissions allowed per host after proxy-layer failures.
    pub retry_ceiling: u32,
    pub user_agent: String,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            threads: 5,
            timeout_secs: 60.0,
            retry_ceiling: 5,
            user_agent: concat!("hostcheck/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProxyConfig {
    pub url: String,
    pub enabled: bool,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_PROXY.to_string(),
            enabled: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct StoreConfig {
    pub path: PathBuf,
    pub upsert: UpsertMode,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_STORE_PATH),
            upsert: UpsertMode::Auto,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct WriterConfig {
    /// How long the persistence writer waits for a record before
    /// re-checking its shutdown flag.
    pub poll_interval_ms: u64,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
        }
    }
}

/// How the store performs an insert-or-update keyed by hostname.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum UpsertMode {
    /// Pick a strategy from the on-disk schema version.
    #[default]
    Auto,
    /// Single read-merge-write transaction.
    Native,
    /// Insert-if-absent, then update on key conflict.
    InsertThenUpdate,
}

impl HostcheckConfig {
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> ConfigResult<Self> {
        let config: HostcheckConfig = toml::from_str(content)?;
        Ok(config)
    }

    /// Check value ranges that serde cannot express.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.probe.threads < 1 {
            return Err(ConfigError::InvalidThreads(self.probe.threads));
        }
        let timeout = self.probe.timeout_secs;
        if timeout <= 0.0 || Duration::try_from_secs_f64(timeout).is_err() {
            return Err(ConfigError::InvalidTimeout(timeout));
        }
        if self.writer.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "writer.poll_interval_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Probe timeout as a `Duration`. Out-of-range values saturate; use
    /// [`validate`](Self::validate) to reject them.
    pub fn timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.probe.timeout_secs).unwrap_or(Duration::MAX)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.writer.poll_interval_ms)
    }

    /// The proxy to route probes through, or `None` when proxying is disabled.
    pub fn proxy_url(&self) -> Option<String> {
        self.proxy
            .enabled
            .then(|| normalize_proxy_url(&self.proxy.url))
    }
}

/// Prefix a bare `host:port` proxy address with `http://`.
pub fn normalize_proxy_url(proxy: &str) -> String {
    let proxy = proxy.trim();
    if proxy.starts_with("http://") || proxy.starts_with("https://") {
        proxy.to_string()
    } else {
        format!("http://{proxy}")
    }
}
