//! Domain types for the hostcheck store.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Latency stored when none was measured (probe errored).
pub const UNKNOWN_LATENCY: f64 = -1.0;

/// Reachability class of a host.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum HostStatus {
    /// Answered with HTTP 200.
    Up,
    /// Answered with another status, or did not answer in time.
    Down,
    /// The probe itself failed.
    Error,
}

impl HostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HostStatus::Up => "UP",
            HostStatus::Down => "DOWN",
            HostStatus::Error => "ERROR",
        }
    }
}

impl fmt::Display for HostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Classified result of probing one host, handed to the persistence writer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusRecord {
    pub hostname: String,
    pub status: HostStatus,
    /// Empty for `Up`.
    pub reason: String,
    /// Seconds; `None` when no latency is known.
    pub latency: Option<f64>,
    /// Unix timestamp (seconds) of classification.
    pub updated: u64,
}

/// Persisted row: the latest known state of a host.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HostRecord {
    pub hostname: String,
    /// Stored under the `type` column name.
    #[serde(rename = "type")]
    pub status: HostStatus,
    pub reason: String,
    /// Seconds, or [`UNKNOWN_LATENCY`].
    pub latency: f64,
    /// Unix timestamp (seconds) of the first write for this host.
    pub added: u64,
    /// Unix timestamp (seconds) of the latest write for this host.
    pub updated: u64,
}

impl HostRecord {
    /// Row for a host seen for the first time.
    pub fn first_seen(record: &StatusRecord) -> Self {
        Self {
            hostname: record.hostname.clone(),
            status: record.status,
            reason: record.reason.clone(),
            latency: record.latency.unwrap_or(UNKNOWN_LATENCY),
            added: record.updated,
            updated: record.updated,
        }
    }

    /// This row overwritten by a newer observation. `added` is kept.
    pub fn merged(&self, record: &StatusRecord) -> Self {
        Self {
            added: self.added,
            ..Self::first_seen(record)
        }
    }

    pub fn table_key(&self) -> &str {
        &self.hostname
    }
}
