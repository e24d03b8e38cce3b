//! Turns probe results into status records.

use std::time::Duration;

use hostcheck_state::{HostStatus, StatusRecord};

use crate::client::{ProbeOutcome, ProbeResult};

/// Reason recorded when the response did not arrive in time.
pub const TIMEOUT_REASON: &str = "TIMEOUT";

/// Classify one probe result for `hostname`.
///
/// `200` is UP with the measured latency. Any other status, and a timeout,
/// are DOWN with the configured timeout recorded as latency rather than the
/// measured time. Transport errors are ERROR without a latency.
/// `updated` is stamped now, not when the probe started.
pub fn classify(hostname: &str, result: &ProbeResult, timeout: Duration) -> StatusRecord {
    let (status, reason, latency) = match result {
        Ok(ProbeOutcome::Response {
            status: 200,
            elapsed,
        }) => (HostStatus::Up, String::new(), Some(elapsed.as_secs_f64())),
        Ok(ProbeOutcome::Response { status, .. }) => (
            HostStatus::Down,
            format!("DOWN ({status})"),
            Some(timeout.as_secs_f64()),
        ),
        Ok(ProbeOutcome::Timeout) => (
            HostStatus::Down,
            TIMEOUT_REASON.to_string(),
            Some(timeout.as_secs_f64()),
        ),
        Err(e) => (HostStatus::Error, e.to_string(), None),
    };
    StatusRecord {
        hostname: hostname.to_string(),
        status,
        reason,
        latency,
        updated: epoch_secs(),
    }
}

pub(crate) fn epoch_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
