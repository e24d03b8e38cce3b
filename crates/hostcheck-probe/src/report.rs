//! Human-readable console lines for terminal host outcomes.

use hostcheck_state::{HostStatus, StatusRecord};

/// Format the line printed once a host reaches a terminal outcome.
pub fn status_line(record: &StatusRecord) -> String {
    match record.status {
        HostStatus::Up => format!(
            "{:>15} UP ({:.3} seconds)",
            record.hostname,
            record.latency.unwrap_or_default()
        ),
        HostStatus::Down => format!("{:>15} {}", record.hostname, record.reason),
        HostStatus::Error => format!(
            "{:?} generated an exception: {}",
            record.hostname, record.reason
        ),
    }
}
