//! Hostname list loading and URL resolution.

use std::path::Path;

use crate::error::{ConfigError, ConfigResult};

/// Resolve a hostname into the URL that gets probed.
///
/// Names that already carry an `http://` or `https://` prefix pass through
/// unchanged; everything else is probed over plain HTTP.
pub fn to_url(hostname: &str) -> String {
    if hostname.starts_with("http://") || hostname.starts_with("https://") {
        hostname.to_string()
    } else {
        format!("http://{hostname}")
    }
}

/// Split file content into hostnames on any whitespace.
pub fn parse_hostnames(content: &str) -> Vec<String> {
    content.split_whitespace().map(str::to_string).collect()
}

/// Read a whitespace-separated hostname list from disk.
pub fn read_hostnames(path: &Path) -> ConfigResult<Vec<String>> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(parse_hostnames(&content))
}
