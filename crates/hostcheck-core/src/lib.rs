//! Shared configuration and input handling.
//!
//! Parses `hostcheck.toml`, loads whitespace-separated hostname lists and
//! resolves bare hostnames into probe URLs.

pub mod config;
pub mod error;
pub mod hosts;

pub use config::{HostcheckConfig, UpsertMode};
pub use error::{ConfigError, ConfigResult};
pub use hosts::{read_hostnames, to_url};
