//! Layering of CLI flags over `hostcheck.toml`, and startup failures.

use std::path::PathBuf;

use thiserror::Error;

use hostcheck_core::{ConfigError, HostcheckConfig};
use hostcheck_probe::ProbeError;
use hostcheck_state::StateError;

use crate::Cli;

/// Fatal problems found before probing starts. Each maps to an exit code.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Cannot open file \"{}\"", .0.display())]
    InputFile(PathBuf),

    #[error("Cannot use {0} threads")]
    Threads(i64),

    #[error("{0}")]
    Config(ConfigError),

    #[error("cannot open store: {0}")]
    Store(#[from] StateError),

    #[error("cannot set up prober: {0}")]
    Probe(#[from] ProbeError),
}

impl From<ConfigError> for StartupError {
    fn from(e: ConfigError) -> Self {
        match e {
            ConfigError::InvalidThreads(n) => StartupError::Threads(n),
            other => StartupError::Config(other),
        }
    }
}

impl StartupError {
    pub fn exit_code(&self) -> u8 {
        match self {
            StartupError::InputFile(_) => 1,
            StartupError::Threads(_) => 2,
            StartupError::Config(_) | StartupError::Store(_) | StartupError::Probe(_) => 3,
        }
    }
}

/// Process exit status for an error returned by the run.
pub fn exit_status(e: &anyhow::Error) -> u8 {
    e.downcast_ref::<StartupError>()
        .map(StartupError::exit_code)
        .unwrap_or(3)
}

/// Load the config file if one was named, then apply CLI overrides.
pub fn resolve(cli: &Cli) -> Result<HostcheckConfig, StartupError> {
    let mut config = match &cli.config {
        Some(path) => HostcheckConfig::from_file(path)?,
        None => HostcheckConfig::default(),
    };
    apply_overrides(&mut config, cli);
    config.validate()?;
    Ok(config)
}

fn apply_overrides(config: &mut HostcheckConfig, cli: &Cli) {
    if let Some(threads) = cli.threads {
        config.probe.threads = threads;
    }
    if let Some(timeout) = cli.timeout {
        config.probe.timeout_secs = timeout;
    }
    if let Some(retries) = cli.retries {
        config.probe.retry_ceiling = retries;
    }
    if let Some(proxy) = &cli.proxy {
        config.proxy.url = proxy.clone();
        config.proxy.enabled = true;
    }
    if cli.no_proxy {
        config.proxy.enabled = false;
    }
    if let Some(db) = &cli.db {
        config.store.path = db.clone();
    }
}
