//! hostcheck: probe a list of hostnames and record their reachability.
//!
//! # Usage
//!
//! ```text
//! hostcheck hosts.txt --threads 32 --timeout 10 --proxy 127.0.0.1:4444
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

mod run;
mod settings;

#[derive(Parser, Debug)]
#[command(
    name = "hostcheck",
    about = "Probe hostnames over HTTP(S) and record whether they are up",
    version
)]
pub struct Cli {
    /// File with whitespace-separated hostnames
    pub file: PathBuf,

    /// Number of probes in flight (5 default)
    #[arg(short, long, allow_negative_numbers = true)]
    pub threads: Option<i64>,

    /// Timeout, seconds (60 default)
    #[arg(short = 'n', long)]
    pub timeout: Option<f64>,

    /// HTTP proxy address (default http://127.0.0.1:4444)
    #[arg(short, long)]
    pub proxy: Option<String>,

    /// Proceed without proxy
    #[arg(long)]
    pub no_proxy: bool,

    /// Store file (hosts.db default)
    #[arg(long)]
    pub db: Option<PathBuf>,

    /// Config file (hostcheck.toml)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Resubmissions allowed per host after proxy errors (5 default)
    #[arg(long)]
    pub retries: Option<u32>,

    /// Print every stored host after the run
    #[arg(long)]
    pub summary: bool,

    /// Debug logging (overridden by RUST_LOG)
    #[arg(short, long)]
    pub verbose: bool,
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "info,hostcheck=debug"
    } else {
        "warn,hostcheck=info"
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default)),
        )
        .init();
}

/// Resolves on Ctrl-C. Never resolves if the handler cannot be installed.
async fn interrupted() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "cannot listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run::run(cli, interrupted()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{e:#}");
            ExitCode::from(settings::exit_status(&e))
        }
    }
}
