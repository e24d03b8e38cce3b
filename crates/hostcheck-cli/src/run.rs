//! One invocation: read hosts, probe them, persist and report.

use std::future::Future;
use std::sync::Arc;

use tracing::{debug, info, warn};

use hostcheck_core::read_hostnames;
use hostcheck_probe::{
    HttpProber, ProbeScheduler, RunSummary, SchedulerConfig, WriterHandle, status_line,
};
use hostcheck_state::{HostRecord, StateStore, StoreOptions};

use crate::Cli;
use crate::settings::{self, StartupError};

/// Probe every host in `cli.file`. When `shutdown` resolves first, probes
/// still in flight are abandoned and results already collected are flushed.
pub async fn run(cli: Cli, shutdown: impl Future<Output = ()>) -> anyhow::Result<()> {
    let hostnames = read_hostnames(&cli.file).map_err(|e| {
        debug!(error = %e, "input file unreadable");
        StartupError::InputFile(cli.file.clone())
    })?;
    let config = settings::resolve(&cli)?;
    let threads =
        usize::try_from(config.probe.threads).map_err(|_| StartupError::Threads(config.probe.threads))?;

    let proxy = config.proxy_url();
    let prober = HttpProber::new(proxy.as_deref(), &config.probe.user_agent)
        .map_err(StartupError::from)?;
    let store = StateStore::open_with(
        &config.store.path,
        StoreOptions {
            upsert: config.store.upsert,
        },
    )
    .map_err(StartupError::from)?;

    info!(
        hosts = hostnames.len(),
        threads,
        proxy = proxy.as_deref().unwrap_or("none"),
        store = %config.store.path.display(),
        strategy = ?store.strategy(),
        "hostcheck starting"
    );

    let writer = WriterHandle::spawn(store.clone(), config.poll_interval());
    let scheduler = ProbeScheduler::new(
        Arc::new(prober),
        SchedulerConfig {
            threads,
            timeout: config.timeout(),
            retry_ceiling: config.probe.retry_ceiling,
        },
    );

    let summary: Option<RunSummary> = tokio::select! {
        summary = scheduler.run(&hostnames, &writer, |record| println!("{}", status_line(record))) => Some(summary),
        () = shutdown => {
            warn!("interrupted, flushing results already collected");
            None
        }
    };

    let stats = writer.finish().await;
    match summary {
        Some(s) => info!(
            up = s.up,
            down = s.down,
            error = s.error,
            retries = s.retries,
            written = stats.written,
            failed = stats.failed,
            "hostcheck finished"
        ),
        None => info!(written = stats.written, failed = stats.failed, "hostcheck stopped early"),
    }

    if cli.summary {
        for host in store.list_hosts().map_err(StartupError::from)? {
            println!("{}", summary_line(&host));
        }
    }
    Ok(())
}

fn summary_line(host: &HostRecord) -> String {
    format!(
        "{:>15} {:<5} {:>8.3} added={} updated={} {}",
        host.hostname, host.status, host.latency, host.added, host.updated, host.reason
    )
    .trim_end()
    .to_string()
}
