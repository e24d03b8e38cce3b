//! Probe scheduler: bounded worker pool with completion-order draining.
//!
//! Each hostname moves through
//!
//! ```text
//! PENDING → IN_FLIGHT → TERMINAL
//!               │  ↑
//!               ↓  │ resubmit while proxy failures ≤ ceiling
//!        PROXY_FAILURE ──(ceiling exceeded)──→ TERMINAL (ERROR)
//! ```
//!
//! At most `threads` probes run at once. Finished probes are handled in
//! the order they complete, so a slow host never holds back the reporting
//! and persistence of fast ones. Every terminal outcome is classified,
//! reported to the caller and queued on the persistence writer.
//!
//! The proxy-failure counters are owned by the single control flow that
//! drains completions; worker tasks never touch them.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use hostcheck_state::{HostStatus, StatusRecord};

use crate::classifier::classify;
use crate::client::{ProbeResult, Prober};
use crate::error::ProbeError;
use crate::task::ProbeTask;
use crate::writer::WriterHandle;

pub const DEFAULT_THREADS: usize = 5;
pub const DEFAULT_RETRY_CEILING: u32 = 5;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Maximum probes in flight.
    pub threads: usize,
    pub timeout: Duration,
    /// Resubmissions allowed per host after proxy failures.
    pub retry_ceiling: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            threads: DEFAULT_THREADS,
            timeout: DEFAULT_TIMEOUT,
            retry_ceiling: DEFAULT_RETRY_CEILING,
        }
    }
}

/// Tally of one scheduling run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub up: usize,
    pub down: usize,
    pub error: usize,
    /// Probes resubmitted after a proxy failure.
    pub retries: usize,
}

impl RunSummary {
    fn count(&mut self, status: HostStatus) {
        match status {
            HostStatus::Up => self.up += 1,
            HostStatus::Down => self.down += 1,
            HostStatus::Error => self.error += 1,
        }
    }

    /// Hosts that reached a terminal outcome.
    pub fn total(&self) -> usize {
        self.up + self.down + self.error
    }
}

pub struct ProbeScheduler<P> {
    prober: Arc<P>,
    config: SchedulerConfig,
}

impl<P: Prober> ProbeScheduler<P> {
    pub fn new(prober: Arc<P>, config: SchedulerConfig) -> Self {
        let config = SchedulerConfig {
            threads: config.threads.max(1),
            ..config
        };
        Self { prober, config }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Probe every hostname until each has a terminal outcome.
    ///
    /// `on_terminal` sees each record before it is queued on `writer`.
    /// Individual host failures never abort the run.
    pub async fn run<F>(&self, hostnames: &[String], writer: &WriterHandle, mut on_terminal: F) -> RunSummary
    where
        F: FnMut(&StatusRecord),
    {
        let mut pending: VecDeque<ProbeTask> = hostnames
            .iter()
            .map(|hostname| ProbeTask::new(hostname, self.config.timeout))
            .collect();
        let mut in_flight: JoinSet<(ProbeTask, ProbeResult)> = JoinSet::new();
        let mut proxy_failures: HashMap<String, u32> = HashMap::new();
        let mut summary = RunSummary::default();

        info!(
            hosts = pending.len(),
            threads = self.config.threads,
            timeout = ?self.config.timeout,
            "probe run started"
        );

        loop {
            while in_flight.len() < self.config.threads {
                let Some(task) = pending.pop_front() else {
                    break;
                };
                self.submit(&mut in_flight, task);
            }

            let Some(joined) = in_flight.join_next().await else {
                break;
            };
            let (task, result) = match joined {
                Ok(pair) => pair,
                Err(e) => {
                    // Only reachable if the run itself is being torn down.
                    error!(error = %e, "probe worker aborted");
                    continue;
                }
            };

            if let Err(e) = &result {
                if e.is_proxy_failure() {
                    let failures = proxy_failures.entry(task.hostname().to_string()).or_insert(0);
                    *failures += 1;
                    if *failures <= self.config.retry_ceiling {
                        debug!(
                            hostname = task.hostname(),
                            attempt = *failures,
                            ceiling = self.config.retry_ceiling,
                            error = %e,
                            "proxy failure, resubmitting probe"
                        );
                        summary.retries += 1;
                        pending.push_back(task);
                        continue;
                    }
                    warn!(
                        hostname = task.hostname(),
                        failures = *failures,
                        "proxy retry ceiling exceeded"
                    );
                }
            }

            let record = classify(task.hostname(), &result, task.timeout());
            summary.count(record.status);
            on_terminal(&record);
            writer.enqueue(record);
        }

        info!(
            up = summary.up,
            down = summary.down,
            error = summary.error,
            retries = summary.retries,
            "probe run finished"
        );
        summary
    }

    fn submit(&self, in_flight: &mut JoinSet<(ProbeTask, ProbeResult)>, task: ProbeTask) {
        let prober = Arc::clone(&self.prober);
        let probe_task = task.clone();
        in_flight.spawn(async move {
            // The probe runs in its own task so a panic surfaces as a
            // JoinError for this host instead of tearing down the pool slot.
            let result = tokio::spawn(async move { prober.probe(&probe_task).await })
                .await
                .unwrap_or_else(|e| Err(ProbeError::Task(e.to_string())));
            (task, result)
        });
    }
}
