//! Persistence queue writer. A single background task owns store writes.
//!
//! Probing never waits on the store: status records are pushed onto an
//! unbounded channel and a dedicated task upserts them one by one.
//!
//! Each upsert is a synchronous redb commit, so it runs on the blocking
//! pool; the runtime threads driving probes never wait on disk.
//!
//! Shutdown is two-phase. [`WriterHandle::stop`] clears the working flag,
//! but the loop only exits once the queue is empty as well, so nothing
//! enqueued before the stop is lost. While idle the task wakes every poll
//! interval to re-check the flag.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use hostcheck_state::{StateStore, StatusRecord};

/// Default wait for the next record before re-checking the working flag.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Counters reported when the writer exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriterStats {
    pub written: u64,
    pub failed: u64,
}

/// Producer side of the persistence queue.
pub struct WriterHandle {
    tx: mpsc::UnboundedSender<StatusRecord>,
    working: Arc<AtomicBool>,
    task: JoinHandle<WriterStats>,
}

impl WriterHandle {
    /// Start the writer task on its own handle to `store`. The handle is
    /// dropped when the task exits; other clones stay usable for reads.
    pub fn spawn(store: StateStore, poll_interval: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let working = Arc::new(AtomicBool::new(true));
        let task = tokio::spawn(run_writer(store, rx, Arc::clone(&working), poll_interval));
        Self { tx, working, task }
    }

    /// Queue a record for persistence. Never blocks.
    pub fn enqueue(&self, record: StatusRecord) {
        if let Err(mpsc::error::SendError(record)) = self.tx.send(record) {
            warn!(hostname = %record.hostname, "persistence writer has exited, record dropped");
        }
    }

    /// Signal that no more work is coming. Already-queued records are still written.
    pub fn stop(&self) {
        self.working.store(false, Ordering::SeqCst);
    }

    /// Stop, wait for the queue to drain and return the writer's counters.
    pub async fn finish(self) -> WriterStats {
        let Self { tx, working, task } = self;
        working.store(false, Ordering::SeqCst);
        drop(tx);
        match task.await {
            Ok(stats) => stats,
            Err(e) => {
                error!(error = %e, "persistence writer task failed");
                WriterStats::default()
            }
        }
    }
}

async fn run_writer(
    store: StateStore,
    mut rx: mpsc::UnboundedReceiver<StatusRecord>,
    working: Arc<AtomicBool>,
    poll_interval: Duration,
) -> WriterStats {
    let mut stats = WriterStats::default();
    debug!(?poll_interval, strategy = ?store.strategy(), "persistence writer started");

    while working.load(Ordering::SeqCst) || !rx.is_empty() {
        let record = match tokio::time::timeout(poll_interval, rx.recv()).await {
            Ok(Some(record)) => record,
            // Every sender is gone and the queue is empty.
            Ok(None) => break,
            Err(_) => continue,
        };
        let writer_store = store.clone();
        let upsert = tokio::task::spawn_blocking(move || {
            let result = writer_store.upsert_host(&record);
            (record, result)
        });
        match upsert.await {
            Ok((record, Ok(outcome))) => {
                stats.written += 1;
                debug!(hostname = %record.hostname, status = %record.status, ?outcome, "host status persisted");
            }
            Ok((record, Err(e))) => {
                stats.failed += 1;
                error!(hostname = %record.hostname, error = %e, "failed to persist host status");
            }
            Err(e) => {
                stats.failed += 1;
                error!(error = %e, "store write task failed");
            }
        }
    }

    info!(written = stats.written, failed = stats.failed, "persistence writer stopped");
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use hostcheck_state::HostStatus;

    fn record(hostname: &str, updated: u64) -> StatusRecord {
        StatusRecord {
            hostname: hostname.to_string(),
            status: HostStatus::Up,
            reason: String::new(),
            latency: Some(0.1),
            updated,
        }
    }

    #[tokio::test]
    async fn drains_everything_enqueued_before_stop() {
        let store = StateStore::open_in_memory().unwrap();
        let writer = WriterHandle::spawn(store.clone(), Duration::from_millis(50));

        for i in 0..200 {
            writer.enqueue(record(&format!("host-{i}.example"), 1000 + i));
        }
        writer.stop();
        let stats = writer.finish().await;

        assert_eq!(stats, WriterStats { written: 200, failed: 0 });
        assert_eq!(store.count_hosts().unwrap(), 200);
    }

    #[tokio::test]
    async fn repeated_records_keep_first_added() {
        let store = StateStore::open_in_memory().unwrap();
        let writer = WriterHandle::spawn(store.clone(), Duration::from_millis(50));

        for i in 0..20 {
            writer.enqueue(record("same.example", 1000 + i));
        }
        writer.stop();
        let stats = writer.finish().await;

        assert_eq!(stats.written, 20);
        let row = store.get_host("same.example").unwrap().unwrap();
        assert_eq!(row.added, 1000);
        assert_eq!(row.updated, 1019);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn store_commits_leave_the_runtime_thread_free() {
        let store = StateStore::open_in_memory().unwrap();
        let writer = WriterHandle::spawn(store.clone(), Duration::from_millis(20));

        // On a single-threaded runtime this task only runs while the writer
        // is parked awaiting a commit on the blocking pool.
        let ticks = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = Arc::clone(&ticks);
        let ticker = tokio::spawn(async move {
            loop {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::task::yield_now().await;
            }
        });

        for i in 0..50 {
            writer.enqueue(record(&format!("host-{i}.example"), 1000 + i));
        }
        let stats = writer.finish().await;
        ticker.abort();

        assert_eq!(stats.written, 50);
        assert!(ticks.load(Ordering::SeqCst) >= 50);
    }

    #[tokio::test]
    async fn idle_writer_exits_within_poll_interval() {
        let store = StateStore::open_in_memory().unwrap();
        let writer = WriterHandle::spawn(store, Duration::from_millis(20));

        let stats = tokio::time::timeout(Duration::from_secs(2), writer.finish())
            .await
            .expect("writer did not exit");
        assert_eq!(stats, WriterStats::default());
    }

    #[tokio::test]
    async fn records_are_written_while_running() {
        let store = StateStore::open_in_memory().unwrap();
        let writer = WriterHandle::spawn(store.clone(), Duration::from_millis(20));

        writer.enqueue(record("early.example", 1000));
        for _ in 0..100 {
            if store.get_host("early.example").unwrap().is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(store.get_host("early.example").unwrap().is_some());

        writer.finish().await;
    }
}
