//! Concurrent reachability probing for hostcheck.
//!
//! # Architecture
//!
//! ```text
//! ProbeScheduler
//!   ├── JoinSet capped at `threads`
//!   │   └── Prober::probe(ProbeTask) → ProbeResult
//!   ├── completion-order drain
//!   │   ├── proxy failure ≤ ceiling → resubmit same task
//!   │   └── terminal → classify() → StatusRecord
//!   ├── on_terminal callback (console line)
//!   └── WriterHandle::enqueue ──mpsc──▶ writer task ──▶ StateStore::upsert_host
//! ```
//!
//! During a run every upsert goes through the writer task. Other store
//! clones, such as the one the CLI keeps for `--summary`, only read.

pub mod classifier;
pub mod client;
pub mod error;
pub mod report;
pub mod scheduler;
pub mod task;
pub mod writer;

pub use classifier::classify;
pub use client::{HttpProber, ProbeOutcome, ProbeResult, Prober, ProxyEndpoint};
pub use error::ProbeError;
pub use report::status_line;
pub use scheduler::{ProbeScheduler, RunSummary, SchedulerConfig};
pub use task::ProbeTask;
pub use writer::{WriterHandle, WriterStats};
