//! Durable latest-status store for probed hosts.
//!
//! Backed by [redb](https://docs.rs/redb). One row per hostname; every
//! write is an upsert that refreshes status, reason, latency and `updated`
//! while keeping the `added` timestamp of the first observation.
//!
//! # Upsert strategies
//!
//! ```text
//! StateStore::open
//!   ├── detect on-disk layout (meta.schema_version)
//!   └── select UpsertStrategy once
//!         ├── Native            read-merge-write in one transaction
//!         └── InsertThenUpdate  insert-if-absent, update on conflict
//! ```
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`).
//! Clones share one database, which closes when the last clone is dropped.
//! Nothing here stops two clones from writing; callers that need a single
//! writer route every upsert through one task.

pub mod error;
pub mod store;
pub mod tables;
pub mod types;
pub mod upsert;

pub use error::{StateError, StateResult};
pub use hostcheck_core::UpsertMode;
pub use store::{StateStore, StoreOptions};
pub use types::*;
pub use upsert::{SchemaLayout, UpsertOutcome, UpsertStrategy};
