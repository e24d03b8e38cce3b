//! Insert-or-update of host rows.
//!
//! Both strategies give the same result: a new hostname gets
//! `added = updated`, an existing one has status, reason, latency and
//! `updated` overwritten while `added` stays put.

use redb::{Database, ReadableTable};
use tracing::trace;

use hostcheck_core::UpsertMode;

use crate::error::{StateResult, map_err};
use crate::tables::HOSTS;
use crate::types::{HostRecord, StatusRecord};

/// On-disk layout found when a store is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaLayout {
    /// No `hosts` table yet.
    Fresh,
    /// `hosts` table without a current `schema_version`.
    Legacy { version: Option<u64> },
    Current { version: u64 },
}

/// How a store applies upserts. Chosen once, when the store is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertStrategy {
    /// Read the existing row and write the merged row in one write transaction.
    Native,
    /// Try an insert-if-absent transaction; on key conflict run a separate
    /// update transaction.
    InsertThenUpdate,
}

/// What an upsert did to the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

impl UpsertStrategy {
    /// Pick the strategy for a configured mode and a detected layout.
    pub fn select(mode: UpsertMode, layout: SchemaLayout) -> Self {
        match mode {
            UpsertMode::Native => UpsertStrategy::Native,
            UpsertMode::InsertThenUpdate => UpsertStrategy::InsertThenUpdate,
            UpsertMode::Auto => match layout {
                SchemaLayout::Legacy { .. } => UpsertStrategy::InsertThenUpdate,
                SchemaLayout::Fresh | SchemaLayout::Current { .. } => UpsertStrategy::Native,
            },
        }
    }

    pub(crate) fn apply(self, db: &Database, record: &StatusRecord) -> StateResult<UpsertOutcome> {
        let outcome = match self {
            UpsertStrategy::Native => native_upsert(db, record)?,
            UpsertStrategy::InsertThenUpdate => {
                if insert_if_absent(db, record)? {
                    UpsertOutcome::Inserted
                } else {
                    update_existing(db, record)?;
                    UpsertOutcome::Updated
                }
            }
        };
        trace!(hostname = %record.hostname, strategy = ?self, ?outcome, "host upserted");
        Ok(outcome)
    }
}

pub(crate) fn decode(bytes: &[u8]) -> StateResult<HostRecord> {
    serde_json::from_slice(bytes).map_err(map_err!(Deserialize))
}

fn encode(row: &HostRecord) -> StateResult<Vec<u8>> {
    serde_json::to_vec(row).map_err(map_err!(Serialize))
}

fn native_upsert(db: &Database, record: &StatusRecord) -> StateResult<UpsertOutcome> {
    let txn = db.begin_write().map_err(map_err!(Transaction))?;
    let outcome;
    {
        let mut table = txn.open_table(HOSTS).map_err(map_err!(Table))?;
        let existing = table
            .get(record.hostname.as_str())
            .map_err(map_err!(Read))?
            .map(|guard| decode(guard.value()))
            .transpose()?;
        let row = match existing {
            Some(prev) => {
                outcome = UpsertOutcome::Updated;
                prev.merged(record)
            }
            None => {
                outcome = UpsertOutcome::Inserted;
                HostRecord::first_seen(record)
            }
        };
        let value = encode(&row)?;
        table
            .insert(row.table_key(), value.as_slice())
            .map_err(map_err!(Write))?;
    }
    txn.commit().map_err(map_err!(Transaction))?;
    Ok(outcome)
}

/// Returns false, writing nothing, when the hostname already has a row.
fn insert_if_absent(db: &Database, record: &StatusRecord) -> StateResult<bool> {
    let txn = db.begin_write().map_err(map_err!(Transaction))?;
    let inserted;
    {
        let mut table = txn.open_table(HOSTS).map_err(map_err!(Table))?;
        let exists = table
            .get(record.hostname.as_str())
            .map_err(map_err!(Read))?
            .is_some();
        if exists {
            inserted = false;
        } else {
            let row = HostRecord::first_seen(record);
            let value = encode(&row)?;
            table
                .insert(row.table_key(), value.as_slice())
                .map_err(map_err!(Write))?;
            inserted = true;
        }
    }
    if inserted {
        txn.commit().map_err(map_err!(Transaction))?;
    } else {
        txn.abort().map_err(map_err!(Transaction))?;
    }
    Ok(inserted)
}

fn update_existing(db: &Database, record: &StatusRecord) -> StateResult<()> {
    let txn = db.begin_write().map_err(map_err!(Transaction))?;
    {
        let mut table = txn.open_table(HOSTS).map_err(map_err!(Table))?;
        let existing = table
            .get(record.hostname.as_str())
            .map_err(map_err!(Read))?
            .map(|guard| decode(guard.value()))
            .transpose()?;
        // The row cannot vanish between the two transactions while the
        // writer is the only mutator, but fall back to an insert if it did.
        let row = match existing {
            Some(prev) => prev.merged(record),
            None => HostRecord::first_seen(record),
        };
        let value = encode(&row)?;
        table
            .insert(row.table_key(), value.as_slice())
            .map_err(map_err!(Write))?;
    }
    txn.commit().map_err(map_err!(Transaction))?;
    Ok(())
}
