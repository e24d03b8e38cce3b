//! redb table definitions for the hostcheck store.

use redb::TableDefinition;

/// Latest status per host, keyed by hostname as it appeared in the input list.
/// Values are JSON-serialized `HostRecord`s.
pub const HOSTS: TableDefinition<&str, &[u8]> = TableDefinition::new("hosts");

/// Store metadata. Holds `schema_version`; absent in stores written by the
/// legacy layout.
pub const META: TableDefinition<&str, u64> = TableDefinition::new("meta");

pub const SCHEMA_VERSION_KEY: &str = "schema_version";

/// Version written into fresh stores. Stores at or above this version
/// support the single-transaction upsert.
pub const SCHEMA_VERSION: u64 = 2;
