//! MetadataStore: indexed repository of KeyRecords. One on-disk backend
//! (normal mode) and one volatile backend (OPSEC mode), behind a single
//! trait — the same polymorphic-storage shape as `crate::store`.

mod memory;
mod sqlite;

pub use memory::MemoryMetadataStore;
pub use sqlite::SqliteMetadataStore;

use crate::config::CoreConfig;
use crate::error::Result;
use crate::fingerprint::Fingerprint;
use crate::types::{KeyRecord, TrustLevel};

pub trait MetadataStore: Send + Sync {
    /// Exactly one row per fingerprint; reinsert replaces, never duplicates.
    fn upsert(&self, record: KeyRecord) -> Result<()>;
    fn get(&self, fingerprint: &Fingerprint) -> Result<Option<KeyRecord>>;
    /// Own keys first, then most-recent `added_at`.
    fn list(&self) -> Result<Vec<KeyRecord>>;
    /// Idempotent: deleting an absent fingerprint is not an error.
    fn delete(&self, fingerprint: &Fingerprint) -> Result<()>;
    /// Case-insensitive match on name, email, and fingerprint suffix.
    fn search(&self, query: &str) -> Result<Vec<KeyRecord>>;
    fn set_trust(&self, fingerprint: &Fingerprint, level: TrustLevel) -> Result<()>;
}

pub fn open(config: &CoreConfig) -> Result<Box<dyn MetadataStore>> {
    if config.opsec {
        tracing::debug!("opsec mode: metadata store is memory-only");
        Ok(Box::new(MemoryMetadataStore::new()))
    } else {
        open_non_opsec(config)
    }
}

/// Opens the on-disk backend regardless of `config.opsec`. Used when
/// toggling OPSEC off at runtime.
pub fn open_non_opsec(config: &CoreConfig) -> Result<Box<dyn MetadataStore>> {
    Ok(Box::new(SqliteMetadataStore::open(&config.metadata_db_path)?))
}

/// Shared ordering: own keys first, then most-recent `added_at` — used by
/// both backends so `list()`/`search()` agree regardless of which is active.
pub(crate) fn sort_records(records: &mut [KeyRecord]) {
    records.sort_by(|a, b| {
        b.is_own_key
            .cmp(&a.is_own_key)
            .then(b.added_at.cmp(&a.added_at))
    });
}

pub(crate) fn matches_query(record: &KeyRecord, query: &str) -> bool {
    let query_lower = query.to_lowercase();
    if record.fingerprint.as_str().to_lowercase().ends_with(&query_lower) {
        return true;
    }
    record
        .all_user_ids
        .iter()
        .any(|u| u.matches_query(&query_lower))
}
