use std::collections::BTreeMap;
use std::sync::Mutex;

use super::{matches_query, sort_records, MetadataStore};
use crate::error::Result;
use crate::fingerprint::Fingerprint;
use crate::types::{KeyRecord, TrustLevel};

/// OPSEC-mode backend: a `BTreeMap` ordered by fingerprint so iteration is
/// deterministic before `sort_records` imposes the display order.
pub struct MemoryMetadataStore {
    records: Mutex<BTreeMap<Fingerprint, KeyRecord>>,
}

impl MemoryMetadataStore {
    pub fn new() -> Self {
        MemoryMetadataStore {
            records: Mutex::new(BTreeMap::new()),
        }
    }
}

impl Default for MemoryMetadataStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MetadataStore for MemoryMetadataStore {
    fn upsert(&self, record: KeyRecord) -> Result<()> {
        let mut guard = self.records.lock().unwrap_or_else(|p| p.into_inner());
        guard.insert(record.fingerprint.clone(), record);
        Ok(())
    }

    fn get(&self, fingerprint: &Fingerprint) -> Result<Option<KeyRecord>> {
        let guard = self.records.lock().unwrap_or_else(|p| p.into_inner());
        Ok(guard.get(fingerprint).cloned())
    }

    fn list(&self) -> Result<Vec<KeyRecord>> {
        let guard = self.records.lock().unwrap_or_else(|p| p.into_inner());
        let mut records: Vec<_> = guard.values().cloned().collect();
        sort_records(&mut records);
        Ok(records)
    }

    fn delete(&self, fingerprint: &Fingerprint) -> Result<()> {
        let mut guard = self.records.lock().unwrap_or_else(|p| p.into_inner());
        guard.remove(fingerprint);
        Ok(())
    }

    fn search(&self, query: &str) -> Result<Vec<KeyRecord>> {
        let guard = self.records.lock().unwrap_or_else(|p| p.into_inner());
        let mut matches: Vec<_> = guard
            .values()
            .filter(|r| matches_query(r, query))
            .cloned()
            .collect();
        sort_records(&mut matches);
        Ok(matches)
    }

    fn set_trust(&self, fingerprint: &Fingerprint, level: TrustLevel) -> Result<()> {
        let mut guard = self.records.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(record) = guard.get_mut(fingerprint) {
            record.trust_level = level;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record(c: char, is_own: bool) -> KeyRecord {
        KeyRecord {
            fingerprint: Fingerprint::parse(&c.to_string().repeat(40)).unwrap(),
            primary_user_id: None,
            all_user_ids: vec![],
            algorithm_label: "Ed25519".to_string(),
            created_at: Utc::now(),
            expires_at: None,
            trust_level: TrustLevel::Unknown,
            is_own_key: is_own,
            certificate_bytes: vec![],
            revocation_cert: None,
            added_at: Utc::now(),
        }
    }

    #[test]
    fn upsert_replaces_rather_than_duplicates() {
        let store = MemoryMetadataStore::new();
        let mut r = record('A', false);
        store.upsert(r.clone()).unwrap();
        r.trust_level = TrustLevel::Verified;
        store.upsert(r).unwrap();
        assert_eq!(store.list().unwrap().len(), 1);
        assert_eq!(store.get(&Fingerprint::parse(&"A".repeat(40)).unwrap()).unwrap().unwrap().trust_level, TrustLevel::Verified);
    }

    #[test]
    fn delete_is_idempotent() {
        let store = MemoryMetadataStore::new();
        let fp = Fingerprint::parse(&"B".repeat(40)).unwrap();
        store.upsert(record('B', false)).unwrap();
        store.delete(&fp).unwrap();
        store.delete(&fp).unwrap();
        assert!(store.get(&fp).unwrap().is_none());
    }

    #[test]
    fn list_orders_own_keys_first_then_recency() {
        let store = MemoryMetadataStore::new();
        store.upsert(record('C', false)).unwrap();
        store.upsert(record('D', true)).unwrap();
        let list = store.list().unwrap();
        assert!(list[0].is_own_key);
    }
}
