use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::{matches_query, sort_records, MetadataStore};
use crate::error::Result;
use crate::fingerprint::Fingerprint;
use crate::types::{KeyRecord, TrustLevel, UserId};

/// On-disk backend: a single-table transactional index, migratable by
/// `user_version`. Timestamps are stored as RFC 3339 text rather than via
/// `rusqlite`'s chrono feature, keeping the schema readable with any SQLite
/// client.
pub struct SqliteMetadataStore {
    conn: Mutex<Connection>,
}

const SCHEMA_VERSION: i64 = 1;

const CREATE_TABLE: &str = "
CREATE TABLE IF NOT EXISTS key_records (
    fingerprint TEXT PRIMARY KEY,
    primary_user_id TEXT,
    all_user_ids TEXT NOT NULL,
    algorithm_label TEXT NOT NULL,
    created_at TEXT NOT NULL,
    expires_at TEXT,
    trust_level TEXT NOT NULL,
    is_own_key INTEGER NOT NULL,
    certificate_bytes BLOB NOT NULL,
    revocation_cert BLOB,
    added_at TEXT NOT NULL
)";

impl SqliteMetadataStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.execute(CREATE_TABLE, [])?;
        let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
        if version == 0 {
            conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
        }
        Ok(SqliteMetadataStore {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute(CREATE_TABLE, [])?;
        Ok(SqliteMetadataStore {
            conn: Mutex::new(conn),
        })
    }
}

fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<KeyRecord> {
    let fingerprint_text: String = row.get(0)?;
    let fingerprint = Fingerprint::parse(&fingerprint_text)
        .map_err(|_| rusqlite::Error::InvalidColumnType(0, "fingerprint".into(), rusqlite::types::Type::Text))?;
    let primary_user_id_json: Option<String> = row.get(1)?;
    let all_user_ids_json: String = row.get(2)?;
    let algorithm_label: String = row.get(3)?;
    let created_at_text: String = row.get(4)?;
    let expires_at_text: Option<String> = row.get(5)?;
    let trust_level_text: String = row.get(6)?;
    let is_own_key: i64 = row.get(7)?;
    let certificate_bytes: Vec<u8> = row.get(8)?;
    let revocation_cert: Option<Vec<u8>> = row.get(9)?;
    let added_at_text: String = row.get(10)?;

    let primary_user_id = primary_user_id_json
        .and_then(|s| serde_json::from_str::<UserId>(&s).ok());
    let all_user_ids: Vec<UserId> = serde_json::from_str(&all_user_ids_json).unwrap_or_default();
    let created_at = DateTime::parse_from_rfc3339(&created_at_text)
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now());
    let expires_at = expires_at_text
        .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|d| d.with_timezone(&Utc));
    let added_at = DateTime::parse_from_rfc3339(&added_at_text)
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now());
    let trust_level = TrustLevel::parse(&trust_level_text).unwrap_or(TrustLevel::Unknown);

    Ok(KeyRecord {
        fingerprint,
        primary_user_id,
        all_user_ids,
        algorithm_label,
        created_at,
        expires_at,
        trust_level,
        is_own_key: is_own_key != 0,
        certificate_bytes,
        revocation_cert,
        added_at,
    })
}

const SELECT_COLUMNS: &str = "fingerprint, primary_user_id, all_user_ids, algorithm_label, \
     created_at, expires_at, trust_level, is_own_key, certificate_bytes, revocation_cert, added_at";

impl MetadataStore for SqliteMetadataStore {
    fn upsert(&self, record: KeyRecord) -> Result<()> {
        let conn = self.conn.lock().unwrap_or_else(|p| p.into_inner());
        let primary_user_id_json = record
            .primary_user_id
            .as_ref()
            .map(|u| serde_json::to_string(u))
            .transpose()
            .map_err(|_| crate::error::KeyringError::BackendUnavailable(None))?;
        let all_user_ids_json = serde_json::to_string(&record.all_user_ids)
            .map_err(|_| crate::error::KeyringError::BackendUnavailable(None))?;

        conn.execute(
            "INSERT INTO key_records
                (fingerprint, primary_user_id, all_user_ids, algorithm_label, created_at,
                 expires_at, trust_level, is_own_key, certificate_bytes, revocation_cert, added_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
             ON CONFLICT(fingerprint) DO UPDATE SET
                primary_user_id = excluded.primary_user_id,
                all_user_ids = excluded.all_user_ids,
                algorithm_label = excluded.algorithm_label,
                created_at = excluded.created_at,
                expires_at = excluded.expires_at,
                trust_level = excluded.trust_level,
                is_own_key = excluded.is_own_key,
                certificate_bytes = excluded.certificate_bytes,
                revocation_cert = excluded.revocation_cert",
            params![
                record.fingerprint.as_str(),
                primary_user_id_json,
                all_user_ids_json,
                record.algorithm_label,
                record.created_at.to_rfc3339(),
                record.expires_at.map(|d| d.to_rfc3339()),
                record.trust_level.as_str(),
                record.is_own_key as i64,
                record.certificate_bytes,
                record.revocation_cert,
                record.added_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn get(&self, fingerprint: &Fingerprint) -> Result<Option<KeyRecord>> {
        let conn = self.conn.lock().unwrap_or_else(|p| p.into_inner());
        let sql = format!("SELECT {SELECT_COLUMNS} FROM key_records WHERE fingerprint = ?1");
        let record = conn
            .query_row(&sql, params![fingerprint.as_str()], row_to_record)
            .optional()?;
        Ok(record)
    }

    fn list(&self) -> Result<Vec<KeyRecord>> {
        let conn = self.conn.lock().unwrap_or_else(|p| p.into_inner());
        let sql = format!("SELECT {SELECT_COLUMNS} FROM key_records");
        let mut stmt = conn.prepare(&sql)?;
        let mut records: Vec<KeyRecord> = stmt
            .query_map([], row_to_record)?
            .collect::<rusqlite::Result<_>>()?;
        sort_records(&mut records);
        Ok(records)
    }

    fn delete(&self, fingerprint: &Fingerprint) -> Result<()> {
        let conn = self.conn.lock().unwrap_or_else(|p| p.into_inner());
        conn.execute(
            "DELETE FROM key_records WHERE fingerprint = ?1",
            params![fingerprint.as_str()],
        )?;
        Ok(())
    }

    fn search(&self, query: &str) -> Result<Vec<KeyRecord>> {
        // Filtering is done in-process rather than pushed into SQL: the
        // query needs to match decoded user-id JSON, not the raw column.
        let all = self.list()?;
        let mut matches: Vec<_> = all.into_iter().filter(|r| matches_query(r, query)).collect();
        sort_records(&mut matches);
        Ok(matches)
    }

    fn set_trust(&self, fingerprint: &Fingerprint, level: TrustLevel) -> Result<()> {
        let conn = self.conn.lock().unwrap_or_else(|p| p.into_inner());
        conn.execute(
            "UPDATE key_records SET trust_level = ?1 WHERE fingerprint = ?2",
            params![level.as_str(), fingerprint.as_str()],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(c: char) -> KeyRecord {
        KeyRecord {
            fingerprint: Fingerprint::parse(&c.to_string().repeat(40)).unwrap(),
            primary_user_id: Some(UserId {
                name: Some("Alice".to_string()),
                email: Some("alice@example.com".to_string()),
            }),
            all_user_ids: vec![UserId {
                name: Some("Alice".to_string()),
                email: Some("alice@example.com".to_string()),
            }],
            algorithm_label: "Ed25519".to_string(),
            created_at: Utc::now(),
            expires_at: None,
            trust_level: TrustLevel::Unknown,
            is_own_key: false,
            certificate_bytes: vec![1, 2, 3],
            revocation_cert: None,
            added_at: Utc::now(),
        }
    }

    #[test]
    fn upsert_get_round_trip() {
        let store = SqliteMetadataStore::open_in_memory().unwrap();
        let r = record('A');
        let fp = r.fingerprint.clone();
        store.upsert(r).unwrap();
        let fetched = store.get(&fp).unwrap().unwrap();
        assert_eq!(fetched.algorithm_label, "Ed25519");
        assert_eq!(fetched.primary_user_id.unwrap().email.as_deref(), Some("alice@example.com"));
    }

    #[test]
    fn reinsert_replaces_not_duplicates() {
        let store = SqliteMetadataStore::open_in_memory().unwrap();
        let mut r = record('B');
        let fp = r.fingerprint.clone();
        store.upsert(r.clone()).unwrap();
        r.trust_level = TrustLevel::Verified;
        store.upsert(r).unwrap();
        assert_eq!(store.list().unwrap().len(), 1);
        assert_eq!(store.get(&fp).unwrap().unwrap().trust_level, TrustLevel::Verified);
    }

    #[test]
    fn search_matches_email_case_insensitively() {
        let store = SqliteMetadataStore::open_in_memory().unwrap();
        store.upsert(record('C')).unwrap();
        let results = store.search("ALICE@EXAMPLE.COM").unwrap();
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn delete_is_idempotent() {
        let store = SqliteMetadataStore::open_in_memory().unwrap();
        let r = record('D');
        let fp = r.fingerprint.clone();
        store.upsert(r).unwrap();
        store.delete(&fp).unwrap();
        store.delete(&fp).unwrap();
        assert!(store.get(&fp).unwrap().is_none());
    }
}
