//! The single configuration structure the core accepts.
//!
//! The core never reads an environment variable itself; the shell builds a
//! `CoreConfig` however it likes (env, a TOML file, hardcoded test values)
//! and hands it to [`crate::service::KeyringService::new`].

use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialBackendPreference {
    /// Try the OS vault first, fall back to the File backend on write failure.
    Auto,
    OsVaultOnly,
    FileOnly,
}

#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// Directory backing the File credential store (`{secrets_dir}/{fp}.key`).
    pub secrets_dir: PathBuf,
    /// Path to the on-disk MetadataStore index (ignored in OPSEC mode).
    pub metadata_db_path: PathBuf,
    /// Application name used to namespace OS-vault entries.
    pub app_service_name: String,
    /// TTL for newly-inserted PassphraseCache entries.
    pub passphrase_cache_ttl: Duration,
    /// Whether armor output includes `Comment`/`Version` headers.
    pub include_armor_metadata: bool,
    /// Start the session in OPSEC mode (no secret or metadata state persists).
    pub opsec: bool,
    pub credential_backend: CredentialBackendPreference,
}

impl CoreConfig {
    /// A configuration useful for tests: temp-directory backed, auto backend.
    pub fn ephemeral(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        CoreConfig {
            secrets_dir: dir.join("secrets"),
            metadata_db_path: dir.join("metadata.sqlite3"),
            app_service_name: "keychainpgp".to_string(),
            passphrase_cache_ttl: Duration::from_secs(300),
            include_armor_metadata: false,
            opsec: false,
            credential_backend: CredentialBackendPreference::Auto,
        }
    }
}
