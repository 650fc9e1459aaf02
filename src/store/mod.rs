//! CredentialStore: pluggable at-rest storage for wrapped secrets.
//!
//! Expressed as a capability-set trait (`put`/`get`/`delete`/
//! `list_fingerprints`) — no inheritance hierarchy, just a common contract
//! behind `Box<dyn ..>`. Exactly one backend is active per session; the
//! choice is made once at initialization, never per-call.

mod file;
mod memory;
mod os_vault;

pub use file::FileCredentialStore;
pub use memory::MemoryCredentialStore;
pub use os_vault::OsVaultCredentialStore;

use std::collections::BTreeSet;

use crate::config::{CoreConfig, CredentialBackendPreference};
use crate::error::Result;
use crate::fingerprint::Fingerprint;
use crate::secret::WrappedSecret;

pub trait CredentialStore: Send + Sync {
    fn put(&self, fingerprint: &Fingerprint, secret: WrappedSecret) -> Result<()>;
    fn get(&self, fingerprint: &Fingerprint) -> Result<Option<WrappedSecret>>;
    /// Idempotent: deleting an absent fingerprint is not an error.
    fn delete(&self, fingerprint: &Fingerprint) -> Result<()>;
    fn list_fingerprints(&self) -> Result<BTreeSet<Fingerprint>>;
}

/// Chooses and opens the session's single active backend.
///
/// OPSEC mode unconditionally selects the in-memory backend, regardless of
/// `config.credential_backend`. Otherwise: `OsVaultOnly`/`FileOnly` are
/// honored directly; `Auto` probes the OS vault with a throwaway
/// write/delete and falls back to the File backend if that probe fails.
pub fn open(config: &CoreConfig) -> Result<Box<dyn CredentialStore>> {
    if config.opsec {
        tracing::debug!("opsec mode: credential store is memory-only");
        return Ok(Box::new(MemoryCredentialStore::new()));
    }
    open_non_opsec(config)
}

/// Opens the backend named by `config.credential_backend`, ignoring
/// `config.opsec`. Used when toggling OPSEC off at runtime, where the
/// caller has already decided the mode independently of the config the
/// service was constructed with.
pub fn open_non_opsec(config: &CoreConfig) -> Result<Box<dyn CredentialStore>> {
    match config.credential_backend {
        CredentialBackendPreference::OsVaultOnly => {
            Ok(Box::new(OsVaultCredentialStore::new(&config.app_service_name)))
        }
        CredentialBackendPreference::FileOnly => {
            Ok(Box::new(FileCredentialStore::new(config.secrets_dir.clone())?))
        }
        CredentialBackendPreference::Auto => {
            let vault = OsVaultCredentialStore::new(&config.app_service_name);
            if vault.probe_writable() {
                tracing::debug!("credential store backend selected: os vault");
                Ok(Box::new(vault))
            } else {
                tracing::debug!("credential store backend selected: file (os vault unavailable)");
                Ok(Box::new(FileCredentialStore::new(config.secrets_dir.clone())?))
            }
        }
    }
}
