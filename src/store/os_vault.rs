use std::collections::BTreeSet;

use keyring::Entry;

use super::CredentialStore;
use crate::error::{KeyringError, Result};
use crate::fingerprint::Fingerprint;
use crate::secret::WrappedSecret;

/// Backend of choice: the platform secret store (macOS Keychain, Windows
/// Credential Manager, the Secret Service / kwallet on Linux), reached via
/// the `keyring` crate's `Entry`. One entry per fingerprint, keyed by
/// `(service_name, fingerprint)`.
pub struct OsVaultCredentialStore {
    service_name: String,
}

const PROBE_USERNAME: &str = "__keyring_core_probe__";

impl OsVaultCredentialStore {
    pub fn new(service_name: impl Into<String>) -> Self {
        OsVaultCredentialStore {
            service_name: service_name.into(),
        }
    }

    fn entry(&self, username: &str) -> Result<Entry> {
        Entry::new(&self.service_name, username)
            .map_err(|e| KeyringError::BackendUnavailable(Some(anyhow::Error::new(e))))
    }

    /// A throwaway write/read/delete used at initialization to decide
    /// whether the `Auto` preference should use this backend or fail over
    /// to the File backend. Never called per-operation.
    pub fn probe_writable(&self) -> bool {
        let entry = match self.entry(PROBE_USERNAME) {
            Ok(e) => e,
            Err(_) => return false,
        };
        if entry.set_secret(b"probe").is_err() {
            return false;
        }
        let readable = entry.get_secret().is_ok();
        let _ = entry.delete_credential();
        readable
    }
}

impl CredentialStore for OsVaultCredentialStore {
    fn put(&self, fingerprint: &Fingerprint, secret: WrappedSecret) -> Result<()> {
        let entry = self.entry(fingerprint.as_str())?;
        let bytes = serde_json::to_vec(&secret)
            .map_err(|e| KeyringError::BackendUnavailable(Some(anyhow::Error::new(e))))?;
        entry
            .set_secret(&bytes)
            .map_err(|e| KeyringError::BackendUnavailable(Some(anyhow::Error::new(e))))
    }

    fn get(&self, fingerprint: &Fingerprint) -> Result<Option<WrappedSecret>> {
        let entry = self.entry(fingerprint.as_str())?;
        match entry.get_secret() {
            Ok(bytes) => {
                let secret = serde_json::from_slice(&bytes)
                    .map_err(|e| KeyringError::BackendUnavailable(Some(anyhow::Error::new(e))))?;
                Ok(Some(secret))
            }
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(KeyringError::BackendUnavailable(Some(anyhow::Error::new(e)))),
        }
    }

    fn delete(&self, fingerprint: &Fingerprint) -> Result<()> {
        let entry = self.entry(fingerprint.as_str())?;
        match entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(KeyringError::BackendUnavailable(Some(anyhow::Error::new(e)))),
        }
    }

    fn list_fingerprints(&self) -> Result<BTreeSet<Fingerprint>> {
        // Platform secret stores expose no service-scoped enumeration API
        // through `keyring-rs`; callers that need a full listing while
        // using this backend should rely on the MetadataStore index
        // instead, which always tracks every fingerprint the service knows
        // about regardless of which CredentialStore backend is active.
        // Always empty here: never use this return value to decide that a
        // specific fingerprint's secret is absent — use `get()` for that.
        Ok(BTreeSet::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // The OS vault is unavailable in CI/sandboxed test environments, so
    // these only assert the failure path degrades to `BackendUnavailable`
    // rather than panicking; they do not assert success.
    #[test]
    fn missing_entry_is_not_an_error() {
        let store = OsVaultCredentialStore::new("keyring-core-tests-nonexistent");
        let fp = Fingerprint::parse(&"F".repeat(40)).unwrap();
        let result = store.get(&fp);
        if let Ok(value) = result {
            assert!(value.is_none());
        }
    }

    #[test]
    fn list_fingerprints_is_always_empty() {
        let store = OsVaultCredentialStore::new("keyring-core-tests-nonexistent");
        assert!(store.list_fingerprints().unwrap().is_empty());
    }
}
