use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use super::CredentialStore;
use crate::error::Result;
use crate::fingerprint::Fingerprint;
use crate::secret::WrappedSecret;

/// Process-local, non-persistent stand-in for the platform store. Used
/// unconditionally in OPSEC mode.
pub struct MemoryCredentialStore {
    entries: Mutex<BTreeMap<Fingerprint, WrappedSecret>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        MemoryCredentialStore {
            entries: Mutex::new(BTreeMap::new()),
        }
    }
}

impl Default for MemoryCredentialStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn put(&self, fingerprint: &Fingerprint, secret: WrappedSecret) -> Result<()> {
        let mut guard = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        guard.insert(fingerprint.clone(), secret);
        Ok(())
    }

    fn get(&self, fingerprint: &Fingerprint) -> Result<Option<WrappedSecret>> {
        let guard = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        Ok(guard.get(fingerprint).cloned())
    }

    fn delete(&self, fingerprint: &Fingerprint) -> Result<()> {
        let mut guard = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        guard.remove(fingerprint);
        Ok(())
    }

    fn list_fingerprints(&self) -> Result<BTreeSet<Fingerprint>> {
        let guard = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        Ok(guard.keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fp(c: char) -> Fingerprint {
        Fingerprint::parse(&c.to_string().repeat(40)).unwrap()
    }

    fn wrapped(fp: &Fingerprint) -> WrappedSecret {
        WrappedSecret {
            ciphertext: vec![1, 2, 3],
            nonce: [0u8; 12],
            fingerprint: fp.clone(),
        }
    }

    #[test]
    fn put_then_get_observes_program_order() {
        let store = MemoryCredentialStore::new();
        let fp = fp('A');
        store.put(&fp, wrapped(&fp)).unwrap();
        assert!(store.get(&fp).unwrap().is_some());
    }

    #[test]
    fn delete_is_idempotent_and_observed_as_not_present() {
        let store = MemoryCredentialStore::new();
        let fp = fp('B');
        store.put(&fp, wrapped(&fp)).unwrap();
        store.delete(&fp).unwrap();
        store.delete(&fp).unwrap();
        assert!(store.get(&fp).unwrap().is_none());
    }
}
