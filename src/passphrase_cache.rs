//! Self-pruning passphrase cache: `get` removes an expired entry on the
//! same access that observes its expiry. In-memory only, never persisted.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use secrecy::{ExposeSecret, SecretString};

use crate::fingerprint::Fingerprint;

struct Entry {
    passphrase: SecretString,
    deadline: Instant,
}

/// TTL is configurable per-session and takes effect immediately for all
/// future inserts; existing entries retain their original deadline.
pub struct PassphraseCache {
    ttl: Mutex<Duration>,
    entries: Mutex<HashMap<Fingerprint, Entry>>,
}

impl PassphraseCache {
    pub fn new(ttl: Duration) -> Self {
        PassphraseCache {
            ttl: Mutex::new(ttl),
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn set_ttl(&self, ttl: Duration) {
        let mut guard = self.ttl.lock().unwrap_or_else(|p| p.into_inner());
        *guard = ttl;
    }

    pub fn insert(&self, fingerprint: Fingerprint, passphrase: SecretString) {
        let ttl = *self.ttl.lock().unwrap_or_else(|p| p.into_inner());
        let mut guard = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        guard.insert(
            fingerprint,
            Entry {
                passphrase,
                deadline: Instant::now() + ttl,
            },
        );
    }

    /// Returns the cached passphrase if present and unexpired. An expired
    /// entry is pruned on this same call before returning `None`.
    pub fn get(&self, fingerprint: &Fingerprint) -> Option<String> {
        let mut guard = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        match guard.get(fingerprint) {
            Some(entry) if entry.deadline > Instant::now() => {
                Some(entry.passphrase.expose_secret().to_string())
            }
            Some(_) => {
                guard.remove(fingerprint);
                None
            }
            None => None,
        }
    }

    pub fn remove(&self, fingerprint: &Fingerprint) {
        let mut guard = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        guard.remove(fingerprint);
    }

    pub fn clear(&self) {
        let mut guard = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        guard.clear();
    }

    pub fn is_empty(&self) -> bool {
        let guard = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        guard.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fp() -> Fingerprint {
        Fingerprint::parse(&"A".repeat(40)).unwrap()
    }

    #[test]
    fn insert_then_get_returns_passphrase() {
        let cache = PassphraseCache::new(Duration::from_secs(60));
        cache.insert(fp(), SecretString::new("hunter2".to_string()));
        assert_eq!(cache.get(&fp()).as_deref(), Some("hunter2"));
    }

    #[test]
    fn expired_entry_self_prunes_on_access() {
        let cache = PassphraseCache::new(Duration::from_millis(1));
        cache.insert(fp(), SecretString::new("hunter2".to_string()));
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(cache.get(&fp()), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn clear_empties_the_cache() {
        let cache = PassphraseCache::new(Duration::from_secs(60));
        cache.insert(fp(), SecretString::new("hunter2".to_string()));
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn ttl_change_does_not_affect_existing_entries() {
        let cache = PassphraseCache::new(Duration::from_secs(60));
        cache.insert(fp(), SecretString::new("hunter2".to_string()));
        cache.set_ttl(Duration::from_millis(1));
        std::thread::sleep(Duration::from_millis(20));
        // The existing entry kept its original (long) deadline.
        assert_eq!(cache.get(&fp()).as_deref(), Some("hunter2"));
    }
}
