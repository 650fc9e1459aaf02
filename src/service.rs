//! KeyringService: the orchestration layer implementing the public command
//! surface. Calls into `MetadataStore` for public data, `CredentialStore` +
//! `SecretProtector` for secret access, and `crypto` for all cryptography.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use chrono::Utc;

use crate::config::CoreConfig;
use crate::crypto::{self, SignerInfo, VerifyResult};
use crate::error::{KeyringError, Result};
use crate::fingerprint::Fingerprint;
use crate::metadata::{self, MetadataStore};
use crate::passphrase_cache::PassphraseCache;
use crate::secret::SecretProtector;
use crate::store::{self, CredentialStore};
use crate::types::{KeyRecord, TrustLevel};

/// A narrow, optional network boundary. The core ships no implementation
/// and never calls it unless the caller supplies one to `import_from`.
pub trait CertSource: Send + Sync {
    fn fetch(&self, query: &str) -> std::result::Result<Vec<u8>, KeyringError>;
}

pub struct KeyringService {
    config: CoreConfig,
    protector: SecretProtector,
    credential_store: Mutex<Box<dyn CredentialStore>>,
    metadata_store: Mutex<Box<dyn MetadataStore>>,
    passphrase_cache: PassphraseCache,
    opsec: AtomicBool,
}

impl KeyringService {
    pub fn new(config: CoreConfig) -> Result<Self> {
        let credential_store = store::open(&config)?;
        let metadata_store = metadata::open(&config)?;
        let opsec = AtomicBool::new(config.opsec);
        let passphrase_cache = PassphraseCache::new(config.passphrase_cache_ttl);

        let service = KeyringService {
            opsec,
            protector: SecretProtector::new(),
            credential_store: Mutex::new(credential_store),
            metadata_store: Mutex::new(metadata_store),
            passphrase_cache,
            config,
        };
        service.repair()?;
        Ok(service)
    }

    pub fn is_opsec(&self) -> bool {
        self.opsec.load(Ordering::Acquire)
    }

    /// Enumerates MetadataStore and CredentialStore and reconciles drift:
    /// own-key rows with no backing WrappedSecret are downgraded; orphan
    /// WrappedSecrets with no metadata row are deleted.
    ///
    /// The downgrade check is a targeted `cred.get()` per own-key row, not
    /// membership in `list_fingerprints()`: backends such as the OS vault
    /// have no enumeration API and always return an empty set there, which
    /// would otherwise downgrade every own-key on every startup.
    fn repair(&self) -> Result<()> {
        let cred = self.credential_store.lock().unwrap_or_else(|p| p.into_inner());
        let meta = self.metadata_store.lock().unwrap_or_else(|p| p.into_inner());

        for mut record in meta.list()? {
            if record.is_own_key && cred.get(&record.fingerprint)?.is_none() {
                tracing::warn!("own-key metadata row has no backing secret; downgrading is_own_key");
                tracing::debug!(fingerprint = %record.fingerprint, "downgrading is_own_key");
                record.is_own_key = false;
                meta.upsert(record)?;
            }
        }

        // Orphan cleanup still relies on enumeration and is a no-op on
        // backends that can't provide it; that only means a stale secret
        // outlives its metadata row, never the reverse.
        let meta_fps: HashSet<Fingerprint> =
            meta.list()?.into_iter().map(|r| r.fingerprint).collect();
        for fp in cred.list_fingerprints()? {
            if !meta_fps.contains(&fp) {
                tracing::warn!("orphan wrapped secret with no metadata row; deleting");
                tracing::debug!(fingerprint = %fp, "deleting orphan wrapped secret");
                cred.delete(&fp)?;
            }
        }
        Ok(())
    }

    pub fn generate(
        &self,
        name: &str,
        email: &str,
        passphrase: Option<&str>,
    ) -> Result<KeyRecord> {
        let generated = crypto::generate_keypair(name, email, passphrase)?;
        let wrapped = self
            .protector
            .wrap(&generated.fingerprint, &generated.secret_material)?;

        let cred = self.credential_store.lock().unwrap_or_else(|p| p.into_inner());
        cred.put(&generated.fingerprint, wrapped)?;

        let cert = match crypto::parse_cert(&generated.certificate_bytes) {
            Ok(c) => c,
            Err(e) => {
                let _ = cred.delete(&generated.fingerprint);
                return Err(e);
            }
        };
        let info = match crypto::inspect(&cert) {
            Ok(i) => i,
            Err(e) => {
                let _ = cred.delete(&generated.fingerprint);
                return Err(e);
            }
        };

        let now = Utc::now();
        let record = KeyRecord {
            fingerprint: generated.fingerprint.clone(),
            primary_user_id: info.user_ids.first().cloned(),
            all_user_ids: info.user_ids,
            algorithm_label: info.algorithm,
            created_at: info.created_at,
            expires_at: info.expires_at,
            trust_level: TrustLevel::Verified,
            is_own_key: true,
            certificate_bytes: generated.certificate_bytes,
            revocation_cert: Some(generated.revocation_cert),
            added_at: now,
        };

        let meta = self.metadata_store.lock().unwrap_or_else(|p| p.into_inner());
        if let Err(e) = meta.upsert(record.clone()) {
            let _ = cred.delete(&generated.fingerprint);
            return Err(e);
        }
        Ok(record)
    }

    /// Re-importing a known fingerprint merges: union of user-ids, max of
    /// expiration, upgrade-only `is_own_key`.
    pub fn import(&self, blob: &[u8]) -> Result<KeyRecord> {
        let cert = crypto::parse_cert(blob)?;
        let info = crypto::inspect(&cert)?;

        let meta = self.metadata_store.lock().unwrap_or_else(|p| p.into_inner());
        let existing = meta.get(&info.fingerprint)?;

        let mut all_user_ids = info.user_ids.clone();
        if let Some(existing) = &existing {
            for uid in &existing.all_user_ids {
                if !all_user_ids.contains(uid) {
                    all_user_ids.push(uid.clone());
                }
            }
        }
        let expires_at = match (existing.as_ref().and_then(|e| e.expires_at), info.expires_at) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };

        let mut is_own_key = existing.as_ref().map(|e| e.is_own_key).unwrap_or(false);
        if info.has_secret_key {
            let cred = self.credential_store.lock().unwrap_or_else(|p| p.into_inner());
            let wrapped = self.protector.wrap(&info.fingerprint, blob)?;
            cred.put(&info.fingerprint, wrapped)?;
            is_own_key = true;
        }

        let certificate_bytes = if info.has_secret_key {
            crypto::export_public(&cert)?
        } else {
            blob.to_vec()
        };

        let revocation_cert = existing.as_ref().and_then(|e| e.revocation_cert.clone());

        let record = KeyRecord {
            fingerprint: info.fingerprint.clone(),
            primary_user_id: all_user_ids.first().cloned(),
            all_user_ids,
            algorithm_label: info.algorithm,
            created_at: existing.as_ref().map(|e| e.created_at).unwrap_or(info.created_at),
            expires_at,
            trust_level: existing
                .as_ref()
                .map(|e| e.trust_level)
                .unwrap_or(TrustLevel::Imported),
            is_own_key,
            certificate_bytes,
            revocation_cert,
            added_at: existing.map(|e| e.added_at).unwrap_or_else(Utc::now),
        };
        meta.upsert(record.clone())?;
        Ok(record)
    }

    /// Fetches a certificate blob through a caller-supplied `CertSource`
    /// (keyserver/WKD lookup lives entirely outside this crate) and imports it.
    pub fn import_from(&self, query: &str, source: &dyn CertSource) -> Result<KeyRecord> {
        let blob = source.fetch(query)?;
        self.import(&blob)
    }

    /// Exporting a secret requires an explicit boolean at call time, never
    /// derived from context.
    pub fn export(&self, fingerprint: &Fingerprint, include_secret: bool) -> Result<Vec<u8>> {
        let meta = self.metadata_store.lock().unwrap_or_else(|p| p.into_inner());
        let record = meta.get(fingerprint)?.ok_or(KeyringError::NotFound)?;

        if !include_secret {
            return Ok(record.certificate_bytes);
        }

        let cred = self.credential_store.lock().unwrap_or_else(|p| p.into_inner());
        let wrapped = cred.get(fingerprint)?.ok_or(KeyringError::NotFound)?;
        let secret_buf = self.protector.unwrap(&wrapped)?;
        Ok(secret_buf.to_vec())
    }

    /// Enumerates candidate own-keys, unwraps one at a time, calls into
    /// `crypto::decrypt`. Tie-break: insertion order, first success wins.
    pub fn decrypt(
        &self,
        armored: &[u8],
        passphrase: Option<&str>,
    ) -> Result<(Vec<u8>, Vec<SignerInfo>)> {
        let own_keys: Vec<KeyRecord> = {
            let meta = self.metadata_store.lock().unwrap_or_else(|p| p.into_inner());
            meta.list()?.into_iter().filter(|r| r.is_own_key).collect()
        };

        let mut last_err = KeyringError::WrongKey;
        for record in &own_keys {
            let wrapped = {
                let cred = self.credential_store.lock().unwrap_or_else(|p| p.into_inner());
                cred.get(&record.fingerprint)?
            };
            let Some(wrapped) = wrapped else { continue };

            let secret_buf = match self.protector.unwrap(&wrapped) {
                Ok(buf) => buf,
                Err(e) => {
                    last_err = e;
                    continue;
                }
            };
            let tsk = match crypto::parse_cert(&secret_buf) {
                Ok(c) => c,
                Err(_) => continue,
            };

            let candidate_pw = passphrase
                .map(|s| s.to_string())
                .or_else(|| self.passphrase_cache.get(&record.fingerprint));

            match crypto::decrypt(armored, &tsk, candidate_pw.as_deref()) {
                Ok(result) => return Ok(result),
                Err(KeyringError::PassphraseRequired) if candidate_pw.is_none() => {
                    last_err = KeyringError::PassphraseRequired;
                }
                Err(e) => last_err = e,
            }
            // `secret_buf` drops here, zeroizing before the next candidate.
        }
        Err(last_err)
    }

    /// Single active signing identity: if more than one own-key exists the
    /// caller must name which one via `signing_fingerprint`.
    pub fn sign(
        &self,
        data: &[u8],
        signing_fingerprint: Option<&Fingerprint>,
        passphrase: Option<&str>,
    ) -> Result<Vec<u8>> {
        let own_keys: Vec<KeyRecord> = {
            let meta = self.metadata_store.lock().unwrap_or_else(|p| p.into_inner());
            meta.list()?.into_iter().filter(|r| r.is_own_key).collect()
        };

        let record = match signing_fingerprint {
            Some(fp) => own_keys
                .into_iter()
                .find(|r| &r.fingerprint == fp)
                .ok_or(KeyringError::NotFound)?,
            None => match own_keys.len() {
                0 => return Err(KeyringError::NotFound),
                1 => own_keys.into_iter().next().unwrap(),
                _ => return Err(KeyringError::InvalidIdentifier),
            },
        };

        let wrapped = {
            let cred = self.credential_store.lock().unwrap_or_else(|p| p.into_inner());
            cred.get(&record.fingerprint)?.ok_or(KeyringError::NotFound)?
        };
        let secret_buf = self.protector.unwrap(&wrapped)?;
        let tsk = crypto::parse_cert(&secret_buf)?;

        let candidate_pw = passphrase
            .map(|s| s.to_string())
            .or_else(|| self.passphrase_cache.get(&record.fingerprint));
        crypto::sign(data, &tsk, candidate_pw.as_deref())
    }

    /// Passes the full known-certificate set as verification candidates;
    /// the returned fingerprint is cross-referenced against the
    /// MetadataStore to attach a trust label.
    pub fn verify(&self, armored: &[u8]) -> Result<(VerifyResult, Option<TrustLevel>)> {
        let records = {
            let meta = self.metadata_store.lock().unwrap_or_else(|p| p.into_inner());
            meta.list()?
        };
        let certs: Vec<_> = records
            .iter()
            .filter_map(|r| crypto::parse_cert(&r.certificate_bytes).ok())
            .collect();
        let result = crypto::verify(armored, &certs)?;
        let trust = result
            .signer_fingerprint
            .as_ref()
            .and_then(|fp| records.iter().find(|r| &r.fingerprint == fp))
            .map(|r| r.trust_level);
        Ok((result, trust))
    }

    pub fn set_trust(&self, fingerprint: &Fingerprint, level: TrustLevel) -> Result<()> {
        let meta = self.metadata_store.lock().unwrap_or_else(|p| p.into_inner());
        meta.set_trust(fingerprint, level)
    }

    /// Order: passphrase cache entry, then secret material, then metadata
    /// row. Idempotent on repeat.
    pub fn delete(&self, fingerprint: &Fingerprint) -> Result<()> {
        self.passphrase_cache.remove(fingerprint);
        {
            let cred = self.credential_store.lock().unwrap_or_else(|p| p.into_inner());
            cred.delete(fingerprint)?;
        }
        {
            let meta = self.metadata_store.lock().unwrap_or_else(|p| p.into_inner());
            meta.delete(fingerprint)?;
        }
        Ok(())
    }

    pub fn get_key(&self, fingerprint: &Fingerprint) -> Result<Option<KeyRecord>> {
        let meta = self.metadata_store.lock().unwrap_or_else(|p| p.into_inner());
        meta.get(fingerprint)
    }

    pub fn list_keys(&self) -> Result<Vec<KeyRecord>> {
        let meta = self.metadata_store.lock().unwrap_or_else(|p| p.into_inner());
        meta.list()
    }

    pub fn search_keys(&self, query: &str) -> Result<Vec<KeyRecord>> {
        let meta = self.metadata_store.lock().unwrap_or_else(|p| p.into_inner());
        meta.search(query)
    }

    pub fn inspect_key(&self, fingerprint: &Fingerprint) -> Result<crypto::CertInfo> {
        let meta = self.metadata_store.lock().unwrap_or_else(|p| p.into_inner());
        let record = meta.get(fingerprint)?.ok_or(KeyringError::NotFound)?;
        let cert = crypto::parse_cert(&record.certificate_bytes)?;
        crypto::inspect(&cert)
    }

    pub fn clear_passphrase_cache(&self) {
        self.passphrase_cache.clear();
    }

    pub fn cache_passphrase(&self, fingerprint: Fingerprint, passphrase: secrecy::SecretString) {
        self.passphrase_cache.insert(fingerprint, passphrase);
    }

    /// Swaps both stores to in-memory backends. Acquire/release ordering on
    /// the flag guarantees concurrent commands observe the switch before
    /// they perform any write.
    pub fn enable_opsec(&self) -> Result<()> {
        self.opsec.store(true, Ordering::Release);
        let mut cred = self.credential_store.lock().unwrap_or_else(|p| p.into_inner());
        *cred = Box::new(store::MemoryCredentialStore::new());
        let mut meta = self.metadata_store.lock().unwrap_or_else(|p| p.into_inner());
        *meta = Box::new(metadata::MemoryMetadataStore::new());
        tracing::debug!("opsec enabled");
        Ok(())
    }

    /// Returns to the configured persistent backends. Existing in-memory
    /// state from the OPSEC window is discarded, not migrated.
    pub fn disable_opsec(&self) -> Result<()> {
        let cred_store = store::open_non_opsec(&self.config)?;
        let meta_store = metadata::open_non_opsec(&self.config)?;
        let mut cred = self.credential_store.lock().unwrap_or_else(|p| p.into_inner());
        *cred = cred_store;
        let mut meta = self.metadata_store.lock().unwrap_or_else(|p| p.into_inner());
        *meta = meta_store;
        self.opsec.store(false, Ordering::Release);
        tracing::debug!("opsec disabled");
        Ok(())
    }

    /// Wipes the session wrapping key, clears the passphrase cache, and
    /// discards all in-session state. Subsequent decrypt/sign attempts
    /// observe `SessionLost` or `NotFound`; the keyring reads empty.
    pub fn panic_wipe(&self) {
        self.protector.wipe();
        self.passphrase_cache.clear();
        self.opsec.store(true, Ordering::Release);
        let mut cred = self.credential_store.lock().unwrap_or_else(|p| p.into_inner());
        *cred = Box::new(store::MemoryCredentialStore::new());
        let mut meta = self.metadata_store.lock().unwrap_or_else(|p| p.into_inner());
        *meta = Box::new(metadata::MemoryMetadataStore::new());
        tracing::warn!("panic wipe executed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> (KeyringService, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let config = CoreConfig::ephemeral(dir.path());
        (KeyringService::new(config).unwrap(), dir)
    }

    #[test]
    fn s1_generate_encrypt_decrypt_round_trip() {
        let (service, _dir) = service();
        let record = service.generate("Alice", "alice@example.com", None).unwrap();
        let ciphertext = service.export(&record.fingerprint, false).unwrap();
        let cert = crypto::parse_cert(&ciphertext).unwrap();
        let armored = crypto::encrypt(b"hello", &[cert], false).unwrap();

        let (plaintext, signers) = service.decrypt(&armored, None).unwrap();
        assert_eq!(plaintext, b"hello");
        assert!(signers.is_empty());
    }

    #[test]
    fn s2_passphrase_path() {
        let (service, _dir) = service();
        let record = service
            .generate("Carol", "carol@example.com", Some("pw-123"))
            .unwrap();
        let public = service.export(&record.fingerprint, false).unwrap();
        let cert = crypto::parse_cert(&public).unwrap();
        let armored = crypto::encrypt(b"top secret", &[cert], false).unwrap();

        let err = service.decrypt(&armored, None).unwrap_err();
        assert!(matches!(err, KeyringError::PassphraseRequired));

        let err = service.decrypt(&armored, Some("wrong")).unwrap_err();
        assert!(matches!(err, KeyringError::BadPassphrase));

        let (plaintext, _) = service.decrypt(&armored, Some("pw-123")).unwrap();
        assert_eq!(plaintext, b"top secret");
    }

    #[test]
    fn s3_delete_cascades() {
        let (service, _dir) = service();
        let record = service.generate("Dana", "dana@example.com", None).unwrap();
        service.cache_passphrase(record.fingerprint.clone(), secrecy::SecretString::new("x".into()));

        service.delete(&record.fingerprint).unwrap();

        assert!(service
            .list_keys()
            .unwrap()
            .iter()
            .all(|r| r.fingerprint != record.fingerprint));
        assert!(service.get_key(&record.fingerprint).unwrap().is_none());
        assert!(service.passphrase_cache.get(&record.fingerprint).is_none());
    }

    #[test]
    fn repair_downgrades_own_key_when_secret_missing() {
        let (service, _dir) = service();
        let record = service.generate("Erin", "erin@example.com", None).unwrap();
        {
            let cred = service.credential_store.lock().unwrap();
            cred.delete(&record.fingerprint).unwrap();
        }
        service.repair().unwrap();
        let fetched = service.get_key(&record.fingerprint).unwrap().unwrap();
        assert!(!fetched.is_own_key);
    }

    /// Stands in for a backend with no enumeration API (like the OS vault):
    /// `get`/`put`/`delete` work normally but `list_fingerprints` always
    /// returns empty. `repair()` must not mistake that for "no secret".
    struct BlindCredentialStore(store::MemoryCredentialStore);

    impl CredentialStore for BlindCredentialStore {
        fn put(&self, fingerprint: &Fingerprint, secret: crate::secret::WrappedSecret) -> Result<()> {
            self.0.put(fingerprint, secret)
        }
        fn get(&self, fingerprint: &Fingerprint) -> Result<Option<crate::secret::WrappedSecret>> {
            self.0.get(fingerprint)
        }
        fn delete(&self, fingerprint: &Fingerprint) -> Result<()> {
            self.0.delete(fingerprint)
        }
        fn list_fingerprints(&self) -> Result<std::collections::BTreeSet<Fingerprint>> {
            Ok(std::collections::BTreeSet::new())
        }
    }

    #[test]
    fn repair_does_not_downgrade_when_backend_cannot_enumerate() {
        let (service, _dir) = service();
        let record = service.generate("Gabe", "gabe@example.com", None).unwrap();
        {
            let mut cred = service.credential_store.lock().unwrap();
            let blind = BlindCredentialStore(store::MemoryCredentialStore::new());
            let wrapped = cred.get(&record.fingerprint).unwrap().unwrap();
            blind.put(&record.fingerprint, wrapped).unwrap();
            *cred = Box::new(blind);
        }
        service.repair().unwrap();
        let fetched = service.get_key(&record.fingerprint).unwrap().unwrap();
        assert!(fetched.is_own_key);
    }

    #[test]
    fn panic_wipe_empties_keyring_and_loses_session() {
        let (service, _dir) = service();
        let record = service.generate("Frank", "frank@example.com", None).unwrap();
        service.panic_wipe();
        assert!(service.list_keys().unwrap().is_empty());
        assert!(service.get_key(&record.fingerprint).unwrap().is_none());
        assert!(service.passphrase_cache.is_empty());
    }
}
