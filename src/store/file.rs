use std::collections::BTreeSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use super::CredentialStore;
use crate::error::{KeyringError, Result};
use crate::fingerprint::Fingerprint;
use crate::secret::WrappedSecret;

/// Fallback backend: one file per fingerprint under `secrets_dir`, written
/// atomically via a temp file + rename.
pub struct FileCredentialStore {
    secrets_dir: PathBuf,
}

fn record_path(secrets_dir: &Path, fingerprint: &Fingerprint) -> PathBuf {
    // `fingerprint` is already hex-validated at construction (see
    // `Fingerprint::parse`), so this can never escape `secrets_dir`.
    secrets_dir.join(format!("{}.key", fingerprint.as_str()))
}

impl FileCredentialStore {
    pub fn new(secrets_dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&secrets_dir)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = fs::metadata(&secrets_dir)?.permissions();
            perms.set_mode(0o700);
            fs::set_permissions(&secrets_dir, perms)?;
        }
        Ok(FileCredentialStore { secrets_dir })
    }

    fn write_atomic(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        let tmp_path = path.with_extension("key.tmp");
        {
            let mut tmp = fs::File::create(&tmp_path)?;
            tmp.write_all(bytes)?;
            tmp.sync_all()?;
        }
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = fs::metadata(&tmp_path)?.permissions();
            perms.set_mode(0o600);
            fs::set_permissions(&tmp_path, perms)?;
        }
        fs::rename(&tmp_path, path)?;
        Ok(())
    }
}

impl CredentialStore for FileCredentialStore {
    fn put(&self, fingerprint: &Fingerprint, secret: WrappedSecret) -> Result<()> {
        let path = record_path(&self.secrets_dir, fingerprint);
        let bytes = serde_json::to_vec(&secret)
            .map_err(|e| KeyringError::BackendUnavailable(Some(anyhow::Error::new(e))))?;
        self.write_atomic(&path, &bytes)
    }

    fn get(&self, fingerprint: &Fingerprint) -> Result<Option<WrappedSecret>> {
        let path = record_path(&self.secrets_dir, fingerprint);
        match fs::read(&path) {
            Ok(bytes) => {
                let secret = serde_json::from_slice(&bytes)
                    .map_err(|e| KeyringError::BackendUnavailable(Some(anyhow::Error::new(e))))?;
                Ok(Some(secret))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn delete(&self, fingerprint: &Fingerprint) -> Result<()> {
        let path = record_path(&self.secrets_dir, fingerprint);
        // Best-effort zero-overwrite before unlinking. Flash-translation
        // layers may remap writes elsewhere, so this is a caveat, not a
        // guarantee.
        if let Ok(meta) = fs::metadata(&path) {
            if let Ok(mut f) = fs::OpenOptions::new().write(true).open(&path) {
                let zeros = vec![0u8; meta.len() as usize];
                let _ = f.write_all(&zeros);
                let _ = f.sync_all();
            }
        }
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn list_fingerprints(&self) -> Result<BTreeSet<Fingerprint>> {
        let mut out = BTreeSet::new();
        let entries = match fs::read_dir(&self.secrets_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(out),
            Err(e) => return Err(e.into()),
        };
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if let Some(stem) = name.strip_suffix(".key") {
                if let Ok(fp) = Fingerprint::parse(stem) {
                    out.insert(fp);
                }
            }
        }
        Ok(out)
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
            ciphertext: vec![9, 9, 9],
            nonce: [1u8; 12],
            fingerprint: fp.clone(),
        }
    }

    #[test]
    fn round_trip_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::new(dir.path().join("secrets")).unwrap();
        let fp = fp('C');
        store.put(&fp, wrapped(&fp)).unwrap();
        assert!(store.get(&fp).unwrap().is_some());
        assert!(store.list_fingerprints().unwrap().contains(&fp));

        store.delete(&fp).unwrap();
        assert!(store.get(&fp).unwrap().is_none());
        // idempotent
        store.delete(&fp).unwrap();
    }

    #[test]
    fn file_mode_is_owner_only_on_unix() {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let dir = tempfile::tempdir().unwrap();
            let store = FileCredentialStore::new(dir.path().join("secrets")).unwrap();
            let fp = fp('D');
            store.put(&fp, wrapped(&fp)).unwrap();
            let path = dir.path().join("secrets").join(format!("{}.key", fp.as_str()));
            let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
            assert_eq!(mode, 0o600);
        }
    }
}
