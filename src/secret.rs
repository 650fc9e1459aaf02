//! SecretProtector: wraps/unwraps secret key bytes with a session-scoped
//! wrapping key, and the zeroizing containers that carry secret bytes
//! through the rest of the crate.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};
use std::ops::Deref;
use std::sync::Mutex;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{KeyringError, Result};
use crate::fingerprint::Fingerprint;

/// A secret byte buffer that zeroizes its backing storage on every exit
/// path (normal return, early return, panic unwinding).
#[derive(ZeroizeOnDrop)]
pub struct SecretBuffer(Vec<u8>);

impl SecretBuffer {
    pub fn new(bytes: Vec<u8>) -> Self {
        SecretBuffer(bytes)
    }
}

impl Deref for SecretBuffer {
    type Target = [u8];
    fn deref(&self) -> &[u8] {
        &self.0
    }
}

// Manual Debug: never print secret bytes.
impl std::fmt::Debug for SecretBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SecretBuffer(<redacted, {} bytes>)", self.0.len())
    }
}

/// Secret material encrypted under the session wrapping key, as stored at
/// rest by a `CredentialStore` backend.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct WrappedSecret {
    pub ciphertext: Vec<u8>,
    pub nonce: [u8; 12],
    pub fingerprint: Fingerprint,
}

/// Ephemeral, session-scoped symmetric key protecting at-rest secrets.
///
/// Generated once per session; never serialized. The raw key bytes never
/// leave this module — there is no accessor — which is the portable stand-in
/// for a hardware "non-extractable" flag where the platform has none.
struct SessionWrappingKey(Option<[u8; 32]>);

impl Drop for SessionWrappingKey {
    fn drop(&mut self) {
        if let Some(mut key) = self.0.take() {
            key.zeroize();
        }
    }
}

impl SessionWrappingKey {
    fn generate() -> Self {
        let key = Aes256Gcm::generate_key(&mut OsRng);
        SessionWrappingKey(Some(key.into()))
    }

    fn cipher(&self) -> Result<Aes256Gcm> {
        match &self.0 {
            Some(key) => Ok(Aes256Gcm::new_from_slice(key).expect("key is exactly 32 bytes")),
            None => Err(KeyringError::SessionLost),
        }
    }

    fn wipe(&mut self) {
        if let Some(mut key) = self.0.take() {
            key.zeroize();
        }
    }
}

/// Owns the session wrapping key and mediates every wrap/unwrap of secret
/// material. Guarded by a mutex so it is safe to share across threads
/// (poison-recovered: a prior panic must never leave secrets unreleased).
pub struct SecretProtector {
    key: Mutex<SessionWrappingKey>,
}

impl SecretProtector {
    pub fn new() -> Self {
        SecretProtector {
            key: Mutex::new(SessionWrappingKey::generate()),
        }
    }

    /// Encrypts `secret_bytes` under the session wrapping key with a fresh
    /// random 96-bit nonce. Nonce reuse under the same key is a hard
    /// failure; a fresh nonce is drawn from `OsRng` on every call.
    pub fn wrap(&self, fingerprint: &Fingerprint, secret_bytes: &[u8]) -> Result<WrappedSecret> {
        let guard = self.key.lock().unwrap_or_else(|p| p.into_inner());
        let cipher = guard.cipher()?;
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = cipher
            .encrypt(&nonce, secret_bytes)
            .map_err(|_| KeyringError::SessionLost)?;
        Ok(WrappedSecret {
            ciphertext,
            nonce: nonce.into(),
            fingerprint: fingerprint.clone(),
        })
    }

    /// Decrypts a `WrappedSecret`. Any failure — wrapping key rotated away,
    /// nonce/ciphertext tampered — returns `SessionLost`, never a panic.
    pub fn unwrap(&self, wrapped: &WrappedSecret) -> Result<SecretBuffer> {
        let guard = self.key.lock().unwrap_or_else(|p| p.into_inner());
        let cipher = guard.cipher()?;
        let nonce = Nonce::from_slice(&wrapped.nonce);
        let plaintext = cipher
            .decrypt(nonce, wrapped.ciphertext.as_ref())
            .map_err(|_| KeyringError::SessionLost)?;
        Ok(SecretBuffer::new(plaintext))
    }

    /// Replaces the session wrapping key with zeros. Every existing
    /// `WrappedSecret` becomes permanently un-unwrappable. Called on
    /// OPSEC panic-wipe and on normal session teardown.
    pub fn wipe(&self) {
        let mut guard = self.key.lock().unwrap_or_else(|p| p.into_inner());
        guard.wipe();
    }
}

impl Default for SecretProtector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fp() -> Fingerprint {
        Fingerprint::parse(&"A".repeat(40)).unwrap()
    }

    #[test]
    fn round_trip_preserves_bytes() {
        let protector = SecretProtector::new();
        let secret = b"top secret key material".to_vec();
        let wrapped = protector.wrap(&fp(), &secret).unwrap();
        let unwrapped = protector.unwrap(&wrapped).unwrap();
        assert_eq!(&*unwrapped, secret.as_slice());
    }

    #[test]
    fn wipe_makes_existing_wrapped_secrets_unrecoverable() {
        let protector = SecretProtector::new();
        let wrapped = protector.wrap(&fp(), b"secret").unwrap();
        protector.wipe();
        let err = protector.unwrap(&wrapped).unwrap_err();
        assert!(matches!(err, KeyringError::SessionLost));
    }

    #[test]
    fn fresh_sessions_cannot_unwrap_each_others_secrets() {
        let a = SecretProtector::new();
        let b = SecretProtector::new();
        let wrapped = a.wrap(&fp(), b"secret").unwrap();
        assert!(matches!(b.unwrap(&wrapped), Err(KeyringError::SessionLost)));
    }

    #[test]
    fn nonces_are_not_reused_across_wraps() {
        let protector = SecretProtector::new();
        let a = protector.wrap(&fp(), b"same-plaintext").unwrap();
        let b = protector.wrap(&fp(), b"same-plaintext").unwrap();
        assert_ne!(a.nonce, b.nonce);
    }
}
