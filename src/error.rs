//! Crate-wide error kinds.
//!
//! Every public operation returns one of these variants rather than a raw
//! string from `sequoia_openpgp`, `rusqlite`, or `keyring`. Variants never
//! carry secret bytes (passphrases, key material, plaintext) in their
//! `Display` output; underlying library errors are attached only via
//! `#[source]` for diagnostics.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum KeyringError {
    #[error("identifier is not a valid fingerprint")]
    InvalidIdentifier,

    #[error("no record for the given fingerprint")]
    NotFound,

    #[error("a record for this identifier already exists")]
    Duplicate,

    #[error("certificate could not be parsed")]
    MalformedCertificate(#[source] Option<anyhow::Error>),

    #[error("ciphertext could not be parsed")]
    MalformedCiphertext,

    #[error("integrity check failed; data has been tampered with")]
    Tampered,

    #[error("a passphrase is required to use this key")]
    PassphraseRequired,

    #[error("the supplied passphrase is incorrect")]
    BadPassphrase,

    #[error("none of the candidate keys could decrypt this message")]
    WrongKey,

    #[error("recipient certificate has no usable encryption subkey")]
    RecipientUnusable,

    #[error("no recipients were supplied")]
    NoRecipients,

    #[error("the session wrapping key is no longer available")]
    SessionLost,

    #[error("the credential backend is unavailable")]
    BackendUnavailable(#[source] Option<anyhow::Error>),

    #[error("bundle parts disagree about the total part count")]
    InconsistentBundle,

    #[error("bundle is missing parts")]
    TruncatedBundle,

    #[error("bundle framing is corrupt")]
    CorruptFraming,

    #[error("bundle envelope version is not supported")]
    UnsupportedVersion,

    #[error("capacity exceeded")]
    CapacityExceeded,

    #[error("operation was cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, KeyringError>;

impl From<sequoia_openpgp::Error> for KeyringError {
    fn from(e: sequoia_openpgp::Error) -> Self {
        KeyringError::MalformedCertificate(Some(anyhow::Error::new(e)))
    }
}

impl From<rusqlite::Error> for KeyringError {
    fn from(e: rusqlite::Error) -> Self {
        KeyringError::BackendUnavailable(Some(anyhow::Error::new(e)))
    }
}

impl From<keyring::Error> for KeyringError {
    fn from(e: keyring::Error) -> Self {
        KeyringError::BackendUnavailable(Some(anyhow::Error::new(e)))
    }
}

impl From<std::io::Error> for KeyringError {
    fn from(e: std::io::Error) -> Self {
        KeyringError::BackendUnavailable(Some(anyhow::Error::new(e)))
    }
}
