//! Keyring Core: OpenPGP key generation, encryption, storage, and
//! multi-key transfer bundling, for a clipboard-first desktop application.
//! No network, no UI, no shell — those are the caller's concern.

pub mod bundle;
pub mod config;
pub mod crypto;
pub mod error;
pub mod fingerprint;
pub mod metadata;
pub mod passphrase_cache;
pub mod secret;
pub mod service;
pub mod store;
pub mod types;

pub use config::{CoreConfig, CredentialBackendPreference};
pub use error::{KeyringError, Result};
pub use fingerprint::Fingerprint;
pub use service::{CertSource, KeyringService};
pub use types::{KeyRecord, TrustLevel, UserId};
