//! Validated fingerprint identifiers.
//!
//! A [`Fingerprint`] is the only type allowed to reach a storage backend's
//! path or index composition. Constructing one validates the `[0-9A-F]+`
//! shape (40 or 64 hex chars) up front, so an unvalidated string can never
//! cross into path composition (`CredentialStore::put`, the File backend's
//! `{secrets_dir}/{fingerprint}.key`, etc).

use crate::error::{KeyringError, Result};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn parse(raw: &str) -> Result<Self> {
        let upper = raw.to_ascii_uppercase();
        let valid_len = upper.len() == 40 || upper.len() == 64;
        let valid_chars = !upper.is_empty() && upper.bytes().all(|b| b.is_ascii_hexdigit());
        if valid_len && valid_chars {
            Ok(Fingerprint(upper))
        } else {
            Err(KeyringError::InvalidIdentifier)
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Case-insensitive suffix match, used by `MetadataStore::search`.
    pub fn ends_with_ignore_case(&self, suffix: &str) -> bool {
        self.0.to_ascii_uppercase().ends_with(&suffix.to_ascii_uppercase())
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<sequoia_openpgp::Fingerprint> for Fingerprint {
    type Error = KeyringError;

    fn try_from(fp: sequoia_openpgp::Fingerprint) -> Result<Self> {
        Fingerprint::parse(&fp.to_hex())
    }
}
