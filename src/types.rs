//! Data-model types shared across components: the persistent metadata row
//! and the small value types it's built from.

use chrono::{DateTime, Utc};

use crate::fingerprint::Fingerprint;

/// A certificate user-id, decomposed. Either half may be absent — some
/// certificates carry a bare email, or a bare name with no address.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct UserId {
    pub name: Option<String>,
    pub email: Option<String>,
}

impl UserId {
    pub fn matches_query(&self, query_lower: &str) -> bool {
        self.name
            .as_deref()
            .map(|n| n.to_lowercase().contains(query_lower))
            .unwrap_or(false)
            || self
                .email
                .as_deref()
                .map(|e| e.to_lowercase().contains(query_lower))
                .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum TrustLevel {
    Unknown,
    Imported,
    Verified,
}

impl TrustLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrustLevel::Unknown => "unknown",
            TrustLevel::Imported => "imported",
            TrustLevel::Verified => "verified",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "unknown" => Some(TrustLevel::Unknown),
            "imported" => Some(TrustLevel::Imported),
            "verified" => Some(TrustLevel::Verified),
            _ => None,
        }
    }
}

/// The persistent metadata row: one per fingerprint, owned by the
/// `MetadataStore`.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct KeyRecord {
    pub fingerprint: Fingerprint,
    pub primary_user_id: Option<UserId>,
    pub all_user_ids: Vec<UserId>,
    pub algorithm_label: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub trust_level: TrustLevel,
    /// True iff a matching `WrappedSecret` exists in the `CredentialStore`.
    /// Kept in agreement with that fact by `KeyringService`'s startup
    /// repair; never set true anywhere else without a secret being stored
    /// first.
    pub is_own_key: bool,
    pub certificate_bytes: Vec<u8>,
    /// Revocation certificate produced alongside the key at generation time,
    /// if any. Absent for imported keys unless the import itself carried one
    /// forward from an existing own-key row.
    pub revocation_cert: Option<Vec<u8>>,
    pub added_at: DateTime<Utc>,
}
