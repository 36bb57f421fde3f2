//! Plain data exchanged with engine callers.
//!
//! Every type serializes with snake_case field names so an API layer can
//! marshal it without an intermediate representation.

use bon::Builder;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Request to create one certificate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Builder)]
#[serde(default)]
pub struct Subject {
    #[builder(into)]
    pub name: String,
    /// Validity in days; zero yields a certificate that is already expired.
    #[builder(default)]
    pub days: u32,
    #[builder(default)]
    pub ca: bool,
    /// Issuing certificate; absent means a self-signed root.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issuer: Option<u64>,
    #[builder(default)]
    pub domains: Vec<String>,
    #[builder(default)]
    pub units: Vec<String>,
    #[builder(default)]
    pub ips: Vec<String>,
}

/// New validity and attribute sets for an existing certificate.
///
/// The sets replace the certificate's current ones; an omitted set is empty,
/// so the domains fall back to the name and units and addresses are cleared.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Builder)]
#[serde(default)]
pub struct Renewal {
    #[builder(default)]
    pub days: u32,
    #[builder(default)]
    pub domains: Vec<String>,
    #[builder(default)]
    pub units: Vec<String>,
    #[builder(default)]
    pub ips: Vec<String>,
}

/// A certificate with the certificates it issues, as read by the importer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Batch {
    pub certificate: Subject,
    pub nested: Vec<Batch>,
}

/// Public view of a stored certificate. Key material is never included.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Certificate {
    pub id: u64,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub issuer: Option<u64>,
    pub name: String,
    pub serial: String,
    pub ca: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub expire_at: OffsetDateTime,
    #[serde(
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none",
        default
    )]
    pub revoked_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    pub domains: Vec<String>,
    pub units: Vec<String>,
    pub ips: Vec<String>,
}

impl Certificate {
    pub fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }

    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        self.expire_at <= now
    }
}

/// Aggregated counters over the whole store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    /// Every certificate, revoked included.
    pub total: u64,
    pub expired: u64,
    pub soon_expire: u64,
    pub ca: u64,
    pub revoked: u64,
}
