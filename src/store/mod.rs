//! Certificate persistence.
//!
//! The engine talks to storage only through [`CertificateStore`] and the
//! transaction type it hands out. Rows form an arena keyed by id; issuer
//! links are plain id references.

pub mod memory;

pub use memory::MemoryStore;

use bon::Builder;
use time::OffsetDateTime;

use crate::error::CaResult;
use crate::model;

/// One stored certificate with its attribute sets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateRecord {
    pub id: u64,
    pub issuer_id: Option<u64>,
    pub name: String,
    /// Decimal serial number.
    pub serial: String,
    pub ca: bool,
    pub expire_at: OffsetDateTime,
    pub encrypted_key: String,
    pub cert_pem: String,
    pub domains: Vec<String>,
    pub units: Vec<String>,
    pub ips: Vec<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
    pub revoked_at: Option<OffsetDateTime>,
}

impl CertificateRecord {
    /// Placeholder row reserving an id before the certificate is forged.
    pub fn draft(id: u64, issuer_id: Option<u64>, name: &str, now: OffsetDateTime) -> Self {
        Self {
            id,
            issuer_id,
            name: name.to_string(),
            serial: String::new(),
            ca: false,
            expire_at: now,
            encrypted_key: String::new(),
            cert_pem: String::new(),
            domains: Vec::new(),
            units: Vec::new(),
            ips: Vec::new(),
            created_at: now,
            updated_at: now,
            revoked_at: None,
        }
    }

    pub fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }

    pub fn to_view(&self) -> model::Certificate {
        model::Certificate {
            id: self.id,
            issuer: self.issuer_id,
            name: self.name.clone(),
            serial: self.serial.clone(),
            ca: self.ca,
            expire_at: self.expire_at,
            revoked_at: self.revoked_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
            domains: self.domains.clone(),
            units: self.units.clone(),
            ips: self.ips.clone(),
        }
    }
}

/// Which issuer a query is restricted to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum IssuerScope {
    #[default]
    Any,
    /// Self-signed roots only.
    Root,
    /// Direct children of the given certificate.
    Issuer(u64),
}

impl From<Option<u64>> for IssuerScope {
    fn from(issuer: Option<u64>) -> Self {
        match issuer {
            None => IssuerScope::Root,
            Some(id) => IssuerScope::Issuer(id),
        }
    }
}

/// How revoked rows are treated by a query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RevokedScope {
    #[default]
    Exclude,
    Only,
    Include,
}

/// Row selection for [`CertificateStore::list`] and [`CertificateStore::count`].
///
/// The default filter selects every non-revoked row.
#[derive(Debug, Clone, Default, Builder)]
pub struct CertificateFilter {
    #[builder(default)]
    pub issuer: IssuerScope,
    #[builder(default)]
    pub revoked: RevokedScope,
    /// Inclusive upper bound on `expire_at`.
    pub expire_at_or_before: Option<OffsetDateTime>,
    /// Exclusive lower bound on `expire_at`.
    pub expire_after: Option<OffsetDateTime>,
    pub ca: Option<bool>,
}

impl CertificateFilter {
    pub fn matches(&self, record: &CertificateRecord) -> bool {
        let issuer = match self.issuer {
            IssuerScope::Any => true,
            IssuerScope::Root => record.issuer_id.is_none(),
            IssuerScope::Issuer(id) => record.issuer_id == Some(id),
        };
        let revoked = match self.revoked {
            RevokedScope::Exclude => !record.is_revoked(),
            RevokedScope::Only => record.is_revoked(),
            RevokedScope::Include => true,
        };
        issuer
            && revoked
            && self
                .expire_at_or_before
                .is_none_or(|bound| record.expire_at <= bound)
            && self.expire_after.is_none_or(|bound| record.expire_at > bound)
            && self.ca.is_none_or(|ca| record.ca == ca)
    }
}

/// Writes staged until [`StoreTransaction::commit`].
///
/// Dropping a transaction without committing discards its writes.
pub trait StoreTransaction: Send {
    /// Reserves a fresh id with a placeholder row visible only to this
    /// transaction.
    fn insert_draft(
        &mut self,
        issuer_id: Option<u64>,
        name: &str,
    ) -> impl Future<Output = CaResult<u64>> + Send;

    /// Stages the full row, replacing its attribute sets.
    fn save(&mut self, record: CertificateRecord) -> impl Future<Output = CaResult<()>> + Send;

    fn commit(self) -> impl Future<Output = CaResult<()>> + Send;

    fn rollback(self) -> impl Future<Output = CaResult<()>> + Send;
}

pub trait CertificateStore: Send + Sync {
    type Tx: StoreTransaction;

    fn begin(&self) -> impl Future<Output = CaResult<Self::Tx>> + Send;

    /// Non-revoked row with this exact name under this exact issuer
    /// (`None` matches roots only).
    fn find_by_name(
        &self,
        name: &str,
        issuer_id: Option<u64>,
    ) -> impl Future<Output = CaResult<Option<CertificateRecord>>> + Send;

    /// Non-revoked row by id.
    fn get(&self, id: u64) -> impl Future<Output = CaResult<Option<CertificateRecord>>> + Send;

    /// Matching rows ordered by id.
    fn list(
        &self,
        filter: &CertificateFilter,
    ) -> impl Future<Output = CaResult<Vec<CertificateRecord>>> + Send;

    fn count(&self, filter: &CertificateFilter) -> impl Future<Output = CaResult<u64>> + Send;

    /// Sets the tombstone. Unknown or already revoked ids are left alone.
    fn revoke(&self, id: u64, at: OffsetDateTime) -> impl Future<Output = CaResult<()>> + Send;
}
