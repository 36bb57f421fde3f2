//! CA engine: certificate lifecycle on top of a [`CertificateStore`].
//!
//! Every operation takes a [`CancellationToken`]. Store calls and the forge
//! are raced against it; a cancelled operation returns [`CaError::Cancelled`]
//! and drops its open transaction, which discards the staged writes.

use std::collections::HashSet;
use std::pin::Pin;

use time::{Duration, OffsetDateTime};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cert::CertificateWithPrivateKey;
use crate::config::EngineConfig;
use crate::crl::RevokedEntry;
use crate::error::{CaError, CaResult, ResultExt};
use crate::forge::{Forge, ForgedCertificate};
use crate::model::{Batch, Certificate, Renewal, Status, Subject};
use crate::serial::Serial;
use crate::store::{
    CertificateFilter, CertificateRecord, CertificateStore, IssuerScope, RevokedScope,
    StoreTransaction,
};

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

const SECONDS_PER_DAY: u64 = 86_400;

/// Issues, renews and revokes certificates in a trust hierarchy.
pub struct Engine<S> {
    store: S,
    forge: Forge,
    expose_ca_key: bool,
    soon_window: Duration,
}

impl<S> std::fmt::Debug for Engine<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("forge", &self.forge)
            .field("expose_ca_key", &self.expose_ca_key)
            .field("soon_window", &self.soon_window)
            .finish_non_exhaustive()
    }
}

/// Issuer id 0 is the wire spelling of "no issuer".
fn issuer_ref(issuer: Option<u64>) -> Option<u64> {
    issuer.filter(|id| *id != 0)
}

async fn cancellable<T>(
    cancel: &CancellationToken,
    operation: impl Future<Output = CaResult<T>>,
) -> CaResult<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(CaError::Cancelled),
        result = operation => result,
    }
}

impl<S: CertificateStore> Engine<S> {
    pub fn new(store: S, config: EngineConfig) -> Self {
        if config.secret.is_empty() {
            warn!("encryption secret is empty, private keys are effectively stored in clear");
        }
        if config.expose_ca_key {
            warn!("CA private keys can be exported");
        }
        Self {
            forge: Forge::from_config(&config),
            store,
            expose_ca_key: config.expose_ca_key,
            soon_window: config.soon_window,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Creates a certificate, or returns the existing non-revoked one with the
    /// same trimmed name under the same issuer.
    pub async fn create_certificate(
        &self,
        mut subject: Subject,
        cancel: &CancellationToken,
    ) -> CaResult<Certificate> {
        subject.issuer = issuer_ref(subject.issuer);
        let name = subject.name.trim().to_string();
        if name.is_empty() {
            return Err(CaError::InvalidName);
        }

        if let Some(existing) = cancellable(cancel, self.store.find_by_name(&name, subject.issuer))
            .await
            .stage("find existing certificate")?
        {
            debug!(id = existing.id, name = %name, "certificate already exists");
            return Ok(existing.to_view());
        }

        let mut tx = cancellable(cancel, self.store.begin())
            .await
            .stage("begin transaction")?;
        let id = cancellable(cancel, tx.insert_draft(subject.issuer, &name))
            .await
            .stage("reserve certificate id")?;

        let authority = match subject.issuer {
            None => None,
            Some(issuer_id) => Some(
                self.authority(issuer_id, cancel)
                    .await
                    .stage("validate issuer")?,
            ),
        };

        let forged = self
            .run_forge(subject, id, authority, cancel)
            .await
            .stage("forge certificate")?;

        let now = OffsetDateTime::now_utc();
        let record = CertificateRecord {
            id,
            issuer_id: forged.subject.issuer,
            name: forged.subject.name,
            serial: forged.serial.to_string(),
            ca: forged.subject.ca,
            expire_at: forged.expire_at,
            encrypted_key: forged.encrypted_key,
            cert_pem: forged.cert_pem,
            domains: forged.subject.domains,
            units: forged.subject.units,
            ips: forged.subject.ips,
            created_at: now,
            updated_at: now,
            revoked_at: None,
        };
        let (name, ca, issuer_id) = (record.name.clone(), record.ca, record.issuer_id);

        cancellable(cancel, tx.save(record))
            .await
            .stage("save certificate")?;
        cancellable(cancel, tx.commit()).await.stage("commit")?;
        info!(id, name = %name, ca, issuer = ?issuer_id, "certificate created");

        self.get_certificate(id, cancel).await
    }

    /// Creates every batch depth first. Items with nested items or without an
    /// issuer become CAs; nested items are issued by their parent.
    ///
    /// Returns the created certificates, parents before children. The first
    /// failure aborts the remaining items; certificates already created stay.
    pub async fn batch_create_certificate(
        &self,
        batches: Vec<Batch>,
        cancel: &CancellationToken,
    ) -> CaResult<Vec<Certificate>> {
        let mut created = Vec::new();
        for batch in batches {
            self.create_batch(batch, cancel, &mut created).await?;
        }
        Ok(created)
    }

    fn create_batch<'a>(
        &'a self,
        batch: Batch,
        cancel: &'a CancellationToken,
        created: &'a mut Vec<Certificate>,
    ) -> BoxFuture<'a, CaResult<()>> {
        Box::pin(async move {
            let mut subject = batch.certificate;
            if !batch.nested.is_empty() || issuer_ref(subject.issuer).is_none() {
                subject.ca = true;
            }
            let name = subject.name.clone();
            let certificate = self
                .create_certificate(subject, cancel)
                .await
                .with_stage(|| format!("create {name:?}"))?;
            let id = certificate.id;
            created.push(certificate);

            for mut nested in batch.nested {
                nested.certificate.issuer = Some(id);
                self.create_batch(nested, cancel, created).await?;
            }
            Ok(())
        })
    }

    /// Non-revoked certificate by id.
    pub async fn get_certificate(
        &self,
        id: u64,
        cancel: &CancellationToken,
    ) -> CaResult<Certificate> {
        Ok(self.record(id, cancel).await?.to_view())
    }

    /// The certificate and its issuers up to the root, root first.
    pub async fn get_certificate_chain(
        &self,
        id: u64,
        cancel: &CancellationToken,
    ) -> CaResult<Vec<Certificate>> {
        let mut chain = Vec::new();
        let mut seen = HashSet::new();
        let mut next = Some(id);
        while let Some(current) = next {
            if !seen.insert(current) {
                return Err(CaError::Store(format!("issuer loop at certificate {current}")));
            }
            let record = self.record(current, cancel).await?;
            next = record.issuer_id;
            chain.push(record.to_view());
        }
        chain.reverse();
        Ok(chain)
    }

    /// Non-revoked certificates issued by `issuer`; `None` lists roots.
    pub async fn list_certificates(
        &self,
        issuer: Option<u64>,
        cancel: &CancellationToken,
    ) -> CaResult<Vec<Certificate>> {
        let filter = CertificateFilter::builder()
            .issuer(IssuerScope::from(issuer_ref(issuer)))
            .build();
        self.list(&filter, cancel).await
    }

    pub async fn list_root_certificates(
        &self,
        cancel: &CancellationToken,
    ) -> CaResult<Vec<Certificate>> {
        self.list_certificates(None, cancel).await
    }

    pub async fn list_expired_certificates(
        &self,
        cancel: &CancellationToken,
    ) -> CaResult<Vec<Certificate>> {
        let filter = CertificateFilter::builder()
            .expire_at_or_before(OffsetDateTime::now_utc())
            .build();
        self.list(&filter, cancel).await
    }

    pub async fn list_soon_expire_certificates(
        &self,
        cancel: &CancellationToken,
    ) -> CaResult<Vec<Certificate>> {
        let now = OffsetDateTime::now_utc();
        let filter = CertificateFilter::builder()
            .expire_after(now)
            .expire_at_or_before(now + self.soon_window)
            .build();
        self.list(&filter, cancel).await
    }

    /// Revoked certificates whose issuer is exactly `issuer` (no subtree scan).
    pub async fn list_revoked_certificates(
        &self,
        issuer: Option<u64>,
        cancel: &CancellationToken,
    ) -> CaResult<Vec<Certificate>> {
        let filter = CertificateFilter::builder()
            .issuer(IssuerScope::from(issuer_ref(issuer)))
            .revoked(RevokedScope::Only)
            .build();
        self.list(&filter, cancel).await
    }

    /// Tombstones the certificate. Children are not touched; unknown ids are
    /// ignored.
    pub async fn revoke_certificate(&self, id: u64, cancel: &CancellationToken) -> CaResult<()> {
        cancellable(cancel, self.store.revoke(id, OffsetDateTime::now_utc()))
            .await
            .stage("revoke certificate")?;
        info!(id, "certificate revoked");
        Ok(())
    }

    /// Re-issues the certificate under the same id with a new key, serial and
    /// expiry, and the renewal's attribute sets in place of the current ones.
    /// Then renews every active child so it keeps its remaining lifetime;
    /// children are renewed with empty sets, like any renewal without them.
    pub async fn renew_certificate(
        &self,
        id: u64,
        renewal: Renewal,
        cancel: &CancellationToken,
    ) -> CaResult<Certificate> {
        self.renew(id, renewal, cancel).await
    }

    fn renew<'a>(
        &'a self,
        id: u64,
        renewal: Renewal,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, CaResult<Certificate>> {
        Box::pin(async move {
            let old = self.record(id, cancel).await?;

            let subject = Subject {
                name: old.name.clone(),
                days: renewal.days,
                ca: old.ca,
                issuer: old.issuer_id,
                domains: renewal.domains,
                units: renewal.units,
                ips: renewal.ips,
            };

            let authority = match old.issuer_id {
                None => None,
                Some(issuer_id) => Some(
                    self.authority(issuer_id, cancel)
                        .await
                        .stage("validate issuer")?,
                ),
            };

            let forged = self
                .run_forge(subject, id, authority, cancel)
                .await
                .stage("regenerate certificate")?;

            let record = CertificateRecord {
                serial: forged.serial.to_string(),
                expire_at: forged.expire_at,
                encrypted_key: forged.encrypted_key,
                cert_pem: forged.cert_pem,
                domains: forged.subject.domains,
                units: forged.subject.units,
                ips: forged.subject.ips,
                ..old
            };

            let mut tx = cancellable(cancel, self.store.begin())
                .await
                .stage("begin transaction")?;
            cancellable(cancel, tx.save(record))
                .await
                .stage("save renewed certificate")?;
            cancellable(cancel, tx.commit()).await.stage("commit")?;
            info!(id, days = renewal.days, "certificate renewed");

            let children = cancellable(
                cancel,
                self.store.list(
                    &CertificateFilter::builder()
                        .issuer(IssuerScope::Issuer(id))
                        .revoked(RevokedScope::Include)
                        .build(),
                ),
            )
            .await
            .stage("list issued certificates")?;

            let now = OffsetDateTime::now_utc();
            for child in children {
                if child.is_revoked() || child.expire_at <= now {
                    debug!(id = child.id, issuer = id, "skip renewal of inactive certificate");
                    continue;
                }
                let days = remaining_days(&child);
                debug!(id = child.id, issuer = id, days, "cascade renewal");
                self.renew(
                    child.id,
                    Renewal {
                        days,
                        ..Renewal::default()
                    },
                    cancel,
                )
                .await
                .with_stage(|| format!("renew nested certificate {}", child.id))?;
            }

            self.get_certificate(id, cancel).await
        })
    }

    /// Signed CRL (PEM) of the revoked direct children of `issuer`.
    pub async fn get_revoked_certificates_list(
        &self,
        issuer: u64,
        cancel: &CancellationToken,
    ) -> CaResult<String> {
        let authority = self.authority(issuer, cancel).await.stage("get CA")?;

        let revoked = cancellable(
            cancel,
            self.store.list(
                &CertificateFilter::builder()
                    .issuer(IssuerScope::Issuer(issuer))
                    .revoked(RevokedScope::Only)
                    .build(),
            ),
        )
        .await
        .stage("list revoked certificates")?;

        let entries = revoked
            .iter()
            .map(|record| {
                let serial = record
                    .serial
                    .parse::<Serial>()
                    .map_err(|_| CaError::InvalidSerial(record.id))?;
                Ok(RevokedEntry {
                    serial,
                    revoked_at: record.revoked_at.unwrap_or(record.updated_at),
                })
            })
            .collect::<CaResult<Vec<_>>>()?;

        // Wall-clock nanoseconds: increasing in practice, not guaranteed.
        let number = Serial::from_u128(
            u128::try_from(OffsetDateTime::now_utc().unix_timestamp_nanos()).unwrap_or_default(),
        );
        let crl = self
            .forge
            .revocation_list(&authority, &entries, number)
            .stage("create CRL")?;
        info!(issuer, revoked = entries.len(), "revocation list issued");
        Ok(crl)
    }

    /// Stored certificate PEM.
    pub async fn get_public_cert(&self, id: u64, cancel: &CancellationToken) -> CaResult<String> {
        Ok(self.record(id, cancel).await?.cert_pem)
    }

    /// Decrypted private key PEM. CA keys require `expose_ca_key`.
    pub async fn get_private_key(&self, id: u64, cancel: &CancellationToken) -> CaResult<String> {
        let record = self.record(id, cancel).await?;
        if record.ca && !self.expose_ca_key {
            return Err(CaError::KeyNotExposed);
        }
        self.forge
            .cipher()
            .open(&record.encrypted_key)
            .stage("decrypt key")
    }

    /// Counters over the store. Each one is a separate query.
    pub async fn get_status(&self, cancel: &CancellationToken) -> CaResult<Status> {
        let now = OffsetDateTime::now_utc();

        let total = self
            .count(
                CertificateFilter::builder()
                    .revoked(RevokedScope::Include)
                    .build(),
                cancel,
            )
            .await
            .stage("count certificates")?;
        let expired = self
            .count(
                CertificateFilter::builder().expire_at_or_before(now).build(),
                cancel,
            )
            .await
            .stage("count expired certificates")?;
        let soon_expire = self
            .count(
                CertificateFilter::builder()
                    .expire_after(now)
                    .expire_at_or_before(now + self.soon_window)
                    .build(),
                cancel,
            )
            .await
            .stage("count soon expiring certificates")?;
        let ca = self
            .count(CertificateFilter::builder().ca(true).build(), cancel)
            .await
            .stage("count CA")?;
        let revoked = self
            .count(
                CertificateFilter::builder()
                    .revoked(RevokedScope::Only)
                    .build(),
                cancel,
            )
            .await
            .stage("count revoked certificates")?;

        Ok(Status {
            total,
            expired,
            soon_expire,
            ca,
            revoked,
        })
    }

    async fn record(&self, id: u64, cancel: &CancellationToken) -> CaResult<CertificateRecord> {
        cancellable(cancel, self.store.get(id))
            .await?
            .ok_or(CaError::NotFound(id))
    }

    async fn list(
        &self,
        filter: &CertificateFilter,
        cancel: &CancellationToken,
    ) -> CaResult<Vec<Certificate>> {
        let records = cancellable(cancel, self.store.list(filter))
            .await
            .stage("list certificates")?;
        Ok(records.iter().map(CertificateRecord::to_view).collect())
    }

    async fn count(&self, filter: CertificateFilter, cancel: &CancellationToken) -> CaResult<u64> {
        cancellable(cancel, self.store.count(&filter)).await
    }

    /// Loads an issuer able to sign: present, not revoked, and a CA.
    async fn authority(
        &self,
        issuer: u64,
        cancel: &CancellationToken,
    ) -> CaResult<CertificateWithPrivateKey> {
        let record = cancellable(cancel, self.store.get(issuer))
            .await?
            .ok_or(CaError::IssuerNotFound(issuer))?;
        if !record.ca {
            return Err(CaError::NotIssuerNotCA);
        }
        self.forge
            .open_authority(&record.cert_pem, &record.encrypted_key)
    }

    async fn run_forge(
        &self,
        subject: Subject,
        id: u64,
        authority: Option<CertificateWithPrivateKey>,
        cancel: &CancellationToken,
    ) -> CaResult<ForgedCertificate> {
        let forge = self.forge.clone();
        let task =
            tokio::task::spawn_blocking(move || forge.forge(subject, id, authority.as_ref()));
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(CaError::Cancelled),
            joined = task => match joined {
                Ok(result) => result,
                Err(err) => Err(err.into()),
            },
        }
    }
}

/// Whole days left between the last write and expiry, rounded up.
fn remaining_days(record: &CertificateRecord) -> u32 {
    let seconds = (record.expire_at - record.updated_at).whole_seconds().max(0) as u64;
    u32::try_from(seconds.div_ceil(SECONDS_PER_DAY)).unwrap_or(u32::MAX)
}
