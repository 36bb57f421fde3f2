//! Certificate forge: turns a [`Subject`] into signed, sealed material.
//!
//! Forging is synchronous and CPU bound (RSA key generation dominates); the
//! engine runs it on the blocking pool.

use std::net::IpAddr;
use std::sync::Arc;

use time::OffsetDateTime;

use crate::cert::extensions::{ExtendedKeyUsageOption, SubjectAltName};
use crate::cert::params::{CertificationRequestInfo, DistinguishedName, ExtensionParam, Validity};
use crate::cert::{Certificate, CertificateWithPrivateKey};
use crate::cipher::KeyCipher;
use crate::config::EngineConfig;
use crate::crl::{RevocationList, RevokedEntry};
use crate::error::{CaError, CaResult, ResultExt};
use crate::issuer::Issuer;
use crate::key::KeyPair;
use crate::model::Subject;
use crate::random::RandomSource;
use crate::serial::Serial;

/// Output of [`Forge::forge`], ready to be stored.
#[derive(Debug, Clone)]
pub struct ForgedCertificate {
    /// The subject after normalization: trimmed name, default domain, CA flag
    /// forced for roots, canonical addresses.
    pub subject: Subject,
    pub cert_pem: String,
    pub encrypted_key: String,
    pub expire_at: OffsetDateTime,
    pub serial: Serial,
}

#[derive(Clone)]
pub struct Forge {
    cipher: Arc<KeyCipher>,
    random: Arc<dyn RandomSource>,
    key_bits: usize,
}

impl Forge {
    pub fn new(cipher: Arc<KeyCipher>, random: Arc<dyn RandomSource>, key_bits: usize) -> Self {
        Self {
            cipher,
            random,
            key_bits,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(
            Arc::new(KeyCipher::new(&config.secret)),
            config.random.clone(),
            config.key_bits,
        )
    }

    pub fn cipher(&self) -> &KeyCipher {
        &self.cipher
    }

    /// Generates a key pair and a certificate for `subject`, stored under `id`.
    ///
    /// Without an issuer the certificate is self-signed and always a CA.
    pub fn forge(
        &self,
        subject: Subject,
        id: u64,
        issuer: Option<&CertificateWithPrivateKey>,
    ) -> CaResult<ForgedCertificate> {
        let mut subject = normalize(subject)?;
        if issuer.is_none() {
            subject.ca = true;
        }

        let mut rng = self.random.rng();
        let serial = Serial::generate(rng.as_mut());

        let key = KeyPair::generate_rsa(rng.as_mut(), self.key_bits)
            .stage("generate private key")?;

        let ip_addresses = subject
            .ips
            .iter()
            .map(|ip| ip.parse::<IpAddr>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| CaError::InvalidAddress(e.to_string()))?;
        let san = SubjectAltName {
            dns_names: subject.domains.clone(),
            ip_addresses,
        };

        let usages = if subject.ca {
            vec![]
        } else {
            vec![
                ExtendedKeyUsageOption::ClientAuth,
                ExtendedKeyUsageOption::ServerAuth,
            ]
        };

        let request = CertificationRequestInfo::builder()
            .subject(
                DistinguishedName::builder()
                    .common_name(subject.name.clone())
                    .organization_unit(id.to_string())
                    .serial_number(serial.to_string())
                    .build(),
            )
            .subject_public_key(key.public_key().clone())
            .usages(usages)
            .is_ca(subject.ca)
            .extensions(vec![
                ExtensionParam::from_extension(san, false).stage("encode subject alt names")?,
            ])
            .build();

        let validity = Validity::for_days(i64::from(subject.days)).stage("compute validity")?;
        let expire_at = validity.not_after;

        let cert = match issuer {
            None => Certificate::new_self_signed(
                &request,
                &key,
                validity,
                serial.clone(),
                rng.as_mut(),
            ),
            Some(authority) => authority.issue(&request, validity, serial.clone(), rng.as_mut()),
        }
        .stage("sign certificate")?;

        let cert_pem = cert.to_pem().stage("encode certificate")?;
        let key_pem = key.to_pkcs1_pem().stage("encode private key")?;
        let encrypted_key = self.cipher.seal(&key_pem);

        Ok(ForgedCertificate {
            subject,
            cert_pem,
            encrypted_key,
            expire_at,
            serial,
        })
    }

    /// Decrypts and parses stored CA material into a signing authority.
    pub fn open_authority(
        &self,
        cert_pem: &str,
        encrypted_key: &str,
    ) -> CaResult<CertificateWithPrivateKey> {
        let key_pem = self.cipher.open(encrypted_key).stage("decrypt key")?;
        let key = KeyPair::import_from_pkcs1_pem(&key_pem).stage("parse key")?;
        let cert = Certificate::from_pem(cert_pem).stage("parse certificate")?;
        CertificateWithPrivateKey::new(cert, key)
    }

    /// Signs a revocation list for `authority` and returns it as PEM.
    pub fn revocation_list<I: Issuer + ?Sized>(
        &self,
        authority: &I,
        entries: &[RevokedEntry],
        number: Serial,
    ) -> CaResult<String> {
        let mut rng = self.random.rng();
        RevocationList::issue(
            authority,
            entries,
            number,
            OffsetDateTime::now_utc(),
            rng.as_mut(),
        )?
        .to_pem()
    }
}

impl std::fmt::Debug for Forge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Forge")
            .field("key_bits", &self.key_bits)
            .finish_non_exhaustive()
    }
}

/// Trims the name, defaults and deduplicates attribute sets, canonicalizes
/// addresses.
pub fn normalize(mut subject: Subject) -> CaResult<Subject> {
    subject.name = subject.name.trim().to_string();
    if subject.name.is_empty() {
        return Err(CaError::InvalidName);
    }

    subject.domains = collapse(subject.domains.iter().map(|d| d.trim().to_string()));
    if subject.domains.is_empty() {
        subject.domains.push(subject.name.clone());
    }

    subject.units = collapse(subject.units.iter().cloned());

    let ips = subject
        .ips
        .iter()
        .map(|ip| ip.trim())
        .filter(|ip| !ip.is_empty())
        .map(|ip| {
            ip.parse::<IpAddr>()
                .map(|parsed| parsed.to_string())
                .map_err(|_| CaError::InvalidAddress(ip.to_string()))
        })
        .collect::<CaResult<Vec<_>>>()?;
    subject.ips = collapse(ips.into_iter());

    Ok(subject)
}

fn collapse(values: impl Iterator<Item = String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for value in values {
        if !value.is_empty() && !out.contains(&value) {
            out.push(value);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cert::extensions::{BasicConstraints, ExtendedKeyUsage, KeyUsage, KeyUsages};
    use crate::random::SeededRandom;

    fn forge() -> Forge {
        Forge::new(
            Arc::new(KeyCipher::new("test123")),
            Arc::new(SeededRandom::new(5)),
            512,
        )
    }

    #[test]
    fn normalize_trims_and_defaults() {
        let subject = Subject::builder()
            .name("  example  ")
            .domains(vec![" a.local ".into(), "a.local".into(), "".into()])
            .ips(vec![" 127.0.0.1".into(), "127.0.0.1".into()])
            .units(vec!["ops".into(), "ops".into()])
            .build();
        let subject = normalize(subject).unwrap();
        assert_eq!(subject.name, "example");
        assert_eq!(subject.domains, vec!["a.local"]);
        assert_eq!(subject.ips, vec!["127.0.0.1"]);
        assert_eq!(subject.units, vec!["ops"]);

        let bare = normalize(Subject::builder().name("bare").build()).unwrap();
        assert_eq!(bare.domains, vec!["bare"]);
    }

    #[test]
    fn normalize_rejects_blank_name_and_bad_address() {
        assert!(matches!(
            normalize(Subject::builder().name("   ").build()),
            Err(CaError::InvalidName)
        ));
        assert!(matches!(
            normalize(Subject::builder().name("x").ips(vec!["300.1.1.1".into()]).build()),
            Err(CaError::InvalidAddress(_))
        ));
    }

    #[test]
    fn root_is_forced_to_ca_and_carries_authority_usages() {
        let forge = forge();
        let forged = forge
            .forge(Subject::builder().name("root").days(10).build(), 1, None)
            .unwrap();
        assert!(forged.subject.ca);

        let cert = Certificate::from_pem(&forged.cert_pem).unwrap();
        let bc = cert.extension::<BasicConstraints>().unwrap().unwrap();
        assert!(bc.is_ca);
        let ku = cert.extension::<KeyUsage>().unwrap().unwrap();
        assert!(ku.contains(KeyUsages::KeyCertSign));
        assert!(ku.contains(KeyUsages::CRLSign));
        assert!(cert.extension::<ExtendedKeyUsage>().unwrap().is_none());

        let dn = cert.subject();
        assert_eq!(dn.common_name, "root");
        assert_eq!(dn.organization_unit.as_deref(), Some("1"));
        assert_eq!(dn.serial_number, Some(forged.serial.to_string()));
        assert_eq!(cert.serial(), forged.serial);
        assert_eq!(cert.not_after(), forged.expire_at);
    }

    #[test]
    fn leaf_gets_client_and_server_usage_only() {
        let forge = forge();
        let root = forge
            .forge(Subject::builder().name("root").days(10).build(), 1, None)
            .unwrap();
        let authority = forge
            .open_authority(&root.cert_pem, &root.encrypted_key)
            .unwrap();

        let leaf = forge
            .forge(
                Subject::builder()
                    .name("leaf")
                    .days(5)
                    .issuer(1)
                    .ips(vec!["10.0.0.1".into()])
                    .build(),
                2,
                Some(&authority),
            )
            .unwrap();
        assert!(!leaf.subject.ca);

        let cert = Certificate::from_pem(&leaf.cert_pem).unwrap();
        assert!(cert.verify_signed_by(authority.key.public_key()).is_ok());
        let ku = cert.extension::<KeyUsage>().unwrap().unwrap();
        assert!(ku.contains(KeyUsages::DigitalSignature));
        assert!(!ku.contains(KeyUsages::KeyCertSign));
        let eku = cert.extension::<ExtendedKeyUsage>().unwrap().unwrap();
        assert_eq!(
            eku.usage,
            vec![
                ExtendedKeyUsageOption::ClientAuth,
                ExtendedKeyUsageOption::ServerAuth
            ]
        );
        let san = cert.extension::<SubjectAltName>().unwrap().unwrap();
        assert_eq!(san.dns_names, vec!["leaf"]);
        assert_eq!(san.ip_addresses, vec!["10.0.0.1".parse::<IpAddr>().unwrap()]);
    }

    #[test]
    fn authority_does_not_open_with_another_secret() {
        let root = forge()
            .forge(Subject::builder().name("root").days(1).build(), 1, None)
            .unwrap();
        let other = Forge::new(
            Arc::new(KeyCipher::new("other")),
            Arc::new(SeededRandom::new(6)),
            512,
        );
        assert!(other.open_authority(&root.cert_pem, &root.encrypted_key).is_err());
    }
}
