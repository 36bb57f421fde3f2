//! Certificate revocation lists.
//!
//! A list is issued by a CA for its direct children: one entry per revoked
//! certificate with its serial and revocation time, a CRL number extension
//! and the authority key identifier of the signer.

use der::{Decode, Encode};
use rand_core::CryptoRngCore;
use time::OffsetDateTime;
use x509_cert::Version;
use x509_cert::crl::{CertificateList, RevokedCert, TbsCertList};

use crate::cert::SignatureAlgorithm;
use crate::cert::extensions::{AuthorityKeyIdentifier, CrlNumber, ToAndFromX509Extension};
use crate::cert::params::ExtensionParam;
use crate::error::CaError;
use crate::issuer::Issuer;
use crate::key::PublicKey;
use crate::pem_utils::{CRL_LABEL, der_to_pem, pem_to_der};
use crate::serial::Serial;
use crate::tbs_certificate::{from_x509_time, to_x509_time};

/// One revoked certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevokedEntry {
    pub serial: Serial,
    pub revoked_at: OffsetDateTime,
}

/// A signed X.509 v2 CRL.
#[derive(Debug, Clone)]
pub struct RevocationList {
    pub inner: CertificateList,
}

impl RevocationList {
    /// Builds and signs a list with `issuer`'s key.
    ///
    /// No nextUpdate is written; consumers refetch on demand.
    pub fn issue<I: Issuer + ?Sized>(
        issuer: &I,
        entries: &[RevokedEntry],
        number: Serial,
        this_update: OffsetDateTime,
        rng: &mut dyn CryptoRngCore,
    ) -> Result<Self, CaError> {
        let revoked = entries
            .iter()
            .map(|entry| {
                Ok(RevokedCert {
                    serial_number: entry.serial.to_x509()?,
                    revocation_date: to_x509_time(entry.revoked_at)?,
                    crl_entry_extensions: None,
                })
            })
            .collect::<Result<Vec<_>, CaError>>()?;

        let authority_key_id = AuthorityKeyIdentifier {
            key_identifier: issuer.signing_key().public_key().key_identifier()?,
        };
        let extensions = [
            ExtensionParam::from_extension(CrlNumber(number), false)?,
            ExtensionParam::from_extension(authority_key_id, false)?,
        ]
        .iter()
        .map(ExtensionParam::to_x509)
        .collect::<Result<Vec<_>, CaError>>()?;

        let tbs_cert_list = TbsCertList {
            version: Version::V2,
            signature: SignatureAlgorithm::Sha256WithRSA.into(),
            issuer: issuer.issuer_name()?,
            this_update: to_x509_time(this_update)?,
            next_update: None,
            revoked_certificates: (!revoked.is_empty()).then_some(revoked),
            crl_extensions: Some(extensions),
        };

        let signature = issuer
            .signing_key()
            .sign_data(rng, &tbs_cert_list.to_der()?)?;

        Ok(RevocationList {
            inner: CertificateList {
                tbs_cert_list,
                signature_algorithm: SignatureAlgorithm::Sha256WithRSA.into(),
                signature: der::asn1::BitString::from_bytes(&signature)?,
            },
        })
    }

    pub fn to_der(&self) -> Result<Vec<u8>, CaError> {
        self.inner
            .to_der()
            .map_err(|e| CaError::EncodingError(e.to_string()))
    }

    pub fn to_pem(&self) -> Result<String, CaError> {
        Ok(der_to_pem(&self.to_der()?, CRL_LABEL))
    }

    pub fn from_pem(pem: &str) -> Result<Self, CaError> {
        let der = pem_to_der(pem, CRL_LABEL)?;
        Ok(RevocationList {
            inner: CertificateList::from_der(&der)?,
        })
    }

    pub fn this_update(&self) -> OffsetDateTime {
        from_x509_time(&self.inner.tbs_cert_list.this_update)
    }

    pub fn entries(&self) -> Vec<RevokedEntry> {
        self.inner
            .tbs_cert_list
            .revoked_certificates
            .iter()
            .flatten()
            .map(|revoked| RevokedEntry {
                serial: Serial::from_x509(&revoked.serial_number),
                revoked_at: from_x509_time(&revoked.revocation_date),
            })
            .collect()
    }

    /// The CRL number, if the list carries one.
    pub fn number(&self) -> Result<Option<Serial>, CaError> {
        self.inner
            .tbs_cert_list
            .crl_extensions
            .iter()
            .flatten()
            .find(|ext| ext.extn_id == CrlNumber::OID)
            .map(|ext| CrlNumber::from_x509_extension_value(ext.extn_value.as_bytes()))
            .transpose()
            .map(|number| number.map(|n| n.0))
    }

    pub fn verify_signed_by(&self, key: &PublicKey) -> Result<(), CaError> {
        let tbs = self.inner.tbs_cert_list.to_der()?;
        let signature = self.inner.signature.as_bytes().ok_or_else(|| {
            CaError::DecodingError("signature bit string is not octet aligned".into())
        })?;
        key.verify(&tbs, signature)
    }
}
