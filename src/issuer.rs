use der::Encode;
use rand_core::CryptoRngCore;
use x509_cert::certificate::CertificateInner;
use x509_cert::name::Name;

use crate::cert::Certificate;
use crate::cert::SignatureAlgorithm;
use crate::cert::extensions::AuthorityKeyIdentifier;
use crate::cert::extensions::BasicConstraints;
use crate::cert::extensions::ExtendedKeyUsage;
use crate::cert::extensions::KeyUsage;
use crate::cert::extensions::SubjectKeyIdentifier;
use crate::cert::params::Validity;
use crate::cert::params::{CertificationRequestInfo, ExtensionParam};
use crate::error::CaError;
use crate::key::KeyPair;
use crate::serial::Serial;
use crate::tbs_certificate::TbsCertificate;

/// Represents an entity capable of issuing certificates.
///
/// This trait provides methods to retrieve issuer details and issue certificates.
pub trait Issuer {
    /// Returns the name written into the issuer field of issued certificates.
    fn issuer_name(&self) -> Result<Name, CaError>;

    /// Returns the signing key of the issuer.
    fn signing_key(&self) -> &KeyPair;

    /// Issues a certificate based on the provided certification request information.
    ///
    /// CA requests get a critical `cA=TRUE` basic constraint and the
    /// keyCertSign/cRLSign usages. Leaf requests get digital signature only,
    /// plus whatever extended usages the request lists.
    ///
    /// # Arguments
    /// * `cert_request` - The certification request information containing details about the certificate to be issued.
    /// * `validity` - Validity window of the new certificate.
    /// * `serial` - Serial number of the new certificate.
    /// * `rng` - Randomness for the signature.
    fn issue(
        &self,
        cert_request: &CertificationRequestInfo,
        validity: Validity,
        serial: Serial,
        rng: &mut dyn CryptoRngCore,
    ) -> Result<Certificate, CaError> {
        let signature_algo = SignatureAlgorithm::Sha256WithRSA;

        let authority_key_id = AuthorityKeyIdentifier {
            key_identifier: self.signing_key().public_key().key_identifier()?,
        };
        let subject_key_id = SubjectKeyIdentifier {
            key_identifier: cert_request.subject_public_key.key_identifier()?,
        };

        let basic_constraints = BasicConstraints {
            is_ca: cert_request.is_ca,
            max_path_length: None,
        };

        let key_usage = if cert_request.is_ca {
            KeyUsage::authority()
        } else {
            KeyUsage::leaf()
        };

        let mut extensions: Vec<ExtensionParam> = vec![
            ExtensionParam::from_extension(basic_constraints, true)?,
            ExtensionParam::from_extension(key_usage, true)?,
        ];

        if !cert_request.usages.is_empty() {
            let extended_key_usage = ExtendedKeyUsage {
                usage: cert_request.usages.clone(),
            };
            extensions.push(ExtensionParam::from_extension(extended_key_usage, false)?);
        }

        extensions.push(ExtensionParam::from_extension(subject_key_id, false)?);
        extensions.push(ExtensionParam::from_extension(authority_key_id, false)?);

        let combined_extensions = extensions
            .into_iter()
            .chain(cert_request.extensions.iter().cloned())
            .collect();

        let tbs_cert = TbsCertificate {
            serial_number: serial,
            signature_algorithm: signature_algo.clone(),
            issuer: self.issuer_name()?,
            validity,
            subject: cert_request.subject.clone(),
            subject_public_key: cert_request.subject_public_key.clone(),
            extensions: combined_extensions,
        };

        let tbs_cert_inner = tbs_cert.to_tbs_certificate_inner()?;

        let signature = self
            .signing_key()
            .sign_data(rng, &tbs_cert_inner.to_der()?)?;

        let cert_inner = CertificateInner {
            tbs_certificate: tbs_cert_inner,
            signature_algorithm: signature_algo.into(),
            signature: der::asn1::BitString::from_bytes(&signature)?,
        };

        Ok(Certificate { inner: cert_inner })
    }
}
