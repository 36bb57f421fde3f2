use bon::Builder;
use const_oid::ObjectIdentifier;
use der::{Tag, Tagged};
use der::asn1::{Any, OctetString, PrintableStringRef, SetOfVec, Utf8StringRef};
use time::Duration;
use time::OffsetDateTime;
use x509_cert::attr::AttributeTypeAndValue;
use x509_cert::name::{RdnSequence, RelativeDistinguishedName};

use super::extensions::ToAndFromX509Extension;
pub use crate::cert::extensions::ExtendedKeyUsage;
pub use crate::cert::extensions::ExtendedKeyUsageOption;
use crate::error::CaError;
use crate::key::PublicKey;

const COMMON_NAME: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.3");
const SERIAL_NUMBER: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.5");
const ORGANIZATIONAL_UNIT: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.11");

/// Parameters for building an X.509 certificate.
///
/// # Fields
/// * `subject` - The distinguished name of the certificate subject.
/// * `subject_public_key` - The public key of the certificate subject.
/// * `usages` - Extended key usages; empty means no restriction.
/// * `is_ca` - Indicates if the certificate may sign certificates and CRLs.
/// * `extensions` - Additional X.509 extensions (e.g. subject alt names).
#[derive(Clone, Debug, Builder)]
pub struct CertificationRequestInfo {
    pub subject: DistinguishedName,
    pub subject_public_key: PublicKey,
    #[builder(default)]
    pub usages: Vec<ExtendedKeyUsageOption>,
    #[builder(default)]
    pub is_ca: bool,
    #[builder(default)]
    pub extensions: Vec<ExtensionParam>,
}

/// Distinguished name of an issued certificate.
///
/// The organizational unit carries the store id of the certificate and the
/// serial number attribute repeats the certificate serial, so a certificate
/// can be traced back to its row without a lookup table.
#[derive(Clone, Debug, Builder, Default, PartialEq, Eq)]
pub struct DistinguishedName {
    pub common_name: String,
    pub organization_unit: Option<String>,
    pub serial_number: Option<String>,
}

impl DistinguishedName {
    /// Converts the distinguished name to an X.509 name, one attribute per RDN.
    pub fn as_x509_name(&self) -> Result<x509_cert::name::DistinguishedName, CaError> {
        let mut rdns = vec![rdn(COMMON_NAME, Tag::Utf8String, &self.common_name)?];
        if let Some(unit) = &self.organization_unit {
            rdns.push(rdn(ORGANIZATIONAL_UNIT, Tag::Utf8String, unit)?);
        }
        if let Some(serial) = &self.serial_number {
            rdns.push(rdn(SERIAL_NUMBER, Tag::PrintableString, serial)?);
        }
        Ok(RdnSequence(rdns))
    }

    /// Creates a `DistinguishedName` from an X.509 name, keeping the
    /// attributes this crate writes and ignoring the rest.
    pub fn from_x509_name(x509dn: &x509_cert::name::DistinguishedName) -> Self {
        let mut dn = DistinguishedName::default();

        for rdn in x509dn.0.iter() {
            for attr in rdn.0.iter() {
                let Some(value) = attribute_string(attr) else {
                    continue;
                };
                match attr.oid {
                    COMMON_NAME => dn.common_name = value,
                    ORGANIZATIONAL_UNIT => dn.organization_unit = Some(value),
                    SERIAL_NUMBER => dn.serial_number = Some(value),
                    _ => {}
                }
            }
        }

        dn
    }
}

fn rdn(oid: ObjectIdentifier, tag: Tag, value: &str) -> Result<RelativeDistinguishedName, CaError> {
    let invalid = |e: der::Error| CaError::InvalidInput(format!("name attribute {oid}: {e}"));
    let value = match tag {
        Tag::PrintableString => {
            Any::encode_from(&PrintableStringRef::new(value).map_err(invalid)?)
        }
        _ => Any::encode_from(&Utf8StringRef::new(value).map_err(invalid)?),
    }?;
    let set = SetOfVec::try_from(vec![AttributeTypeAndValue { oid, value }])?;
    Ok(RelativeDistinguishedName(set))
}

fn attribute_string(attr: &AttributeTypeAndValue) -> Option<String> {
    match attr.value.tag() {
        Tag::Utf8String | Tag::PrintableString | Tag::Ia5String => {
            String::from_utf8(attr.value.value().to_vec()).ok()
        }
        _ => None,
    }
}

/// Certificate validity period.
///
/// # Fields
/// * `not_before` - The start of the validity period.
/// * `not_after` - The end of the validity period.
#[derive(Clone, Debug)]
pub struct Validity {
    pub not_before: OffsetDateTime,
    pub not_after: OffsetDateTime,
}

impl Validity {
    /// Creates a validity period starting now for the given number of days.
    ///
    /// Both bounds are truncated to whole seconds, the precision X.509 time
    /// values carry, so the stored expiry equals the certificate's notAfter.
    pub fn for_days(days: i64) -> Result<Self, CaError> {
        let now = OffsetDateTime::now_utc()
            .replace_nanosecond(0)
            .unwrap_or_else(|_| OffsetDateTime::now_utc());
        let not_after = now
            .checked_add(Duration::days(days))
            .ok_or_else(|| CaError::InvalidInput(format!("validity of {days} days")))?;
        Ok(Self {
            not_before: now,
            not_after,
        })
    }
}

/// Represents an X.509 extension.
///
/// # Fields
/// * `oid` - The object identifier of the extension.
/// * `critical` - Indicates if the extension is critical.
/// * `value` - The DER-encoded value of the extension.
#[derive(Clone, Debug)]
pub struct ExtensionParam {
    pub oid: ObjectIdentifier,
    pub critical: bool,
    /// DER-encoded extension value
    pub value: Vec<u8>,
}

impl ExtensionParam {
    /// Creates an `ExtensionParam` from a specific extension.
    pub fn from_extension<E: ToAndFromX509Extension>(
        extension: E,
        critical: bool,
    ) -> Result<Self, CaError> {
        Ok(Self {
            oid: E::OID,
            critical,
            value: extension.to_x509_extension_value()?,
        })
    }

    /// Decodes an `ExtensionParam` into a specific extension.
    pub fn to_extension<E: ToAndFromX509Extension>(&self) -> Result<E, CaError> {
        E::from_x509_extension_value(&self.value)
    }

    /// Wraps the value into the X.509 extension structure.
    pub fn to_x509(&self) -> Result<x509_cert::ext::Extension, CaError> {
        Ok(x509_cert::ext::Extension {
            extn_id: self.oid,
            critical: self.critical,
            extn_value: OctetString::new(self.value.clone())?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_attributes_survive_encoding() {
        let dn = DistinguishedName::builder()
            .common_name("example.com, Inc.".to_string())
            .organization_unit("42".to_string())
            .serial_number("1234567890".to_string())
            .build();
        let x509 = dn.as_x509_name().unwrap();
        assert_eq!(x509.0.len(), 3);
        assert_eq!(DistinguishedName::from_x509_name(&x509), dn);
    }

    #[test]
    fn serial_attribute_must_be_printable() {
        let dn = DistinguishedName::builder()
            .common_name("x".to_string())
            .serial_number("not*printable".to_string())
            .build();
        assert!(dn.as_x509_name().is_err());
    }

    #[test]
    fn validity_is_second_aligned() {
        let validity = Validity::for_days(3).unwrap();
        assert_eq!(validity.not_before.nanosecond(), 0);
        assert_eq!(validity.not_after - validity.not_before, Duration::days(3));
    }
}
