use der::asn1::{ObjectIdentifier, OctetString, Utf8StringRef};
use der::Encode;
use x509_cert::ext::Extension;

use crate::error::CertificateError;

// Identity claim OIDs (1.3.6.1.4.1.57264.1.x). The arc is a closed,
// project-level registry; extension values are UTF-8 strings. The issuer and
// workflow entries (.1 - .6) carry the raw string bytes, the build-metadata
// entries (.9 and up) carry a DER UTF8String.
pub const OID_ISSUER: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.3.6.1.4.1.57264.1.1");
pub const OID_WORKFLOW_TRIGGER: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.3.6.1.4.1.57264.1.2");
pub const OID_WORKFLOW_SHA: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.3.6.1.4.1.57264.1.3");
pub const OID_WORKFLOW_NAME: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.3.6.1.4.1.57264.1.4");
pub const OID_WORKFLOW_REPOSITORY: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.3.6.1.4.1.57264.1.5");
pub const OID_WORKFLOW_REF: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.3.6.1.4.1.57264.1.6");
/// OtherName SAN type-id for username identities.
pub const OID_OTHERNAME_SAN: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.3.6.1.4.1.57264.1.7");
pub const OID_BUILD_SIGNER_URI: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.3.6.1.4.1.57264.1.9");
pub const OID_SOURCE_REPOSITORY_URI: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.3.6.1.4.1.57264.1.12");
pub const OID_SOURCE_REPOSITORY_REF: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.3.6.1.4.1.57264.1.14");
pub const OID_BUILD_TRIGGER: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.3.6.1.4.1.57264.1.20");
pub const OID_RUN_INVOCATION_URI: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.3.6.1.4.1.57264.1.21");

/// How a claim value is written into the extension octets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtensionValue {
    /// Raw UTF-8 bytes, no DER wrapping (the legacy arc encoding).
    RawUtf8(String),
    /// DER UTF8String.
    Utf8String(String),
}

/// One identity extension destined for the certificate. Always non-critical.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimExtension {
    pub oid: ObjectIdentifier,
    pub value: ExtensionValue,
}

impl ClaimExtension {
    pub fn raw(oid: ObjectIdentifier, value: &str) -> Self {
        ClaimExtension { oid, value: ExtensionValue::RawUtf8(value.to_string()) }
    }

    pub fn utf8(oid: ObjectIdentifier, value: &str) -> Self {
        ClaimExtension { oid, value: ExtensionValue::Utf8String(value.to_string()) }
    }

    pub fn to_x509(&self) -> Result<Extension, CertificateError> {
        let contents = match &self.value {
            ExtensionValue::RawUtf8(s) => s.as_bytes().to_vec(),
            ExtensionValue::Utf8String(s) => Utf8StringRef::new(s)
                .map_err(CertificateError::from)?
                .to_der()
                .map_err(CertificateError::from)?,
        };
        Ok(Extension {
            extn_id: self.oid,
            critical: false,
            extn_value: OctetString::new(contents).map_err(CertificateError::from)?,
        })
    }
}

/// Order extensions by OID so certificate contents are deterministic for a
/// given principal.
pub fn sort_by_oid(extensions: &mut [ClaimExtension]) {
    extensions.sort_by(|a, b| a.oid.as_bytes().cmp(b.oid.as_bytes()));
}
