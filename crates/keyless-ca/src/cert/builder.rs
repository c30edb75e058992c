use std::time::{Duration, SystemTime, UNIX_EPOCH};

use const_oid::db::rfc6962::{CT_PRECERT_POISON, CT_PRECERT_SCTS};
use der::asn1::{BitString, ObjectIdentifier, OctetString, UtcTime};
use der::oid::AssociatedOid;
use der::{Decode, Encode};
use rand::RngCore;
use x509_cert::certificate::{TbsCertificate, Version};
use x509_cert::ext::pkix::{
    AuthorityKeyIdentifier, BasicConstraints, ExtendedKeyUsage, KeyUsage, KeyUsages,
    SubjectAltName, SubjectKeyIdentifier,
};
use x509_cert::ext::Extension;
use x509_cert::name::Name;
use x509_cert::serial_number::SerialNumber;
use x509_cert::spki::{AlgorithmIdentifierOwned, SubjectPublicKeyInfoOwned, SubjectPublicKeyInfoRef};
use x509_cert::time::{Time, Validity};
use x509_cert::Certificate;

use crate::ca::IssuingIdentity;
use crate::crypto::hash::key_identifier;
use crate::error::CertificateError;
use crate::identity::principal::Principal;

const ID_KP_CODE_SIGNING: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.6.1.5.5.7.3.3");

/// Build the clean to-be-signed body for a principal: no poison, no SCT
/// list. The precertificate and the final certificate are both derived from
/// this body, so they differ only in those two extensions.
pub fn build_tbs(
    principal: &Principal,
    client_spki_der: &[u8],
    issuing: &IssuingIdentity,
    validity_window: Duration,
) -> Result<TbsCertificate, CertificateError> {
    let serial_number = random_serial()?;
    let issuer = Name::from_der(&issuing.issuer_name_der)?;
    let subject_public_key_info = SubjectPublicKeyInfoOwned::from_der(client_spki_der)?;

    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| CertificateError::DerError(e.to_string()))?;
    let validity = Validity {
        not_before: Time::UtcTime(UtcTime::from_unix_duration(now)?),
        not_after: Time::UtcTime(UtcTime::from_unix_duration(now + validity_window)?),
    };

    let mut extensions = vec![
        encode_extension(KeyUsage::OID, true, &KeyUsage(KeyUsages::DigitalSignature.into()))?,
        encode_extension(
            ExtendedKeyUsage::OID,
            false,
            &ExtendedKeyUsage(vec![ID_KP_CODE_SIGNING]),
        )?,
        encode_extension(
            BasicConstraints::OID,
            true,
            &BasicConstraints { ca: false, path_len_constraint: None },
        )?,
        // The subject Name is empty, so the single SAN entry is critical.
        encode_extension(
            SubjectAltName::OID,
            true,
            &SubjectAltName(vec![principal.subject_alt_name().to_general_name()?]),
        )?,
    ];
    for claim_ext in principal.extensions() {
        extensions.push(claim_ext.to_x509()?);
    }
    extensions.push(encode_extension(
        AuthorityKeyIdentifier::OID,
        false,
        &AuthorityKeyIdentifier {
            key_identifier: Some(OctetString::new(
                spki_key_identifier(&issuing.ca_spki_der)?.to_vec(),
            )?),
            authority_cert_issuer: None,
            authority_cert_serial_number: None,
        },
    )?);
    extensions.push(encode_extension(
        SubjectKeyIdentifier::OID,
        false,
        &SubjectKeyIdentifier(OctetString::new(
            spki_key_identifier(client_spki_der)?.to_vec(),
        )?),
    )?);

    Ok(TbsCertificate {
        version: Version::V3,
        serial_number,
        signature: issuing.signature_algorithm.clone(),
        issuer,
        validity,
        subject: Name::default(),
        subject_public_key_info,
        issuer_unique_id: None,
        subject_unique_id: None,
        extensions: Some(extensions),
    })
}

/// The precertificate body: the clean body plus the critical CT poison
/// extension carrying a literal ASN.1 NULL.
pub fn with_poison(tbs: &TbsCertificate) -> Result<TbsCertificate, CertificateError> {
    let mut poisoned = tbs.clone();
    let extension = Extension {
        extn_id: CT_PRECERT_POISON,
        critical: true,
        extn_value: OctetString::new(vec![0x05, 0x00])?,
    };
    poisoned
        .extensions
        .get_or_insert_with(Vec::new)
        .push(extension);
    Ok(poisoned)
}

/// The final body: the clean body plus the non-critical SCT list extension.
pub fn with_sct_list(
    tbs: &TbsCertificate,
    sct_list_der: &[u8],
) -> Result<TbsCertificate, CertificateError> {
    let mut finalized = tbs.clone();
    let extension = Extension {
        extn_id: CT_PRECERT_SCTS,
        critical: false,
        extn_value: OctetString::new(sct_list_der.to_vec())?,
    };
    finalized
        .extensions
        .get_or_insert_with(Vec::new)
        .push(extension);
    Ok(finalized)
}

pub fn encode_tbs(tbs: &TbsCertificate) -> Result<Vec<u8>, CertificateError> {
    Ok(tbs.to_der()?)
}

/// Assemble a DER certificate from a signed TBS body.
pub fn assemble_certificate(
    tbs_der: &[u8],
    signature_algorithm: &AlgorithmIdentifierOwned,
    signature: &[u8],
) -> Result<Vec<u8>, CertificateError> {
    let certificate = Certificate {
        tbs_certificate: TbsCertificate::from_der(tbs_der)?,
        signature_algorithm: signature_algorithm.clone(),
        signature: BitString::from_bytes(signature)?,
    };
    Ok(certificate.to_der()?)
}

/// Random 20-byte serial with the high bit cleared.
pub fn random_serial() -> Result<SerialNumber, CertificateError> {
    let mut bytes = [0u8; 20];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    bytes[0] &= 0x7f;
    Ok(SerialNumber::new(&bytes)?)
}

pub(crate) fn spki_key_identifier(spki_der: &[u8]) -> Result<[u8; 20], CertificateError> {
    let spki = SubjectPublicKeyInfoRef::from_der(spki_der)?;
    let bits = spki
        .subject_public_key
        .as_bytes()
        .ok_or_else(|| CertificateError::ParseError("public key has unused bits".to_string()))?;
    Ok(key_identifier(bits))
}

pub(crate) fn encode_extension<T: Encode>(
    oid: ObjectIdentifier,
    critical: bool,
    value: &T,
) -> Result<Extension, CertificateError> {
    Ok(Extension {
        extn_id: oid,
        critical,
        extn_value: OctetString::new(value.to_der()?)?,
    })
}
