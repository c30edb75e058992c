use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use der::asn1::{OctetString, UtcTime};
use der::oid::AssociatedOid;
use der::{Decode, Encode};
use x509_cert::certificate::{TbsCertificate, Version};
use x509_cert::ext::pkix::{BasicConstraints, KeyUsage, KeyUsages, SubjectKeyIdentifier};
use x509_cert::name::{Name, RdnSequence};
use x509_cert::spki::SubjectPublicKeyInfoOwned;
use x509_cert::time::{Time, Validity};

use crate::ca::{
    CertificateAuthority, CodeSigningCertificate, IssuingIdentity, KeySigner,
};
use crate::cert::builder::{encode_extension, random_serial, spki_key_identifier};
use crate::error::CaError;

const ROOT_SUBJECT: &str = "CN=keyless-ca ephemeral root,O=keyless-ca";
const ROOT_VALIDITY: Duration = Duration::from_secs(10 * 365 * 24 * 60 * 60);

/// In-memory CA with a self-signed P-256 root generated at startup. For
/// tests and local development only: the key never leaves the process and
/// dies with it.
pub struct EphemeralCa {
    signer: KeySigner,
    root_der: Vec<u8>,
    identity: IssuingIdentity,
}

impl EphemeralCa {
    pub fn new() -> Result<Self, CaError> {
        let signer = KeySigner::generate_p256();
        let ca_spki_der = signer.public_key_der()?;
        let issuer_name_der = RdnSequence::encode_from_string(ROOT_SUBJECT)
            .map_err(|e| CaError::BadConfig(e.to_string()))?;
        let signature_algorithm = signer.signature_algorithm()?;

        let root_der = self_signed_root(&signer, &issuer_name_der, &ca_spki_der)?;

        Ok(EphemeralCa {
            signer,
            root_der,
            identity: IssuingIdentity {
                issuer_name_der,
                ca_spki_der,
                signature_algorithm,
            },
        })
    }
}

pub(crate) fn self_signed_root(
    signer: &KeySigner,
    name_der: &[u8],
    spki_der: &[u8],
) -> Result<Vec<u8>, CaError> {
    let to_ca_error = |e: crate::error::CertificateError| CaError::BadConfig(e.to_string());

    let name = Name::from_der(name_der).map_err(|e| CaError::BadConfig(e.to_string()))?;
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| CaError::BadConfig(e.to_string()))?;
    let validity = Validity {
        not_before: Time::UtcTime(
            UtcTime::from_unix_duration(now).map_err(|e| CaError::BadConfig(e.to_string()))?,
        ),
        not_after: Time::UtcTime(
            UtcTime::from_unix_duration(now + ROOT_VALIDITY)
                .map_err(|e| CaError::BadConfig(e.to_string()))?,
        ),
    };

    let extensions = vec![
        encode_extension(
            KeyUsage::OID,
            true,
            &KeyUsage(
                KeyUsages::DigitalSignature | KeyUsages::KeyCertSign | KeyUsages::CRLSign,
            ),
        )
        .map_err(to_ca_error)?,
        encode_extension(
            BasicConstraints::OID,
            true,
            &BasicConstraints { ca: true, path_len_constraint: None },
        )
        .map_err(to_ca_error)?,
        encode_extension(
            SubjectKeyIdentifier::OID,
            false,
            &SubjectKeyIdentifier(
                OctetString::new(
                    spki_key_identifier(spki_der).map_err(to_ca_error)?.to_vec(),
                )
                .map_err(|e| CaError::BadConfig(e.to_string()))?,
            ),
        )
        .map_err(to_ca_error)?,
    ];

    let tbs = TbsCertificate {
        version: Version::V3,
        serial_number: random_serial().map_err(to_ca_error)?,
        signature: signer.signature_algorithm()?,
        issuer: name.clone(),
        validity,
        subject: name,
        subject_public_key_info: SubjectPublicKeyInfoOwned::from_der(spki_der)
            .map_err(|e| CaError::BadConfig(e.to_string()))?,
        issuer_unique_id: None,
        subject_unique_id: None,
        extensions: Some(extensions),
    };

    let tbs_der = tbs.to_der().map_err(|e| CaError::BadConfig(e.to_string()))?;
    let signature = signer.sign(&tbs_der)?;
    crate::cert::builder::assemble_certificate(&tbs_der, &signer.signature_algorithm()?, &signature)
        .map_err(to_ca_error)
}

#[async_trait]
impl CertificateAuthority for EphemeralCa {
    fn issuing_identity(&self) -> Result<IssuingIdentity, CaError> {
        Ok(self.identity.clone())
    }

    async fn create_certificate(&self, tbs_der: &[u8]) -> Result<CodeSigningCertificate, CaError> {
        let signature = self.signer.sign(tbs_der)?;
        Ok(CodeSigningCertificate {
            tbs_der: tbs_der.to_vec(),
            signature,
            signature_algorithm: self.identity.signature_algorithm.clone(),
        })
    }

    async fn trust_bundle(&self) -> Result<Vec<Vec<u8>>, CaError> {
        Ok(vec![self.root_der.clone()])
    }

    async fn root(&self) -> Result<Vec<u8>, CaError> {
        Ok(self.root_der.clone())
    }

    async fn close(&self) {}
}
