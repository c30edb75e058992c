use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use der::Encode;
use serde::Deserialize;
use tls_codec::{
    DeserializeBytes, SerializeBytes, TlsByteVecU16, TlsByteVecU24, TlsSerializeBytes, TlsSize,
};
use x509_cert::ext::pkix::sct::{
    DigitallySigned, HashAlgorithm, LogId, SerializedSct, SignedCertificateTimestamp,
    SignedCertificateTimestampList, Version as SctVersion,
};

use crate::crypto::algorithms::HashKind;
use crate::crypto::hash::sha256;
use crate::crypto::keys::PublicKey;
use crate::error::CtLogError;

// TLS structures for the RFC 6962 signing payload of a precert entry.
#[derive(PartialEq, Debug, TlsSerializeBytes, TlsSize)]
#[repr(u8)]
enum SignatureType {
    CertificateTimestamp = 0,
    #[allow(dead_code)]
    TreeHash = 1,
}

#[derive(PartialEq, Debug, TlsSerializeBytes, TlsSize)]
#[repr(u16)]
enum LogEntryType {
    #[allow(dead_code)]
    X509Entry = 0,
    PrecertEntry = 1,
}

#[derive(PartialEq, Debug, TlsSerializeBytes, TlsSize)]
struct PreCert {
    issuer_key_hash: [u8; 32],
    tbs_certificate: TlsByteVecU24,
}

#[derive(PartialEq, Debug, TlsSerializeBytes, TlsSize)]
#[repr(u16)]
enum SignedEntry {
    #[tls_codec(discriminant = "LogEntryType::PrecertEntry")]
    PrecertEntry(PreCert),
}

#[derive(PartialEq, Debug, TlsSerializeBytes, TlsSize)]
struct SctSignedPayload {
    version: SctVersion,
    signature_type: SignatureType,
    timestamp: u64,
    signed_entry: SignedEntry,
    extensions: TlsByteVecU16,
}

/// JSON body of an RFC 6962 `add-pre-chain` response.
#[derive(Debug, Deserialize)]
pub struct AddChainResponse {
    pub sct_version: u8,
    pub id: String,
    pub timestamp: u64,
    #[serde(default)]
    pub extensions: String,
    pub signature: String,
}

/// A signed certificate timestamp received from a log.
#[derive(Debug)]
pub struct Sct {
    pub log_id: [u8; 32],
    pub timestamp: u64,
    pub extensions: Vec<u8>,
    pub signature: DigitallySigned,
}

/// TLS round-trip clone, since `DigitallySigned` does not implement `Clone`.
fn clone_digitally_signed(signature: &DigitallySigned) -> DigitallySigned {
    let bytes = signature.tls_serialize().expect("DigitallySigned always serializes");
    let (cloned, rest) =
        DigitallySigned::tls_deserialize_bytes(&bytes).expect("round-trip of own serialization");
    debug_assert!(rest.is_empty());
    cloned
}

impl Sct {
    pub fn from_response(response: &AddChainResponse) -> Result<Self, CtLogError> {
        if response.sct_version != 0 {
            return Err(CtLogError::InvalidSct(format!(
                "unsupported sct version {}",
                response.sct_version
            )));
        }
        let log_id: [u8; 32] = BASE64
            .decode(&response.id)
            .map_err(|e| CtLogError::InvalidSct(e.to_string()))?
            .try_into()
            .map_err(|_| CtLogError::InvalidSct("log id must be 32 bytes".to_string()))?;
        let extensions = BASE64
            .decode(&response.extensions)
            .map_err(|e| CtLogError::InvalidSct(e.to_string()))?;
        let signature_bytes = BASE64
            .decode(&response.signature)
            .map_err(|e| CtLogError::InvalidSct(e.to_string()))?;
        let (signature, rest) = DigitallySigned::tls_deserialize_bytes(&signature_bytes)
            .map_err(|e| CtLogError::InvalidSct(e.to_string()))?;
        if !rest.is_empty() {
            return Err(CtLogError::InvalidSct(
                "trailing bytes after sct signature".to_string(),
            ));
        }

        Ok(Sct { log_id, timestamp: response.timestamp, extensions, signature })
    }

    fn to_rfc6962(&self) -> SignedCertificateTimestamp {
        SignedCertificateTimestamp {
            version: SctVersion::V1,
            log_id: LogId { key_id: self.log_id },
            timestamp: self.timestamp,
            extensions: TlsByteVecU16::from_slice(&self.extensions),
            signature: clone_digitally_signed(&self.signature),
        }
    }

    /// TLS-encoded SCT, the form returned to clients.
    pub fn to_tls_bytes(&self) -> Result<Vec<u8>, CtLogError> {
        self.to_rfc6962()
            .tls_serialize()
            .map_err(|e| CtLogError::InvalidSct(e.to_string()))
    }

    /// DER `SignedCertificateTimestampList` for embedding as an extension.
    pub fn to_list_extension_der(&self) -> Result<Vec<u8>, CtLogError> {
        let serialized = SerializedSct::new(self.to_rfc6962())
            .map_err(|e| CtLogError::InvalidSct(format!("{:?}", e)))?;
        let list = SignedCertificateTimestampList::new(&[serialized])
            .map_err(|e| CtLogError::InvalidSct(format!("{:?}", e)))?;
        list.to_der()
            .map_err(|e| CtLogError::InvalidSct(e.to_string()))
    }

    /// Verify the log's signature over the precert entry this SCT covers.
    /// `clean_tbs_der` is the TBS without poison (and without the SCT list);
    /// the issuer key hash is SHA-256 over the CA's DER SPKI.
    pub fn verify(
        &self,
        log_key: &PublicKey,
        clean_tbs_der: &[u8],
        issuer_spki_der: &[u8],
    ) -> Result<(), CtLogError> {
        let payload = SctSignedPayload {
            version: SctVersion::V1,
            signature_type: SignatureType::CertificateTimestamp,
            timestamp: self.timestamp,
            signed_entry: SignedEntry::PrecertEntry(PreCert {
                issuer_key_hash: sha256(issuer_spki_der),
                tbs_certificate: clean_tbs_der.into(),
            }),
            extensions: TlsByteVecU16::from_slice(&self.extensions),
        };
        let message = payload
            .tls_serialize()
            .map_err(|e| CtLogError::InvalidSct(e.to_string()))?;

        let hash = match &self.signature.algorithm.hash {
            HashAlgorithm::Sha256 => HashKind::Sha256,
            HashAlgorithm::Sha384 => HashKind::Sha384,
            HashAlgorithm::Sha512 => HashKind::Sha512,
            other => {
                return Err(CtLogError::InvalidSct(format!(
                    "unsupported sct hash algorithm {:?}",
                    other
                )))
            }
        };
        log_key
            .verify(hash, &message, self.signature.signature.as_slice())
            .map_err(|e| CtLogError::InvalidSct(e.to_string()))
    }
}
