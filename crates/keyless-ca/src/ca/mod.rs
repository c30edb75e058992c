pub mod ephemeral;
pub mod file;
pub mod signer;

pub use ephemeral::*;
pub use file::*;
pub use signer::*;

use async_trait::async_trait;
use x509_cert::spki::AlgorithmIdentifierOwned;

use crate::cert::builder::assemble_certificate;
use crate::error::{CaError, CertificateError};

/// What the issuance handler needs from a CA before constructing a TBS:
/// the issuer Name, the CA public key (for the authority key identifier),
/// and the signature algorithm certificates will carry.
#[derive(Debug, Clone)]
pub struct IssuingIdentity {
    pub issuer_name_der: Vec<u8>,
    pub ca_spki_der: Vec<u8>,
    pub signature_algorithm: AlgorithmIdentifierOwned,
}

/// A signed to-be-signed body. The handler assembles the certificate; the
/// CA only contributes the signature.
#[derive(Debug, Clone)]
pub struct CodeSigningCertificate {
    pub tbs_der: Vec<u8>,
    pub signature: Vec<u8>,
    pub signature_algorithm: AlgorithmIdentifierOwned,
}

impl CodeSigningCertificate {
    pub fn certificate_der(&self) -> Result<Vec<u8>, CertificateError> {
        assemble_certificate(&self.tbs_der, &self.signature_algorithm, &self.signature)
    }

    pub fn certificate_pem(&self) -> Result<String, CertificateError> {
        Ok(der_to_pem(&self.certificate_der()?))
    }

    /// The full chain, leaf first, as PEM blocks.
    pub fn chain_pem(&self, trust_bundle: &[Vec<u8>]) -> Result<Vec<String>, CertificateError> {
        let mut chain = vec![self.certificate_pem()?];
        chain.extend(trust_bundle.iter().map(|der| der_to_pem(der)));
        Ok(chain)
    }
}

pub fn der_to_pem(der: &[u8]) -> String {
    pem::encode(&pem::Pem::new("CERTIFICATE", der.to_vec()))
}

/// The contract every signing backend satisfies.
///
/// The handler constructs the `tbsCertificate`; `create_certificate` signs
/// exactly those bytes with the digest matching the CA key and must not
/// alter them. SCT embedding is the handler's job, never the backend's.
/// Backend-specific failures are translated into `CaError`; the handler
/// never inspects backend internals.
#[async_trait]
pub trait CertificateAuthority: Send + Sync {
    fn issuing_identity(&self) -> Result<IssuingIdentity, CaError>;

    async fn create_certificate(&self, tbs_der: &[u8]) -> Result<CodeSigningCertificate, CaError>;

    /// Chain to return with issued artifacts, leaf-issuer first, root last.
    async fn trust_bundle(&self) -> Result<Vec<Vec<u8>>, CaError>;

    async fn root(&self) -> Result<Vec<u8>, CaError>;

    /// Idempotent release of held resources.
    async fn close(&self);
}
