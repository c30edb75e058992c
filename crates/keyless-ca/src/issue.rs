use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use der::{Decode, Encode};
use x509_cert::request::CertReq;

use crate::ca::CertificateAuthority;
use crate::cert::builder::{build_tbs, encode_tbs, with_poison, with_sct_list};
use crate::crypto::algorithms::{AlgorithmRegistry, HashKind};
use crate::crypto::keys::PublicKey;
use crate::ctlog::client::CtLogClient;
use crate::error::{ConfigError, IssueError};
use crate::identity::pool::{IssuerKind, IssuerPool};
use crate::identity::principal::Principal;
use crate::oidc::claims::decode_payload_unverified;
use crate::oidc::verifier::TokenVerifier;

/// Hard ceiling on the certificate validity window.
pub const MAX_VALIDITY: Duration = Duration::from_secs(10 * 60);

/// Client key material: a PKCS#10 CSR, or a raw public key plus a signature
/// over the token's `sub` claim. A request carrying both forms is rejected
/// before it reaches this type.
pub enum KeyMaterial {
    Csr(Vec<u8>),
    PublicKey { spki_der: Vec<u8>, proof_of_possession: Vec<u8> },
}

pub struct CertificateRequest {
    pub token: String,
    pub key_material: KeyMaterial,
}

pub struct IssuedCertificate {
    /// Leaf first, root last.
    pub chain_pem: Vec<String>,
    /// TLS-encoded SCT; absent when the server runs without a log.
    pub sct: Option<Vec<u8>>,
}

/// The per-request issuance pipeline: validate, authenticate, authorize the
/// algorithm, check possession, extract the principal, sign, log, assemble.
pub struct IssuanceService {
    pool: ArcSwap<IssuerPool>,
    verifier: TokenVerifier,
    ca: Arc<dyn CertificateAuthority>,
    ct_log: Option<CtLogClient>,
    algorithms: AlgorithmRegistry,
    validity_window: Duration,
}

impl IssuanceService {
    pub fn new(
        pool: IssuerPool,
        verifier: TokenVerifier,
        ca: Arc<dyn CertificateAuthority>,
        ct_log: Option<CtLogClient>,
        algorithms: AlgorithmRegistry,
        validity_window: Duration,
    ) -> Result<Self, ConfigError> {
        if validity_window.is_zero() || validity_window > MAX_VALIDITY {
            return Err(ConfigError::Invalid(format!(
                "validity window must be within (0, {}s]",
                MAX_VALIDITY.as_secs()
            )));
        }
        Ok(IssuanceService {
            pool: ArcSwap::from_pointee(pool),
            verifier,
            ca,
            ct_log,
            algorithms,
            validity_window,
        })
    }

    /// Swap in a freshly loaded issuer pool. In-flight requests keep the
    /// pool they already resolved.
    pub fn reload_issuers(&self, pool: IssuerPool) {
        self.pool.store(Arc::new(pool));
    }

    pub fn issuers(&self) -> Vec<(String, IssuerKind, String)> {
        self.pool.load().list()
    }

    pub async fn trust_bundle_pem(&self) -> Result<Vec<String>, IssueError> {
        let bundle = self.ca.trust_bundle().await?;
        Ok(bundle.iter().map(|der| crate::ca::der_to_pem(der)).collect())
    }

    /// Release the CA backend's resources. Idempotent.
    pub async fn close(&self) {
        self.ca.close().await;
    }

    #[tracing::instrument(skip_all)]
    pub async fn issue(
        &self,
        request: CertificateRequest,
    ) -> Result<IssuedCertificate, IssueError> {
        // Algorithm check comes first: unlisted keys are rejected before any
        // token verification work. The matched entry selects the digest for
        // every proof-of-possession check below.
        let (public_key, spki_der) = parse_key_material(&request.key_material)?;
        let Some(entry) = self.algorithms.lookup(&public_key) else {
            return Err(IssueError::UnsupportedAlgorithm(public_key.kind().to_string()));
        };
        tracing::debug!(algorithm = %public_key.kind(), "algorithm allowed");

        // A CSR proves possession on its own; it is checked before the token
        // is even decoded.
        if let KeyMaterial::Csr(csr_der) = &request.key_material {
            verify_csr_signature(csr_der, entry.hash)?;
        }

        // Unverified peek: the proof-of-possession subject and the issuer
        // routing both come from the raw token; nothing from it is trusted
        // until verification below.
        let unverified = decode_payload_unverified(&request.token)
            .map_err(|e| IssueError::InvalidCredentials(e.to_string()))?;

        if let KeyMaterial::PublicKey { proof_of_possession, .. } = &request.key_material {
            // The signed payload is the UTF-8 bytes of the `sub` claim, with
            // no framing.
            let subject = unverified.subject().ok_or_else(|| {
                IssueError::InvalidCredentials("token has no sub claim".to_string())
            })?;
            public_key
                .verify(entry.hash, subject.as_bytes(), proof_of_possession)
                .map_err(|e| IssueError::FailedPrecondition(e.to_string()))?;
        }
        tracing::debug!("proof of possession verified");

        let iss = unverified
            .issuer()
            .ok_or_else(|| IssueError::InvalidCredentials("token has no iss claim".to_string()))?;
        let pool = self.pool.load();
        let matched = pool
            .lookup(iss, &unverified)
            .ok_or_else(|| IssueError::PermissionDenied(iss.to_string()))?;

        let claims = self
            .verifier
            .verify(&request.token, &matched.issuer_url, &matched.config.client_id)
            .await?;
        tracing::debug!(issuer = %matched.issuer_url, "token verified");

        let principal = Principal::from_claims(matched.config, &matched.issuer_url, &claims)?;
        tracing::debug!(principal = %principal.name(), "principal extracted");

        let issuing = self.ca.issuing_identity()?;
        let clean_tbs = build_tbs(&principal, &spki_der, &issuing, self.validity_window)?;

        match &self.ct_log {
            Some(ct_log) => {
                let clean_tbs_der = encode_tbs(&clean_tbs)?;
                let precert_tbs_der = encode_tbs(&with_poison(&clean_tbs)?)?;
                let precert = self.ca.create_certificate(&precert_tbs_der).await?;
                tracing::debug!("precertificate signed");

                let bundle = self.ca.trust_bundle().await?;
                let mut precert_chain = vec![precert.certificate_der()?];
                precert_chain.extend(bundle.iter().cloned());

                let sct = ct_log
                    .submit_precert(&precert_chain, &clean_tbs_der, &issuing.ca_spki_der)
                    .await?;
                tracing::debug!(timestamp = sct.timestamp, "precertificate logged");

                let final_tbs = with_sct_list(&clean_tbs, &sct.to_list_extension_der()?)?;
                let certificate = self.ca.create_certificate(&encode_tbs(&final_tbs)?).await?;
                tracing::info!(principal = %principal.name(), "certificate issued");

                Ok(IssuedCertificate {
                    chain_pem: certificate.chain_pem(&bundle)?,
                    sct: Some(sct.to_tls_bytes()?),
                })
            }
            None => {
                // No log configured: the clean body is signed once and the
                // response carries no SCT.
                let certificate = self.ca.create_certificate(&encode_tbs(&clean_tbs)?).await?;
                let bundle = self.ca.trust_bundle().await?;
                tracing::info!(principal = %principal.name(), "certificate issued without ct");

                Ok(IssuedCertificate {
                    chain_pem: certificate.chain_pem(&bundle)?,
                    sct: None,
                })
            }
        }
    }
}

fn parse_key_material(material: &KeyMaterial) -> Result<(PublicKey, Vec<u8>), IssueError> {
    match material {
        KeyMaterial::Csr(csr_der) => {
            let csr = CertReq::from_der(csr_der)
                .map_err(|e| IssueError::InvalidArgument(format!("malformed csr: {}", e)))?;
            let spki_der = csr
                .info
                .public_key
                .to_der()
                .map_err(|e| IssueError::InvalidArgument(e.to_string()))?;
            let key = PublicKey::from_spki_der(&spki_der)?;
            Ok((key, spki_der))
        }
        KeyMaterial::PublicKey { spki_der, .. } => {
            let key = PublicKey::from_spki_der(spki_der)?;
            Ok((key, spki_der.clone()))
        }
    }
}

/// A CSR proves possession through its own self-signature, checked with the
/// digest the registry pairs with the key.
fn verify_csr_signature(csr_der: &[u8], hash: HashKind) -> Result<(), IssueError> {
    let csr = CertReq::from_der(csr_der)
        .map_err(|e| IssueError::InvalidArgument(format!("malformed csr: {}", e)))?;
    let message = csr
        .info
        .to_der()
        .map_err(|e| IssueError::InvalidArgument(e.to_string()))?;
    let spki_der = csr
        .info
        .public_key
        .to_der()
        .map_err(|e| IssueError::InvalidArgument(e.to_string()))?;
    let key = PublicKey::from_spki_der(&spki_der)
        .map_err(|e| IssueError::InvalidArgument(e.to_string()))?;
    let signature = csr
        .signature
        .as_bytes()
        .ok_or_else(|| IssueError::InvalidArgument("csr signature has unused bits".to_string()))?;
    key.verify(hash, &message, signature)
        .map_err(|e| IssueError::FailedPrecondition(format!("csr signature: {}", e)))
}
