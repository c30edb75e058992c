//! JSON request and response shapes of the REST surface, and the mapping
//! from pipeline errors to HTTP statuses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};

use keyless_ca::{CertificateRequest, IssueError, KeyMaterial};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSigningCertificateBody {
    #[serde(default)]
    pub credentials: Option<Credentials>,

    /// Base64 PKCS#10 DER.
    #[serde(default)]
    pub certificate_signing_request: Option<String>,

    #[serde(default)]
    pub public_key_request: Option<PublicKeyRequest>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    pub oidc_identity_token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicKeyRequest {
    pub public_key: PublicKeyBody,
    /// Base64 signature over the token's `sub` claim.
    pub proof_of_possession: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicKeyBody {
    /// Informational; the key itself determines the algorithm.
    #[serde(default)]
    pub algorithm: Option<String>,
    /// PEM `PUBLIC KEY` block.
    pub content: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SigningCertificateResponse {
    /// Leaf first, root last.
    pub chain: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signed_certificate_timestamp: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TrustBundleResponse {
    pub chains: Vec<Vec<String>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigurationResponse {
    pub issuers: Vec<IssuerEntry>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuerEntry {
    pub url: String,
    pub kind: keyless_ca::identity::pool::IssuerKind,
    pub client_id: String,
}

impl CreateSigningCertificateBody {
    /// Convert the wire shape into a pipeline request. The bearer token from
    /// the Authorization header fills the credentials slot when the body
    /// omits it; a request carrying both a CSR and a raw key is rejected.
    pub fn into_request(self, bearer: Option<String>) -> Result<CertificateRequest, IssueError> {
        let token = self
            .credentials
            .map(|c| c.oidc_identity_token)
            .or(bearer)
            .ok_or_else(|| {
                IssueError::InvalidArgument("missing oidc identity token".to_string())
            })?;

        let key_material = match (self.certificate_signing_request, self.public_key_request) {
            (Some(_), Some(_)) => {
                return Err(IssueError::InvalidArgument(
                    "provide either a csr or a public key, not both".to_string(),
                ))
            }
            (None, None) => {
                return Err(IssueError::InvalidArgument(
                    "missing key material".to_string(),
                ))
            }
            (Some(csr_b64), None) => KeyMaterial::Csr(
                BASE64
                    .decode(csr_b64.as_bytes())
                    .map_err(|e| IssueError::InvalidArgument(format!("csr: {}", e)))?,
            ),
            (None, Some(pk)) => {
                let block = pem::parse(pk.public_key.content.as_bytes())
                    .map_err(|e| IssueError::InvalidArgument(format!("public key: {}", e)))?;
                if block.tag() != "PUBLIC KEY" {
                    return Err(IssueError::InvalidArgument(format!(
                        "expected PUBLIC KEY pem block, got {}",
                        block.tag()
                    )));
                }
                KeyMaterial::PublicKey {
                    spki_der: block.into_contents(),
                    proof_of_possession: BASE64
                        .decode(pk.proof_of_possession.as_bytes())
                        .map_err(|e| {
                            IssueError::InvalidArgument(format!("proof of possession: {}", e))
                        })?,
                }
            }
        };

        Ok(CertificateRequest { token, key_material })
    }
}

/// Wrapper carrying a pipeline error out of a handler.
pub struct ApiError(pub IssueError);

impl From<IssueError> for ApiError {
    fn from(err: IssueError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind) = match &self.0 {
            IssueError::InvalidArgument(_) => (StatusCode::BAD_REQUEST, "invalid-argument"),
            IssueError::UnsupportedAlgorithm(_) => {
                (StatusCode::BAD_REQUEST, "unsupported-algorithm")
            }
            IssueError::InvalidCredentials(_) => {
                (StatusCode::UNAUTHORIZED, "invalid-credentials")
            }
            IssueError::PermissionDenied(_) => (StatusCode::FORBIDDEN, "permission-denied"),
            IssueError::FailedPrecondition(_) => {
                (StatusCode::PRECONDITION_FAILED, "failed-precondition")
            }
            IssueError::Unavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "unavailable"),
            IssueError::DeadlineExceeded => (StatusCode::GATEWAY_TIMEOUT, "deadline-exceeded"),
            IssueError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };

        // Internal details are logged server-side, never returned.
        let message = match &self.0 {
            IssueError::Internal(details) => {
                tracing::error!(details, "internal error");
                "internal error".to_string()
            }
            other => other.to_string(),
        };

        (status, Json(serde_json::json!({ "error": kind, "message": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bearer_fills_missing_credentials() {
        let body = CreateSigningCertificateBody {
            credentials: None,
            certificate_signing_request: Some(BASE64.encode(b"csr")),
            public_key_request: None,
        };
        let request = body.into_request(Some("token-from-header".to_string())).unwrap();
        assert_eq!(request.token, "token-from-header");
    }

    #[test]
    fn test_both_key_forms_rejected() {
        let body = CreateSigningCertificateBody {
            credentials: Some(Credentials { oidc_identity_token: "t".to_string() }),
            certificate_signing_request: Some(BASE64.encode(b"csr")),
            public_key_request: Some(PublicKeyRequest {
                public_key: PublicKeyBody { algorithm: None, content: "x".to_string() },
                proof_of_possession: BASE64.encode(b"sig"),
            }),
        };
        assert!(matches!(
            body.into_request(None),
            Err(IssueError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_missing_token_rejected() {
        let body = CreateSigningCertificateBody {
            credentials: None,
            certificate_signing_request: Some(BASE64.encode(b"csr")),
            public_key_request: None,
        };
        assert!(matches!(
            body.into_request(None),
            Err(IssueError::InvalidArgument(_))
        ));
    }
}
