//! HTTP surface: issuance, trust bundle, configuration, health.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;

use keyless_ca::{IssuanceService, IssueError};

use crate::api::{
    ApiError, ConfigurationResponse, CreateSigningCertificateBody, IssuerEntry,
    SigningCertificateResponse, TrustBundleResponse,
};

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<IssuanceService>,
    pub deadline: Duration,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/v2/signingCert", post(create_signing_certificate))
        .route("/api/v2/trustBundle", get(trust_bundle))
        .route("/api/v2/configuration", get(configuration))
        .route("/healthz", get(liveness))
        .route("/readyz", get(readiness))
        // A panicking request must not take the server down; the client
        // sees a plain 500.
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::to_string)
}

async fn create_signing_certificate(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CreateSigningCertificateBody>,
) -> Result<Json<SigningCertificateResponse>, ApiError> {
    let request = body.into_request(bearer_token(&headers))?;

    let issued = tokio::time::timeout(state.deadline, state.service.issue(request))
        .await
        .map_err(|_| IssueError::DeadlineExceeded)??;

    Ok(Json(SigningCertificateResponse {
        chain: issued.chain_pem,
        signed_certificate_timestamp: issued.sct.map(|sct| BASE64.encode(sct)),
    }))
}

async fn trust_bundle(
    State(state): State<AppState>,
) -> Result<Json<TrustBundleResponse>, ApiError> {
    let chain = state.service.trust_bundle_pem().await?;
    Ok(Json(TrustBundleResponse { chains: vec![chain] }))
}

async fn configuration(State(state): State<AppState>) -> Json<ConfigurationResponse> {
    let issuers = state
        .service
        .issuers()
        .into_iter()
        .map(|(url, kind, client_id)| IssuerEntry { url, kind, client_id })
        .collect();
    Json(ConfigurationResponse { issuers })
}

async fn liveness() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "SERVING" }))
}

async fn readiness(State(state): State<AppState>) -> Json<serde_json::Value> {
    let status = match state.service.trust_bundle_pem().await {
        Ok(_) => "SERVING",
        Err(_) => "NOT_SERVING",
    };
    Json(serde_json::json!({ "status": status }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use std::collections::HashMap;
    use tower::util::ServiceExt;

    use keyless_ca::ca::EphemeralCa;
    use keyless_ca::crypto::algorithms::AlgorithmRegistry;
    use keyless_ca::identity::pool::{IssuerConfig, IssuerKind, IssuerPool};
    use keyless_ca::oidc::verifier::TokenVerifier;

    fn test_state() -> AppState {
        let mut issuers = HashMap::new();
        issuers.insert(
            "https://accounts.example".to_string(),
            IssuerConfig {
                kind: IssuerKind::Email,
                client_id: "sigstore".to_string(),
                issuer_claim: None,
                subject_domain: None,
                challenge_claim: None,
                spiffe_trust_domain: None,
            },
        );
        let pool = IssuerPool::new(&issuers, &HashMap::new()).unwrap();
        let verifier =
            TokenVerifier::new(reqwest::Client::new(), Duration::from_secs(300), 0);
        let service = IssuanceService::new(
            pool,
            verifier,
            Arc::new(EphemeralCa::new().unwrap()),
            None,
            AlgorithmRegistry::default(),
            Duration::from_secs(600),
        )
        .unwrap();
        AppState { service: Arc::new(service), deadline: Duration::from_secs(5) }
    }

    #[tokio::test]
    async fn test_health_endpoints() {
        let app = router(test_state());
        let response = app
            .clone()
            .oneshot(Request::get("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(Request::get("/readyz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_configuration_lists_issuers() {
        let app = router(test_state());
        let response = app
            .oneshot(Request::get("/api/v2/configuration").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024)
            .await
            .unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["issuers"][0]["url"], "https://accounts.example");
        assert_eq!(value["issuers"][0]["kind"], "email");
        assert_eq!(value["issuers"][0]["clientId"], "sigstore");
    }

    #[tokio::test]
    async fn test_trust_bundle_returns_pem_chain() {
        let app = router(test_state());
        let response = app
            .oneshot(Request::get("/api/v2/trustBundle").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024)
            .await
            .unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        let pem_block = value["chains"][0][0].as_str().unwrap();
        assert!(pem_block.starts_with("-----BEGIN CERTIFICATE-----"));
    }

    #[tokio::test]
    async fn test_missing_key_material_is_bad_request() {
        let app = router(test_state());
        let body = serde_json::json!({
            "credentials": { "oidcIdentityToken": "some-token" }
        });
        let response = app
            .oneshot(
                Request::post("/api/v2/signingCert")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unknown_issuer_is_forbidden() {
        use base64::engine::general_purpose::URL_SAFE_NO_PAD;

        let app = router(test_state());
        // Unsigned token shell with an unconfigured issuer; the pool check
        // fires before signature verification.
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"ES256"}"#);
        let payload = URL_SAFE_NO_PAD.encode(br#"{"iss":"https://evil.example","sub":"x"}"#);
        let token = format!("{}.{}.sig", header, payload);

        let key = p256_spki_pem();
        let body = serde_json::json!({
            "credentials": { "oidcIdentityToken": token },
            "publicKeyRequest": {
                "publicKey": { "content": key.0 },
                "proofOfPossession": BASE64.encode(key.1),
            }
        });
        let response = app
            .oneshot(
                Request::post("/api/v2/signingCert")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    /// A P-256 public key PEM and a signature over the literal subject "x".
    fn p256_spki_pem() -> (String, Vec<u8>) {
        use p256::pkcs8::EncodePublicKey;
        use signature::Signer;
        let key = p256::ecdsa::SigningKey::random(&mut rand::rngs::OsRng);
        let spki = key.verifying_key().to_public_key_der().unwrap();
        let pem_text = pem::encode(&pem::Pem::new("PUBLIC KEY", spki.into_vec()));
        let sig: p256::ecdsa::DerSignature = key.sign(b"x");
        (pem_text, sig.as_bytes().to_vec())
    }
}
