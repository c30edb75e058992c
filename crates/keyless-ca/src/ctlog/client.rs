use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::Serialize;

use crate::crypto::keys::PublicKey;
use crate::ctlog::sct::{AddChainResponse, Sct};
use crate::error::CtLogError;

const ADD_PRE_CHAIN: &str = "/ct/v1/add-pre-chain";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Serialize)]
struct AddChainRequest {
    chain: Vec<String>,
}

/// Client for a CT v1 log's `add-pre-chain` endpoint. Shared across
/// requests; the underlying HTTP transport pools connections.
pub struct CtLogClient {
    http: reqwest::Client,
    url: String,
    log_public_key: Option<PublicKey>,
}

impl CtLogClient {
    /// `extra_tls_root` trusts an additional PEM CA for the log connection
    /// (test logs); `log_public_key_pem` pins the key SCT signatures must
    /// verify against before they are accepted.
    pub fn new(
        url: impl Into<String>,
        extra_tls_root: Option<&[u8]>,
        log_public_key_pem: Option<&str>,
    ) -> Result<Self, CtLogError> {
        let mut builder = reqwest::Client::builder().timeout(REQUEST_TIMEOUT);
        if let Some(root_pem) = extra_tls_root {
            let certificate = reqwest::Certificate::from_pem(root_pem)
                .map_err(|e| CtLogError::Unreachable(e.to_string()))?;
            builder = builder.add_root_certificate(certificate);
        }
        let http = builder
            .build()
            .map_err(|e| CtLogError::Unreachable(e.to_string()))?;

        let log_public_key = match log_public_key_pem {
            Some(pem_text) => Some(
                PublicKey::from_pem(pem_text)
                    .map(|(key, _)| key)
                    .map_err(|e| CtLogError::InvalidSct(e.to_string()))?,
            ),
            None => None,
        };

        Ok(CtLogClient {
            http,
            url: url.into().trim_end_matches('/').to_string(),
            log_public_key,
        })
    }

    /// Submit the precertificate chain (precert leaf first, root last) and
    /// return the log's SCT. Retries once on a 5xx; when a log key is
    /// pinned, the SCT signature is verified before it is accepted.
    pub async fn submit_precert(
        &self,
        precert_chain_der: &[Vec<u8>],
        clean_tbs_der: &[u8],
        issuer_spki_der: &[u8],
    ) -> Result<Sct, CtLogError> {
        let request = AddChainRequest {
            chain: precert_chain_der.iter().map(|der| BASE64.encode(der)).collect(),
        };
        let url = format!("{}{}", self.url, ADD_PRE_CHAIN);

        let mut response = self.post(&url, &request).await?;
        if response.status().is_server_error() {
            tracing::warn!(status = %response.status(), "ct log returned server error, retrying");
            response = self.post(&url, &request).await?;
        }
        let status = response.status();
        if status.is_server_error() {
            return Err(CtLogError::Unreachable(format!("log returned {}", status)));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CtLogError::Rejected(format!("{}: {}", status, body)));
        }

        let body: AddChainResponse = response
            .json()
            .await
            .map_err(|e| CtLogError::Rejected(e.to_string()))?;
        let sct = Sct::from_response(&body)?;

        if let Some(log_key) = &self.log_public_key {
            sct.verify(log_key, clean_tbs_der, issuer_spki_der)?;
            tracing::debug!(timestamp = sct.timestamp, "sct verified against pinned log key");
        }
        Ok(sct)
    }

    async fn post(
        &self,
        url: &str,
        request: &AddChainRequest,
    ) -> Result<reqwest::Response, CtLogError> {
        self.http
            .post(url)
            .json(request)
            .send()
            .await
            .map_err(|e| CtLogError::Unreachable(e.to_string()))
    }
}
