use std::sync::Arc;
use std::time::Duration;

use jsonwebtoken::jwk::JwkSet;
use moka::future::Cache;
use serde::Deserialize;

use crate::error::TokenError;

#[derive(Debug, Deserialize)]
struct DiscoveryDocument {
    jwks_uri: String,
}

/// Per-issuer JWKS cache.
///
/// Documents are fetched lazily on first use and expire after the configured
/// TTL. Population is single-flight per issuer: concurrent misses coalesce
/// into one discovery + JWKS fetch, the rest await the shared result.
pub struct KeySetCache {
    http: reqwest::Client,
    cache: Cache<String, Arc<JwkSet>>,
}

impl KeySetCache {
    pub fn new(http: reqwest::Client, ttl: Duration) -> Self {
        let cache = Cache::builder().time_to_live(ttl).build();
        KeySetCache { http, cache }
    }

    /// Get the key set for an issuer, fetching it if absent or expired.
    pub async fn get(&self, issuer: &str) -> Result<Arc<JwkSet>, TokenError> {
        let http = self.http.clone();
        let url = issuer.to_string();
        self.cache
            .try_get_with(issuer.to_string(), async move { fetch_jwks(&http, &url).await })
            .await
            .map_err(|e: Arc<TokenError>| TokenError::ProviderUnreachable(e.to_string()))
    }

    /// Drop the cached key set and refetch. Used when a token references a
    /// `kid` the cached set does not contain (key rotation).
    pub async fn refresh(&self, issuer: &str) -> Result<Arc<JwkSet>, TokenError> {
        self.cache.invalidate(issuer).await;
        self.get(issuer).await
    }
}

async fn fetch_jwks(http: &reqwest::Client, issuer: &str) -> Result<Arc<JwkSet>, TokenError> {
    let discovery_url = format!(
        "{}/.well-known/openid-configuration",
        issuer.trim_end_matches('/')
    );
    tracing::debug!(issuer, "fetching oidc discovery document");

    let discovery: DiscoveryDocument = http
        .get(&discovery_url)
        .send()
        .await
        .map_err(|e| TokenError::ProviderUnreachable(e.to_string()))?
        .error_for_status()
        .map_err(|e| TokenError::ProviderUnreachable(e.to_string()))?
        .json()
        .await
        .map_err(|e| TokenError::ProviderUnreachable(e.to_string()))?;

    let jwks: JwkSet = http
        .get(&discovery.jwks_uri)
        .send()
        .await
        .map_err(|e| TokenError::ProviderUnreachable(e.to_string()))?
        .error_for_status()
        .map_err(|e| TokenError::ProviderUnreachable(e.to_string()))?
        .json()
        .await
        .map_err(|e| TokenError::ProviderUnreachable(e.to_string()))?;

    Ok(Arc::new(jwks))
}
