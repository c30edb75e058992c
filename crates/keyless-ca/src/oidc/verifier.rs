use std::time::Duration;

use jsonwebtoken::jwk::{Jwk, JwkSet};
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde_json::{Map, Value};

use crate::error::TokenError;
use crate::oidc::claims::ClaimSet;
use crate::oidc::jwks::KeySetCache;

/// Cryptographically verifies OIDC tokens against their issuer's published
/// keys. Safe to share across requests.
pub struct TokenVerifier {
    keys: KeySetCache,
    leeway_secs: u64,
}

impl TokenVerifier {
    pub fn new(http: reqwest::Client, jwks_ttl: Duration, leeway_secs: u64) -> Self {
        TokenVerifier { keys: KeySetCache::new(http, jwks_ttl), leeway_secs }
    }

    /// Verify signature, issuer, audience, and validity window. `issuer_url`
    /// is the wildcard-resolved issuer from the pool lookup; `client_id` the
    /// audience the matched configuration requires.
    pub async fn verify(
        &self,
        token: &str,
        issuer_url: &str,
        client_id: &str,
    ) -> Result<ClaimSet, TokenError> {
        let header = decode_header(token).map_err(|e| TokenError::Malformed(e.to_string()))?;
        let algorithm = match header.alg {
            Algorithm::RS256 | Algorithm::ES256 | Algorithm::ES384 | Algorithm::EdDSA => header.alg,
            other => {
                return Err(TokenError::Rejected(format!(
                    "token algorithm {:?} not accepted",
                    other
                )))
            }
        };

        let jwks = self.keys.get(issuer_url).await?;
        let jwk = match find_key(&jwks, header.kid.as_deref()) {
            Some(jwk) => jwk.clone(),
            None => {
                // Unknown kid: the provider may have rotated keys since the
                // cached fetch. Refresh once within the request.
                tracing::debug!(issuer = issuer_url, "kid not in cached jwks, refreshing");
                let jwks = self.keys.refresh(issuer_url).await?;
                find_key(&jwks, header.kid.as_deref())
                    .cloned()
                    .ok_or_else(|| TokenError::Rejected("no key matches token kid".to_string()))?
            }
        };

        let decoding_key =
            DecodingKey::from_jwk(&jwk).map_err(|e| TokenError::Rejected(e.to_string()))?;

        let mut validation = Validation::new(algorithm);
        validation.set_issuer(&[issuer_url]);
        validation.set_audience(&[client_id]);
        validation.leeway = self.leeway_secs;
        validation.validate_nbf = true;

        let data = decode::<Map<String, Value>>(token, &decoding_key, &validation)
            .map_err(|e| TokenError::Rejected(e.to_string()))?;
        Ok(ClaimSet::new(data.claims))
    }
}

fn find_key<'a>(jwks: &'a JwkSet, kid: Option<&str>) -> Option<&'a Jwk> {
    match kid {
        Some(kid) => jwks.find(kid),
        // Tokens without a kid are acceptable only against a single-key set.
        None => match jwks.keys.as_slice() {
            [only] => Some(only),
            _ => None,
        },
    }
}
