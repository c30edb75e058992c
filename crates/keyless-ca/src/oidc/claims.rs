use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde_json::{Map, Value};

use crate::error::{PrincipalError, TokenError};

/// The claim set of a token. Before `TokenVerifier::verify` returns one, the
/// contents are attacker-controlled; only `iss`, `sub` and the header `kid`
/// may be peeked at unverified, and only to route the request.
#[derive(Debug, Clone)]
pub struct ClaimSet(Map<String, Value>);

impl ClaimSet {
    pub fn new(claims: Map<String, Value>) -> Self {
        ClaimSet(claims)
    }

    pub fn issuer(&self) -> Option<&str> {
        self.get_str("iss")
    }

    pub fn subject(&self) -> Option<&str> {
        self.get_str("sub")
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(Value::as_str)
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        self.0.get(name).and_then(Value::as_bool)
    }

    pub fn has(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn require_str(&self, name: &str) -> Result<&str, PrincipalError> {
        self.get_str(name).ok_or_else(|| PrincipalError::MissingClaim(name.to_string()))
    }
}

/// Decode the payload of a JWT without verifying anything.
///
/// JWTs are `header.payload.signature` with base64url-encoded JSON parts.
/// The result is used only to select the issuer configuration and to obtain
/// the proof-of-possession subject; the token is still fully verified before
/// any claim reaches a certificate.
pub fn decode_payload_unverified(token: &str) -> Result<ClaimSet, TokenError> {
    let mut parts = token.split('.');
    let (Some(_), Some(payload), Some(_), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(TokenError::Malformed("expected three jwt segments".to_string()));
    };

    let payload_bytes = URL_SAFE_NO_PAD
        .decode(payload.as_bytes())
        .map_err(|e| TokenError::Malformed(e.to_string()))?;
    let claims: Map<String, Value> = serde_json::from_slice(&payload_bytes)
        .map_err(|e| TokenError::Malformed(e.to_string()))?;
    Ok(ClaimSet::new(claims))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_segment(value: &Value) -> String {
        URL_SAFE_NO_PAD.encode(serde_json::to_vec(value).unwrap())
    }

    #[test]
    fn test_decode_payload_unverified() {
        let header = encode_segment(&serde_json::json!({"alg": "RS256"}));
        let payload = encode_segment(&serde_json::json!({
            "iss": "https://accounts.example",
            "sub": "user-123",
        }));
        let token = format!("{}.{}.sig", header, payload);

        let claims = decode_payload_unverified(&token).unwrap();
        assert_eq!(claims.issuer(), Some("https://accounts.example"));
        assert_eq!(claims.subject(), Some("user-123"));
    }

    #[test]
    fn test_reject_wrong_segment_count() {
        assert!(decode_payload_unverified("only.two").is_err());
        assert!(decode_payload_unverified("a.b.c.d").is_err());
    }
}
