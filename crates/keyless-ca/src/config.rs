use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::identity::pool::{IssuerConfig, IssuerPool};

/// The trusted-issuer section of the configuration file. `OIDCIssuers` maps
/// literal issuer URLs, `MetaIssuers` maps wildcard URL patterns.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdentityConfig {
    #[serde(rename = "OIDCIssuers", default)]
    pub oidc_issuers: HashMap<String, IssuerConfig>,

    #[serde(rename = "MetaIssuers", default)]
    pub meta_issuers: HashMap<String, IssuerConfig>,
}

impl IdentityConfig {
    /// Validate the configuration and build the lookup pool. All load-time
    /// errors (bad URLs, ambiguous discriminators) surface here.
    pub fn build_pool(&self) -> Result<IssuerPool, ConfigError> {
        IssuerPool::new(&self.oidc_issuers, &self.meta_issuers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::pool::IssuerKind;

    #[test]
    fn test_parse_config_file_spelling() {
        let json = r#"{
            "OIDCIssuers": {
                "https://accounts.example": {
                    "Type": "email",
                    "ClientID": "sigstore"
                },
                "https://token.actions.githubusercontent.com": {
                    "Type": "github-workflow",
                    "ClientID": "sigstore"
                }
            },
            "MetaIssuers": {
                "https://*.sts.example": {
                    "Type": "uri",
                    "ClientID": "sigstore",
                    "SubjectDomain": "https://sts.example"
                }
            }
        }"#;

        let config: IdentityConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.oidc_issuers.len(), 2);
        assert_eq!(
            config.oidc_issuers["https://accounts.example"].kind,
            IssuerKind::Email
        );
        let pool = config.build_pool().unwrap();
        assert_eq!(pool.list().len(), 3);
    }

    #[test]
    fn test_empty_config_builds_empty_pool() {
        let config = IdentityConfig::default();
        let pool = config.build_pool().unwrap();
        assert!(pool.list().is_empty());
    }
}
