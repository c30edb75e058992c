//! Server configuration: the trusted-issuer map shared with the library,
//! plus process-level settings (CA backend, CT log, ports, windows).

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use serde::Deserialize;

use keyless_ca::ca::{CertificateAuthority, EphemeralCa, FileCa};
use keyless_ca::config::IdentityConfig;
use keyless_ca::crypto::algorithms::AlgorithmRegistry;
use keyless_ca::ctlog::client::CtLogClient;
use keyless_ca::oidc::verifier::TokenVerifier;
use keyless_ca::IssuanceService;

fn default_port() -> u16 {
    5555
}
fn default_validity_seconds() -> u64 {
    600
}
fn default_jwks_cache_seconds() -> u64 {
    300
}
fn default_request_deadline_seconds() -> u64 {
    25
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(flatten)]
    pub identity: IdentityConfig,

    #[serde(default)]
    pub ca: CaSettings,

    /// Absent means certificates are issued without transparency logging.
    #[serde(default)]
    pub ct_log: Option<CtLogSettings>,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_validity_seconds")]
    pub validity_seconds: u64,

    /// Registry names, e.g. "ecdsa-p256-sha256"; absent means the default
    /// allow-list.
    #[serde(default)]
    pub allowed_algorithms: Option<Vec<String>>,

    #[serde(default = "default_jwks_cache_seconds")]
    pub jwks_cache_seconds: u64,

    /// Clock skew tolerated on exp/nbf, zero unless configured.
    #[serde(default)]
    pub clock_leeway_seconds: u64,

    #[serde(default = "default_request_deadline_seconds")]
    pub request_deadline_seconds: u64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(tag = "backend", rename_all = "kebab-case")]
pub enum CaSettings {
    #[default]
    Ephemeral,
    File {
        key_path: PathBuf,
        chain_path: PathBuf,
        /// Environment variable holding the key passphrase.
        password_env: Option<String>,
        #[serde(default = "default_true")]
        watch: bool,
    },
}

#[derive(Debug, Deserialize)]
pub struct CtLogSettings {
    pub url: String,
    /// Extra PEM root to trust for the log connection (test logs).
    pub tls_ca_path: Option<PathBuf>,
    /// PEM public key SCTs must verify against.
    pub public_key_path: Option<PathBuf>,
}

impl ServerConfig {
    /// Load from a JSON or YAML file, selected by extension.
    pub fn load(path: &Path) -> anyhow::Result<ServerConfig> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config = match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => serde_yaml::from_str(&raw)
                .with_context(|| format!("parsing yaml config {}", path.display()))?,
            _ => serde_json::from_str(&raw)
                .with_context(|| format!("parsing json config {}", path.display()))?,
        };
        Ok(config)
    }

    pub fn build_ca(&self) -> anyhow::Result<Arc<dyn CertificateAuthority>> {
        match &self.ca {
            CaSettings::Ephemeral => {
                tracing::warn!("using ephemeral ca: key material will not survive restart");
                Ok(Arc::new(EphemeralCa::new()?))
            }
            CaSettings::File { key_path, chain_path, password_env, watch } => {
                let password = match password_env {
                    Some(var) => Some(
                        std::env::var(var)
                            .with_context(|| format!("reading key passphrase from ${}", var))?,
                    ),
                    None => None,
                };
                Ok(Arc::new(FileCa::new(key_path, chain_path, password, *watch)?))
            }
        }
    }

    /// Assemble the issuance service from this configuration. Every
    /// load-time validation error surfaces here, before the server binds.
    pub fn build_service(&self) -> anyhow::Result<IssuanceService> {
        let pool = self.identity.build_pool()?;
        let verifier = TokenVerifier::new(
            reqwest::Client::new(),
            Duration::from_secs(self.jwks_cache_seconds),
            self.clock_leeway_seconds,
        );
        let ca = self.build_ca()?;

        let ct_log = match &self.ct_log {
            Some(settings) => {
                if settings.url.is_empty() {
                    bail!("ct_log.url must not be empty when ct_log is configured");
                }
                let tls_root = match &settings.tls_ca_path {
                    Some(path) => Some(
                        std::fs::read(path)
                            .with_context(|| format!("reading {}", path.display()))?,
                    ),
                    None => None,
                };
                let public_key = match &settings.public_key_path {
                    Some(path) => Some(
                        std::fs::read_to_string(path)
                            .with_context(|| format!("reading {}", path.display()))?,
                    ),
                    None => None,
                };
                Some(CtLogClient::new(
                    &settings.url,
                    tls_root.as_deref(),
                    public_key.as_deref(),
                )?)
            }
            None => None,
        };

        let algorithms = match &self.allowed_algorithms {
            Some(names) => AlgorithmRegistry::from_names(names)?,
            None => AlgorithmRegistry::default(),
        };

        let service = IssuanceService::new(
            pool,
            verifier,
            ca,
            ct_log,
            algorithms,
            Duration::from_secs(self.validity_seconds),
        )?;
        Ok(service)
    }

    pub fn request_deadline(&self) -> Duration {
        Duration::from_secs(self.request_deadline_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_json_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{
                "OIDCIssuers": {
                    "https://accounts.example": {
                        "Type": "email",
                        "ClientID": "sigstore"
                    }
                }
            }"#,
        )
        .unwrap();

        let config = ServerConfig::load(&path).unwrap();
        assert_eq!(config.port, 5555);
        assert_eq!(config.validity_seconds, 600);
        assert!(config.ct_log.is_none());
        config.build_service().unwrap();
    }

    #[test]
    fn test_yaml_config_with_settings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            concat!(
                "OIDCIssuers:\n",
                "  https://accounts.example:\n",
                "    Type: email\n",
                "    ClientID: sigstore\n",
                "port: 8080\n",
                "validity_seconds: 300\n",
                "allowed_algorithms: [ecdsa-p256-sha256]\n",
            ),
        )
        .unwrap();

        let config = ServerConfig::load(&path).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.validity_seconds, 300);
        config.build_service().unwrap();
    }

    #[test]
    fn test_oversized_validity_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"validity_seconds": 3600}"#).unwrap();
        let config = ServerConfig::load(&path).unwrap();
        assert!(config.build_service().is_err());
    }
}
