use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::oidc::claims::ClaimSet;

/// The principal-extraction strategy an issuer configuration selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum IssuerKind {
    #[serde(rename = "email")]
    Email,
    #[serde(rename = "spiffe")]
    Spiffe,
    #[serde(rename = "uri")]
    Uri,
    #[serde(rename = "username")]
    Username,
    #[serde(rename = "github-workflow")]
    GithubWorkflow,
    #[serde(rename = "gitlab-pipeline")]
    GitlabPipeline,
    #[serde(rename = "buildkite")]
    Buildkite,
    #[serde(rename = "ci-provider")]
    CiProvider,
}

/// One trusted identity provider. Immutable for the lifetime of a pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuerConfig {
    #[serde(rename = "Type")]
    pub kind: IssuerKind,

    /// Audience the token must carry.
    #[serde(rename = "ClientID")]
    pub client_id: String,

    /// Discriminator claim for configurations sharing an issuer URL: the
    /// configuration matches only when the token carries this claim.
    #[serde(rename = "IssuerClaim", default, skip_serializing_if = "Option::is_none")]
    pub issuer_claim: Option<String>,

    /// Host constraint for uri identities, name suffix for username ones.
    #[serde(rename = "SubjectDomain", default, skip_serializing_if = "Option::is_none")]
    pub subject_domain: Option<String>,

    /// Claim holding the subject for non-email kinds; defaults to `sub`.
    #[serde(rename = "ChallengeClaim", default, skip_serializing_if = "Option::is_none")]
    pub challenge_claim: Option<String>,

    #[serde(rename = "SPIFFETrustDomain", default, skip_serializing_if = "Option::is_none")]
    pub spiffe_trust_domain: Option<String>,
}

impl IssuerConfig {
    pub fn subject_claim(&self) -> &str {
        self.challenge_claim.as_deref().unwrap_or("sub")
    }
}

/// An issuer URL pattern: either a literal URL or a URL whose host has a `*`
/// in exactly one label position.
#[derive(Debug, Clone, PartialEq, Eq)]
struct UrlPattern {
    scheme: String,
    host_labels: Vec<String>,
    rest: String,
}

impl UrlPattern {
    fn parse(pattern: &str) -> Result<Self, ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidIssuerUrl {
            url: pattern.to_string(),
            reason: reason.to_string(),
        };

        let (scheme, remainder) = pattern
            .split_once("://")
            .ok_or_else(|| invalid("missing scheme"))?;
        let (host, rest) = match remainder.split_once('/') {
            Some((host, path)) => (host, format!("/{}", path)),
            None => (remainder, String::new()),
        };
        if host.is_empty() {
            return Err(invalid("missing host"));
        }
        let host_labels: Vec<String> = host.split('.').map(str::to_string).collect();

        let wildcard_labels = host_labels.iter().filter(|l| l.contains('*')).count();
        if wildcard_labels > 1 || host_labels.iter().any(|l| l.contains('*') && l != "*") {
            return Err(invalid("wildcard must replace exactly one whole host label"));
        }
        if rest.contains('*') || scheme.contains('*') {
            return Err(invalid("wildcard allowed in host only"));
        }

        Ok(UrlPattern { scheme: scheme.to_string(), host_labels, rest })
    }

    fn is_wildcard(&self) -> bool {
        self.host_labels.iter().any(|l| l == "*")
    }

    fn matches(&self, url: &str) -> bool {
        let Some((scheme, remainder)) = url.split_once("://") else {
            return false;
        };
        let (host, rest) = match remainder.split_once('/') {
            Some((host, path)) => (host, format!("/{}", path)),
            None => (remainder, String::new()),
        };
        if scheme != self.scheme || rest != self.rest {
            return false;
        }
        let labels: Vec<&str> = host.split('.').collect();
        if labels.len() != self.host_labels.len() {
            return false;
        }
        labels
            .iter()
            .zip(&self.host_labels)
            .all(|(have, want)| want == "*" || have == want)
    }
}

struct PoolEntry {
    pattern: UrlPattern,
    pattern_text: String,
    configs: Vec<IssuerConfig>,
}

/// The matched configuration together with the concrete issuer URL that a
/// wildcard pattern resolved to.
#[derive(Debug, Clone)]
pub struct MatchedIssuer<'a> {
    pub issuer_url: String,
    pub config: &'a IssuerConfig,
}

/// Maps a token's `iss` claim to an issuer configuration.
///
/// Built once from configuration at startup and replaced atomically on
/// reload; lookups never block.
pub struct IssuerPool {
    exact: HashMap<String, PoolEntry>,
    wildcard: Vec<PoolEntry>,
}

impl IssuerPool {
    pub fn new(
        issuers: &HashMap<String, IssuerConfig>,
        meta_issuers: &HashMap<String, IssuerConfig>,
    ) -> Result<Self, ConfigError> {
        let mut grouped: HashMap<String, Vec<IssuerConfig>> = HashMap::new();
        for (url, config) in issuers.iter().chain(meta_issuers.iter()) {
            grouped.entry(url.clone()).or_default().push(config.clone());
        }

        let mut exact = HashMap::new();
        let mut wildcard = Vec::new();
        for (url, configs) in grouped {
            validate_discriminators(&url, &configs)?;
            let pattern = UrlPattern::parse(&url)?;
            let entry = PoolEntry { pattern_text: url.clone(), pattern, configs };
            if entry.pattern.is_wildcard() {
                wildcard.push(entry);
            } else {
                exact.insert(url, entry);
            }
        }
        // Deterministic wildcard probe order across reloads.
        wildcard.sort_by(|a, b| a.pattern_text.cmp(&b.pattern_text));

        Ok(IssuerPool { exact, wildcard })
    }

    /// Resolve the issuer configuration for a presented `iss` claim. Exact
    /// URL matches win over wildcard matches.
    pub fn lookup(&self, iss: &str, claims: &ClaimSet) -> Option<MatchedIssuer<'_>> {
        if let Some(entry) = self.exact.get(iss) {
            if let Some(config) = select_config(&entry.configs, claims) {
                return Some(MatchedIssuer { issuer_url: iss.to_string(), config });
            }
        }
        for entry in &self.wildcard {
            if entry.pattern.matches(iss) {
                if let Some(config) = select_config(&entry.configs, claims) {
                    return Some(MatchedIssuer { issuer_url: iss.to_string(), config });
                }
            }
        }
        None
    }

    /// All configured issuers, for the configuration endpoint.
    pub fn list(&self) -> Vec<(String, IssuerKind, String)> {
        let mut entries: Vec<(String, IssuerKind, String)> = self
            .exact
            .values()
            .chain(self.wildcard.iter())
            .flat_map(|entry| {
                entry.configs.iter().map(|c| {
                    (entry.pattern_text.clone(), c.kind, c.client_id.clone())
                })
            })
            .collect();
        entries.sort();
        entries
    }
}

fn validate_discriminators(url: &str, configs: &[IssuerConfig]) -> Result<(), ConfigError> {
    let defaults = configs.iter().filter(|c| c.issuer_claim.is_none()).count();
    if defaults > 1 {
        return Err(ConfigError::AmbiguousIssuer(url.to_string()));
    }
    let mut claims: Vec<&str> = configs
        .iter()
        .filter_map(|c| c.issuer_claim.as_deref())
        .collect();
    claims.sort_unstable();
    claims.dedup();
    if claims.len() + defaults != configs.len() {
        return Err(ConfigError::AmbiguousIssuer(url.to_string()));
    }
    Ok(())
}

/// Pick the configuration whose discriminator claim the token carries, or
/// the default configuration when no discriminator matches.
fn select_config<'a>(configs: &'a [IssuerConfig], claims: &ClaimSet) -> Option<&'a IssuerConfig> {
    let discriminated: Vec<&IssuerConfig> = configs
        .iter()
        .filter(|c| c.issuer_claim.as_deref().is_some_and(|claim| claims.has(claim)))
        .collect();
    match discriminated.len() {
        1 => Some(discriminated[0]),
        0 => configs.iter().find(|c| c.issuer_claim.is_none()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    fn empty_claims() -> ClaimSet {
        ClaimSet::new(Map::new())
    }

    fn config(kind: IssuerKind) -> IssuerConfig {
        IssuerConfig {
            kind,
            client_id: "sigstore".to_string(),
            issuer_claim: None,
            subject_domain: None,
            challenge_claim: None,
            spiffe_trust_domain: None,
        }
    }

    fn pool_of(entries: &[(&str, IssuerConfig)]) -> IssuerPool {
        let issuers: HashMap<String, IssuerConfig> = entries
            .iter()
            .map(|(url, c)| (url.to_string(), c.clone()))
            .collect();
        IssuerPool::new(&issuers, &HashMap::new()).expect("valid pool")
    }

    #[test]
    fn test_exact_match() {
        let pool = pool_of(&[("https://accounts.example", config(IssuerKind::Email))]);
        let matched = pool
            .lookup("https://accounts.example", &empty_claims())
            .expect("match");
        assert_eq!(matched.issuer_url, "https://accounts.example");
        assert_eq!(matched.config.kind, IssuerKind::Email);
        assert!(pool.lookup("https://other.example", &empty_claims()).is_none());
    }

    #[test]
    fn test_wildcard_match_resolves_concrete_url() {
        let pool = pool_of(&[("https://*.sts.example", config(IssuerKind::Uri))]);
        let matched = pool
            .lookup("https://eu.sts.example", &empty_claims())
            .expect("wildcard match");
        assert_eq!(matched.issuer_url, "https://eu.sts.example");
        // One label only; deeper subdomains do not match.
        assert!(pool
            .lookup("https://a.b.sts.example", &empty_claims())
            .is_none());
    }

    #[test]
    fn test_exact_wins_over_wildcard() {
        let exact = config(IssuerKind::Email);
        let wild = config(IssuerKind::Uri);
        let pool = pool_of(&[
            ("https://eu.sts.example", exact),
            ("https://*.sts.example", wild),
        ]);
        let matched = pool
            .lookup("https://eu.sts.example", &empty_claims())
            .expect("match");
        assert_eq!(matched.config.kind, IssuerKind::Email);
    }

    #[test]
    fn test_wildcard_requires_single_whole_label() {
        let bad = [
            "https://e*.sts.example",
            "https://*.*.example",
            "https://sts.example/*",
        ];
        for url in bad {
            let issuers: HashMap<String, IssuerConfig> =
                [(url.to_string(), config(IssuerKind::Uri))].into();
            assert!(IssuerPool::new(&issuers, &HashMap::new()).is_err(), "{url}");
        }
    }

    #[test]
    fn test_scheme_and_path_must_equal() {
        let pool = pool_of(&[("https://*.sts.example/auth", config(IssuerKind::Uri))]);
        assert!(pool
            .lookup("https://eu.sts.example/auth", &empty_claims())
            .is_some());
        assert!(pool
            .lookup("http://eu.sts.example/auth", &empty_claims())
            .is_none());
        assert!(pool
            .lookup("https://eu.sts.example/other", &empty_claims())
            .is_none());
    }

    #[test]
    fn test_shared_issuer_discriminated_by_claim() {
        let mut github = config(IssuerKind::GithubWorkflow);
        github.issuer_claim = Some("workflow_ref".to_string());
        let email = config(IssuerKind::Email);

        let issuers: HashMap<String, IssuerConfig> = HashMap::new();
        let mut meta = HashMap::new();
        meta.insert("https://dex.example".to_string(), github);
        let mut issuers = issuers;
        issuers.insert("https://dex.example".to_string(), email);
        let pool = IssuerPool::new(&issuers, &meta).expect("valid pool");

        let mut map = Map::new();
        map.insert("workflow_ref".to_string(), "octo/repo".into());
        let workflow_claims = ClaimSet::new(map);
        let matched = pool.lookup("https://dex.example", &workflow_claims).unwrap();
        assert_eq!(matched.config.kind, IssuerKind::GithubWorkflow);

        let matched = pool.lookup("https://dex.example", &empty_claims()).unwrap();
        assert_eq!(matched.config.kind, IssuerKind::Email);
    }

    #[test]
    fn test_duplicate_defaults_rejected_at_load() {
        let mut issuers = HashMap::new();
        issuers.insert("https://dex.example".to_string(), config(IssuerKind::Email));
        let mut meta = HashMap::new();
        meta.insert("https://dex.example".to_string(), config(IssuerKind::Uri));
        assert!(matches!(
            IssuerPool::new(&issuers, &meta),
            Err(ConfigError::AmbiguousIssuer(_))
        ));
    }
}
