use der::asn1::{Ia5String, Utf8StringRef};
use der::Any;
use url::Url;
use x509_cert::ext::pkix::name::{GeneralName, OtherName};

use crate::error::{CertificateError, PrincipalError};
use crate::identity::extensions::{
    sort_by_oid, ClaimExtension, OID_BUILD_SIGNER_URI, OID_BUILD_TRIGGER, OID_ISSUER,
    OID_OTHERNAME_SAN, OID_RUN_INVOCATION_URI, OID_SOURCE_REPOSITORY_REF,
    OID_SOURCE_REPOSITORY_URI, OID_WORKFLOW_NAME, OID_WORKFLOW_REF, OID_WORKFLOW_REPOSITORY,
    OID_WORKFLOW_SHA, OID_WORKFLOW_TRIGGER,
};
use crate::identity::pool::{IssuerConfig, IssuerKind};
use crate::oidc::claims::ClaimSet;

/// The single SubjectAlternativeName entry a principal renders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SanEntry {
    Email(String),
    Uri(String),
    /// Username-style identity carried as an otherName UTF8String.
    OtherName(String),
}

impl SanEntry {
    pub fn to_general_name(&self) -> Result<GeneralName, CertificateError> {
        match self {
            SanEntry::Email(email) => Ok(GeneralName::Rfc822Name(
                Ia5String::new(email).map_err(CertificateError::from)?,
            )),
            SanEntry::Uri(uri) => Ok(GeneralName::UniformResourceIdentifier(
                Ia5String::new(uri).map_err(CertificateError::from)?,
            )),
            SanEntry::OtherName(name) => {
                let value = Any::encode_from(
                    &Utf8StringRef::new(name).map_err(CertificateError::from)?,
                )
                .map_err(CertificateError::from)?;
                Ok(GeneralName::OtherName(OtherName {
                    type_id: OID_OTHERNAME_SAN,
                    value,
                }))
            }
        }
    }
}

/// Structured identity derived from a verified OIDC claim set.
///
/// Each variant knows its canonical name, its SAN entry, and the identity
/// extensions it contributes to the certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Principal {
    Email {
        email: String,
        issuer: String,
    },
    Spiffe {
        id: String,
        issuer: String,
    },
    Uri {
        uri: String,
        issuer: String,
    },
    Username {
        username: String,
        domain: String,
        issuer: String,
    },
    GithubWorkflow {
        workflow_ref: String,
        repository: String,
        trigger: Option<String>,
        sha: Option<String>,
        workflow_name: Option<String>,
        git_ref: Option<String>,
        issuer: String,
    },
    GitlabPipeline {
        config_ref_uri: String,
        project_path: String,
        git_ref: Option<String>,
        pipeline_source: Option<String>,
        job_id: Option<String>,
        issuer: String,
    },
    Buildkite {
        organization: String,
        pipeline: String,
        issuer: String,
    },
    CiProvider {
        subject: String,
        build_signer_uri: Option<String>,
        source_repository_uri: Option<String>,
        source_repository_ref: Option<String>,
        build_trigger: Option<String>,
        run_invocation_uri: Option<String>,
        issuer: String,
    },
}

impl Principal {
    /// Project a verified claim set into a principal using the extraction
    /// strategy of the matched issuer configuration. `issuer_url` is the
    /// wildcard-resolved issuer that authenticated the request.
    pub fn from_claims(
        config: &IssuerConfig,
        issuer_url: &str,
        claims: &ClaimSet,
    ) -> Result<Self, PrincipalError> {
        let issuer = issuer_url.to_string();
        match config.kind {
            IssuerKind::Email => {
                let email = claims.require_str("email")?;
                if claims.get_bool("email_verified") != Some(true) {
                    return Err(PrincipalError::InvalidClaim {
                        claim: "email_verified",
                        reason: "identity provider has not verified the address".to_string(),
                    });
                }
                Ok(Principal::Email { email: email.to_string(), issuer })
            }
            IssuerKind::Spiffe => {
                let sub = claims.require_str("sub")?;
                let id = Url::parse(sub).map_err(|e| PrincipalError::InvalidClaim {
                    claim: "sub",
                    reason: e.to_string(),
                })?;
                if id.scheme() != "spiffe" {
                    return Err(PrincipalError::InvalidClaim {
                        claim: "sub",
                        reason: format!("expected spiffe scheme, got {}", id.scheme()),
                    });
                }
                if let Some(trust_domain) = &config.spiffe_trust_domain {
                    if id.host_str() != Some(trust_domain.as_str()) {
                        return Err(PrincipalError::InvalidClaim {
                            claim: "sub",
                            reason: format!("spiffe id outside trust domain {}", trust_domain),
                        });
                    }
                }
                Ok(Principal::Spiffe { id: sub.to_string(), issuer })
            }
            IssuerKind::Uri => {
                let subject_claim = config.subject_claim();
                let sub = claims.require_str(subject_claim)?;
                let uri = Url::parse(sub).map_err(|e| PrincipalError::InvalidClaim {
                    claim: "sub",
                    reason: e.to_string(),
                })?;
                if let Some(domain) = &config.subject_domain {
                    let domain_url =
                        Url::parse(domain).map_err(|e| PrincipalError::InvalidClaim {
                            claim: "sub",
                            reason: e.to_string(),
                        })?;
                    if uri.scheme() != domain_url.scheme() || uri.host() != domain_url.host() {
                        return Err(PrincipalError::InvalidClaim {
                            claim: "sub",
                            reason: format!("uri outside subject domain {}", domain),
                        });
                    }
                }
                Ok(Principal::Uri { uri: sub.to_string(), issuer })
            }
            IssuerKind::Username => {
                let username = claims.require_str(config.subject_claim())?;
                if username.contains('@') {
                    return Err(PrincipalError::InvalidClaim {
                        claim: "sub",
                        reason: "username must not contain @".to_string(),
                    });
                }
                let domain = config.subject_domain.clone().ok_or(
                    PrincipalError::InvalidClaim {
                        claim: "sub",
                        reason: "username issuers require a configured subject domain".to_string(),
                    },
                )?;
                Ok(Principal::Username { username: username.to_string(), domain, issuer })
            }
            IssuerKind::GithubWorkflow => Ok(Principal::GithubWorkflow {
                workflow_ref: claims.require_str("workflow_ref")?.to_string(),
                repository: claims.require_str("repository")?.to_string(),
                trigger: claims.get_str("event_name").map(str::to_string),
                sha: claims.get_str("sha").map(str::to_string),
                workflow_name: claims.get_str("workflow").map(str::to_string),
                git_ref: claims.get_str("ref").map(str::to_string),
                issuer,
            }),
            IssuerKind::GitlabPipeline => Ok(Principal::GitlabPipeline {
                config_ref_uri: claims.require_str("ci_config_ref_uri")?.to_string(),
                project_path: claims.require_str("project_path")?.to_string(),
                git_ref: claims.get_str("ref").map(str::to_string),
                pipeline_source: claims.get_str("pipeline_source").map(str::to_string),
                job_id: claims.get_str("job_id").map(str::to_string),
                issuer,
            }),
            IssuerKind::Buildkite => Ok(Principal::Buildkite {
                organization: claims.require_str("organization_slug")?.to_string(),
                pipeline: claims.require_str("pipeline_slug")?.to_string(),
                issuer,
            }),
            IssuerKind::CiProvider => {
                let sub = claims.require_str("sub")?;
                Url::parse(sub).map_err(|e| PrincipalError::InvalidClaim {
                    claim: "sub",
                    reason: e.to_string(),
                })?;
                Ok(Principal::CiProvider {
                    subject: sub.to_string(),
                    build_signer_uri: claims.get_str("build_signer_uri").map(str::to_string),
                    source_repository_uri: claims
                        .get_str("source_repository_uri")
                        .map(str::to_string),
                    source_repository_ref: claims
                        .get_str("source_repository_ref")
                        .map(str::to_string),
                    build_trigger: claims.get_str("build_trigger").map(str::to_string),
                    run_invocation_uri: claims.get_str("run_invocation_uri").map(str::to_string),
                    issuer,
                })
            }
        }
    }

    /// The canonical identity string.
    pub fn name(&self) -> String {
        match self {
            Principal::Email { email, .. } => email.clone(),
            Principal::Spiffe { id, .. } => id.clone(),
            Principal::Uri { uri, .. } => uri.clone(),
            Principal::Username { username, domain, .. } => format!("{}!{}", username, domain),
            Principal::GithubWorkflow { workflow_ref, .. } => {
                format!("https://github.com/{}", workflow_ref)
            }
            Principal::GitlabPipeline { config_ref_uri, .. } => {
                format!("https://{}", config_ref_uri)
            }
            Principal::Buildkite { organization, pipeline, .. } => {
                format!("https://buildkite.com/{}/{}", organization, pipeline)
            }
            Principal::CiProvider { subject, .. } => subject.clone(),
        }
    }

    /// The OIDC issuer that authenticated this principal.
    pub fn issuer(&self) -> &str {
        match self {
            Principal::Email { issuer, .. }
            | Principal::Spiffe { issuer, .. }
            | Principal::Uri { issuer, .. }
            | Principal::Username { issuer, .. }
            | Principal::GithubWorkflow { issuer, .. }
            | Principal::GitlabPipeline { issuer, .. }
            | Principal::Buildkite { issuer, .. }
            | Principal::CiProvider { issuer, .. } => issuer,
        }
    }

    /// Exactly one SAN entry; the type depends on the variant.
    pub fn subject_alt_name(&self) -> SanEntry {
        match self {
            Principal::Email { email, .. } => SanEntry::Email(email.clone()),
            Principal::Username { .. } => SanEntry::OtherName(self.name()),
            _ => SanEntry::Uri(self.name()),
        }
    }

    /// The identity extensions, ordered deterministically by OID.
    pub fn extensions(&self) -> Vec<ClaimExtension> {
        let mut exts = vec![ClaimExtension::raw(OID_ISSUER, self.issuer())];

        match self {
            Principal::GithubWorkflow {
                trigger, sha, workflow_name, repository, git_ref, ..
            } => {
                if let Some(trigger) = trigger {
                    exts.push(ClaimExtension::raw(OID_WORKFLOW_TRIGGER, trigger));
                }
                if let Some(sha) = sha {
                    exts.push(ClaimExtension::raw(OID_WORKFLOW_SHA, sha));
                }
                if let Some(name) = workflow_name {
                    exts.push(ClaimExtension::raw(OID_WORKFLOW_NAME, name));
                }
                exts.push(ClaimExtension::raw(OID_WORKFLOW_REPOSITORY, repository));
                if let Some(git_ref) = git_ref {
                    exts.push(ClaimExtension::raw(OID_WORKFLOW_REF, git_ref));
                }
            }
            Principal::GitlabPipeline {
                config_ref_uri,
                project_path,
                git_ref,
                pipeline_source,
                job_id,
                issuer,
            } => {
                let instance = Url::parse(issuer)
                    .ok()
                    .and_then(|u| u.host_str().map(str::to_string))
                    .unwrap_or_else(|| "gitlab.com".to_string());
                let repository = format!("https://{}/{}", instance, project_path);
                exts.push(ClaimExtension::utf8(
                    OID_BUILD_SIGNER_URI,
                    &format!("https://{}", config_ref_uri),
                ));
                exts.push(ClaimExtension::utf8(OID_SOURCE_REPOSITORY_URI, &repository));
                if let Some(git_ref) = git_ref {
                    exts.push(ClaimExtension::utf8(OID_SOURCE_REPOSITORY_REF, git_ref));
                }
                if let Some(source) = pipeline_source {
                    exts.push(ClaimExtension::utf8(OID_BUILD_TRIGGER, source));
                }
                if let Some(job_id) = job_id {
                    exts.push(ClaimExtension::utf8(
                        OID_RUN_INVOCATION_URI,
                        &format!("{}/-/jobs/{}", repository, job_id),
                    ));
                }
            }
            Principal::CiProvider {
                build_signer_uri,
                source_repository_uri,
                source_repository_ref,
                build_trigger,
                run_invocation_uri,
                ..
            } => {
                if let Some(uri) = build_signer_uri {
                    exts.push(ClaimExtension::utf8(OID_BUILD_SIGNER_URI, uri));
                }
                if let Some(uri) = source_repository_uri {
                    exts.push(ClaimExtension::utf8(OID_SOURCE_REPOSITORY_URI, uri));
                }
                if let Some(git_ref) = source_repository_ref {
                    exts.push(ClaimExtension::utf8(OID_SOURCE_REPOSITORY_REF, git_ref));
                }
                if let Some(trigger) = build_trigger {
                    exts.push(ClaimExtension::utf8(OID_BUILD_TRIGGER, trigger));
                }
                if let Some(uri) = run_invocation_uri {
                    exts.push(ClaimExtension::utf8(OID_RUN_INVOCATION_URI, uri));
                }
            }
            _ => {}
        }

        sort_by_oid(&mut exts);
        exts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::pool::IssuerConfig;
    use serde_json::Map;

    fn claims(pairs: &[(&str, serde_json::Value)]) -> ClaimSet {
        let mut map = Map::new();
        for (k, v) in pairs {
            map.insert(k.to_string(), v.clone());
        }
        ClaimSet::new(map)
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

    #[test]
    fn test_email_principal() {
        let claims = claims(&[
            ("email", "alice@example.com".into()),
            ("email_verified", true.into()),
        ]);
        let principal =
            Principal::from_claims(&config(IssuerKind::Email), "https://accounts.example", &claims)
                .unwrap();
        assert_eq!(principal.name(), "alice@example.com");
        assert_eq!(
            principal.subject_alt_name(),
            SanEntry::Email("alice@example.com".to_string())
        );
        let exts = principal.extensions();
        assert_eq!(exts.len(), 1);
        assert_eq!(exts[0].oid, OID_ISSUER);
    }

    #[test]
    fn test_unverified_email_is_rejected() {
        let claims = claims(&[
            ("email", "alice@example.com".into()),
            ("email_verified", false.into()),
        ]);
        let result =
            Principal::from_claims(&config(IssuerKind::Email), "https://accounts.example", &claims);
        assert!(result.is_err());
    }

    #[test]
    fn test_spiffe_trust_domain_enforced() {
        let mut cfg = config(IssuerKind::Spiffe);
        cfg.spiffe_trust_domain = Some("example.org".to_string());
        let ok = claims(&[("sub", "spiffe://example.org/ns/prod/sa/builder".into())]);
        let principal =
            Principal::from_claims(&cfg, "https://spiffe.example", &ok).unwrap();
        assert_eq!(
            principal.subject_alt_name(),
            SanEntry::Uri("spiffe://example.org/ns/prod/sa/builder".to_string())
        );

        let outside = claims(&[("sub", "spiffe://other.org/sa/builder".into())]);
        assert!(Principal::from_claims(&cfg, "https://spiffe.example", &outside).is_err());
    }

    #[test]
    fn test_github_workflow_extensions() {
        let claims = claims(&[
            ("workflow_ref", "octo/repo/.github/workflows/release.yml@refs/tags/v1".into()),
            ("repository", "octo/repo".into()),
            ("event_name", "push".into()),
            ("sha", "deadbeef".into()),
            ("workflow", "release".into()),
            ("ref", "refs/tags/v1".into()),
        ]);
        let principal = Principal::from_claims(
            &config(IssuerKind::GithubWorkflow),
            "https://token.actions.githubusercontent.com",
            &claims,
        )
        .unwrap();

        assert_eq!(
            principal.name(),
            "https://github.com/octo/repo/.github/workflows/release.yml@refs/tags/v1"
        );
        let exts = principal.extensions();
        assert_eq!(exts.len(), 6);
        // Deterministic arc order: .1, .2, .3, .4, .5, .6
        assert_eq!(exts[0].oid, OID_ISSUER);
        assert_eq!(exts[1].oid, OID_WORKFLOW_TRIGGER);
        assert_eq!(exts[5].oid, OID_WORKFLOW_REF);
    }

    #[test]
    fn test_missing_required_claim() {
        let claims = claims(&[("repository", "octo/repo".into())]);
        let result = Principal::from_claims(
            &config(IssuerKind::GithubWorkflow),
            "https://token.actions.githubusercontent.com",
            &claims,
        );
        assert!(matches!(result, Err(PrincipalError::MissingClaim(ref s)) if s == "workflow_ref"));
    }

    #[test]
    fn test_username_othername() {
        let mut cfg = config(IssuerKind::Username);
        cfg.subject_domain = Some("example.com".to_string());
        let claims = claims(&[("sub", "carol".into())]);
        let principal =
            Principal::from_claims(&cfg, "https://accounts.example", &claims).unwrap();
        assert_eq!(principal.name(), "carol!example.com");
        assert_eq!(
            principal.subject_alt_name(),
            SanEntry::OtherName("carol!example.com".to_string())
        );
    }
}
