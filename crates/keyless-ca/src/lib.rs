//! Short-lived code-signing certificate authority.
//!
//! Clients present a fresh public key with a proof of possession and an
//! OIDC identity token. The service verifies the token, projects its claims
//! into a principal, binds the identity into X.509 extensions, obtains an
//! SCT from a Certificate Transparency log, and returns a signing
//! certificate valid for minutes.

pub mod ca;
pub mod cert;
pub mod config;
pub mod crypto;
pub mod ctlog;
pub mod error;
pub mod identity;
pub mod issue;
pub mod oidc;

pub use error::IssueError;
pub use issue::{CertificateRequest, IssuanceService, IssuedCertificate, KeyMaterial};
