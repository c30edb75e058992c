use thiserror::Error;

/// Errors surfaced to clients of the issuance pipeline.
///
/// Every pipeline step failure maps to exactly one of these kinds; the HTTP
/// layer translates them to status codes. `Internal` carries a message for
/// the server log only, it is never returned in a response body.
#[derive(Debug, Error)]
pub enum IssueError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("failed precondition: {0}")]
    FailedPrecondition(String),

    #[error("unavailable: {0}")]
    Unavailable(String),

    #[error("deadline exceeded")]
    DeadlineExceeded,

    #[error("internal error")]
    Internal(String),
}

/// The backend error set every certificate authority translates into.
///
/// The issuance handler never inspects backend internals; these three kinds
/// are the whole contract.
#[derive(Debug, Error)]
pub enum CaError {
    #[error("ca unavailable: {0}")]
    Unavailable(String),

    #[error("ca misconfigured: {0}")]
    BadConfig(String),

    #[error("signing failed: {0}")]
    SignFailed(String),
}

impl From<CaError> for IssueError {
    fn from(err: CaError) -> Self {
        match err {
            CaError::Unavailable(msg) => IssueError::Unavailable(msg),
            CaError::BadConfig(msg) => IssueError::Internal(msg),
            CaError::SignFailed(msg) => IssueError::Internal(msg),
        }
    }
}

/// Key and signature handling failures while parsing client material.
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("failed to parse public key: {0}")]
    ParseError(String),

    #[error("unsupported key type: {0}")]
    UnsupportedKey(String),

    #[error("signature verification failed: {0}")]
    VerificationFailed(String),
}

impl From<KeyError> for IssueError {
    fn from(err: KeyError) -> Self {
        match err {
            KeyError::ParseError(msg) => IssueError::InvalidArgument(msg),
            KeyError::UnsupportedKey(msg) => IssueError::UnsupportedAlgorithm(msg),
            KeyError::VerificationFailed(msg) => IssueError::FailedPrecondition(msg),
        }
    }
}

/// Token verification failures. An unreachable provider surfaces as
/// `unavailable`; everything else is `invalid-credentials`. An untrusted
/// issuer never reaches the verifier: the pool lookup rejects it with
/// `permission-denied` first.
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("malformed token: {0}")]
    Malformed(String),

    #[error("token rejected: {0}")]
    Rejected(String),

    #[error("identity provider unreachable: {0}")]
    ProviderUnreachable(String),
}

impl From<TokenError> for IssueError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::ProviderUnreachable(msg) => IssueError::Unavailable(msg),
            TokenError::Malformed(msg) | TokenError::Rejected(msg) => {
                IssueError::InvalidCredentials(msg)
            }
        }
    }
}

/// A verified claim set that cannot be projected into a principal.
#[derive(Debug, Error)]
pub enum PrincipalError {
    #[error("missing claim {0}")]
    MissingClaim(String),

    #[error("invalid claim {claim}: {reason}")]
    InvalidClaim { claim: &'static str, reason: String },
}

impl From<PrincipalError> for IssueError {
    fn from(err: PrincipalError) -> Self {
        IssueError::InvalidCredentials(err.to_string())
    }
}

/// Transparency log submission failures.
#[derive(Debug, Error)]
pub enum CtLogError {
    #[error("ct log unreachable: {0}")]
    Unreachable(String),

    #[error("ct log rejected precertificate: {0}")]
    Rejected(String),

    #[error("sct did not verify: {0}")]
    InvalidSct(String),
}

impl From<CtLogError> for IssueError {
    fn from(err: CtLogError) -> Self {
        match err {
            CtLogError::Unreachable(msg) => IssueError::Unavailable(msg),
            CtLogError::Rejected(msg) => IssueError::Unavailable(msg),
            CtLogError::InvalidSct(msg) => IssueError::Internal(msg),
        }
    }
}

/// Configuration problems surfaced at load time, before the server starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid issuer url {url}: {reason}")]
    InvalidIssuerUrl { url: String, reason: String },

    #[error("ambiguous issuer configuration for {0}: identical issuer urls need distinct challenge claims")]
    AmbiguousIssuer(String),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Certificate assembly failures. These are always server-side bugs or bad
/// CA material, never client input, so they surface as `internal`.
#[derive(Debug, Error)]
pub enum CertificateError {
    #[error("der encoding failed: {0}")]
    DerError(String),

    #[error("failed to parse certificate: {0}")]
    ParseError(String),
}

impl From<der::Error> for CertificateError {
    fn from(err: der::Error) -> Self {
        CertificateError::DerError(err.to_string())
    }
}

impl From<CertificateError> for IssueError {
    fn from(err: CertificateError) -> Self {
        IssueError::Internal(err.to_string())
    }
}
