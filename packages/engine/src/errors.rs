//! Error types for startup configuration and per-connection processing

/// Per-connection and per-request failures.
///
/// None of these are fatal to the process; they abort the handshake or deny
/// the request they were raised for.
#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    #[error("Certificate parsing failed: {0}")]
    CertificateParsing(String),
    #[error("Certificate validation failed: {0}")]
    CertificateValidation(String),
    #[error("No trust anchors available for verification: {0}")]
    NoTrustAnchors(String),
    #[error("Credentials unavailable: {0}")]
    CredentialUnavailable(String),
    #[error("Priority policy rejected by engine: {0}")]
    Priority(String),
    #[error("Re-negotiation failed: {0}")]
    Renegotiation(String),
    #[error("OpenPGP operation failed: {0}")]
    OpenPgp(String),
    #[error("Verifier lookup failed: {0}")]
    Lookup(String),
    #[error("Internal error: {0}")]
    Internal(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Static configuration problems detected while building the credential store.
///
/// Every variant aborts startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Host '{0}' is missing a certificate file")]
    MissingCertificate(String),
    #[error("Host '{0}' is missing a private key file")]
    MissingPrivateKey(String),
    #[error("Host '{0}' is missing a priorities string")]
    MissingPriorities(String),
    #[error("Host '{0}' requires client certificates but has no trust anchors configured")]
    MissingTrustAnchors(String),
    #[error("Host '{0}' configures both an X.509 and an OpenPGP identity")]
    ConflictingIdentities(String),
    #[error("Host '{0}' is missing SRP passwd or conf file: {1}")]
    MissingSrpFiles(String, String),
    #[error("Host '{0}' configures an OpenPGP identity but no OpenPGP backend is installed")]
    MissingOpenPgpBackend(String),
    #[error("Syntax error parsing priorities string at: {0}")]
    PrioritySyntax(String),
    #[error("Invalid client verify mode '{0}'")]
    InvalidVerifyMode(String),
    #[error("No hosts configured")]
    NoHosts,
    #[error("Failed to load '{path}': {reason}")]
    Load { path: String, reason: String },
    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConfigError {
    pub(crate) fn load(path: impl AsRef<std::path::Path>, reason: impl std::fmt::Display) -> Self {
        Self::Load {
            path: path.as_ref().display().to_string(),
            reason: reason.to_string(),
        }
    }
}
