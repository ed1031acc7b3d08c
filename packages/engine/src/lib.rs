//! # tlsgate engine
//!
//! Handshake-time virtual host selection and client certificate verification
//! for a TLS-terminating server.
//!
//! - [`store`]: per-host identities and policy, built once at startup
//! - [`handle`] and [`resolver`]: binding a connection to a host from its SNI
//! - [`binder`]: applying a host's credentials and priorities to a handshake
//! - [`verifier`]: client chain verification and verdicts
//! - [`access`]: per-request decisions with at most one re-negotiation
//! - [`attributes`]: `SSL_*` request attributes
//! - [`resumption`]: the process-wide session ticket key

pub mod access;
pub mod attributes;
pub mod binder;
pub mod certificate;
pub mod config;
pub mod engine;
pub mod errors;
pub mod handle;
pub mod resolver;
pub mod resumption;
pub mod rustls_resolver;
pub mod srp;
pub mod store;
pub mod types;
pub mod verifier;

pub use access::{AccessController, AccessDecision, AccessState};
pub use attributes::{CertificateAttributes, RequestAttributes, Side};
pub use certificate::{
    CertificateChain, Keyring, KeyringCertificate, OpenPgpBackend, PathValidator, PeerCertificate,
    X509PathValidator, X509TrustAnchors,
};
pub use config::{PriorityPolicy, ServerConfig};
pub use engine::{
    CredentialMaterial, CredentialProvider, HandshakeHooks, HandshakeSummary, NegotiationSession,
};
pub use errors::{ConfigError, TlsError};
pub use handle::{Binding, ConnectionHandle};
pub use resumption::{ResumptionKeys, TicketKey};
pub use rustls_resolver::SniCertResolver;
pub use srp::{SrpParameters, VerifierLookup, VerifierRow};
pub use store::{CredentialEntry, CredentialStore, DhParams, ServerIdentity, SrpSource};
pub use types::{
    CertStatus, CertificateType, MAX_CHAIN_SIZE, NameType, ServerNameIndication, VerifyMode,
};
pub use verifier::{Verdict, Verifier, VerifyFailure, VerifyOutcome};
