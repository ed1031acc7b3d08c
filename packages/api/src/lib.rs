//! tlsgate public API
//!
//! Virtual-host TLS identity negotiation and client certificate access control
//! for TLS-terminating servers. A [`Gate`] owns the credential store and the
//! session ticket key for the life of the server; connections are bound
//! through [`Gate::accept`] and requests are checked with [`Gate::authorize`].

#![deny(unsafe_code)]
#![warn(clippy::all, clippy::pedantic)]

pub mod builder;
pub mod gate;

pub use builder::GateBuilder;
pub use gate::{Gate, GateError};

// Re-export the engine types embedders implement or receive
pub use tlsgate_engine::{
    AccessController, AccessDecision, CertStatus, CertificateType, ConfigError, ConnectionHandle,
    CredentialEntry, CredentialMaterial, CredentialProvider, CredentialStore, DhParams,
    HandshakeHooks, HandshakeSummary, Keyring, KeyringCertificate, NegotiationSession,
    OpenPgpBackend, PathValidator, PriorityPolicy, RequestAttributes, ServerConfig, ServerIdentity,
    ServerNameIndication, SniCertResolver, SrpParameters, TicketKey, TlsError, VerifierLookup,
    VerifierRow, VerifyMode,
};
