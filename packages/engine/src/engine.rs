//! Contract with the TLS engine
//!
//! The record layer and handshake cryptography live in the engine. This crate
//! drives an in-progress session through [`NegotiationSession`] and receives
//! the engine's callbacks through [`HandshakeHooks`] and [`CredentialProvider`].

use rustls::pki_types::{CertificateDer, PrivateKeyDer};

use crate::certificate::{KeyringCertificate, KeyringPrivateKey};
use crate::config::PriorityPolicy;
use crate::errors::TlsError;
use crate::resumption::TicketKey;
use crate::srp::SrpParameters;
use crate::store::DhParams;
use crate::types::{CertificateType, ServerNameIndication, VerifyMode};

/// Negotiated parameters of a completed handshake, as reported by the engine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HandshakeSummary {
    /// Engine name and version, e.g. `rustls/0.23`
    pub library: String,
    pub protocol: String,
    pub cipher_suite: String,
    pub compression: String,
    /// Symmetric key size in bits
    pub cipher_key_bits: u32,
    pub session_id: Vec<u8>,
    pub srp_user: Option<String>,
}

/// Operations on one in-progress engine session.
///
/// Every call made between the client hello and certificate selection
/// affects only the handshake in flight.
pub trait NegotiationSession {
    /// Whether and how strongly to ask the client for a certificate.
    fn set_client_verify(&mut self, mode: VerifyMode);

    fn set_certificate_credentials(&mut self);

    fn set_anonymous_credentials(&mut self, dh_params: &DhParams);

    fn set_srp_credentials(&mut self);

    fn set_priorities(&mut self, policy: &PriorityPolicy) -> Result<(), TlsError>;

    /// Restrict the certificate types the engine may negotiate.
    fn set_certificate_type_priority(
        &mut self,
        allowed: &[CertificateType],
    ) -> Result<(), TlsError>;

    fn enable_session_tickets(&mut self, key: &TicketKey) -> Result<(), TlsError>;

    /// Certificate type agreed with the peer, once known.
    fn negotiated_certificate_type(&self) -> Option<CertificateType>;

    /// Raw certificates the peer presented, leaf first.
    fn peer_certificates(&self) -> Vec<Vec<u8>>;

    /// Run the initial handshake, calling back into `hooks`.
    fn handshake(&mut self, hooks: &mut dyn HandshakeHooks) -> Result<(), TlsError>;

    /// Run one more handshake on the established connection.
    fn rehandshake(&mut self, hooks: &mut dyn HandshakeHooks) -> Result<(), TlsError>;

    fn summary(&self) -> HandshakeSummary;
}

/// Server identity material handed to the engine for one handshake.
#[derive(Debug)]
pub enum CredentialMaterial<'a> {
    X509 {
        chain: &'a [CertificateDer<'static>],
        key: &'a PrivateKeyDer<'static>,
    },
    OpenPgp {
        certificate: &'a KeyringCertificate,
        key: &'a KeyringPrivateKey,
    },
}

impl CredentialMaterial<'_> {
    pub fn certificate_type(&self) -> CertificateType {
        match self {
            Self::X509 { .. } => CertificateType::X509,
            Self::OpenPgp { .. } => CertificateType::OpenPgp,
        }
    }
}

/// Certificate retrieval callback.
pub trait CredentialProvider {
    /// Identity of the currently bound host for the requested type.
    fn retrieve(&self, requested: CertificateType) -> Result<CredentialMaterial<'_>, TlsError>;
}

/// Callbacks the engine makes while a handshake is running.
pub trait HandshakeHooks: CredentialProvider {
    /// Called once the client hello is parsed and before certificate selection.
    fn post_client_hello(
        &mut self,
        session: &mut dyn NegotiationSession,
        server_name: Option<&ServerNameIndication>,
    ) -> Result<(), TlsError>;

    /// SRP verifier for `username`, or decoy parameters when unknown.
    fn srp_parameters(&self, username: &str) -> Result<SrpParameters, TlsError>;
}
