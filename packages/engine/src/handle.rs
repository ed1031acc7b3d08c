//! Per-connection state
//!
//! A [`ConnectionHandle`] owns the engine session and the binding to a
//! virtual host. The binding starts at the store's default host and may be
//! replaced once, when the client hello names another host.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info};

use crate::attributes::{CertificateAttributes, RequestAttributes};
use crate::binder;
use crate::engine::{CredentialMaterial, CredentialProvider, HandshakeHooks, NegotiationSession};
use crate::errors::TlsError;
use crate::resolver;
use crate::resumption::ResumptionKeys;
use crate::srp::{self, SrpParameters, VerifierLookup};
use crate::store::{CredentialEntry, CredentialStore, ServerIdentity};
use crate::types::{CertificateType, ServerNameIndication, VerifyMode};

/// Host binding of one connection. Receives the engine's handshake callbacks.
pub struct Binding {
    store: Arc<CredentialStore>,
    entry: Arc<CredentialEntry>,
    verify_mode: VerifyMode,
    rebound: bool,
    renegotiating: bool,
    srp_lookup: Option<Arc<dyn VerifierLookup>>,
}

impl Binding {
    fn new(store: Arc<CredentialStore>, srp_lookup: Option<Arc<dyn VerifierLookup>>) -> Self {
        let entry = Arc::clone(store.default_entry());
        Self {
            verify_mode: entry.verify_mode,
            store,
            entry,
            rebound: false,
            renegotiating: false,
            srp_lookup,
        }
    }

    pub fn entry(&self) -> &Arc<CredentialEntry> {
        &self.entry
    }

    pub fn verify_mode(&self) -> VerifyMode {
        self.verify_mode
    }

    pub fn is_rebound(&self) -> bool {
        self.rebound
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("entry", &self.entry.name)
            .field("verify_mode", &self.verify_mode)
            .field("rebound", &self.rebound)
            .field("renegotiating", &self.renegotiating)
            .finish_non_exhaustive()
    }
}

impl CredentialProvider for Binding {
    fn retrieve(&self, requested: CertificateType) -> Result<CredentialMaterial<'_>, TlsError> {
        let unavailable = || {
            TlsError::CredentialUnavailable(format!(
                "host '{}' has no {} identity",
                self.entry.name,
                requested.label()
            ))
        };
        match (self.entry.identity.as_ref(), requested) {
            (
                Some(ServerIdentity::X509 {
                    chain,
                    key: Some(key),
                    ..
                }),
                CertificateType::X509,
            ) => Ok(CredentialMaterial::X509 { chain, key }),
            (
                Some(ServerIdentity::OpenPgp {
                    certificate,
                    key: Some(key),
                }),
                CertificateType::OpenPgp,
            ) => Ok(CredentialMaterial::OpenPgp { certificate, key }),
            _ => Err(unavailable()),
        }
    }
}

impl HandshakeHooks for Binding {
    fn post_client_hello(
        &mut self,
        session: &mut dyn NegotiationSession,
        server_name: Option<&ServerNameIndication>,
    ) -> Result<(), TlsError> {
        if !self.renegotiating && !self.rebound {
            if let Some(entry) = resolver::resolve(&self.store, server_name) {
                debug!("Switching to virtual host '{}'", entry.name);
                self.verify_mode = entry.verify_mode;
                self.entry = entry;
                self.rebound = true;
            }
        }
        binder::bind(session, &self.entry, self.verify_mode)
    }

    fn srp_parameters(&self, username: &str) -> Result<SrpParameters, TlsError> {
        let Some(source) = self.entry.srp.as_ref() else {
            return Err(TlsError::CredentialUnavailable(format!(
                "host '{}' has no SRP source",
                self.entry.name
            )));
        };
        srp::resolve(source, self.srp_lookup.as_deref(), username)
    }
}

/// One live TLS connection.
#[derive(Debug)]
pub struct ConnectionHandle<S> {
    session: S,
    binding: Binding,
    tickets: bool,
}

impl<S: NegotiationSession> ConnectionHandle<S> {
    /// Bind a new session to the default host. `Ok(None)` when the default
    /// host does not serve TLS.
    pub fn accept(
        mut session: S,
        store: Arc<CredentialStore>,
        resumption: &ResumptionKeys,
        srp_lookup: Option<Arc<dyn VerifierLookup>>,
    ) -> Result<Option<Self>, TlsError> {
        let binding = Binding::new(store, srp_lookup);
        if !binding.entry.enabled {
            debug!("Default host '{}' does not serve TLS", binding.entry.name);
            return Ok(None);
        }
        binder::bind(&mut session, &binding.entry, binding.verify_mode)?;
        let tickets = resumption.attach(&mut session, &binding.entry);
        Ok(Some(Self {
            session,
            binding,
            tickets,
        }))
    }

    /// Run the initial handshake.
    pub fn handshake(&mut self) -> Result<(), TlsError> {
        self.session.handshake(&mut self.binding)
    }

    /// Raise the connection's verification level and run one more handshake.
    /// The host binding is left as it is. On failure the previous level is
    /// restored.
    pub fn renegotiate(&mut self, mode: VerifyMode) -> Result<(), TlsError> {
        let previous = self.binding.verify_mode;
        self.binding.verify_mode = mode;
        self.session.set_client_verify(mode);
        self.binding.renegotiating = true;
        let result = self.session.rehandshake(&mut self.binding);
        self.binding.renegotiating = false;

        result.map_err(|e| {
            info!("Re-negotiation with peer failed: {}", e);
            self.binding.verify_mode = previous;
            self.session.set_client_verify(previous);
            match e {
                TlsError::Renegotiation(_) => e,
                other => TlsError::Renegotiation(other.to_string()),
            }
        })
    }

    /// Export the negotiated parameters and the bound host's certificate.
    pub fn export_attributes(&self, attrs: &mut RequestAttributes) {
        let entry = &self.binding.entry;
        let server_certificate = match (
            entry.identity.as_ref(),
            self.session.negotiated_certificate_type(),
        ) {
            (Some(identity), Some(negotiated)) => {
                CertificateAttributes::for_identity(identity, negotiated, entry.export_certificates)
            }
            _ => None,
        };
        attrs.export_handshake(&self.session.summary(), server_certificate.as_ref());
    }

    pub fn entry(&self) -> &Arc<CredentialEntry> {
        self.binding.entry()
    }

    pub fn binding(&self) -> &Binding {
        &self.binding
    }

    pub fn verify_mode(&self) -> VerifyMode {
        self.binding.verify_mode
    }

    pub fn tickets_enabled(&self) -> bool {
        self.tickets
    }

    pub fn session(&self) -> &S {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut S {
        &mut self.session
    }
}
