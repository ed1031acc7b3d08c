//! Server lifecycle owner

use std::fmt;
use std::sync::Arc;

use tlsgate_engine::{
    AccessController, AccessDecision, ConnectionHandle, CredentialStore, NegotiationSession,
    OpenPgpBackend, PathValidator, RequestAttributes, ResumptionKeys, ServerConfig,
    SniCertResolver, TlsError, VerifierLookup, Verifier, VerifyMode,
};
use tracing::debug;

/// Problems assembling a gate that are not host configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum GateError {
    #[error("No configuration source given")]
    NoConfiguration,
    #[error("Host '{0}' uses an SRP query but no verifier lookup is installed")]
    MissingVerifierLookup(String),
}

/// Credential store, ticket key and verification backends for one server.
///
/// Built once before the first connection; shared read-only by every
/// connection afterwards.
pub struct Gate {
    store: Arc<CredentialStore>,
    config: Option<ServerConfig>,
    resumption: ResumptionKeys,
    validator: Arc<dyn PathValidator>,
    openpgp: Option<Arc<dyn OpenPgpBackend>>,
    srp_lookup: Option<Arc<dyn VerifierLookup>>,
}

impl fmt::Debug for Gate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gate")
            .field("hosts", &self.store.len())
            .field("tickets", &self.resumption.is_initialized())
            .field("openpgp", &self.openpgp.is_some())
            .finish_non_exhaustive()
    }
}

impl Gate {
    pub(crate) fn new(
        store: Arc<CredentialStore>,
        config: Option<ServerConfig>,
        resumption: ResumptionKeys,
        validator: Arc<dyn PathValidator>,
        openpgp: Option<Arc<dyn OpenPgpBackend>>,
        srp_lookup: Option<Arc<dyn VerifierLookup>>,
    ) -> Self {
        Self {
            store,
            config,
            resumption,
            validator,
            openpgp,
            srp_lookup,
        }
    }

    pub fn builder() -> crate::GateBuilder {
        crate::GateBuilder::new()
    }

    /// Bind a freshly accepted connection to the default host.
    ///
    /// # Errors
    ///
    /// Fails when the engine rejects the default host's credentials or policy.
    pub fn accept<S: NegotiationSession>(
        &self,
        session: S,
    ) -> Result<Option<ConnectionHandle<S>>, TlsError> {
        ConnectionHandle::accept(
            session,
            Arc::clone(&self.store),
            &self.resumption,
            self.srp_lookup.clone(),
        )
    }

    /// Verification level the configuration demands for a resource.
    #[must_use]
    pub fn required_verify(&self, host: &str, path: &str) -> Option<VerifyMode> {
        self.config
            .as_ref()
            .and_then(|config| config.required_verify(host, path))
    }

    /// Access controller for one request.
    #[must_use]
    pub fn access_controller(&self) -> AccessController<'_> {
        AccessController::new(Verifier::new(
            self.validator.as_ref(),
            self.openpgp.as_deref(),
        ))
    }

    /// Check one request for `path` on `host`, exporting the TLS attributes
    /// into `attrs`.
    pub fn authorize<S: NegotiationSession>(
        &self,
        handle: &mut ConnectionHandle<S>,
        host: &str,
        path: &str,
        attrs: &mut RequestAttributes,
    ) -> AccessDecision {
        let required = self.required_verify(host, path);
        debug!("Access check for {}{} (required {:?})", host, path, required);
        let decision = self.access_controller().check(handle, required, attrs);
        handle.export_attributes(attrs);
        decision
    }

    /// Certificate resolver for serving the same hosts through rustls.
    ///
    /// # Errors
    ///
    /// Fails when a host's private key is not usable by rustls.
    pub fn rustls_resolver(&self) -> Result<SniCertResolver, TlsError> {
        SniCertResolver::new(Arc::clone(&self.store))
    }

    #[must_use]
    pub fn store(&self) -> &Arc<CredentialStore> {
        &self.store
    }

    #[must_use]
    pub fn tickets_available(&self) -> bool {
        self.resumption.is_initialized()
    }

    /// Release the session ticket key. Safe to call more than once.
    pub fn shutdown(&mut self) {
        self.resumption.teardown();
    }
}
