//! rustls certificate selection backed by the credential store

use std::sync::Arc;

use rustls::server::{ClientHello, ResolvesServerCert};
use rustls::sign::CertifiedKey;
use tracing::{debug, warn};

use crate::errors::TlsError;
use crate::store::{CredentialEntry, CredentialStore, ServerIdentity};

/// Selects a host's X.509 identity from the client's server name, falling
/// back to the default host. OpenPGP identities are not offered to rustls.
#[derive(Debug)]
pub struct SniCertResolver {
    store: Arc<CredentialStore>,
    keys: Vec<(Arc<CredentialEntry>, Arc<CertifiedKey>)>,
}

impl SniCertResolver {
    pub fn new(store: Arc<CredentialStore>) -> Result<Self, TlsError> {
        let mut keys = Vec::new();
        for entry in store.entries() {
            let Some(ServerIdentity::X509 {
                chain,
                key: Some(key),
                ..
            }) = entry.identity.as_ref()
            else {
                if entry.enabled {
                    warn!("Host '{}' has no X.509 identity for rustls", entry.name);
                }
                continue;
            };
            let signing_key = rustls::crypto::ring::sign::any_supported_type(key).map_err(|e| {
                TlsError::CredentialUnavailable(format!(
                    "Unsupported private key for '{}': {e}",
                    entry.name
                ))
            })?;
            keys.push((
                Arc::clone(entry),
                Arc::new(CertifiedKey::new(chain.clone(), signing_key)),
            ));
        }
        Ok(Self { store, keys })
    }

    /// Identity for a requested server name.
    pub fn certified_key_for(&self, server_name: Option<&str>) -> Option<Arc<CertifiedKey>> {
        let entry = match server_name.and_then(|name| self.store.lookup_by_name(name)) {
            Some(entry) => entry,
            None => {
                let default = self.store.default_entry();
                if !default.enabled {
                    return None;
                }
                Arc::clone(default)
            }
        };
        debug!("rustls handshake bound to '{}'", entry.name);
        self.keys
            .iter()
            .find(|(candidate, _)| Arc::ptr_eq(candidate, &entry))
            .map(|(_, key)| Arc::clone(key))
    }
}

impl ResolvesServerCert for SniCertResolver {
    fn resolve(&self, client_hello: ClientHello<'_>) -> Option<Arc<CertifiedKey>> {
        self.certified_key_for(client_hello.server_name())
    }
}
