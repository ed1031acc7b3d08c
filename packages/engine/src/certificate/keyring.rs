//! OpenPGP identities
//!
//! OpenPGP packet handling belongs to the TLS engine. This module defines the
//! records the rest of the crate works with and the backend contract used to
//! import certificates and check them against a trusted keyring.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::errors::{ConfigError, TlsError};
use crate::types::{CertStatus, SecureKeyMaterial};

/// Fields of one imported OpenPGP certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyringCertificate {
    /// Packet bytes as presented or loaded
    pub raw: Vec<u8>,
    /// First user id
    pub name: String,
    pub fingerprint: Vec<u8>,
    pub version: u32,
    pub created: i64,
    /// Expiration as seconds since the epoch; `0` when the key never expires
    pub expires: i64,
    pub key_algorithm: String,
}

impl KeyringCertificate {
    /// Base64 armour-free rendering exported as `SSL_*_CERT`.
    pub fn to_base64(&self) -> String {
        use base64::Engine;
        base64::engine::general_purpose::STANDARD.encode(&self.raw)
    }
}

/// A trusted OpenPGP keyring, opaque to this crate.
#[derive(Clone, PartialEq, Eq)]
pub struct Keyring {
    raw: Arc<[u8]>,
}

impl Keyring {
    pub fn new(raw: Vec<u8>) -> Self {
        Self { raw: raw.into() }
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read(path).map_err(|e| ConfigError::load(path, e))?;
        if raw.is_empty() {
            return Err(ConfigError::load(path, "keyring file is empty"));
        }
        Ok(Self::new(raw))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.raw
    }
}

impl fmt::Debug for Keyring {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keyring")
            .field("len", &self.raw.len())
            .finish()
    }
}

/// OpenPGP private key bytes, zeroed on drop.
pub type KeyringPrivateKey = SecureKeyMaterial;

/// Engine-provided OpenPGP operations.
pub trait OpenPgpBackend: Send + Sync {
    /// Import one certificate from raw packet bytes.
    fn import(&self, raw: &[u8]) -> Result<KeyringCertificate, TlsError>;

    /// Check a certificate against a trusted keyring.
    fn verify_ring(
        &self,
        cert: &KeyringCertificate,
        keyring: &Keyring,
    ) -> Result<CertStatus, TlsError>;
}
