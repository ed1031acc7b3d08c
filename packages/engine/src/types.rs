//! Core types shared by the store, the handshake hooks and the verifier

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer};
use zeroize::ZeroizeOnDrop;

use crate::errors::ConfigError;

/// Maximum number of peer certificates considered for one verification.
pub const MAX_CHAIN_SIZE: usize = 8;

/// Seconds in one day, used for remaining-validity arithmetic.
pub const SECONDS_PER_DAY: i64 = 86_400;

/// Client certificate verification level.
///
/// Ordered: `Ignore < Request < Require`. A resource demanding a level above the
/// connection's negotiated one triggers escalation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum VerifyMode {
    /// Never ask the client for a certificate
    #[default]
    Ignore,
    /// Ask for a certificate; verification failures are advisory
    Request,
    /// A verified certificate is mandatory
    Require,
}

impl VerifyMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ignore => "ignore",
            Self::Request => "request",
            Self::Require => "require",
        }
    }
}

impl FromStr for VerifyMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "ignore" => Ok(Self::Ignore),
            "optional" | "request" => Ok(Self::Request),
            "require" => Ok(Self::Require),
            _ => Err(ConfigError::InvalidVerifyMode(s.to_string())),
        }
    }
}

impl<'de> Deserialize<'de> for VerifyMode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

impl fmt::Display for VerifyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Certificate formats the engine can negotiate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CertificateType {
    X509,
    OpenPgp,
}

impl CertificateType {
    /// Value exported as `SSL_*_CERT_TYPE`.
    pub fn label(self) -> &'static str {
        match self {
            Self::X509 => "X.509",
            Self::OpenPgp => "OPENPGP",
        }
    }
}

/// Declared type of a server name indication.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameType {
    Dns,
    /// Any other type code carried by the extension
    Other(u8),
}

/// Raw server name indication as handed over by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerNameIndication {
    pub name_type: NameType,
    pub value: Vec<u8>,
}

impl ServerNameIndication {
    pub fn dns(name: &str) -> Self {
        Self {
            name_type: NameType::Dns,
            value: name.as_bytes().to_vec(),
        }
    }
}

bitflags::bitflags! {
    /// Path validation status bits. An empty set means the chain is valid.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct CertStatus: u32 {
        const INVALID = 1 << 1;
        const REVOKED = 1 << 5;
        const SIGNER_NOT_FOUND = 1 << 6;
        const SIGNER_NOT_CA = 1 << 7;
        const INSECURE_ALGORITHM = 1 << 8;
        const NOT_ACTIVATED = 1 << 9;
        const EXPIRED = 1 << 10;
    }
}

/// Kinds of subject alternative names exported per certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubjectAltName {
    Dns(String),
    Rfc822(String),
    Uri(String),
    Unsupported,
}

impl SubjectAltName {
    /// Value exported as `SSL_*_S_AN{n}`.
    pub fn export_value(&self) -> String {
        match self {
            Self::Dns(name) => format!("DNSNAME:{name}"),
            Self::Rfc822(name) => format!("RFC822NAME:{name}"),
            Self::Uri(uri) => format!("URI:{uri}"),
            Self::Unsupported => "UNSUPPORTED".to_string(),
        }
    }
}

/// Secure key material that zeroes on drop
#[derive(ZeroizeOnDrop)]
pub struct SecureKeyMaterial {
    data: Vec<u8>,
}

impl SecureKeyMaterial {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl fmt::Debug for SecureKeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecureKeyMaterial")
            .field("len", &self.data.len())
            .finish_non_exhaustive()
    }
}
