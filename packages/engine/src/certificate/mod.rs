//! Certificate management module
//!
//! This module provides the certificate side of verification:
//! - X.509 parsing into owned records
//! - Presented chain handling with truncation
//! - Path validation against trust anchors and revocation lists
//! - OpenPGP identity records and backend contract

pub mod chain;
pub mod keyring;
pub mod parser;
pub mod validation;

pub use chain::CertificateChain;
pub use keyring::{Keyring, KeyringCertificate, KeyringPrivateKey, OpenPgpBackend};
pub use parser::{PeerCertificate, load_certificates, load_private_key};
pub use validation::{
    PathValidator, RevocationList, X509PathValidator, X509TrustAnchors, load_revocation_lists,
};
