//! Request attributes describing the TLS layer
//!
//! Handlers further down the request pipeline see the negotiated parameters,
//! the server identity and the client verification result as flat `SSL_*`
//! name/value pairs.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::certificate::{KeyringCertificate, PeerCertificate};
use crate::engine::HandshakeSummary;
use crate::store::ServerIdentity;
use crate::types::CertificateType;
use crate::verifier::{Verdict, VerifyOutcome};

/// Value of `SSL_VERSION_INTERFACE`.
pub const INTERFACE_VERSION: &str = concat!("tlsgate/", env!("CARGO_PKG_VERSION"));

/// Key sizes at or below this many bits are flagged as export grade.
const EXPORT_KEY_BITS: u32 = 40;

/// Which end of the connection a certificate belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Server,
    Client,
}

impl Side {
    fn prefix(self) -> &'static str {
        match self {
            Self::Server => "SSL_SERVER",
            Self::Client => "SSL_CLIENT",
        }
    }
}

/// RFC 2822 style timestamp, e.g. `Tue, 01 Jun 2027 12:00:00 GMT`.
pub fn format_time(epoch_seconds: i64) -> String {
    DateTime::<Utc>::from_timestamp(epoch_seconds, 0)
        .unwrap_or_default()
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string()
}

/// Per-certificate attribute suffixes (`_S_DN`, `_V_END`, ...) and values.
///
/// Built while the certificate is still parsed, so the exported values
/// outlive the chain they were read from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CertificateAttributes {
    fields: Vec<(String, String)>,
}

impl CertificateAttributes {
    pub fn from_x509(cert: &PeerCertificate, export_certificate: bool) -> Self {
        let mut attrs = Self::default();
        if export_certificate {
            attrs.push("_CERT", cert.to_pem());
        }
        attrs.push("_S_DN", cert.subject_dn.clone());
        attrs.push("_I_DN", cert.issuer_dn.clone());
        attrs.push("_M_SERIAL", hex::encode_upper(&cert.serial));
        if cert.version > 0 {
            attrs.push("_M_VERSION", cert.version.to_string());
        }
        attrs.push("_CERT_TYPE", CertificateType::X509.label().to_string());
        attrs.push("_V_END", format_time(cert.not_after));
        attrs.push("_V_START", format_time(cert.not_before));
        attrs.push("_A_SIG", cert.signature_algorithm.clone());
        attrs.push("_A_KEY", cert.key_algorithm.clone());
        for (index, name) in cert.subject_alt_names.iter().enumerate() {
            attrs.push(&format!("_S_AN{index}"), name.export_value());
        }
        attrs
    }

    pub fn from_openpgp(cert: &KeyringCertificate, export_certificate: bool) -> Self {
        let mut attrs = Self::default();
        if export_certificate {
            attrs.push("_CERT", cert.to_base64());
        }
        attrs.push("_NAME", cert.name.clone());
        attrs.push("_FINGERPRINT", hex::encode_upper(&cert.fingerprint));
        if cert.version > 0 {
            attrs.push("_M_VERSION", cert.version.to_string());
        }
        attrs.push("_CERT_TYPE", CertificateType::OpenPgp.label().to_string());
        attrs.push("_V_END", format_time(cert.expires));
        attrs.push("_V_START", format_time(cert.created));
        attrs.push("_A_KEY", cert.key_algorithm.clone());
        attrs
    }

    /// Attributes of a server identity, when it matches the negotiated type.
    pub fn for_identity(
        identity: &ServerIdentity,
        negotiated: CertificateType,
        export_certificate: bool,
    ) -> Option<Self> {
        match (identity, negotiated) {
            (ServerIdentity::X509 { leaf, .. }, CertificateType::X509) => {
                Some(Self::from_x509(leaf, export_certificate))
            }
            (ServerIdentity::OpenPgp { certificate, .. }, CertificateType::OpenPgp) => {
                Some(Self::from_openpgp(certificate, export_certificate))
            }
            _ => None,
        }
    }

    fn push(&mut self, suffix: &str, value: String) {
        self.fields.push((suffix.to_string(), value));
    }

    pub fn get(&self, suffix: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(name, _)| name == suffix)
            .map(|(_, value)| value.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Attributes attached to one request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestAttributes {
    values: BTreeMap<String, String>,
}

impl RequestAttributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Export the negotiated parameters and the server certificate.
    pub fn export_handshake(
        &mut self,
        summary: &HandshakeSummary,
        server_certificate: Option<&CertificateAttributes>,
    ) {
        self.set("HTTPS", "on");
        self.set("SSL_VERSION_LIBRARY", summary.library.as_str());
        self.set("SSL_VERSION_INTERFACE", INTERFACE_VERSION);
        self.set("SSL_PROTOCOL", summary.protocol.as_str());
        self.set("SSL_CIPHER", summary.cipher_suite.as_str());
        self.set("SSL_COMPRESS_METHOD", summary.compression.as_str());
        self.set("SSL_SRP_USER", summary.srp_user.as_deref().unwrap_or(""));

        self.values
            .entry("SSL_CLIENT_VERIFY".to_string())
            .or_insert_with(|| VerifyOutcome::None.as_str().to_string());

        let key_bits = summary.cipher_key_bits.to_string();
        self.set("SSL_CIPHER_USEKEYSIZE", key_bits.as_str());
        self.set("SSL_CIPHER_ALGKEYSIZE", key_bits);
        self.set(
            "SSL_CIPHER_EXPORT",
            if summary.cipher_key_bits <= EXPORT_KEY_BITS {
                "true"
            } else {
                "false"
            },
        );
        self.set("SSL_SESSION_ID", hex::encode_upper(&summary.session_id));

        if let Some(attrs) = server_certificate {
            self.export_certificate(Side::Server, attrs);
        }
    }

    /// Export the result of a client certificate verification.
    pub fn record_verdict(&mut self, verdict: &Verdict) {
        if let Some(attrs) = verdict.client_certificate.as_ref() {
            self.export_certificate(Side::Client, attrs);
        }
        if let Some(days) = verdict.days_remaining {
            self.set("SSL_CLIENT_V_REMAIN", days.to_string());
        }
        if verdict.outcome != VerifyOutcome::None {
            self.set("SSL_CLIENT_VERIFY", verdict.outcome.as_str());
        }
    }

    pub fn export_certificate(&mut self, side: Side, attrs: &CertificateAttributes) {
        for (suffix, value) in &attrs.fields {
            self.set(format!("{}{}", side.prefix(), suffix), value.as_str());
        }
    }
}
