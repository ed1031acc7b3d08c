//! X.509 parsing into owned certificate records and PEM file loading

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use x509_parser::prelude::*;

use crate::errors::{ConfigError, TlsError};
use crate::types::SubjectAltName;

/// One parsed X.509 certificate.
///
/// Owns its DER bytes and every field the verifier and attribute export read,
/// so nothing borrows from the wire buffer once parsing returns.
#[derive(Debug)]
pub struct PeerCertificate {
    der: CertificateDer<'static>,
    pub subject_dn: String,
    pub issuer_dn: String,
    pub(crate) subject_raw: Vec<u8>,
    pub(crate) issuer_raw: Vec<u8>,
    pub common_name: Option<String>,
    pub serial: Vec<u8>,
    pub version: u32,
    pub not_before: i64,
    pub not_after: i64,
    pub signature_algorithm: String,
    pub(crate) signature_oid: String,
    pub key_algorithm: String,
    pub subject_alt_names: Vec<SubjectAltName>,
    pub is_ca: bool,
}

impl PeerCertificate {
    /// Parse one DER encoded certificate. Trailing bytes are rejected.
    pub fn from_der(der: &[u8]) -> Result<Self, TlsError> {
        let (remaining, cert) = X509Certificate::from_der(der).map_err(|e| {
            TlsError::CertificateParsing(format!("Failed to parse DER certificate: {e}"))
        })?;
        if !remaining.is_empty() {
            return Err(TlsError::CertificateParsing(format!(
                "{} trailing bytes after certificate",
                remaining.len()
            )));
        }

        let subject_alt_names = match cert.subject_alternative_name() {
            Ok(Some(ext)) => ext
                .value
                .general_names
                .iter()
                .map(|name| match name {
                    GeneralName::DNSName(dns) => SubjectAltName::Dns((*dns).to_string()),
                    GeneralName::RFC822Name(mail) => SubjectAltName::Rfc822((*mail).to_string()),
                    GeneralName::URI(uri) => SubjectAltName::Uri((*uri).to_string()),
                    _ => SubjectAltName::Unsupported,
                })
                .collect(),
            Ok(None) => Vec::new(),
            Err(e) => {
                tracing::warn!("Ignoring malformed subjectAltName extension: {}", e);
                Vec::new()
            }
        };

        let signature_oid = cert.signature_algorithm.algorithm.to_id_string();
        let key_oid = cert.public_key().algorithm.algorithm.to_id_string();

        let parsed = Self {
            der: CertificateDer::from(der.to_vec()),
            subject_dn: cert.subject().to_string(),
            issuer_dn: cert.issuer().to_string(),
            subject_raw: cert.subject().as_raw().to_vec(),
            issuer_raw: cert.issuer().as_raw().to_vec(),
            common_name: cert
                .subject()
                .iter_common_name()
                .next()
                .and_then(|cn| cn.as_str().ok())
                .map(str::to_string),
            serial: cert.raw_serial().to_vec(),
            version: cert.version().0 + 1,
            not_before: cert.validity().not_before.timestamp(),
            not_after: cert.validity().not_after.timestamp(),
            signature_algorithm: signature_algorithm_name(&signature_oid),
            signature_oid,
            key_algorithm: key_algorithm_name(&key_oid),
            subject_alt_names,
            is_ca: cert.is_ca(),
        };
        live::acquire();
        Ok(parsed)
    }

    pub fn der(&self) -> &CertificateDer<'static> {
        &self.der
    }

    /// Name a virtual host is matched by: the subject common name, or the
    /// first DNS subject alternative name when the subject has no CN.
    pub fn host_pattern(&self) -> Option<String> {
        if let Some(cn) = self.common_name.as_ref().filter(|cn| !cn.is_empty()) {
            return Some(cn.clone());
        }
        self.subject_alt_names.iter().find_map(|san| match san {
            SubjectAltName::Dns(name) => Some(name.clone()),
            _ => None,
        })
    }

    /// Whether the signature uses a digest the verifier treats as broken.
    pub fn uses_insecure_algorithm(&self) -> bool {
        matches!(
            self.signature_oid.as_str(),
            "1.2.840.113549.1.1.2" | "1.2.840.113549.1.1.4"
        )
    }

    /// PEM rendering of the certificate, as exported in `SSL_*_CERT`.
    pub fn to_pem(&self) -> String {
        ::pem::encode(&::pem::Pem::new("CERTIFICATE", self.der.to_vec()))
    }
}

impl Drop for PeerCertificate {
    fn drop(&mut self) {
        live::release();
    }
}

fn signature_algorithm_name(oid: &str) -> String {
    match oid {
        "1.2.840.113549.1.1.2" => "RSA-MD2",
        "1.2.840.113549.1.1.4" => "RSA-MD5",
        "1.2.840.113549.1.1.5" => "RSA-SHA1",
        "1.2.840.113549.1.1.10" => "RSA-PSS",
        "1.2.840.113549.1.1.11" => "RSA-SHA256",
        "1.2.840.113549.1.1.12" => "RSA-SHA384",
        "1.2.840.113549.1.1.13" => "RSA-SHA512",
        "1.2.840.10040.4.3" => "DSA-SHA1",
        "1.2.840.10045.4.1" => "ECDSA-SHA1",
        "1.2.840.10045.4.3.2" => "ECDSA-SHA256",
        "1.2.840.10045.4.3.3" => "ECDSA-SHA384",
        "1.2.840.10045.4.3.4" => "ECDSA-SHA512",
        "1.3.101.112" => "EdDSA-Ed25519",
        "1.3.101.113" => "EdDSA-Ed448",
        other => other,
    }
    .to_string()
}

fn key_algorithm_name(oid: &str) -> String {
    match oid {
        "1.2.840.113549.1.1.1" => "RSA",
        "1.2.840.113549.1.1.10" => "RSA-PSS",
        "1.2.840.10040.4.1" => "DSA",
        "1.2.840.10045.2.1" => "EC",
        "1.3.101.112" => "Ed25519",
        "1.3.101.113" => "Ed448",
        other => other,
    }
    .to_string()
}

/// Load every certificate from a PEM file, in file order.
pub fn load_certificates(path: &Path) -> Result<Vec<CertificateDer<'static>>, ConfigError> {
    let file = File::open(path).map_err(|e| ConfigError::load(path, e))?;
    let mut reader = BufReader::new(file);
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ConfigError::load(path, e))?;
    if certs.is_empty() {
        return Err(ConfigError::load(path, "no certificates found"));
    }
    Ok(certs)
}

/// Load the first private key (PKCS#8, PKCS#1 or SEC1) from a PEM file.
pub fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, ConfigError> {
    let file = File::open(path).map_err(|e| ConfigError::load(path, e))?;
    let mut reader = BufReader::new(file);
    rustls_pemfile::private_key(&mut reader)
        .map_err(|e| ConfigError::load(path, e))?
        .ok_or_else(|| ConfigError::load(path, "no private key found"))
}


#[cfg(not(test))]
mod live {
    #[inline(always)]
    pub(crate) fn acquire() {}

    #[inline(always)]
    pub(crate) fn release() {}
}
