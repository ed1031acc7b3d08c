//! Certificate path validation against configured trust anchors

use std::collections::HashSet;
use std::path::Path;

use rustls::pki_types::CertificateDer;
use x509_parser::prelude::*;

use super::parser::PeerCertificate;
use crate::errors::{ConfigError, TlsError};
use crate::types::CertStatus;

/// Path validation primitive: chain plus anchors in, status bitmask out.
///
/// `Err` means validation could not be carried out at all (for example no
/// anchors); a chain that was examined and found wanting is `Ok` with bits set.
pub trait PathValidator: Send + Sync {
    fn verify_chain(
        &self,
        chain: &[PeerCertificate],
        trust: &X509TrustAnchors,
        now: i64,
    ) -> Result<CertStatus, TlsError>;
}

/// Revoked serial numbers published by one issuer.
#[derive(Debug, Clone)]
pub struct RevocationList {
    issuer_raw: Vec<u8>,
    revoked_serials: HashSet<Vec<u8>>,
}

impl RevocationList {
    pub fn from_der(der: &[u8]) -> Result<Self, TlsError> {
        let (_, crl) = CertificateRevocationList::from_der(der)
            .map_err(|e| TlsError::CertificateParsing(format!("Failed to parse CRL: {e}")))?;
        Ok(Self {
            issuer_raw: crl.issuer().as_raw().to_vec(),
            revoked_serials: crl
                .iter_revoked_certificates()
                .map(|revoked| revoked.raw_serial().to_vec())
                .collect(),
        })
    }

    fn revokes(&self, cert: &PeerCertificate) -> bool {
        self.issuer_raw == cert.issuer_raw && self.revoked_serials.contains(&cert.serial)
    }

    pub fn len(&self) -> usize {
        self.revoked_serials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.revoked_serials.is_empty()
    }
}

/// Trusted issuers and revocation lists of one virtual host.
#[derive(Debug, Default)]
pub struct X509TrustAnchors {
    anchors: Vec<PeerCertificate>,
    crls: Vec<RevocationList>,
}

impl X509TrustAnchors {
    pub fn new(anchors: Vec<PeerCertificate>, crls: Vec<RevocationList>) -> Self {
        Self { anchors, crls }
    }

    /// Parse anchors from DER certificates.
    pub fn from_der_certificates(certs: &[CertificateDer<'_>]) -> Result<Self, TlsError> {
        let anchors = certs
            .iter()
            .map(|der| PeerCertificate::from_der(der.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(anchors, Vec::new()))
    }

    pub fn with_revocation_lists(mut self, crls: Vec<RevocationList>) -> Self {
        self.crls = crls;
        self
    }

    pub fn anchors(&self) -> &[PeerCertificate] {
        &self.anchors
    }

    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.anchors.len()
    }

    fn is_revoked(&self, cert: &PeerCertificate) -> bool {
        self.crls.iter().any(|crl| crl.revokes(cert))
    }
}

/// Load every `X509 CRL` block from a PEM file.
pub fn load_revocation_lists(path: &Path) -> Result<Vec<RevocationList>, ConfigError> {
    let data = std::fs::read(path).map_err(|e| ConfigError::load(path, e))?;
    let blocks = ::pem::parse_many(&data).map_err(|e| ConfigError::load(path, e))?;
    blocks
        .iter()
        .filter(|block| block.tag() == "X509 CRL")
        .map(|block| {
            RevocationList::from_der(block.contents()).map_err(|e| ConfigError::load(path, e))
        })
        .collect()
}

/// Default validator built on x509-parser.
///
/// Every failure bit is accompanied by [`CertStatus::INVALID`], so callers
/// that only care about pass/fail can test that bit alone.
#[derive(Debug, Clone, Copy, Default)]
pub struct X509PathValidator;

impl PathValidator for X509PathValidator {
    fn verify_chain(
        &self,
        chain: &[PeerCertificate],
        trust: &X509TrustAnchors,
        now: i64,
    ) -> Result<CertStatus, TlsError> {
        if trust.is_empty() {
            return Err(TlsError::NoTrustAnchors(
                "no X.509 trust anchors configured".to_string(),
            ));
        }
        let Some(top) = chain.last() else {
            return Err(TlsError::CertificateValidation(
                "Empty certificate chain".to_string(),
            ));
        };

        let mut status = CertStatus::empty();

        for cert in chain {
            if now < cert.not_before {
                status |= CertStatus::NOT_ACTIVATED | CertStatus::INVALID;
            }
            if now > cert.not_after {
                status |= CertStatus::EXPIRED | CertStatus::INVALID;
            }
            if cert.uses_insecure_algorithm() {
                status |= CertStatus::INSECURE_ALGORITHM | CertStatus::INVALID;
            }
            if trust.is_revoked(cert) {
                status |= CertStatus::REVOKED | CertStatus::INVALID;
            }
        }

        // Each certificate must be issued by the next one in the chain
        for link in chain.windows(2) {
            let (cert, issuer) = (&link[0], &link[1]);
            if cert.issuer_raw != issuer.subject_raw {
                status |= CertStatus::SIGNER_NOT_FOUND | CertStatus::INVALID;
                continue;
            }
            if !issuer.is_ca {
                status |= CertStatus::SIGNER_NOT_CA | CertStatus::INVALID;
            }
            if !signed_by(cert, issuer)? {
                status |= CertStatus::INVALID;
            }
        }

        // The top of the chain is either an anchor itself or issued by one
        if trust.anchors.iter().any(|anchor| anchor.der() == top.der()) {
            return Ok(status);
        }

        let candidates: Vec<&PeerCertificate> = trust
            .anchors
            .iter()
            .filter(|anchor| anchor.subject_raw == top.issuer_raw)
            .collect();

        if candidates.is_empty() {
            status |= CertStatus::SIGNER_NOT_FOUND | CertStatus::INVALID;
            return Ok(status);
        }

        let mut verified = None;
        for anchor in candidates {
            if signed_by(top, anchor)? {
                verified = Some(anchor);
                break;
            }
        }

        match verified {
            Some(anchor) if !anchor.is_ca => {
                status |= CertStatus::SIGNER_NOT_CA | CertStatus::INVALID;
            }
            Some(anchor) if now > anchor.not_after || now < anchor.not_before => {
                status |= CertStatus::EXPIRED | CertStatus::INVALID;
            }
            Some(_) => {}
            None => status |= CertStatus::INVALID,
        }

        Ok(status)
    }
}

fn signed_by(cert: &PeerCertificate, issuer: &PeerCertificate) -> Result<bool, TlsError> {
    let (_, subject) = X509Certificate::from_der(cert.der().as_ref())
        .map_err(|e| TlsError::Internal(format!("Re-parsing a parsed certificate failed: {e}")))?;
    let (_, signer) = X509Certificate::from_der(issuer.der().as_ref())
        .map_err(|e| TlsError::Internal(format!("Re-parsing a parsed certificate failed: {e}")))?;
    Ok(subject.verify_signature(Some(signer.public_key())).is_ok())
}
