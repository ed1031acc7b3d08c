//! Presented peer chains
//!
//! A [`CertificateChain`] exclusively owns the certificates parsed from one
//! handshake's peer list. Dropping it releases every element, so an early
//! return from the verifier cannot leave parsed certificates behind.

use tracing::{debug, info};

use super::parser::PeerCertificate;
use crate::errors::TlsError;

#[derive(Debug)]
pub struct CertificateChain {
    certs: Vec<PeerCertificate>,
    presented: usize,
}

impl CertificateChain {
    /// Parse a peer chain, leaf first.
    ///
    /// At most `max_depth` elements are parsed. When an element fails to parse
    /// after at least one success, the chain is cut at that element and the
    /// leading part is returned; a failure on the leaf is an error.
    pub fn parse<B: AsRef<[u8]>>(presented: &[B], max_depth: usize) -> Result<Self, TlsError> {
        debug!(
            "A chain of {} certificate(s) was provided for validation",
            presented.len()
        );
        if presented.len() > max_depth {
            info!(
                "Peer presented {} certificates, only the first {} are considered",
                presented.len(),
                max_depth
            );
        }

        let mut certs = Vec::with_capacity(presented.len().min(max_depth));
        for (index, der) in presented.iter().take(max_depth).enumerate() {
            match PeerCertificate::from_der(der.as_ref()) {
                Ok(cert) => certs.push(cert),
                Err(e) if index == 0 => {
                    return Err(TlsError::CertificateParsing(format!(
                        "Failed to import peer certificates: {e}"
                    )));
                }
                Err(e) => {
                    info!(
                        "Failed to import some peer certificates ({}). Using {} certificates",
                        e,
                        certs.len()
                    );
                    break;
                }
            }
        }

        if certs.is_empty() {
            return Err(TlsError::CertificateParsing(
                "No certificates found in chain".to_string(),
            ));
        }

        Ok(Self {
            certs,
            presented: presented.len(),
        })
    }

    pub fn leaf(&self) -> &PeerCertificate {
        // parse() never builds an empty chain
        &self.certs[0]
    }

    pub fn certificates(&self) -> &[PeerCertificate] {
        &self.certs
    }

    pub fn len(&self) -> usize {
        self.certs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.certs.is_empty()
    }

    /// Whether fewer certificates were usable than the peer presented.
    pub fn is_truncated(&self) -> bool {
        self.certs.len() < self.presented
    }
}
