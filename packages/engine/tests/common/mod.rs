//! Shared fixtures: generated certificates and a recording engine session

#![allow(dead_code)]

use std::sync::Arc;

use rcgen::{BasicConstraints, CertificateParams, DnType, IsCa, Issuer, KeyPair};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use tlsgate_engine::{
    CertificateType, CredentialEntry, CredentialStore, HandshakeHooks, HandshakeSummary,
    NegotiationSession, PeerCertificate, PriorityPolicy, ServerIdentity, ServerNameIndication,
    TicketKey, TlsError, VerifyMode, X509TrustAnchors,
};
use tlsgate_engine::store::DhParams;

/// Certificate authority able to issue server and client certificates.
pub struct TestCa {
    pub der: Vec<u8>,
    pub pem: String,
    issuer: Issuer<'static, KeyPair>,
}

pub struct Issued {
    pub der: Vec<u8>,
    pub cert_pem: String,
    pub key_der: Vec<u8>,
    pub key_pem: String,
}

impl Issued {
    pub fn key(&self) -> PrivateKeyDer<'static> {
        PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(self.key_der.clone()))
    }

    pub fn chain(&self) -> Vec<CertificateDer<'static>> {
        vec![CertificateDer::from(self.der.clone())]
    }
}

impl TestCa {
    pub fn new(name: &str) -> Self {
        let key = KeyPair::generate().unwrap();
        let mut params = CertificateParams::new(Vec::<String>::new()).unwrap();
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.distinguished_name.push(DnType::CommonName, name);
        let cert = params.self_signed(&key).unwrap();
        Self {
            der: cert.der().to_vec(),
            pem: cert.pem(),
            issuer: Issuer::new(params, key),
        }
    }

    /// Leaf with `common_name` as CN and every entry of `dns_names` as a SAN.
    pub fn issue(&self, common_name: Option<&str>, dns_names: &[&str]) -> Issued {
        let key = KeyPair::generate().unwrap();
        let sans = dns_names.iter().map(|name| name.to_string()).collect::<Vec<_>>();
        let mut params = CertificateParams::new(sans).unwrap();
        params.distinguished_name = rcgen::DistinguishedName::new();
        if let Some(cn) = common_name {
            params.distinguished_name.push(DnType::CommonName, cn);
        }
        let cert = params.signed_by(&key, &self.issuer).unwrap();
        Issued {
            der: cert.der().to_vec(),
            cert_pem: cert.pem(),
            key_der: key.serialize_der(),
            key_pem: key.serialize_pem(),
        }
    }

    pub fn anchors(&self) -> X509TrustAnchors {
        X509TrustAnchors::new(vec![PeerCertificate::from_der(&self.der).unwrap()], vec![])
    }
}

/// Enabled X.509 host with a fresh certificate for `common_name`.
pub fn host(ca: &TestCa, name: &str, common_name: &str) -> CredentialEntry {
    let issued = ca.issue(Some(common_name), &[]);
    CredentialEntry::builder(name)
        .identity(ServerIdentity::x509(issued.chain(), Some(issued.key())).unwrap())
        .priorities(PriorityPolicy::parse("NORMAL").unwrap())
        .build()
        .unwrap()
}

pub fn store(entries: Vec<CredentialEntry>) -> Arc<CredentialStore> {
    Arc::new(CredentialStore::new(entries).unwrap())
}

/// Engine call recorded by [`MockSession`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    ClientVerify(VerifyMode),
    CertificateCredentials,
    AnonymousCredentials,
    SrpCredentials,
    Priorities(String),
    CertificateTypes(Vec<CertificateType>),
    Tickets,
    Handshake,
    Rehandshake,
}

/// Engine session that records calls and replays a scripted client.
#[derive(Debug, Default)]
pub struct MockSession {
    pub calls: Vec<Call>,
    /// Server name the scripted client sends
    pub server_name: Option<ServerNameIndication>,
    /// Certificates the client presents once asked
    pub client_chain: Vec<Vec<u8>>,
    /// Certificates on the connection right now
    pub presented: Vec<Vec<u8>>,
    pub certificate_type: Option<CertificateType>,
    pub verify_requested: VerifyMode,
    pub fail_priorities: bool,
    pub fail_rehandshake: bool,
    /// Type of the identity retrieved during the last handshake
    pub served: Option<CertificateType>,
}

impl MockSession {
    pub fn with_server_name(name: &str) -> Self {
        Self {
            server_name: Some(ServerNameIndication::dns(name)),
            certificate_type: Some(CertificateType::X509),
            ..Self::default()
        }
    }

    pub fn count(&self, call: &Call) -> usize {
        self.calls.iter().filter(|c| *c == call).count()
    }

    fn run(&mut self, hooks: &mut dyn HandshakeHooks) -> Result<(), TlsError> {
        let server_name = self.server_name.clone();
        hooks.post_client_hello(self, server_name.as_ref())?;
        let requested = self.certificate_type.unwrap_or(CertificateType::X509);
        self.served = Some(hooks.retrieve(requested)?.certificate_type());
        if self.verify_requested != VerifyMode::Ignore {
            self.presented = self.client_chain.clone();
        }
        Ok(())
    }
}

impl NegotiationSession for MockSession {
    fn set_client_verify(&mut self, mode: VerifyMode) {
        self.verify_requested = mode;
        self.calls.push(Call::ClientVerify(mode));
    }

    fn set_certificate_credentials(&mut self) {
        self.calls.push(Call::CertificateCredentials);
    }

    fn set_anonymous_credentials(&mut self, _dh_params: &DhParams) {
        self.calls.push(Call::AnonymousCredentials);
    }

    fn set_srp_credentials(&mut self) {
        self.calls.push(Call::SrpCredentials);
    }

    fn set_priorities(&mut self, policy: &PriorityPolicy) -> Result<(), TlsError> {
        if self.fail_priorities {
            return Err(TlsError::Priority(policy.as_str().to_string()));
        }
        self.calls.push(Call::Priorities(policy.as_str().to_string()));
        Ok(())
    }

    fn set_certificate_type_priority(
        &mut self,
        allowed: &[CertificateType],
    ) -> Result<(), TlsError> {
        self.calls.push(Call::CertificateTypes(allowed.to_vec()));
        Ok(())
    }

    fn enable_session_tickets(&mut self, key: &TicketKey) -> Result<(), TlsError> {
        assert_eq!(key.as_bytes().len(), 32);
        self.calls.push(Call::Tickets);
        Ok(())
    }

    fn negotiated_certificate_type(&self) -> Option<CertificateType> {
        self.certificate_type
    }

    fn peer_certificates(&self) -> Vec<Vec<u8>> {
        self.presented.clone()
    }

    fn handshake(&mut self, hooks: &mut dyn HandshakeHooks) -> Result<(), TlsError> {
        self.calls.push(Call::Handshake);
        self.run(hooks)
    }

    fn rehandshake(&mut self, hooks: &mut dyn HandshakeHooks) -> Result<(), TlsError> {
        self.calls.push(Call::Rehandshake);
        if self.fail_rehandshake {
            return Err(TlsError::Renegotiation("peer refused".to_string()));
        }
        self.run(hooks)
    }

    fn summary(&self) -> HandshakeSummary {
        HandshakeSummary {
            library: "mock/1.0".to_string(),
            protocol: "TLS1.2".to_string(),
            cipher_suite: "ECDHE_RSA_AES_128_GCM_SHA256".to_string(),
            compression: "NULL".to_string(),
            cipher_key_bits: 128,
            session_id: vec![0x0a, 0xbc],
            srp_user: None,
        }
    }
}
