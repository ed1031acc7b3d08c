//! Connection binding, SNI rebinding and handshake credential selection

mod common;

use common::{Call, MockSession, TestCa, host, store};
use tlsgate_engine::{
    CertificateType, ConnectionHandle, CredentialProvider, NameType, RequestAttributes,
    ResumptionKeys, ServerNameIndication, SrpSource, TlsError, VerifyMode,
};

fn keys() -> ResumptionKeys {
    ResumptionKeys::generate_with(|buf| {
        buf.fill(0x42);
        Ok(())
    })
}

#[test]
fn test_sni_rebinds_to_matching_host() {
    let ca = TestCa::new("Handshake CA");
    let mut secure = host(&ca, "secure", "secure.example.com");
    secure.verify_mode = VerifyMode::Request;
    secure.priorities = Some(tlsgate_engine::PriorityPolicy::parse("SECURE256").unwrap());
    let store = store(vec![host(&ca, "default", "default.example.com"), secure]);

    let session = MockSession::with_server_name("secure.example.com");
    let mut handle = ConnectionHandle::accept(session, store, &keys(), None)
        .unwrap()
        .unwrap();
    assert_eq!(handle.entry().name, "default");

    handle.handshake().unwrap();

    assert_eq!(handle.entry().name, "secure");
    assert!(handle.binding().is_rebound());
    assert_eq!(handle.verify_mode(), VerifyMode::Request);
    let calls = &handle.session().calls;
    assert_eq!(calls.last(), Some(&Call::CertificateTypes(vec![CertificateType::X509])));
    assert!(calls.contains(&Call::Priorities("SECURE256".to_string())));
    assert!(calls.contains(&Call::ClientVerify(VerifyMode::Request)));
    assert_eq!(handle.session().served, Some(CertificateType::X509));
}

#[test]
fn test_unknown_name_keeps_default_host() {
    let ca = TestCa::new("Handshake CA");
    let store = store(vec![
        host(&ca, "default", "default.example.com"),
        host(&ca, "www", "www.example.com"),
    ]);

    let session = MockSession::with_server_name("unknown.example.org");
    let mut handle = ConnectionHandle::accept(session, store, &keys(), None)
        .unwrap()
        .unwrap();
    handle.handshake().unwrap();

    assert_eq!(handle.entry().name, "default");
    assert!(!handle.binding().is_rebound());
    // Policy is reapplied on the handshake path even without a match
    assert_eq!(handle.session().count(&Call::CertificateCredentials), 2);
}

#[test]
fn test_non_dns_name_type_is_ignored() {
    let ca = TestCa::new("Handshake CA");
    let store = store(vec![
        host(&ca, "default", "default.example.com"),
        host(&ca, "www", "www.example.com"),
    ]);

    let mut session = MockSession::with_server_name("www.example.com");
    session.server_name = Some(ServerNameIndication {
        name_type: NameType::Other(7),
        value: b"www.example.com".to_vec(),
    });
    let mut handle = ConnectionHandle::accept(session, store, &keys(), None)
        .unwrap()
        .unwrap();
    handle.handshake().unwrap();
    assert_eq!(handle.entry().name, "default");
}

#[test]
fn test_renegotiation_does_not_rebind() {
    let ca = TestCa::new("Handshake CA");
    let mut default = host(&ca, "default", "default.example.com");
    default.x509_trust = ca.anchors();
    let store = store(vec![default, host(&ca, "www", "www.example.com")]);

    let mut handle = ConnectionHandle::accept(MockSession::default(), store, &keys(), None)
        .unwrap()
        .unwrap();
    handle.session_mut().certificate_type = Some(CertificateType::X509);
    handle.handshake().unwrap();
    assert_eq!(handle.entry().name, "default");

    handle.session_mut().server_name = Some(ServerNameIndication::dns("www.example.com"));
    handle.renegotiate(VerifyMode::Require).unwrap();

    assert_eq!(handle.entry().name, "default");
    assert_eq!(handle.verify_mode(), VerifyMode::Require);
    assert_eq!(
        handle.session().calls.iter().rev().find(|c| matches!(c, Call::ClientVerify(_))),
        Some(&Call::ClientVerify(VerifyMode::Require))
    );
}

#[test]
fn test_binder_failure_aborts_handshake() {
    let ca = TestCa::new("Handshake CA");
    let store = store(vec![host(&ca, "default", "default.example.com")]);

    let mut session = MockSession::with_server_name("default.example.com");
    session.fail_priorities = true;
    let result = ConnectionHandle::accept(session, store, &keys(), None);
    assert!(matches!(result, Err(TlsError::Internal(_))));
}

#[test]
fn test_accept_declines_when_default_host_disabled() {
    let ca = TestCa::new("Handshake CA");
    let mut default = host(&ca, "default", "default.example.com");
    default.enabled = false;
    let store = store(vec![default, host(&ca, "www", "www.example.com")]);

    let handle = ConnectionHandle::accept(MockSession::default(), store, &keys(), None).unwrap();
    assert!(handle.is_none());
}

#[test]
fn test_tickets_follow_key_and_host_flag() {
    let ca = TestCa::new("Handshake CA");
    let mut no_tickets = host(&ca, "default", "default.example.com");
    no_tickets.tickets = false;

    let with_key = ConnectionHandle::accept(
        MockSession::default(),
        store(vec![host(&ca, "default", "default.example.com")]),
        &keys(),
        None,
    )
    .unwrap()
    .unwrap();
    assert!(with_key.tickets_enabled());
    assert_eq!(with_key.session().count(&Call::Tickets), 1);

    let without_key = ConnectionHandle::accept(
        MockSession::default(),
        store(vec![host(&ca, "default", "default.example.com")]),
        &ResumptionKeys::default(),
        None,
    )
    .unwrap()
    .unwrap();
    assert!(!without_key.tickets_enabled());

    let host_disabled =
        ConnectionHandle::accept(MockSession::default(), store(vec![no_tickets]), &keys(), None)
            .unwrap()
            .unwrap();
    assert!(!host_disabled.tickets_enabled());
    assert_eq!(host_disabled.session().count(&Call::Tickets), 0);
}

#[test]
fn test_retrieval_reports_missing_material() {
    let ca = TestCa::new("Handshake CA");
    let mut srp_host = host(&ca, "default", "default.example.com");
    srp_host.srp = Some(SrpSource::Query("users".to_string()));
    let handle =
        ConnectionHandle::accept(MockSession::default(), store(vec![srp_host]), &keys(), None)
            .unwrap()
            .unwrap();

    assert!(handle.binding().retrieve(CertificateType::X509).is_ok());
    assert!(matches!(
        handle.binding().retrieve(CertificateType::OpenPgp),
        Err(TlsError::CredentialUnavailable(_))
    ));
    assert_eq!(handle.session().count(&Call::SrpCredentials), 1);
}

#[test]
fn test_server_attributes_exported_after_handshake() {
    let ca = TestCa::new("Handshake CA");
    let mut default = host(&ca, "default", "default.example.com");
    default.export_certificates = true;

    let session = MockSession::with_server_name("default.example.com");
    let mut handle = ConnectionHandle::accept(session, store(vec![default]), &keys(), None)
        .unwrap()
        .unwrap();
    handle.handshake().unwrap();

    let mut attrs = RequestAttributes::new();
    handle.export_attributes(&mut attrs);
    assert_eq!(attrs.get("HTTPS"), Some("on"));
    assert_eq!(attrs.get("SSL_SESSION_ID"), Some("0ABC"));
    assert_eq!(attrs.get("SSL_SERVER_CERT_TYPE"), Some("X.509"));
    assert_eq!(attrs.get("SSL_CLIENT_VERIFY"), Some("NONE"));
    assert!(attrs.get("SSL_SERVER_S_DN").unwrap().contains("default.example.com"));
    assert!(attrs.get("SSL_SERVER_I_DN").unwrap().contains("Handshake CA"));
    assert!(attrs.get("SSL_SERVER_CERT").unwrap().starts_with("-----BEGIN CERTIFICATE-----"));
}
