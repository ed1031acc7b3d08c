//! Client certificate verification
//!
//! Parses the chain a client presented, validates it against the bound
//! host's trust anchors and turns the status bits into a [`Verdict`]. Parsed
//! certificates live in a [`CertificateChain`] owned by this call, so they
//! are released on every return path.

use tracing::{debug, error, info};

use crate::attributes::CertificateAttributes;
use crate::certificate::{CertificateChain, OpenPgpBackend, PathValidator};
use crate::errors::TlsError;
use crate::store::CredentialEntry;
use crate::types::{CertStatus, CertificateType, SECONDS_PER_DAY, VerifyMode};

/// Textual verification outcome exported as `SSL_CLIENT_VERIFY`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyOutcome {
    Success,
    Failed,
    /// No verification took place
    None,
}

impl VerifyOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::Failed => "FAILED",
            Self::None => "NONE",
        }
    }
}

/// Why a verification did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerifyFailure {
    #[error("no certificate presented")]
    NoCertificate,
    #[error("failed to import peer certificates: {0}")]
    Import(String),
    #[error("chained client certificates are not supported")]
    ChainedOpenPgp,
    #[error("unsupported certificate type")]
    UnsupportedType,
    #[error("failed to verify peer certificate: {0}")]
    Validation(String),
    #[error("certificate verification failed: {}", describe_status(*.0))]
    Status(CertStatus),
}

/// Result of one verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub outcome: VerifyOutcome,
    pub status: CertStatus,
    /// Whole days until the leaf expires, negative once expired
    pub days_remaining: Option<i64>,
    pub allowed: bool,
    pub failure: Option<VerifyFailure>,
    /// Exported attributes of the client's leaf certificate
    pub client_certificate: Option<CertificateAttributes>,
}

impl Verdict {
    fn denied(failure: VerifyFailure) -> Self {
        Self {
            outcome: VerifyOutcome::None,
            status: CertStatus::empty(),
            days_remaining: None,
            allowed: false,
            failure: Some(failure),
            client_certificate: None,
        }
    }

    fn absent_but_optional() -> Self {
        Self {
            outcome: VerifyOutcome::None,
            status: CertStatus::empty(),
            days_remaining: None,
            allowed: true,
            failure: None,
            client_certificate: None,
        }
    }

    /// Reason for a denial or an advisory failure.
    pub fn reason(&self) -> Option<String> {
        self.failure.as_ref().map(ToString::to_string)
    }
}

/// Whole days between `now` and `expires`, truncated toward zero.
pub fn days_remaining(expires: i64, now: i64) -> i64 {
    (expires - now) / SECONDS_PER_DAY
}

/// Human readable list of the failure bits set in `status`.
pub fn describe_status(status: CertStatus) -> String {
    const NAMES: [(CertStatus, &str); 7] = [
        (CertStatus::SIGNER_NOT_FOUND, "signer not found"),
        (CertStatus::SIGNER_NOT_CA, "signer is not a CA"),
        (CertStatus::INSECURE_ALGORITHM, "insecure algorithm"),
        (CertStatus::NOT_ACTIVATED, "not yet activated"),
        (CertStatus::EXPIRED, "expired"),
        (CertStatus::REVOKED, "revoked"),
        (CertStatus::INVALID, "invalid"),
    ];
    let names: Vec<&str> = NAMES
        .iter()
        .filter(|(bit, _)| status.contains(*bit))
        .map(|(_, name)| *name)
        .collect();
    if names.is_empty() {
        "no failures".to_string()
    } else {
        names.join(", ")
    }
}

fn log_status(status: CertStatus) {
    if status.contains(CertStatus::SIGNER_NOT_FOUND) {
        info!("Could not find signer for peer certificate");
    }
    if status.contains(CertStatus::SIGNER_NOT_CA) {
        info!("Peer's certificate signer is not a CA");
    }
    if status.contains(CertStatus::INSECURE_ALGORITHM) {
        info!("Peer's certificate is using insecure algorithms");
    }
    if status.intersects(CertStatus::EXPIRED | CertStatus::NOT_ACTIVATED) {
        info!("Peer's certificate is expired or not yet activated");
    }
    if status.contains(CertStatus::INVALID) {
        info!("Peer certificate is invalid");
    }
    if status.contains(CertStatus::REVOKED) {
        info!("Peer certificate is revoked");
    }
}

/// Chain verifier bound to its validation backends.
pub struct Verifier<'a> {
    validator: &'a dyn PathValidator,
    openpgp: Option<&'a dyn OpenPgpBackend>,
}

impl<'a> Verifier<'a> {
    pub fn new(validator: &'a dyn PathValidator, openpgp: Option<&'a dyn OpenPgpBackend>) -> Self {
        Self { validator, openpgp }
    }

    /// Verify the certificates a client presented.
    ///
    /// `mode` is the connection's verification level; under
    /// [`VerifyMode::Request`] a missing or failing certificate is allowed.
    pub fn verify<B: AsRef<[u8]>>(
        &self,
        presented: &[B],
        negotiated: Option<CertificateType>,
        entry: &CredentialEntry,
        mode: VerifyMode,
        now: i64,
    ) -> Verdict {
        if presented.is_empty() {
            if mode == VerifyMode::Request {
                return Verdict::absent_but_optional();
            }
            info!("Failed to verify peer: client did not submit a certificate");
            return Verdict::denied(VerifyFailure::NoCertificate);
        }

        match negotiated {
            Some(CertificateType::X509) => self.verify_x509(presented, entry, mode, now),
            Some(CertificateType::OpenPgp) => self.verify_openpgp(presented, entry, mode, now),
            None => Verdict::denied(VerifyFailure::UnsupportedType),
        }
    }

    fn verify_x509<B: AsRef<[u8]>>(
        &self,
        presented: &[B],
        entry: &CredentialEntry,
        mode: VerifyMode,
        now: i64,
    ) -> Verdict {
        let chain = match CertificateChain::parse(presented, entry.max_chain_depth) {
            Ok(chain) => chain,
            Err(e) => {
                info!("Failed to verify peer: {}", e);
                return Verdict::denied(VerifyFailure::Import(e.to_string()));
            }
        };

        debug!("Verifying list of {} certificate(s)", chain.len());
        let status = match self
            .validator
            .verify_chain(chain.certificates(), &entry.x509_trust, now)
        {
            Ok(status) => status,
            Err(e) => return validation_error(e),
        };

        let leaf = chain.leaf();
        finish(
            status,
            Some(leaf.not_after),
            CertificateAttributes::from_x509(leaf, entry.export_certificates),
            mode,
            now,
        )
    }

    fn verify_openpgp<B: AsRef<[u8]>>(
        &self,
        presented: &[B],
        entry: &CredentialEntry,
        mode: VerifyMode,
        now: i64,
    ) -> Verdict {
        if presented.len() > 1 {
            info!("Failed to verify peer: chained client certificates are not supported");
            return Verdict::denied(VerifyFailure::ChainedOpenPgp);
        }
        let Some(backend) = self.openpgp else {
            return Verdict::denied(VerifyFailure::Import(
                "no OpenPGP backend installed".to_string(),
            ));
        };
        let cert = match backend.import(presented[0].as_ref()) {
            Ok(cert) => cert,
            Err(e) => {
                info!("Failed to verify peer: failed to import peer certificate: {}", e);
                return Verdict::denied(VerifyFailure::Import(e.to_string()));
            }
        };

        let Some(keyring) = entry.keyring.as_ref() else {
            return validation_error(TlsError::NoTrustAnchors(
                "no OpenPGP keyring configured".to_string(),
            ));
        };
        let status = match backend.verify_ring(&cert, keyring) {
            Ok(status) => status,
            Err(e) => return validation_error(e),
        };

        // A zero expiration time means the key never expires
        let expires = (cert.expires != 0).then_some(cert.expires);
        finish(
            status,
            expires,
            CertificateAttributes::from_openpgp(&cert, entry.export_certificates),
            mode,
            now,
        )
    }
}

fn validation_error(e: TlsError) -> Verdict {
    info!("Failed to verify peer certificate: {}", e);
    if matches!(e, TlsError::NoTrustAnchors(_)) {
        error!(
            "No certificate was found for verification. Are client_ca_file or pgp_keyring_file configured?"
        );
    }
    Verdict::denied(VerifyFailure::Validation(e.to_string()))
}

fn finish(
    status: CertStatus,
    expires: Option<i64>,
    client_certificate: CertificateAttributes,
    mode: VerifyMode,
    now: i64,
) -> Verdict {
    log_status(status);
    let days_remaining = expires.map(|expires| days_remaining(expires, now));

    if status.is_empty() {
        return Verdict {
            outcome: VerifyOutcome::Success,
            status,
            days_remaining,
            allowed: true,
            failure: None,
            client_certificate: Some(client_certificate),
        };
    }

    Verdict {
        outcome: VerifyOutcome::Failed,
        status,
        days_remaining,
        allowed: mode == VerifyMode::Request,
        failure: Some(VerifyFailure::Status(status)),
        client_certificate: Some(client_certificate),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::certificate::parser::live;
    use crate::certificate::{
        Keyring, KeyringCertificate, PeerCertificate, X509PathValidator, X509TrustAnchors,
        load_revocation_lists,
    };
    use crate::config::PriorityPolicy;
    use crate::types::MAX_CHAIN_SIZE;
    use rcgen::{
        BasicConstraints, CertificateParams, CertificateRevocationListParams, DnType, IsCa, Issuer,
        KeyIdMethod, KeyPair, RevokedCertParams, SerialNumber,
    };
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    struct Pki {
        ca_der: Vec<u8>,
        leaf_der: Vec<u8>,
        expired_der: Vec<u8>,
        issuer: Issuer<'static, KeyPair>,
    }

    fn ca_params(common_name: &str) -> CertificateParams {
        let mut params = CertificateParams::new(Vec::<String>::new()).unwrap();
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.distinguished_name.push(DnType::CommonName, common_name);
        params
    }

    fn pki_named(common_name: &str) -> Pki {
        let ca_key = KeyPair::generate().unwrap();
        let params = ca_params(common_name);
        let ca = params.self_signed(&ca_key).unwrap();
        let issuer = Issuer::new(params, ca_key);

        let leaf_key = KeyPair::generate().unwrap();
        let leaf = CertificateParams::new(vec!["client.example.com".to_string()])
            .unwrap()
            .signed_by(&leaf_key, &issuer)
            .unwrap();

        let mut expired_params =
            CertificateParams::new(vec!["old.example.com".to_string()]).unwrap();
        expired_params.not_before = (SystemTime::now() - Duration::from_secs(90 * 86_400)).into();
        expired_params.not_after = (SystemTime::now() - Duration::from_secs(30 * 86_400)).into();
        let expired = expired_params.signed_by(&leaf_key, &issuer).unwrap();

        Pki {
            ca_der: ca.der().to_vec(),
            leaf_der: leaf.der().to_vec(),
            expired_der: expired.der().to_vec(),
            issuer,
        }
    }

    fn pki() -> Pki {
        pki_named("Test CA")
    }

    /// Intermediate CA under `pki`'s root and a leaf it issued.
    fn intermediate(pki: &Pki) -> (Vec<u8>, Vec<u8>) {
        let key = KeyPair::generate().unwrap();
        let params = ca_params("Test Intermediate");
        let cert = params.signed_by(&key, &pki.issuer).unwrap();
        let issuer = Issuer::new(params, key);

        let leaf_key = KeyPair::generate().unwrap();
        let leaf = CertificateParams::new(vec!["deep.example.com".to_string()])
            .unwrap()
            .signed_by(&leaf_key, &issuer)
            .unwrap();
        (cert.der().to_vec(), leaf.der().to_vec())
    }

    fn now() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs() as i64
    }

    fn entry(anchors: Option<&[u8]>, mode: VerifyMode) -> CredentialEntry {
        let trust = match anchors {
            Some(der) => {
                X509TrustAnchors::new(vec![PeerCertificate::from_der(der).unwrap()], vec![])
            }
            None => X509TrustAnchors::default(),
        };
        CredentialEntry::builder("test")
            .priorities(PriorityPolicy::parse("NORMAL").unwrap())
            .verify_mode(mode)
            .trust_anchors(trust)
            .build()
            .unwrap()
    }

    fn verify(presented: &[Vec<u8>], entry: &CredentialEntry, mode: VerifyMode) -> Verdict {
        Verifier::new(&X509PathValidator, None).verify(
            presented,
            Some(CertificateType::X509),
            entry,
            mode,
            now(),
        )
    }

    #[test]
    fn missing_certificate_depends_on_mode() {
        let entry = entry(None, VerifyMode::Require);
        let none: &[Vec<u8>] = &[];

        let optional = verify(none, &entry, VerifyMode::Request);
        assert!(optional.allowed);
        assert_eq!(optional.outcome, VerifyOutcome::None);

        let required = verify(none, &entry, VerifyMode::Require);
        assert!(!required.allowed);
        assert_eq!(required.reason().as_deref(), Some("no certificate presented"));
    }

    #[test]
    fn trusted_leaf_is_allowed() {
        let pki = pki();
        let entry = entry(Some(&pki.ca_der), VerifyMode::Require);
        let verdict = verify(&[pki.leaf_der.clone()], &entry, VerifyMode::Require);
        assert_eq!(verdict.outcome, VerifyOutcome::Success);
        assert!(verdict.allowed);
        assert!(verdict.status.is_empty());
        assert!(verdict.days_remaining.is_some_and(|days| days > 0));
        let attrs = verdict.client_certificate.unwrap();
        assert_eq!(attrs.get("_S_AN0"), Some("DNSNAME:client.example.com"));
        assert!(attrs.get("_CERT").is_none());
    }

    #[test]
    fn expired_leaf_is_advisory_under_request() {
        let pki = pki();
        let entry = entry(Some(&pki.ca_der), VerifyMode::Request);

        let required = verify(&[pki.expired_der.clone()], &entry, VerifyMode::Require);
        assert_eq!(required.outcome, VerifyOutcome::Failed);
        assert!(required.status.contains(CertStatus::EXPIRED));
        assert!(!required.allowed);
        assert!(required.days_remaining.is_some_and(|days| days <= -29));

        let requested = verify(&[pki.expired_der], &entry, VerifyMode::Request);
        assert_eq!(requested.outcome, VerifyOutcome::Failed);
        assert!(requested.allowed);
        assert!(requested.reason().unwrap().contains("expired"));
    }

    #[test]
    fn unknown_issuer_is_reported() {
        let pki = pki();
        let rogue = pki_named("Rogue CA");
        let entry = entry(Some(&rogue.ca_der), VerifyMode::Require);
        let verdict = verify(&[pki.leaf_der], &entry, VerifyMode::Require);
        assert!(verdict.status.contains(CertStatus::SIGNER_NOT_FOUND));
        assert!(!verdict.allowed);
    }

    #[test]
    fn same_name_wrong_key_is_invalid() {
        let pki = pki();
        let impostor = pki_named("Test CA");
        let entry = entry(Some(&impostor.ca_der), VerifyMode::Require);
        let verdict = verify(&[pki.leaf_der], &entry, VerifyMode::Require);
        assert_eq!(verdict.status, CertStatus::INVALID);
        assert_eq!(verdict.outcome, VerifyOutcome::Failed);
        assert!(!verdict.allowed);
    }

    #[test]
    fn full_chain_through_intermediate() {
        let pki = pki();
        let (intermediate_der, leaf_der) = intermediate(&pki);
        let full = vec![leaf_der.clone(), intermediate_der.clone(), pki.ca_der.clone()];

        let chain = CertificateChain::parse(full.as_slice(), MAX_CHAIN_SIZE).unwrap();
        assert_eq!(chain.len(), 3);
        assert!(!chain.is_truncated());
        drop(chain);

        let entry = entry(Some(&pki.ca_der), VerifyMode::Require);
        let to_root = verify(&full, &entry, VerifyMode::Require);
        assert_eq!(to_root.outcome, VerifyOutcome::Success);
        assert!(to_root.status.is_empty());

        let to_anchor = verify(&[leaf_der, intermediate_der], &entry, VerifyMode::Require);
        assert_eq!(to_anchor.outcome, VerifyOutcome::Success);
        assert!(to_anchor.allowed);
        assert_eq!(
            to_anchor.client_certificate.unwrap().get("_S_AN0"),
            Some("DNSNAME:deep.example.com")
        );
    }

    #[test]
    fn revoked_by_crl_file() {
        let pki = pki();
        let serial = SerialNumber::from(vec![0x01, 0x2a]);
        let mut params = CertificateParams::new(vec!["gone.example.com".to_string()]).unwrap();
        params.serial_number = Some(serial.clone());
        let revoked = params.signed_by(&KeyPair::generate().unwrap(), &pki.issuer).unwrap();

        let crl = CertificateRevocationListParams {
            this_update: SystemTime::now().into(),
            next_update: (SystemTime::now() + Duration::from_secs(86_400)).into(),
            crl_number: SerialNumber::from(1u64),
            issuing_distribution_point: None,
            revoked_certs: vec![RevokedCertParams {
                serial_number: serial,
                revocation_time: SystemTime::now().into(),
                reason_code: None,
                invalidity_date: None,
            }],
            key_identifier_method: KeyIdMethod::Sha256,
        }
        .signed_by(&pki.issuer)
        .unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ca.crl");
        std::fs::write(&path, crl.pem().unwrap()).unwrap();

        let crls = load_revocation_lists(&path).unwrap();
        assert_eq!(crls.len(), 1);
        assert_eq!(crls[0].len(), 1);

        let anchor = PeerCertificate::from_der(&pki.ca_der).unwrap();
        let trust = X509TrustAnchors::new(vec![anchor], crls);
        let entry = CredentialEntry::builder("test")
            .priorities(PriorityPolicy::parse("NORMAL").unwrap())
            .verify_mode(VerifyMode::Require)
            .trust_anchors(trust)
            .build()
            .unwrap();

        let verdict = verify(&[revoked.der().to_vec()], &entry, VerifyMode::Require);
        assert!(verdict.status.contains(CertStatus::REVOKED));
        assert!(!verdict.allowed);

        let still_good = verify(&[pki.leaf_der], &entry, VerifyMode::Require);
        assert_eq!(still_good.outcome, VerifyOutcome::Success);
    }

    #[test]
    fn no_anchors_is_a_validation_failure() {
        let pki = pki();
        let entry = entry(None, VerifyMode::Require);
        let verdict = verify(&[pki.leaf_der], &entry, VerifyMode::Require);
        assert!(!verdict.allowed);
        assert!(matches!(verdict.failure, Some(VerifyFailure::Validation(_))));
        assert!(verdict.client_certificate.is_none());
    }

    #[test]
    fn corrupt_tail_truncates_chain() {
        let pki = pki();
        let entry = entry(Some(&pki.ca_der), VerifyMode::Require);
        let verdict = verify(
            &[pki.leaf_der.clone(), b"not a certificate".to_vec()],
            &entry,
            VerifyMode::Require,
        );
        assert_eq!(verdict.outcome, VerifyOutcome::Success);

        let broken_leaf = verify(
            &[b"garbage".to_vec(), pki.leaf_der],
            &entry,
            VerifyMode::Require,
        );
        assert!(!broken_leaf.allowed);
        assert!(matches!(broken_leaf.failure, Some(VerifyFailure::Import(_))));
    }

    #[test]
    fn day_boundary_truncates() {
        let now = 1_000_000;
        assert_eq!(days_remaining(now + SECONDS_PER_DAY, now), 1);
        assert_eq!(days_remaining(now + SECONDS_PER_DAY - 1, now), 0);
        assert_eq!(days_remaining(now - SECONDS_PER_DAY + 1, now), 0);
        assert_eq!(days_remaining(now - SECONDS_PER_DAY, now), -1);
    }

    struct StubPgp {
        status: CertStatus,
    }

    impl OpenPgpBackend for StubPgp {
        fn import(&self, raw: &[u8]) -> Result<KeyringCertificate, TlsError> {
            if raw.is_empty() {
                return Err(TlsError::OpenPgp("empty packet".to_string()));
            }
            Ok(KeyringCertificate {
                raw: raw.to_vec(),
                name: "Alice".to_string(),
                fingerprint: vec![1, 2],
                version: 4,
                created: 0,
                expires: 0,
                key_algorithm: "RSA".to_string(),
            })
        }

        fn verify_ring(
            &self,
            _cert: &KeyringCertificate,
            _keyring: &Keyring,
        ) -> Result<CertStatus, TlsError> {
            Ok(self.status)
        }
    }

    fn pgp_entry() -> CredentialEntry {
        CredentialEntry::builder("pgp")
            .priorities(PriorityPolicy::parse("NORMAL").unwrap())
            .keyring(Keyring::new(vec![0x99]))
            .build()
            .unwrap()
    }

    #[test]
    fn openpgp_rules() {
        let backend = StubPgp {
            status: CertStatus::empty(),
        };
        let verifier = Verifier::new(&X509PathValidator, Some(&backend));
        let entry = pgp_entry();
        let pgp = Some(CertificateType::OpenPgp);

        let chained = verifier.verify(&[vec![1u8], vec![2u8]], pgp, &entry, VerifyMode::Require, 0);
        assert_eq!(chained.failure, Some(VerifyFailure::ChainedOpenPgp));

        let bad = verifier.verify(&[Vec::<u8>::new()], pgp, &entry, VerifyMode::Require, 0);
        assert!(matches!(bad.failure, Some(VerifyFailure::Import(_))));

        let good = verifier.verify(&[vec![1u8]], pgp, &entry, VerifyMode::Require, 0);
        assert_eq!(good.outcome, VerifyOutcome::Success);
        assert_eq!(good.days_remaining, None);

        let revoked = StubPgp {
            status: CertStatus::REVOKED | CertStatus::INVALID,
        };
        let verdict = Verifier::new(&X509PathValidator, Some(&revoked)).verify(
            &[vec![1u8]],
            pgp,
            &entry,
            VerifyMode::Require,
            0,
        );
        assert!(!verdict.allowed);
        assert!(verdict.status.contains(CertStatus::REVOKED));
    }

    #[test]
    fn no_parsed_certificates_outlive_verification() {
        let pki = pki();
        let trusted = entry(Some(&pki.ca_der), VerifyMode::Require);
        let untrusted = entry(None, VerifyMode::Require);
        let baseline = live::count();

        let paths: [(&CredentialEntry, Vec<Vec<u8>>); 5] = [
            (&trusted, vec![pki.leaf_der.clone()]),
            (&trusted, vec![pki.expired_der.clone()]),
            (&trusted, vec![pki.leaf_der.clone(), b"junk".to_vec()]),
            (&trusted, vec![b"junk".to_vec(), pki.leaf_der.clone()]),
            (&untrusted, vec![pki.leaf_der.clone(), pki.ca_der.clone()]),
        ];
        for (entry, presented) in &paths {
            let _ = verify(presented, entry, VerifyMode::Require);
            assert_eq!(live::count(), baseline);
        }

        let long_chain = vec![pki.leaf_der.clone(); 20];
        let _ = verify(&long_chain, &trusted, VerifyMode::Require);
        assert_eq!(live::count(), baseline);
    }
}
