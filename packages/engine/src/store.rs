//! Credential store
//!
//! One [`CredentialEntry`] per configured virtual host, built and validated
//! once at startup and shared read-only (`Arc`) by every connection. Lookups
//! are two-tier: enabled hosts are matched by name in registration order, and
//! the first configured host is the explicit fallback.

use std::path::Path;
use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tracing::{debug, error, info};
use x509_parser::der_parser::der::{DerObject, parse_der_integer, parse_der_sequence_defined_g};
use x509_parser::der_parser::error::BerResult;

use crate::certificate::{
    Keyring, KeyringCertificate, KeyringPrivateKey, OpenPgpBackend, PeerCertificate,
    X509TrustAnchors, load_certificates, load_private_key, load_revocation_lists,
};
use crate::config::{HostConfig, HostDefaults, PriorityPolicy, ServerConfig, SrpConfig};
use crate::errors::{ConfigError, TlsError};
use crate::types::{CertificateType, MAX_CHAIN_SIZE, SecureKeyMaterial, VerifyMode};

/// 2048-bit group parameters from RFC 5054, used for anonymous
/// key exchange when a host configures no parameters of its own.
pub const DEFAULT_DH_PARAMS: &str = "-----BEGIN DH PARAMETERS-----\n\
MIIBBwKCAQCsa9tBMkqam/Fm3l4TiVgvr3K2ZRmH7gf8MZKUPbVgUKNzKcu0oJnt\n\
gZPgdXdnoT3VIxKrSwMxDc1/SKnaBP1Q6Ag5ae23Z7DPYJUXmhY6s2YaBfvV+qro\n\
KRipli8Lk7hV+XmT7Jde6qgNdArb9P90c1nQQdXDPqcdKB5EaxR3O8qXtDoj+4AW\n\
dr0gekNsZIHx0rkHhxdGGludMuaI+HdIVEUjtSSw1X1ep3onddLs+gMs+9v1L7N4\n\
YWAnkATleuavh05zA85TKZzMBBx7wwjYKlaY86jQw4JxrjX46dv7tpS1yAPYn3rk\n\
Nd4jbVJfVHWbZeNy/NaO8g+nER+eSv9zAgEC\n\
-----END DH PARAMETERS-----\n";

/// PKCS#3 Diffie-Hellman parameters for anonymous key exchange.
///
/// The `DHParameter` structure is decoded when loaded, so a malformed file is
/// rejected at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DhParams {
    der: Vec<u8>,
    prime: Vec<u8>,
    generator: Vec<u8>,
}

impl DhParams {
    pub fn from_pem(pem_data: &str) -> Result<Self, TlsError> {
        let block = ::pem::parse(pem_data)
            .map_err(|e| TlsError::CertificateParsing(format!("Failed to parse DH params: {e}")))?;
        if block.tag() != "DH PARAMETERS" {
            return Err(TlsError::CertificateParsing(format!(
                "Expected DH PARAMETERS block, found {}",
                block.tag()
            )));
        }
        Self::from_der(block.contents())
    }

    /// Decode a DER `DHParameter` structure.
    pub fn from_der(bytes: &[u8]) -> Result<Self, TlsError> {
        let malformed =
            |detail: String| TlsError::CertificateParsing(format!("Malformed DH params: {detail}"));

        let (remaining, (prime, base, complete)) =
            parse_dh_parameter(bytes).map_err(|e| malformed(e.to_string()))?;
        if !remaining.is_empty() || !complete {
            return Err(malformed("trailing data".to_string()));
        }
        let prime = prime.as_slice().map_err(|e| malformed(e.to_string()))?;
        let generator = base.as_slice().map_err(|e| malformed(e.to_string()))?;

        Ok(Self {
            der: bytes.to_vec(),
            prime: unsigned(prime),
            generator: unsigned(generator),
        })
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let data = std::fs::read_to_string(path).map_err(|e| ConfigError::load(path, e))?;
        Self::from_pem(&data).map_err(|e| ConfigError::load(path, e))
    }

    pub fn builtin() -> Result<Self, TlsError> {
        Self::from_pem(DEFAULT_DH_PARAMS)
    }

    pub fn as_der(&self) -> &[u8] {
        &self.der
    }

    /// Prime as unsigned big-endian bytes.
    pub fn prime(&self) -> &[u8] {
        &self.prime
    }

    /// Generator as unsigned big-endian bytes.
    pub fn generator(&self) -> &[u8] {
        &self.generator
    }
}

/// `DHParameter ::= SEQUENCE { prime INTEGER, base INTEGER,
/// privateValueLength INTEGER OPTIONAL }`. The flag is false when the
/// sequence carries anything after the optional length.
fn parse_dh_parameter(input: &[u8]) -> BerResult<'_, (DerObject<'_>, DerObject<'_>, bool)> {
    parse_der_sequence_defined_g(|content: &[u8], _| {
        let (rest, prime) = parse_der_integer(content)?;
        let (rest, base) = parse_der_integer(rest)?;
        let rest = if rest.is_empty() {
            rest
        } else {
            parse_der_integer(rest)?.0
        };
        Ok((rest, (prime, base, rest.is_empty())))
    })(input)
}

/// Integers are read as unsigned; older files omit the sign octet on primes
/// with the top bit set.
fn unsigned(integer: &[u8]) -> Vec<u8> {
    match integer {
        [0, rest @ ..] if !rest.is_empty() => rest.to_vec(),
        _ => integer.to_vec(),
    }
}

/// Identity a host presents. Exactly one certificate format per host.
#[derive(Debug)]
pub enum ServerIdentity {
    X509 {
        chain: Vec<CertificateDer<'static>>,
        leaf: PeerCertificate,
        key: Option<PrivateKeyDer<'static>>,
    },
    OpenPgp {
        certificate: KeyringCertificate,
        key: Option<KeyringPrivateKey>,
    },
}

impl ServerIdentity {
    /// Build an X.509 identity; the first certificate of `chain` is the leaf.
    pub fn x509(
        chain: Vec<CertificateDer<'static>>,
        key: Option<PrivateKeyDer<'static>>,
    ) -> Result<Self, TlsError> {
        let Some(first) = chain.first() else {
            return Err(TlsError::CertificateParsing(
                "Empty certificate chain".to_string(),
            ));
        };
        let leaf = PeerCertificate::from_der(first.as_ref())?;
        Ok(Self::X509 { chain, leaf, key })
    }

    pub fn certificate_type(&self) -> CertificateType {
        match self {
            Self::X509 { .. } => CertificateType::X509,
            Self::OpenPgp { .. } => CertificateType::OpenPgp,
        }
    }

    fn has_key(&self) -> bool {
        match self {
            Self::X509 { key, .. } => key.is_some(),
            Self::OpenPgp { key, .. } => key.as_ref().is_some_and(|k| !k.is_empty()),
        }
    }

    fn host_pattern(&self) -> Option<String> {
        match self {
            Self::X509 { leaf, .. } => leaf.host_pattern(),
            Self::OpenPgp { certificate, .. } => {
                Some(certificate.name.clone()).filter(|name| !name.is_empty())
            }
        }
    }
}

/// Where SRP verifiers for a host come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SrpSource {
    Files {
        passwd_file: std::path::PathBuf,
        conf_file: std::path::PathBuf,
    },
    Query(String),
}

/// One virtual host's identity material and policy.
#[derive(Debug)]
pub struct CredentialEntry {
    pub name: String,
    pub enabled: bool,
    pub host_pattern: Option<String>,
    pub identity: Option<ServerIdentity>,
    pub priorities: Option<PriorityPolicy>,
    pub verify_mode: VerifyMode,
    pub x509_trust: X509TrustAnchors,
    pub keyring: Option<Keyring>,
    pub dh_params: DhParams,
    pub srp: Option<SrpSource>,
    pub tickets: bool,
    pub export_certificates: bool,
    pub max_chain_depth: usize,
}

impl CredentialEntry {
    pub fn builder(name: &str) -> CredentialEntryBuilder {
        CredentialEntryBuilder::new(name)
    }

    pub fn certificate_type(&self) -> Option<CertificateType> {
        self.identity.as_ref().map(ServerIdentity::certificate_type)
    }

    /// Whether any trust anchor of either format is configured.
    pub fn has_trust_anchors(&self) -> bool {
        !self.x509_trust.is_empty() || self.keyring.is_some()
    }
}

/// Builder for [`CredentialEntry`], used by configuration loading and by
/// embedders that assemble hosts in code.
#[derive(Debug)]
pub struct CredentialEntryBuilder {
    name: String,
    enabled: bool,
    identity: Option<ServerIdentity>,
    priorities: Option<PriorityPolicy>,
    verify_mode: VerifyMode,
    x509_trust: X509TrustAnchors,
    keyring: Option<Keyring>,
    dh_params: Option<DhParams>,
    srp: Option<SrpSource>,
    tickets: bool,
    export_certificates: bool,
    max_chain_depth: usize,
}

impl CredentialEntryBuilder {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            enabled: true,
            identity: None,
            priorities: None,
            verify_mode: VerifyMode::Ignore,
            x509_trust: X509TrustAnchors::default(),
            keyring: None,
            dh_params: None,
            srp: None,
            tickets: true,
            export_certificates: false,
            max_chain_depth: MAX_CHAIN_SIZE,
        }
    }

    #[must_use]
    pub fn enabled(self, enabled: bool) -> Self {
        Self { enabled, ..self }
    }

    #[must_use]
    pub fn identity(self, identity: ServerIdentity) -> Self {
        Self {
            identity: Some(identity),
            ..self
        }
    }

    #[must_use]
    pub fn priorities(self, priorities: PriorityPolicy) -> Self {
        Self {
            priorities: Some(priorities),
            ..self
        }
    }

    #[must_use]
    pub fn verify_mode(self, verify_mode: VerifyMode) -> Self {
        Self {
            verify_mode,
            ..self
        }
    }

    #[must_use]
    pub fn trust_anchors(self, x509_trust: X509TrustAnchors) -> Self {
        Self { x509_trust, ..self }
    }

    #[must_use]
    pub fn keyring(self, keyring: Keyring) -> Self {
        Self {
            keyring: Some(keyring),
            ..self
        }
    }

    #[must_use]
    pub fn dh_params(self, dh_params: DhParams) -> Self {
        Self {
            dh_params: Some(dh_params),
            ..self
        }
    }

    #[must_use]
    pub fn srp(self, srp: SrpSource) -> Self {
        Self {
            srp: Some(srp),
            ..self
        }
    }

    #[must_use]
    pub fn tickets(self, tickets: bool) -> Self {
        Self { tickets, ..self }
    }

    #[must_use]
    pub fn export_certificates(self, export_certificates: bool) -> Self {
        Self {
            export_certificates,
            ..self
        }
    }

    #[must_use]
    pub fn max_chain_depth(self, max_chain_depth: usize) -> Self {
        Self {
            max_chain_depth: max_chain_depth.max(1),
            ..self
        }
    }

    pub fn build(self) -> Result<CredentialEntry, TlsError> {
        let dh_params = match self.dh_params {
            Some(params) => params,
            None => DhParams::builtin()?,
        };
        let host_pattern = self.identity.as_ref().and_then(ServerIdentity::host_pattern);
        Ok(CredentialEntry {
            name: self.name,
            enabled: self.enabled,
            host_pattern,
            identity: self.identity,
            priorities: self.priorities,
            verify_mode: self.verify_mode,
            x509_trust: self.x509_trust,
            keyring: self.keyring,
            dh_params,
            srp: self.srp,
            tickets: self.tickets,
            export_certificates: self.export_certificates,
            max_chain_depth: self.max_chain_depth,
        })
    }
}

/// Startup checks for one entry. Any error aborts startup.
pub fn validate(entry: &CredentialEntry) -> Result<(), ConfigError> {
    if !entry.enabled {
        return Ok(());
    }
    if entry.priorities.is_none() {
        return Err(ConfigError::MissingPriorities(entry.name.clone()));
    }
    let Some(identity) = entry.identity.as_ref() else {
        return Err(ConfigError::MissingCertificate(entry.name.clone()));
    };
    if !identity.has_key() {
        return Err(ConfigError::MissingPrivateKey(entry.name.clone()));
    }
    if entry.verify_mode == VerifyMode::Require && !entry.has_trust_anchors() {
        return Err(ConfigError::MissingTrustAnchors(entry.name.clone()));
    }
    if let Some(SrpSource::Files {
        passwd_file,
        conf_file,
    }) = entry.srp.as_ref()
    {
        for file in [passwd_file, conf_file] {
            std::fs::metadata(file).map_err(|e| {
                ConfigError::MissingSrpFiles(entry.name.clone(), format!("{}: {e}", file.display()))
            })?;
        }
    }
    Ok(())
}

/// Case-insensitive host match. A pattern may start with one `*.` label that
/// stands for exactly one label of the requested name.
pub fn matches_host_pattern(pattern: &str, name: &str) -> bool {
    let pattern = pattern.trim_end_matches('.').to_ascii_lowercase();
    let name = name.trim_end_matches('.').to_ascii_lowercase();

    if pattern == name {
        return true;
    }

    let Some(suffix) = pattern.strip_prefix("*.") else {
        return false;
    };
    match name.split_once('.') {
        Some((label, rest)) => !label.is_empty() && rest == suffix,
        None => false,
    }
}

/// All configured hosts, in registration order.
#[derive(Debug)]
pub struct CredentialStore {
    entries: Vec<Arc<CredentialEntry>>,
}

impl CredentialStore {
    /// Validate every entry and assemble the store. The first entry is the
    /// default host.
    pub fn new(entries: Vec<CredentialEntry>) -> Result<Self, ConfigError> {
        if entries.is_empty() {
            return Err(ConfigError::NoHosts);
        }
        for entry in &entries {
            if let Err(e) = validate(entry) {
                error!("Startup validation failed for host '{}': {}", entry.name, e);
                return Err(e);
            }
            if entry.enabled && entry.host_pattern.is_none() {
                error!(
                    "Cannot find a certificate name for host '{}'; it will only serve as a default",
                    entry.name
                );
            }
        }
        Ok(Self {
            entries: entries.into_iter().map(Arc::new).collect(),
        })
    }

    /// Build the store from a configuration document, loading every file it
    /// names. `openpgp` is required only when a host configures an OpenPGP
    /// identity.
    pub fn from_config(
        config: &ServerConfig,
        openpgp: Option<&dyn OpenPgpBackend>,
    ) -> Result<Self, ConfigError> {
        let entries = config
            .hosts
            .iter()
            .map(|host| load_entry(host, &config.defaults, openpgp))
            .collect::<Result<Vec<_>, _>>()?;
        let store = Self::new(entries)?;
        info!("Credential store ready with {} host(s)", store.len());
        Ok(store)
    }

    /// The explicit fallback host: the first one configured.
    pub fn default_entry(&self) -> &Arc<CredentialEntry> {
        // new() rejects an empty entry list
        &self.entries[0]
    }

    /// First enabled host whose pattern matches `requested_name`.
    pub fn lookup_by_name(&self, requested_name: &str) -> Option<Arc<CredentialEntry>> {
        self.entries
            .iter()
            .filter(|entry| entry.enabled)
            .find(|entry| {
                let Some(pattern) = entry.host_pattern.as_deref() else {
                    return false;
                };
                let matched = matches_host_pattern(pattern, requested_name);
                debug!(
                    "Virtual host match '{}' {} '{}'",
                    pattern,
                    if matched { "==" } else { "!=" },
                    requested_name
                );
                matched
            })
            .cloned()
    }

    pub fn entries(&self) -> &[Arc<CredentialEntry>] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn load_entry(
    host: &HostConfig,
    defaults: &HostDefaults,
    openpgp: Option<&dyn OpenPgpBackend>,
) -> Result<CredentialEntry, ConfigError> {
    let mut builder = CredentialEntry::builder(&host.name)
        .enabled(host.enabled)
        .verify_mode(host.client_verify())
        .tickets(host.tickets(defaults))
        .export_certificates(host.export_certificates(defaults))
        .max_chain_depth(defaults.max_chain_depth());

    let x509 = host
        .certificate_file
        .as_deref()
        .map(|cert_file| {
            let chain = load_certificates(cert_file)?;
            let key = host.key_file.as_deref().map(load_private_key).transpose()?;
            ServerIdentity::x509(chain, key).map_err(|e| ConfigError::load(cert_file, e))
        })
        .transpose()?;

    let pgp = host
        .pgp_certificate_file
        .as_deref()
        .map(|cert_file| {
            let backend =
                openpgp.ok_or_else(|| ConfigError::MissingOpenPgpBackend(host.name.clone()))?;
            let raw = std::fs::read(cert_file).map_err(|e| ConfigError::load(cert_file, e))?;
            let certificate = backend
                .import(&raw)
                .map_err(|e| ConfigError::load(cert_file, e))?;
            let key = host
                .pgp_key_file
                .as_deref()
                .map(|key_file| {
                    std::fs::read(key_file)
                        .map(SecureKeyMaterial::new)
                        .map_err(|e| ConfigError::load(key_file, e))
                })
                .transpose()?;
            Ok::<_, ConfigError>(ServerIdentity::OpenPgp { certificate, key })
        })
        .transpose()?;

    builder = match (x509, pgp) {
        (Some(_), Some(_)) => return Err(ConfigError::ConflictingIdentities(host.name.clone())),
        (Some(identity), None) | (None, Some(identity)) => builder.identity(identity),
        (None, None) => builder,
    };

    if let Some(raw) = host.priorities.as_deref() {
        builder = builder.priorities(PriorityPolicy::parse(raw)?);
    }

    if let Some(ca_file) = host.client_ca_file.as_deref() {
        let anchors = X509TrustAnchors::from_der_certificates(&load_certificates(ca_file)?)
            .map_err(|e| ConfigError::load(ca_file, e))?;
        debug!("Loaded {} client CA certificate(s) for '{}'", anchors.len(), host.name);
        let crls = host
            .crl_file
            .as_deref()
            .map(load_revocation_lists)
            .transpose()?
            .unwrap_or_default();
        builder = builder.trust_anchors(anchors.with_revocation_lists(crls));
    }

    if let Some(keyring_file) = host.pgp_keyring_file.as_deref() {
        builder = builder.keyring(Keyring::from_file(keyring_file)?);
    }

    if let Some(dh_file) = host.dh_params_file(defaults) {
        builder = builder.dh_params(DhParams::from_file(dh_file)?);
    }

    if let Some(srp) = host.srp.as_ref() {
        builder = builder.srp(match srp {
            SrpConfig::Files {
                passwd_file,
                conf_file,
            } => SrpSource::Files {
                passwd_file: passwd_file.clone(),
                conf_file: conf_file.clone(),
            },
            SrpConfig::Query { query } => SrpSource::Query(query.clone()),
        });
    }

    builder
        .build()
        .map_err(|e| ConfigError::load(&host.name, e))
}
