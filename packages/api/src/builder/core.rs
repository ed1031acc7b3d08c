//! Core `GateBuilder` structure

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tlsgate_engine::{
    CredentialEntry, CredentialStore, OpenPgpBackend, PathValidator, ResumptionKeys,
    ServerConfig, SrpSource, VerifierLookup, X509PathValidator,
};
use tracing::info;

use crate::gate::{Gate, GateError};

/// Where host definitions come from.
enum Source {
    File(PathBuf),
    Document(String),
    Entries(Vec<CredentialEntry>),
}

/// Builder for [`Gate`].
#[must_use]
pub struct GateBuilder {
    source: Option<Source>,
    openpgp: Option<Arc<dyn OpenPgpBackend>>,
    validator: Arc<dyn PathValidator>,
    srp_lookup: Option<Arc<dyn VerifierLookup>>,
    tickets: bool,
}

impl Default for GateBuilder {
    fn default() -> Self {
        Self {
            source: None,
            openpgp: None,
            validator: Arc::new(X509PathValidator),
            srp_lookup: None,
            tickets: true,
        }
    }
}

impl fmt::Debug for GateBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let source = match &self.source {
            Some(Source::File(path)) => format!("file {}", path.display()),
            Some(Source::Document(_)) => "document".to_string(),
            Some(Source::Entries(entries)) => format!("{} entries", entries.len()),
            None => "none".to_string(),
        };
        f.debug_struct("GateBuilder")
            .field("source", &source)
            .field("openpgp", &self.openpgp.is_some())
            .field("srp_lookup", &self.srp_lookup.is_some())
            .field("tickets", &self.tickets)
            .finish_non_exhaustive()
    }
}

impl GateBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read host definitions from a JSON configuration file.
    pub fn config_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.source = Some(Source::File(path.into()));
        self
    }

    /// Parse host definitions from a JSON document.
    pub fn config_str(mut self, document: impl Into<String>) -> Self {
        self.source = Some(Source::Document(document.into()));
        self
    }

    /// Use hosts assembled in code. The first entry is the default host.
    pub fn entries(mut self, entries: Vec<CredentialEntry>) -> Self {
        self.source = Some(Source::Entries(entries));
        self
    }

    pub fn openpgp_backend(mut self, backend: Arc<dyn OpenPgpBackend>) -> Self {
        self.openpgp = Some(backend);
        self
    }

    /// Replace the built-in X.509 path validator.
    pub fn path_validator(mut self, validator: Arc<dyn PathValidator>) -> Self {
        self.validator = validator;
        self
    }

    pub fn verifier_lookup(mut self, lookup: Arc<dyn VerifierLookup>) -> Self {
        self.srp_lookup = Some(lookup);
        self
    }

    /// Generate a session ticket key (on by default).
    pub fn tickets(mut self, enabled: bool) -> Self {
        self.tickets = enabled;
        self
    }

    /// Load and validate every host, then generate the ticket key.
    ///
    /// # Errors
    ///
    /// Fails when no configuration source was given, when the configuration
    /// cannot be read or parsed, when any host fails validation, or when a
    /// host uses an SRP query without a verifier lookup installed.
    pub fn build(self) -> anyhow::Result<Gate> {
        let openpgp = self.openpgp.as_deref();
        let (store, config) = match self.source.ok_or(GateError::NoConfiguration)? {
            Source::File(path) => {
                let config = ServerConfig::from_json_file(&path)
                    .with_context(|| format!("loading configuration from {}", path.display()))?;
                let store = CredentialStore::from_config(&config, openpgp)
                    .with_context(|| format!("building hosts from {}", path.display()))?;
                (store, Some(config))
            }
            Source::Document(document) => {
                let config =
                    ServerConfig::from_json_str(&document).context("parsing configuration")?;
                let store = CredentialStore::from_config(&config, openpgp)
                    .context("building hosts from configuration")?;
                (store, Some(config))
            }
            Source::Entries(entries) => (
                CredentialStore::new(entries).context("validating hosts")?,
                None,
            ),
        };

        if self.srp_lookup.is_none() {
            let query_host = store
                .entries()
                .iter()
                .find(|entry| entry.enabled && matches!(entry.srp, Some(SrpSource::Query(_))));
            if let Some(entry) = query_host {
                return Err(GateError::MissingVerifierLookup(entry.name.clone()).into());
            }
        }

        let resumption = if self.tickets {
            ResumptionKeys::init()
        } else {
            ResumptionKeys::default()
        };

        info!(
            "Gate ready: {} host(s), session tickets {}",
            store.len(),
            if resumption.is_initialized() { "on" } else { "off" }
        );

        Ok(Gate::new(
            Arc::new(store),
            config,
            resumption,
            self.validator,
            self.openpgp,
            self.srp_lookup,
        ))
    }
}
