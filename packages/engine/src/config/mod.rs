//! Startup configuration
//!
//! One JSON document describes every virtual host. Values left out of a host
//! block fall back to the `defaults` block, then to built-in defaults. The
//! document is read once at startup and never consulted at request time; the
//! credential store is built from it.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::errors::ConfigError;
use crate::types::{MAX_CHAIN_SIZE, VerifyMode};

pub mod priority;

pub use priority::PriorityPolicy;

/// Whole-server configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    #[serde(default)]
    pub defaults: HostDefaults,
    pub hosts: Vec<HostConfig>,
    /// Per-resource client verification overrides
    #[serde(default)]
    pub locations: Vec<LocationPolicy>,
}

/// Values inherited by every host that does not set them itself.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HostDefaults {
    pub dh_params_file: Option<PathBuf>,
    pub tickets: Option<bool>,
    pub export_certificates: Option<bool>,
    pub max_chain_depth: Option<usize>,
}

/// One virtual host.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HostConfig {
    /// Label used in log lines, e.g. `www.example.com:443`
    pub name: String,
    pub enabled: bool,
    pub certificate_file: Option<PathBuf>,
    pub key_file: Option<PathBuf>,
    pub pgp_certificate_file: Option<PathBuf>,
    pub pgp_key_file: Option<PathBuf>,
    pub priorities: Option<String>,
    pub client_verify: Option<VerifyMode>,
    pub client_ca_file: Option<PathBuf>,
    pub crl_file: Option<PathBuf>,
    pub pgp_keyring_file: Option<PathBuf>,
    pub dh_params_file: Option<PathBuf>,
    pub tickets: Option<bool>,
    pub export_certificates: Option<bool>,
    pub srp: Option<SrpConfig>,
}

/// Source of SRP verifiers for one host.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case", deny_unknown_fields)]
pub enum SrpConfig {
    /// `tpasswd` and `tpasswd.conf` style files
    Files { passwd_file: PathBuf, conf_file: PathBuf },
    /// Named prepared query answered by a [`crate::srp::VerifierLookup`]
    Query { query: String },
}

/// Client verification level demanded by a resource path.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LocationPolicy {
    /// Restrict the policy to one host name; all hosts when absent
    #[serde(default)]
    pub host: Option<String>,
    pub path_prefix: String,
    pub client_verify: VerifyMode,
}

impl HostConfig {
    pub fn tickets(&self, defaults: &HostDefaults) -> bool {
        self.tickets.or(defaults.tickets).unwrap_or(true)
    }

    pub fn export_certificates(&self, defaults: &HostDefaults) -> bool {
        self.export_certificates
            .or(defaults.export_certificates)
            .unwrap_or(false)
    }

    pub fn dh_params_file<'a>(&'a self, defaults: &'a HostDefaults) -> Option<&'a Path> {
        self.dh_params_file
            .as_deref()
            .or(defaults.dh_params_file.as_deref())
    }

    pub fn client_verify(&self) -> VerifyMode {
        self.client_verify.unwrap_or_default()
    }
}

impl HostDefaults {
    pub fn max_chain_depth(&self) -> usize {
        self.max_chain_depth
            .filter(|depth| *depth > 0)
            .unwrap_or(MAX_CHAIN_SIZE)
    }
}

impl ServerConfig {
    /// Parse a configuration document.
    pub fn from_json_str(document: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(document)?;
        if config.hosts.is_empty() {
            return Err(ConfigError::NoHosts);
        }
        Ok(config)
    }

    /// Read and parse a configuration file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let document = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::load(path.as_ref(), e))?;
        Self::from_json_str(&document)
    }

    /// Resolve the verification level a resource demands.
    ///
    /// The longest matching path prefix wins; host-specific policies beat
    /// host-agnostic ones of the same length. `None` means the resource does
    /// not override the connection's level.
    pub fn required_verify(&self, host: &str, path: &str) -> Option<VerifyMode> {
        self.locations
            .iter()
            .filter(|policy| path.starts_with(&policy.path_prefix))
            .filter(|policy| {
                policy
                    .host
                    .as_deref()
                    .is_none_or(|h| h.eq_ignore_ascii_case(host))
            })
            .max_by_key(|policy| (policy.path_prefix.len(), policy.host.is_some()))
            .map(|policy| policy.client_verify)
    }
}
