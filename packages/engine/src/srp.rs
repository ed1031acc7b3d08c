//! SRP verifier lookup
//!
//! Verifiers come either from password files or from a named query answered
//! by an embedder-supplied [`VerifierLookup`]. An unknown user never produces
//! an error the client could observe: the handshake proceeds with decoy
//! parameters drawn from the 1024-bit group.

use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use rand::RngCore;
use tracing::{error, info};

use crate::errors::TlsError;
use crate::store::{DhParams, SrpSource};

/// RFC 5054 1024-bit group prime.
const GROUP_1024_PRIME: &str = "EEAF0AB9ADB38DD69C33F80AFA8FC5E86072618775FF3C0B9EA2314C9C256576\
D674DF7496EA81D3383B4813D692C6E0E0D5D8E250B98BE48E495C1D6089DAD1\
5DC7D7B46154D6B6CE8EF4AD69B15D4982559B297BCF1885C529F566660E57EC\
68EDBC3C05726CC02FD4CBF4976EAA9AFD5138FE8376435B9FC61D2FC0EB06E3";

const DECOY_SALT_LEN: usize = 16;

/// Prime and generator of an SRP group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SrpGroup {
    pub prime: Vec<u8>,
    pub generator: Vec<u8>,
}

impl SrpGroup {
    pub fn group_1024() -> Result<Self, TlsError> {
        Ok(Self {
            prime: hex::decode(GROUP_1024_PRIME)
                .map_err(|e| TlsError::Internal(format!("Bad built-in SRP prime: {e}")))?,
            generator: vec![2],
        })
    }

    /// The 2048-bit group shares its parameters with the built-in DH group.
    pub fn group_2048() -> Result<Self, TlsError> {
        let params = DhParams::builtin()?;
        Ok(Self {
            prime: params.prime().to_vec(),
            generator: params.generator().to_vec(),
        })
    }

    /// Group named by a lookup row (`"1024"`, `"2048"`). `None` for unknown names.
    pub fn by_name(name: &str) -> Result<Option<Self>, TlsError> {
        match name.trim() {
            "1024" => Self::group_1024().map(Some),
            "2048" => Self::group_2048().map(Some),
            _ => Ok(None),
        }
    }
}

/// What the engine needs to run SRP for one user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SrpParameters {
    pub group: SrpGroup,
    pub salt: Vec<u8>,
    pub verifier: Vec<u8>,
    /// Random parameters standing in for an unknown user
    pub decoy: bool,
}

impl SrpParameters {
    /// Random salt and verifier in the 1024-bit group.
    pub fn decoy() -> Result<Self, TlsError> {
        let group = SrpGroup::group_1024()?;
        let mut rng = rand::rng();
        let mut salt = vec![0u8; DECOY_SALT_LEN];
        rng.fill_bytes(&mut salt);
        let mut verifier = vec![0u8; group.prime.len()];
        rng.fill_bytes(&mut verifier);
        Ok(Self {
            group,
            salt,
            verifier,
            decoy: true,
        })
    }
}

/// One row returned by a verifier query. Verifier and salt are base64.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerifierRow {
    pub srp_group: Option<String>,
    pub srp_v: Option<String>,
    pub srp_s: Option<String>,
}

/// Verifier lookup backed by an external store.
pub trait VerifierLookup: Send + Sync {
    /// Run the named query for `username`. `Ok(None)` means no such user;
    /// `Err` means the query itself could not be executed.
    fn lookup(&self, query: &str, username: &str) -> Result<Option<VerifierRow>, TlsError>;
}

/// Resolve SRP parameters for `username` from a host's source.
pub fn resolve(
    source: &SrpSource,
    lookup: Option<&dyn VerifierLookup>,
    username: &str,
) -> Result<SrpParameters, TlsError> {
    let params = match source {
        SrpSource::Query(query) => {
            let Some(lookup) = lookup else {
                error!("SRP query '{}' configured without a verifier lookup", query);
                return Err(TlsError::Lookup(format!(
                    "no verifier lookup installed for query '{query}'"
                )));
            };
            let row = lookup.lookup(query, username).map_err(|e| {
                error!("Query execution error looking up '{}': {}", username, e);
                e
            })?;
            match row {
                Some(row) => parameters_from_row(&row)?,
                None => None,
            }
        }
        SrpSource::Files {
            passwd_file,
            conf_file,
        } => read_passwd_files(passwd_file, conf_file, username)?,
    };

    match params {
        Some(params) => Ok(params),
        None => {
            info!("SRP user '{}' not found, using random params", username);
            SrpParameters::decoy()
        }
    }
}

fn parameters_from_row(row: &VerifierRow) -> Result<Option<SrpParameters>, TlsError> {
    let group = match row.srp_group.as_deref() {
        Some(name) => {
            let group = SrpGroup::by_name(name)?;
            if group.is_none() {
                error!("Unknown SRP group: {}", name);
            }
            group
        }
        None => None,
    };
    let verifier = row.srp_v.as_deref().and_then(decode_column);
    let salt = row.srp_s.as_deref().and_then(decode_column);

    Ok(match (group, verifier, salt) {
        (Some(group), Some(verifier), Some(salt)) => Some(SrpParameters {
            group,
            salt,
            verifier,
            decoy: false,
        }),
        _ => None,
    })
}

fn decode_column(value: &str) -> Option<Vec<u8>> {
    STANDARD
        .decode(value.trim())
        .ok()
        .filter(|bytes| !bytes.is_empty())
}

/// Password file lines are `user:verifier:salt:group_index`; conf file lines
/// are `group_index:prime:generator`. Binary columns are base64.
fn read_passwd_files(
    passwd_file: &Path,
    conf_file: &Path,
    username: &str,
) -> Result<Option<SrpParameters>, TlsError> {
    let passwd = std::fs::read_to_string(passwd_file)?;
    let Some(user) = passwd
        .lines()
        .map(|line| line.trim().split(':').collect::<Vec<_>>())
        .find(|fields| fields.len() == 4 && fields[0] == username)
    else {
        return Ok(None);
    };

    let conf = std::fs::read_to_string(conf_file)?;
    let Some(group) = conf
        .lines()
        .map(|line| line.trim().split(':').collect::<Vec<_>>())
        .find(|fields| fields.len() == 3 && fields[0] == user[3])
    else {
        error!(
            "SRP group index '{}' missing from {}",
            user[3],
            conf_file.display()
        );
        return Ok(None);
    };

    let decoded = (
        decode_column(group[1]),
        decode_column(group[2]),
        decode_column(user[1]),
        decode_column(user[2]),
    );
    let (Some(prime), Some(generator), Some(verifier), Some(salt)) = decoded else {
        return Ok(None);
    };
    Ok(Some(SrpParameters {
        group: SrpGroup { prime, generator },
        salt,
        verifier,
        decoy: false,
    }))
}
