//! Server name indication to virtual host resolution

use std::sync::Arc;

use tracing::{debug, error};

use crate::store::{CredentialEntry, CredentialStore};
use crate::types::{NameType, ServerNameIndication};

/// Host name carried by a DNS-typed server name indication.
pub fn requested_host(server_name: &ServerNameIndication) -> Option<&str> {
    if server_name.name_type != NameType::Dns {
        error!(
            "Server name indication type {:?} is not supported",
            server_name.name_type
        );
        return None;
    }
    match std::str::from_utf8(&server_name.value) {
        Ok(name) if !name.is_empty() => Some(name),
        Ok(_) => None,
        Err(e) => {
            error!("Server name indication is not valid UTF-8: {}", e);
            None
        }
    }
}

/// Find the enabled host a client asked for. `None` keeps the current binding.
pub fn resolve(
    store: &CredentialStore,
    server_name: Option<&ServerNameIndication>,
) -> Option<Arc<CredentialEntry>> {
    let name = requested_host(server_name?)?;
    let found = store.lookup_by_name(name);
    if found.is_none() {
        debug!("No virtual host matches '{}', keeping current host", name);
    }
    found
}
