//! Rebinding an in-progress handshake to a host's credentials and policy

use tracing::{debug, error};

use crate::engine::NegotiationSession;
use crate::errors::TlsError;
use crate::store::CredentialEntry;
use crate::types::VerifyMode;

/// Apply `entry`'s credentials and policy to the handshake in flight.
///
/// `verify_mode` is the connection's current level, which can be above the
/// entry's own level once a request has escalated it.
pub fn bind(
    session: &mut dyn NegotiationSession,
    entry: &CredentialEntry,
    verify_mode: VerifyMode,
) -> Result<(), TlsError> {
    session.set_client_verify(verify_mode);

    session.set_certificate_credentials();
    session.set_anonymous_credentials(&entry.dh_params);
    if entry.srp.is_some() {
        session.set_srp_credentials();
    }

    let Some(priorities) = entry.priorities.as_ref() else {
        return Err(TlsError::Internal(format!(
            "Host '{}' has no priorities to apply",
            entry.name
        )));
    };
    // Checked at startup, so a failure here is the engine's
    session.set_priorities(priorities).map_err(|e| {
        error!("Failed to apply priorities of '{}': {}", entry.name, e);
        TlsError::Internal(format!("Failed to apply priorities: {e}"))
    })?;

    if let Some(cert_type) = entry.certificate_type() {
        session
            .set_certificate_type_priority(&[cert_type])
            .map_err(|e| TlsError::Internal(format!("Failed to restrict certificate type: {e}")))?;
    }

    debug!(
        "Bound handshake to '{}' (verify mode {})",
        entry.name, verify_mode
    );
    Ok(())
}
