//! Session resumption ticket key lifecycle
//!
//! One key per process, generated before the first connection and zeroed at
//! shutdown. A missing key disables tickets without affecting anything else.

use std::fmt;

use ring::rand::{SecureRandom, SystemRandom};
use tracing::{debug, error, info};

use crate::engine::NegotiationSession;
use crate::store::CredentialEntry;
use crate::types::SecureKeyMaterial;

/// Length of the ticket encryption key in bytes.
pub const TICKET_KEY_LEN: usize = 32;

/// Ticket encryption key, zeroed on drop.
pub struct TicketKey {
    material: SecureKeyMaterial,
}

impl TicketKey {
    pub fn as_bytes(&self) -> &[u8] {
        self.material.as_bytes()
    }
}

impl fmt::Debug for TicketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TicketKey(..)")
    }
}

/// Owner of the process-wide ticket key.
#[derive(Debug, Default)]
pub struct ResumptionKeys {
    key: Option<TicketKey>,
}

impl ResumptionKeys {
    /// Generate the key from the system CSPRNG.
    pub fn init() -> Self {
        let rng = SystemRandom::new();
        Self::generate_with(|buf| rng.fill(buf))
    }

    /// Generate the key with a caller-supplied random source. A failing
    /// source leaves the owner without a key.
    pub fn generate_with<F>(fill: F) -> Self
    where
        F: FnOnce(&mut [u8]) -> Result<(), ring::error::Unspecified>,
    {
        let mut buf = vec![0u8; TICKET_KEY_LEN];
        match fill(&mut buf) {
            Ok(()) => {
                debug!("Generated {} byte session ticket key", TICKET_KEY_LEN);
                Self {
                    key: Some(TicketKey {
                        material: SecureKeyMaterial::new(buf),
                    }),
                }
            }
            Err(e) => {
                // buf may hold partial random output
                drop(SecureKeyMaterial::new(buf));
                error!("Session ticket key generation failed: {e}; tickets disabled");
                Self { key: None }
            }
        }
    }

    pub fn key(&self) -> Option<&TicketKey> {
        self.key.as_ref()
    }

    pub fn is_initialized(&self) -> bool {
        self.key.is_some()
    }

    /// Enable tickets on a new session when a key exists and the host allows
    /// them. Returns whether tickets were enabled.
    pub fn attach(&self, session: &mut dyn NegotiationSession, entry: &CredentialEntry) -> bool {
        let Some(key) = self.key.as_ref() else {
            return false;
        };
        if !entry.tickets {
            return false;
        }
        match session.enable_session_tickets(key) {
            Ok(()) => true,
            Err(e) => {
                info!("Could not enable session tickets for '{}': {}", entry.name, e);
                false
            }
        }
    }

    /// Zero and release the key. Safe to call more than once.
    pub fn teardown(&mut self) {
        if self.key.take().is_some() {
            debug!("Session ticket key released");
        }
    }
}

impl Drop for ResumptionKeys {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_a_full_length_key() {
        let keys = ResumptionKeys::init();
        let key = keys.key().expect("system rng should produce a key");
        assert_eq!(key.as_bytes().len(), TICKET_KEY_LEN);
        assert!(format!("{key:?}").contains(".."));
    }

    #[test]
    fn failed_generation_is_tolerated() {
        let keys = ResumptionKeys::generate_with(|_| Err(ring::error::Unspecified));
        assert!(!keys.is_initialized());
    }

    #[test]
    fn teardown_is_idempotent() {
        let mut keys = ResumptionKeys::generate_with(|buf| {
            buf.fill(7);
            Ok(())
        });
        assert!(keys.is_initialized());
        keys.teardown();
        assert!(!keys.is_initialized());
        keys.teardown();

        let mut never = ResumptionKeys::default();
        never.teardown();
        assert!(never.key().is_none());
    }
}
