//! Per-request access decisions with client certificate escalation
//!
//! A resource can demand a stronger client verification level than the
//! connection negotiated. When the client has not yet presented a certificate
//! the connection is re-negotiated once at the higher level; a request never
//! triggers a second re-negotiation.

use tracing::debug;

use crate::attributes::RequestAttributes;
use crate::engine::NegotiationSession;
use crate::handle::ConnectionHandle;
use crate::types::VerifyMode;
use crate::verifier::{Verdict, Verifier};

/// Final answer for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessDecision {
    Allowed,
    Denied { reason: String },
    /// No opinion; the request proceeds to other checks
    Declined,
}

impl AccessDecision {
    pub fn is_denied(&self) -> bool {
        matches!(self, Self::Denied { .. })
    }
}

/// Progress of the check for one request.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AccessState {
    #[default]
    Unchecked,
    RenegotiationPending,
    Decided(AccessDecision),
}

/// Access check for a single request.
pub struct AccessController<'a> {
    verifier: Verifier<'a>,
    state: AccessState,
    renegotiated: bool,
}

impl<'a> AccessController<'a> {
    pub fn new(verifier: Verifier<'a>) -> Self {
        Self {
            verifier,
            state: AccessState::Unchecked,
            renegotiated: false,
        }
    }

    pub fn state(&self) -> &AccessState {
        &self.state
    }

    pub fn renegotiated(&self) -> bool {
        self.renegotiated
    }

    /// Decide whether the request may proceed, using the current time.
    pub fn check<S: NegotiationSession>(
        &mut self,
        handle: &mut ConnectionHandle<S>,
        required: Option<VerifyMode>,
        attrs: &mut RequestAttributes,
    ) -> AccessDecision {
        self.check_at(handle, required, attrs, chrono::Utc::now().timestamp())
    }

    /// Decide whether the request may proceed.
    ///
    /// `required` is the resource's level; `None` uses the connection's.
    /// Verification results are recorded into `attrs`.
    pub fn check_at<S: NegotiationSession>(
        &mut self,
        handle: &mut ConnectionHandle<S>,
        required: Option<VerifyMode>,
        attrs: &mut RequestAttributes,
        now: i64,
    ) -> AccessDecision {
        let negotiated = handle.verify_mode();
        let required = required.unwrap_or(negotiated);

        if required == VerifyMode::Ignore {
            debug!("Resource set to ignore client certificates");
            return self.decide(AccessDecision::Declined);
        }

        if required > negotiated {
            debug!(
                "Resource requires client verification '{}', connection negotiated '{}'",
                required, negotiated
            );

            // A certificate already on the connection is judged as it stands
            if !handle.session().peer_certificates().is_empty() {
                let verdict = self.run_verifier(handle, required, attrs, now);
                return self.conclude(&verdict, required);
            }

            if self.renegotiated {
                return self.decide(AccessDecision::Denied {
                    reason: "re-negotiation already attempted for this request".to_string(),
                });
            }
            self.renegotiated = true;
            self.state = AccessState::RenegotiationPending;
            if let Err(e) = handle.renegotiate(required) {
                return self.decide(AccessDecision::Denied {
                    reason: e.to_string(),
                });
            }
        } else if negotiated == VerifyMode::Ignore {
            debug!("Connection is set to ignore client certificates");
            return self.decide(AccessDecision::Declined);
        }

        let mode = handle.verify_mode();
        let verdict = self.run_verifier(handle, mode, attrs, now);
        self.conclude(&verdict, required)
    }

    fn run_verifier<S: NegotiationSession>(
        &self,
        handle: &ConnectionHandle<S>,
        mode: VerifyMode,
        attrs: &mut RequestAttributes,
        now: i64,
    ) -> Verdict {
        let session = handle.session();
        let presented = session.peer_certificates();
        let verdict = self.verifier.verify(
            presented.as_slice(),
            session.negotiated_certificate_type(),
            handle.entry(),
            mode,
            now,
        );
        attrs.record_verdict(&verdict);
        verdict
    }

    fn conclude(&mut self, verdict: &Verdict, required: VerifyMode) -> AccessDecision {
        if verdict.allowed {
            return self.decide(AccessDecision::Allowed);
        }
        // A resource that only requests a certificate does not deny on failure
        if required == VerifyMode::Request {
            return self.decide(AccessDecision::Declined);
        }
        self.decide(AccessDecision::Denied {
            reason: verdict
                .reason()
                .unwrap_or_else(|| "client certificate verification failed".to_string()),
        })
    }

    fn decide(&mut self, decision: AccessDecision) -> AccessDecision {
        self.state = AccessState::Decided(decision.clone());
        decision
    }
}
