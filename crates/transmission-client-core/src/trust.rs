//! Trust evaluation: turns TLS verifier observations into user decisions.
//!
//! The rustls verifier is synchronous, so when it cannot accept a
//! certificate it records what it saw and fails the handshake. The transport
//! then asks [`TrustEvaluator::resolve_pending`] to settle the matter: under
//! a serializing lock it re-checks the pin store (another call may have
//! pinned the certificate meanwhile), deletes a mismatched pin before asking
//! anyone, and suspends on the decision handler until the user answers.
//!
//! One evaluator per client; evaluations are serialized so at most one
//! prompt is pending at a time even with concurrent calls in flight.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{info, warn};
use transmission_proto::tls::verifier::{ObservationSlot, TrustObservation};
use transmission_proto::trust::{
    ChallengeReason, PinRecord, PinStore, TrustChallenge, TrustDecision,
};

use crate::error::ApiError;
use crate::prompt::DecisionHandler;

pub struct TrustEvaluator {
    pins: Arc<dyn PinStore>,
    observations: Arc<ObservationSlot>,
    handler: Option<DecisionHandler>,
    /// Serializes challenge resolution across concurrent calls.
    gate: Mutex<()>,
}

impl TrustEvaluator {
    /// With no handler configured every challenge is denied.
    pub fn new(
        pins: Arc<dyn PinStore>,
        observations: Arc<ObservationSlot>,
        handler: Option<DecisionHandler>,
    ) -> Self {
        Self {
            pins,
            observations,
            handler,
            gate: Mutex::new(()),
        }
    }

    /// Settles a trust observation left behind by a failed connection
    /// attempt.
    ///
    /// Returns `Ok(true)` when trust was just granted and the request should
    /// be re-attempted, `Ok(false)` when there was no pending observation
    /// (the failure was not about trust), and an error when the user denied
    /// the certificate or the machinery failed.
    pub async fn resolve_pending(&self) -> Result<bool, ApiError> {
        let Some(observation) = self.observations.take() else {
            return Ok(false);
        };

        let _serialized = self.gate.lock().await;
        match observation {
            TrustObservation::StoreFailure(detail) => Err(ApiError::TlsEvaluationFailed(detail)),
            TrustObservation::Challenge(challenge) => {
                self.resolve_challenge(challenge).await.map(|()| true)
            }
        }
    }

    async fn resolve_challenge(&self, challenge: TrustChallenge) -> Result<(), ApiError> {
        // A concurrent call may have pinned this certificate while we waited
        // for the gate; don't prompt twice for the same answer.
        match self.pins.load(&challenge.server) {
            Ok(Some(record)) if record.fingerprint == challenge.certificate.fingerprint => {
                return Ok(());
            }
            Ok(_) => {}
            Err(e) => return Err(ApiError::TlsEvaluationFailed(e.to_string())),
        }

        // Fail closed: a rotated certificate invalidates the old pin before
        // the user is asked about the new one.
        if let ChallengeReason::FingerprintMismatch { .. } = challenge.reason {
            self.pins
                .delete(&challenge.server)
                .map_err(|e| ApiError::TlsEvaluationFailed(e.to_string()))?;
        }

        let decision = match &self.handler {
            Some(handler) => handler(challenge.clone()).await,
            None => TrustDecision::Deny,
        };

        match decision {
            TrustDecision::TrustPermanently => {
                let record = PinRecord {
                    fingerprint: challenge.certificate.fingerprint,
                    certificate: challenge.certificate.clone(),
                };
                self.pins
                    .save(&challenge.server, record)
                    .map_err(|e| ApiError::TlsEvaluationFailed(e.to_string()))?;
                info!(server = %challenge.server,
                      fingerprint = %challenge.certificate.fingerprint,
                      "certificate pinned");
                Ok(())
            }
            TrustDecision::Deny => {
                warn!(server = %challenge.server, "certificate declined by user");
                Err(ApiError::TlsTrustDeclined(Box::new(challenge)))
            }
        }
    }
}
