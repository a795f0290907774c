//! Custom rustls server certificate verifier for the pinning trust model.
//!
//! [`PinnedCertVerifier`] validates the chain against the WebPKI first; a
//! publicly valid certificate is accepted without touching the pin store.
//! Otherwise the leaf's SHA-256 fingerprint is compared against the pin for
//! this server. On a missing or mismatching pin the handshake is rejected and
//! a [`TrustObservation`] is left in the shared [`ObservationSlot`], so the
//! transport layer can run the asynchronous user trust prompt and retry.
//! rustls verifier callbacks are synchronous; the prompt must not live here.
//!
//! Signature verification is delegated to the rustls ring crypto provider.
//! Only certificate chain validation is customized.

use std::fmt;
use std::sync::{Arc, Mutex};

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::client::WebPkiServerVerifier;
use rustls::{DigitallySignedStruct, Error as TlsError, SignatureScheme};
use rustls_pki_types::{CertificateDer, ServerName, UnixTime};

use crate::error::{ProtoError, Result};
use crate::trust::{
    CertificateInfo, ChallengeReason, Fingerprint, PinRecord, PinStore, ServerId, TrustChallenge,
};

/// What the verifier saw when it rejected a handshake.
#[derive(Debug, Clone, PartialEq)]
pub enum TrustObservation {
    /// The certificate needs a user decision.
    Challenge(TrustChallenge),
    /// The pin store failed; no trust judgement was possible.
    StoreFailure(String),
}

/// Single-slot mailbox between the TLS verifier and the transport layer.
///
/// The verifier writes at most one observation per rejected handshake; the
/// transport takes it when the connection attempt surfaces as an error. A
/// later handshake overwrites a stale observation.
#[derive(Debug, Default)]
pub struct ObservationSlot {
    pending: Mutex<Option<TrustObservation>>,
}

impl ObservationSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, observation: TrustObservation) {
        *self.pending.lock().unwrap() = Some(observation);
    }

    /// Removes and returns the pending observation, if any.
    pub fn take(&self) -> Option<TrustObservation> {
        self.pending.lock().unwrap().take()
    }
}

/// Get the ring provider's supported signature verification algorithms.
fn ring_signature_algorithms() -> &'static rustls::crypto::WebPkiSupportedAlgorithms {
    use std::sync::LazyLock;
    static ALGORITHMS: LazyLock<rustls::crypto::WebPkiSupportedAlgorithms> = LazyLock::new(|| {
        rustls::crypto::ring::default_provider().signature_verification_algorithms
    });
    &ALGORITHMS
}

/// Server certificate verifier combining WebPKI validation with pinning.
pub struct PinnedCertVerifier {
    server: ServerId,
    pins: Arc<dyn PinStore>,
    observations: Arc<ObservationSlot>,
    webpki: Arc<WebPkiServerVerifier>,
}

impl PinnedCertVerifier {
    /// Builds a verifier for one server endpoint.
    ///
    /// The WebPKI path validates against the bundled Mozilla root set.
    pub fn new(
        server: ServerId,
        pins: Arc<dyn PinStore>,
        observations: Arc<ObservationSlot>,
    ) -> Result<Self> {
        let mut roots = rustls::RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

        let webpki = WebPkiServerVerifier::builder_with_provider(
            Arc::new(roots),
            Arc::new(rustls::crypto::ring::default_provider()),
        )
        .build()
        .map_err(|e| ProtoError::TlsConfiguration(format!("WebPKI verifier: {e}")))?;

        Ok(Self {
            server,
            pins,
            observations,
            webpki,
        })
    }

    /// Pin check for a certificate the WebPKI rejected.
    fn verify_pinned(&self, end_entity: &CertificateDer<'_>) -> std::result::Result<(), TlsError> {
        let fingerprint = Fingerprint::from_der(end_entity);

        let pinned = match self.pins.load(&self.server) {
            Ok(pinned) => pinned,
            Err(e) => {
                self.observations
                    .record(TrustObservation::StoreFailure(e.to_string()));
                return Err(TlsError::General(format!("pin store unavailable: {e}")));
            }
        };

        let reason = match pinned {
            Some(record) if record.fingerprint == fingerprint => return Ok(()),
            Some(record) => ChallengeReason::FingerprintMismatch {
                previous: record.fingerprint,
            },
            None => ChallengeReason::UntrustedCertificate,
        };

        let challenge = TrustChallenge {
            server: self.server.clone(),
            reason,
            certificate: CertificateInfo::from_der(end_entity),
        };
        self.observations
            .record(TrustObservation::Challenge(challenge));
        Err(TlsError::General(format!(
            "certificate for {} is not trusted",
            self.server
        )))
    }
}

impl fmt::Debug for PinnedCertVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PinnedCertVerifier")
            .field("server", &self.server)
            .finish_non_exhaustive()
    }
}

impl ServerCertVerifier for PinnedCertVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, TlsError> {
        // Publicly valid certificates pass without consulting pins.
        if self
            .webpki
            .verify_server_cert(end_entity, intermediates, server_name, ocsp_response, now)
            .is_ok()
        {
            return Ok(ServerCertVerified::assertion());
        }

        // Pins identify the server by endpoint, not by certificate subject,
        // so no hostname check happens on this path.
        self.verify_pinned(end_entity)?;
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, TlsError> {
        rustls::crypto::verify_tls12_signature(message, cert, dss, ring_signature_algorithms())
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, TlsError> {
        rustls::crypto::verify_tls13_signature(message, cert, dss, ring_signature_algorithms())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        ring_signature_algorithms().supported_schemes()
    }
}
