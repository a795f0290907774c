//! Certificate pinning: server identity and fingerprint trust management.
//!
//! Self-hosted Transmission daemons routinely run behind self-signed
//! certificates, so the client trusts servers on first use: a certificate the
//! WebPKI cannot validate is presented to the user once, and on approval its
//! SHA-256 fingerprint is pinned for that server.
//!
//! The [`PinStore`] trait abstracts how pins are persisted.
//! [`MemoryPinStore`] provides an in-memory implementation suitable for tests
//! and short-lived processes; durable storage (keychain, config file) is the
//! embedding application's concern.

use std::collections::HashMap;
use std::fmt;
use std::sync::RwLock;

use data_encoding::HEXLOWER;
use sha2::{Digest, Sha256};
use url::Url;
use x509_parser::prelude::{FromDer, X509Certificate};

use crate::error::Result;

/// Identity of a server for trust purposes.
///
/// Two endpoints are the same server when host (case-insensitive), port and
/// security of the scheme all match. Hosts are stored lowercased so lookups
/// are canonical.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServerId {
    host: String,
    port: u16,
    secure: bool,
}

impl ServerId {
    pub fn new(host: impl Into<String>, port: u16, secure: bool) -> Self {
        ServerId {
            host: host.into().to_ascii_lowercase(),
            port,
            secure,
        }
    }

    /// Derives the identity from an endpoint URL. Returns `None` if the URL
    /// has no host or no resolvable port.
    pub fn from_url(url: &Url) -> Option<Self> {
        let host = url.host_str()?;
        let port = url.port_or_known_default()?;
        Some(ServerId::new(host, port, url.scheme() == "https"))
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn is_secure(&self) -> bool {
        self.secure
    }
}

impl fmt::Display for ServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scheme = if self.secure { "https" } else { "http" };
        write!(f, "{scheme}://{}:{}", self.host, self.port)
    }
}

/// SHA-256 digest of a DER-encoded certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    pub fn from_der(der: &[u8]) -> Self {
        Fingerprint(Sha256::digest(der).into())
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Fingerprint(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&HEXLOWER.encode(&self.0))
    }
}

/// Human-readable certificate metadata for trust prompts.
///
/// Extraction is best effort: the fingerprint is always computed, while the
/// X.509 fields stay `None` when the certificate does not parse. A user can
/// still make a trust decision on the fingerprint alone.
#[derive(Debug, Clone, PartialEq)]
pub struct CertificateInfo {
    pub common_name: Option<String>,
    pub organization: Option<String>,
    /// Validity bounds as Unix timestamps.
    pub not_before: Option<i64>,
    pub not_after: Option<i64>,
    pub fingerprint: Fingerprint,
}

impl CertificateInfo {
    pub fn from_der(der: &[u8]) -> Self {
        let fingerprint = Fingerprint::from_der(der);

        let Ok((_, cert)) = X509Certificate::from_der(der) else {
            return CertificateInfo {
                common_name: None,
                organization: None,
                not_before: None,
                not_after: None,
                fingerprint,
            };
        };

        let common_name = cert
            .subject()
            .iter_common_name()
            .next()
            .and_then(|attr| attr.as_str().ok())
            .map(ToOwned::to_owned);
        let organization = cert
            .subject()
            .iter_organization()
            .next()
            .and_then(|attr| attr.as_str().ok())
            .map(ToOwned::to_owned);

        CertificateInfo {
            common_name,
            organization,
            not_before: Some(cert.validity().not_before.timestamp()),
            not_after: Some(cert.validity().not_after.timestamp()),
            fingerprint,
        }
    }
}

/// Why a certificate needs a user decision.
#[derive(Debug, Clone, PartialEq)]
pub enum ChallengeReason {
    /// No pin exists for this server and the WebPKI rejected the chain.
    UntrustedCertificate,
    /// A pin exists but the presented certificate does not match it.
    FingerprintMismatch { previous: Fingerprint },
}

/// A certificate awaiting a user trust decision.
#[derive(Debug, Clone, PartialEq)]
pub struct TrustChallenge {
    pub server: ServerId,
    pub reason: ChallengeReason,
    pub certificate: CertificateInfo,
}

/// The user's verdict on a [`TrustChallenge`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrustDecision {
    /// Pin the fingerprint; never ask again for this certificate.
    TrustPermanently,
    /// Reject the connection and keep no record.
    Deny,
}

/// A stored pin: the fingerprint plus the metadata snapshot taken when the
/// user approved the certificate. The metadata lets an application show what
/// was trusted in a "forget this server" view.
#[derive(Debug, Clone, PartialEq)]
pub struct PinRecord {
    pub fingerprint: Fingerprint,
    pub certificate: CertificateInfo,
}

/// Trait for loading and storing certificate pins.
///
/// Implementations must be `Send + Sync` to allow sharing via
/// `Arc<dyn PinStore>` across async tasks and TLS verifier callbacks.
/// Methods are fallible because durable backends (keychain, disk) can fail.
pub trait PinStore: Send + Sync {
    /// Returns the pin for the server, if one exists.
    fn load(&self, server: &ServerId) -> Result<Option<PinRecord>>;

    /// Pins a certificate for the server, replacing any previous pin.
    fn save(&self, server: &ServerId, record: PinRecord) -> Result<()>;

    /// Removes the pin for the server. No-op if none exists.
    fn delete(&self, server: &ServerId) -> Result<()>;
}

/// In-memory pin store backed by `RwLock<HashMap<ServerId, PinRecord>>`.
pub struct MemoryPinStore {
    pins: RwLock<HashMap<ServerId, PinRecord>>,
}

impl MemoryPinStore {
    /// Create an empty pin store.
    pub fn new() -> Self {
        Self {
            pins: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryPinStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PinStore for MemoryPinStore {
    fn load(&self, server: &ServerId) -> Result<Option<PinRecord>> {
        Ok(self.pins.read().unwrap().get(server).cloned())
    }

    fn save(&self, server: &ServerId, record: PinRecord) -> Result<()> {
        self.pins.write().unwrap().insert(server.clone(), record);
        Ok(())
    }

    fn delete(&self, server: &ServerId) -> Result<()> {
        self.pins.write().unwrap().remove(server);
        Ok(())
    }
}
