//! Error type for the protocol layer.
//!
//! These are the failures the protocol crate itself can produce: wire
//! decoding, certificate metadata extraction, pin-store access and TLS
//! configuration. The client crate wraps them into its user-facing error
//! taxonomy.

use thiserror::Error;

/// Errors that can occur within the `transmission-proto` crate.
#[derive(Debug, Error)]
pub enum ProtoError {
    // --- Wire ---
    #[error("response decode failed: {0}")]
    Decode(String),

    // --- Certificates ---
    #[error("certificate parse failed: {0}")]
    CertificateParse(String),

    // --- Trust ---
    #[error("pin store operation failed: {0}")]
    PinStore(String),

    // --- TLS ---
    #[error("TLS configuration error: {0}")]
    TlsConfiguration(String),
}

/// Result type alias using [`ProtoError`].
pub type Result<T> = std::result::Result<T, ProtoError>;
