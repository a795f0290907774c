//! User-facing error taxonomy and response classifiers.
//!
//! The protocol reports failures on three channels: HTTP status codes, the
//! free-text `result` string in an otherwise-healthy envelope, and transport
//! exceptions. Three independent classifiers map those onto [`ApiError`]:
//! exact status codes, keyword sniffing on the result text, and a
//! retryability allow-list on transport errors.

use std::io;

use thiserror::Error;
use transmission_proto::trust::TrustChallenge;

/// Errors surfaced to callers of the client. Closed set; retry decisions
/// happen before construction, never after.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Transient transport failure that survived the whole retry budget.
    #[error("server unreachable: {0}")]
    NetworkUnavailable(String),

    /// The daemon rejected the configured credentials.
    #[error("authentication rejected by server")]
    Unauthorized,

    /// The session token handshake could not be completed.
    #[error("session token rejected after handshake retries")]
    SessionConflict,

    /// The daemon speaks an RPC protocol this client does not support.
    #[error("unsupported server version: {0}")]
    VersionUnsupported(String),

    /// The reply body was empty, malformed or structurally unexpected.
    #[error("response decoding failed: {0}")]
    DecodingFailed(String),

    /// The user declined the server's certificate.
    #[error("connection to {} declined by user", .0.server)]
    TlsTrustDeclined(Box<TrustChallenge>),

    /// Trust machinery failed before a decision could be made.
    #[error("certificate trust evaluation failed: {0}")]
    TlsEvaluationFailed(String),

    /// Anything the taxonomy cannot name more precisely.
    #[error("request failed: {0}")]
    Unknown(String),
}

pub type Result<T> = std::result::Result<T, ApiError>;

/// Maps an HTTP status to an error, or `None` for 2xx.
///
/// Exact code match per the protocol: 401 means bad credentials, 409 means
/// the session handshake ran out of attempts, anything else non-2xx is
/// surfaced with its code.
pub fn classify_status(status: u16) -> Option<ApiError> {
    match status {
        200..=299 => None,
        401 => Some(ApiError::Unauthorized),
        409 => Some(ApiError::SessionConflict),
        other => Some(ApiError::Unknown(format!("HTTP status {other}"))),
    }
}

/// Classifies the free-text `result` string of a failed envelope.
///
/// The protocol carries errors as prose, not codes, so this is deliberate
/// keyword sniffing: case-insensitive substring match, first category wins
/// in the fixed order version > decode > auth > session.
pub fn classify_result(result: &str) -> ApiError {
    let lowered = result.to_ascii_lowercase();

    if lowered.contains("version") || lowered.contains("rpc-version") {
        ApiError::VersionUnsupported(result.to_owned())
    } else if ["invalid json", "parse", "decode"]
        .iter()
        .any(|keyword| lowered.contains(keyword))
    {
        ApiError::DecodingFailed(result.to_owned())
    } else if ["auth", "unauthorized", "credential"]
        .iter()
        .any(|keyword| lowered.contains(keyword))
    {
        ApiError::Unauthorized
    } else if lowered.contains("session") || lowered.contains("csrf") {
        ApiError::SessionConflict
    } else {
        ApiError::Unknown(result.to_owned())
    }
}

/// Returns true if a transport failure is on the retry allow-list.
///
/// Retryable: timeouts, connect-phase failures (DNS, refused, TLS setup) and
/// connection-drop I/O kinds found anywhere in the source chain. Everything
/// else (bad URL, body errors, redirect loops) fails immediately.
pub fn is_retryable(error: &reqwest::Error) -> bool {
    if error.is_timeout() || error.is_connect() {
        return true;
    }

    let mut source = std::error::Error::source(error);
    while let Some(cause) = source {
        if let Some(io_error) = cause.downcast_ref::<io::Error>() {
            return matches!(
                io_error.kind(),
                io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::NotConnected
                    | io::ErrorKind::TimedOut
                    | io::ErrorKind::UnexpectedEof
            );
        }
        source = cause.source();
    }
    false
}
