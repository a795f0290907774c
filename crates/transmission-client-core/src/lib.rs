//! Transmission RPC client engine.
//!
//! Headless client core for the Transmission daemon's JSON-over-HTTP RPC,
//! consumed by any front end (desktop app, TUI, CLI):
//!
//! - HTTP transport with session-token handshake and retry/backoff (reqwest)
//! - TLS trust evaluation with certificate pinning for self-signed daemons
//! - User-facing trust prompt plumbing
//! - Error taxonomy mapping transport, protocol and server failures
//! - Typed domain mapping of torrent, session and statistics payloads
//! - Sanitized request/response logging

pub mod client;
pub mod config;
pub mod error;
pub mod logging;
pub mod mapper;
pub mod model;
pub mod prompt;
pub mod trust;

pub use client::{ClientBuilder, TransmissionClient};
pub use config::{ClientOptions, Credentials, RetryPolicy};
pub use error::ApiError;
pub use prompt::TrustPromptCenter;
