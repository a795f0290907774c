//! TLS primitives for the pinning trust model.
//!
//! - Custom rustls server certificate verifier (WebPKI first, then pins)
//! - Client TLS config builder wired for the HTTP transport

pub mod config;
pub mod verifier;
