//! Transmission RPC wire protocol definitions.
//!
//! Shared protocol layer used by `transmission-client-core`:
//!
//! - Dynamic JSON value and request/response envelopes
//! - RPC protocol version constants
//! - Certificate pinning trust model (pin store, challenges, decisions)
//! - Custom rustls verifier and TLS config builder

pub mod envelope;
pub mod error;
pub mod tls;
pub mod trust;
pub mod value;
pub mod version;
