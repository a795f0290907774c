//! TLS configuration builder for the HTTPS transport.
//!
//! Constructs a `rustls::ClientConfig` with the pinning verifier installed.
//! The config is handed to the HTTP client via its preconfigured-TLS hook.
//!
//! Enforced here:
//! - Ring crypto provider
//! - Default protocol versions (TLS 1.2 and 1.3; daemons still negotiate 1.2)
//! - HTTP/1.1 ALPN, matching the RPC transport

use std::sync::Arc;

use rustls::client::danger::ServerCertVerifier;

use crate::error::{ProtoError, Result};

/// Build a `rustls::ClientConfig` around a custom certificate verifier.
///
/// No client certificate is presented; the RPC protocol authenticates with
/// HTTP Basic credentials instead of mTLS.
pub fn build_client_tls_config(
    verifier: Arc<dyn ServerCertVerifier>,
) -> Result<rustls::ClientConfig> {
    let mut config = rustls::ClientConfig::builder_with_provider(Arc::new(
        rustls::crypto::ring::default_provider(),
    ))
    .with_safe_default_protocol_versions()
    .map_err(|e| ProtoError::TlsConfiguration(format!("TLS version config: {e}")))?
    .dangerous()
    .with_custom_certificate_verifier(verifier)
    .with_no_client_auth();

    config.alpn_protocols = vec![b"http/1.1".to_vec()];

    Ok(config)
}
