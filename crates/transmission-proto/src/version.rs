//! RPC protocol version constants.
//!
//! Transmission numbers its RPC protocol with a single integer that the
//! daemon reports in `session-get` as `rpc-version`, alongside
//! `rpc-version-minimum`, the oldest protocol it still accepts.

/// Oldest daemon protocol this client can talk to.
///
/// Version 14 (Transmission 2.40) introduced the current method set; older
/// daemons lack calls this client depends on.
pub const MIN_SUPPORTED_RPC_VERSION: i64 = 14;

/// Protocol version this client was written against.
pub const TARGET_RPC_VERSION: i64 = 17;

/// Returns true if a daemon reporting `rpc_version` and accepting clients
/// down to `rpc_version_minimum` can serve this client.
///
/// The daemon must be at least [`MIN_SUPPORTED_RPC_VERSION`], and must not
/// have dropped support for protocols at or below our target.
pub fn is_compatible(rpc_version: i64, rpc_version_minimum: i64) -> bool {
    rpc_version >= MIN_SUPPORTED_RPC_VERSION && rpc_version_minimum <= TARGET_RPC_VERSION
}
