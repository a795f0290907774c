//! Pure mapping from decoded wire responses into domain records.
//!
//! No I/O and no retries here: every function takes a [`Response`] the
//! transport already decoded and either produces a typed record or a
//! [`MapError`] naming exactly what was wrong. Mandatory fields (torrent id,
//! name, status) fail loudly; optional numerics and booleans default to
//! 0/false so the mapping survives older and newer daemons.
//!
//! Numbers are accepted in either wire shape (int or double); the protocol
//! is loosely typed about the distinction.

use thiserror::Error;
use transmission_proto::envelope::Response;
use transmission_proto::value::Value;
use transmission_proto::version;

use crate::model::{
    AddedTorrent, SessionInfo, SessionStats, StatsDetail, Torrent, TorrentStatus,
};

/// Errors produced while mapping a wire response to a domain record.
///
/// Independent of the transport taxonomy: a `MapError` means the call itself
/// succeeded but the payload does not match the domain contract.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum MapError {
    #[error("server reported failure for {context}: {result}")]
    RpcError { result: String, context: &'static str },

    #[error("missing arguments object ({0})")]
    MissingArguments(&'static str),

    #[error("missing field `{field}` ({context})")]
    MissingField {
        field: &'static str,
        context: &'static str,
    },

    #[error("field `{field}` is {found}, expected {expected} ({context})")]
    InvalidType {
        field: &'static str,
        expected: &'static str,
        found: &'static str,
        context: &'static str,
    },

    #[error("field `{field}` invalid: {detail} ({context})")]
    InvalidValue {
        field: &'static str,
        detail: String,
        context: &'static str,
    },

    #[error("unsupported torrent status value {0}")]
    UnsupportedStatus(i64),

    #[error("empty collection ({0})")]
    EmptyCollection(&'static str),
}

type MapResult<T> = Result<T, MapError>;

// ---------------------------------------------------------------------------
// Field extraction helpers
// ---------------------------------------------------------------------------

/// Checks the envelope result and returns the arguments object.
fn require_arguments<'a>(response: &'a Response, context: &'static str) -> MapResult<&'a Value> {
    if !response.is_success() {
        return Err(MapError::RpcError {
            result: response.result.clone(),
            context,
        });
    }
    match &response.arguments {
        Some(arguments) if arguments.as_object().is_some() => Ok(arguments),
        Some(arguments) => Err(MapError::InvalidType {
            field: "arguments",
            expected: "object",
            found: arguments.type_name(),
            context,
        }),
        None => Err(MapError::MissingArguments(context)),
    }
}

fn require_i64(object: &Value, field: &'static str, context: &'static str) -> MapResult<i64> {
    match object.get(field) {
        None | Some(Value::Null) => Err(MapError::MissingField { field, context }),
        Some(Value::Int(n)) => Ok(*n),
        Some(Value::Double(d)) if d.fract() == 0.0 => Ok(*d as i64),
        Some(Value::Double(d)) => Err(MapError::InvalidValue {
            field,
            detail: format!("{d} is not an integer"),
            context,
        }),
        Some(other) => Err(MapError::InvalidType {
            field,
            expected: "number",
            found: other.type_name(),
            context,
        }),
    }
}

fn require_str<'a>(
    object: &'a Value,
    field: &'static str,
    context: &'static str,
) -> MapResult<&'a str> {
    match object.get(field) {
        None | Some(Value::Null) => Err(MapError::MissingField { field, context }),
        Some(Value::String(s)) => Ok(s),
        Some(other) => Err(MapError::InvalidType {
            field,
            expected: "string",
            found: other.type_name(),
            context,
        }),
    }
}

/// Optional numeric field: absent or null defaults to zero, a present value
/// must still be numeric.
fn optional_i64(object: &Value, field: &'static str, context: &'static str) -> MapResult<i64> {
    match object.get(field) {
        None | Some(Value::Null) => Ok(0),
        Some(_) => require_i64(object, field, context),
    }
}

fn optional_f64(object: &Value, field: &'static str, context: &'static str) -> MapResult<f64> {
    match object.get(field) {
        None | Some(Value::Null) => Ok(0.0),
        Some(value) => value.as_f64().ok_or_else(|| MapError::InvalidType {
            field,
            expected: "number",
            found: value.type_name(),
            context,
        }),
    }
}

fn optional_bool(object: &Value, field: &'static str, context: &'static str) -> MapResult<bool> {
    match object.get(field) {
        None | Some(Value::Null) => Ok(false),
        Some(Value::Bool(b)) => Ok(*b),
        Some(other) => Err(MapError::InvalidType {
            field,
            expected: "bool",
            found: other.type_name(),
            context,
        }),
    }
}

fn optional_string(
    object: &Value,
    field: &'static str,
    context: &'static str,
) -> MapResult<Option<String>> {
    match object.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(MapError::InvalidType {
            field,
            expected: "string",
            found: other.type_name(),
            context,
        }),
    }
}

/// Completion heuristic: the wire carries both fractions (0.45) and whole
/// percentages (45) without a marker. Values above 1 are treated as
/// already-percent.
fn normalize_percent(raw: f64) -> f64 {
    if raw > 1.0 { raw / 100.0 } else { raw }
}

// ---------------------------------------------------------------------------
// Torrents
// ---------------------------------------------------------------------------

const TORRENT_CONTEXT: &str = "torrent";

fn torrent_from_value(value: &Value) -> MapResult<Torrent> {
    if value.as_object().is_none() {
        return Err(MapError::InvalidType {
            field: "torrents[]",
            expected: "object",
            found: value.type_name(),
            context: TORRENT_CONTEXT,
        });
    }

    let raw_status = require_i64(value, "status", TORRENT_CONTEXT)?;
    let status =
        TorrentStatus::from_wire(raw_status).ok_or(MapError::UnsupportedStatus(raw_status))?;

    Ok(Torrent {
        id: require_i64(value, "id", TORRENT_CONTEXT)?,
        name: require_str(value, "name", TORRENT_CONTEXT)?.to_owned(),
        status,
        percent_done: normalize_percent(optional_f64(value, "percentDone", TORRENT_CONTEXT)?),
        total_size: optional_i64(value, "totalSize", TORRENT_CONTEXT)?,
        rate_download: optional_i64(value, "rateDownload", TORRENT_CONTEXT)?,
        rate_upload: optional_i64(value, "rateUpload", TORRENT_CONTEXT)?,
        uploaded_ever: optional_i64(value, "uploadedEver", TORRENT_CONTEXT)?,
        downloaded_ever: optional_i64(value, "downloadedEver", TORRENT_CONTEXT)?,
        eta: optional_i64(value, "eta", TORRENT_CONTEXT)?,
        upload_ratio: optional_f64(value, "uploadRatio", TORRENT_CONTEXT)?,
        is_finished: optional_bool(value, "isFinished", TORRENT_CONTEXT)?,
        added_date: optional_i64(value, "addedDate", TORRENT_CONTEXT)?,
        queue_position: optional_i64(value, "queuePosition", TORRENT_CONTEXT)?,
        download_dir: optional_string(value, "downloadDir", TORRENT_CONTEXT)?,
        hash_string: optional_string(value, "hashString", TORRENT_CONTEXT)?,
        error_string: optional_string(value, "errorString", TORRENT_CONTEXT)?
            .filter(|s| !s.is_empty()),
    })
}

/// Maps a `torrent-get` response to the full torrent list.
pub fn map_torrents(response: &Response) -> MapResult<Vec<Torrent>> {
    let arguments = require_arguments(response, "torrent-get")?;
    let torrents = match arguments.get("torrents") {
        None => {
            return Err(MapError::MissingField {
                field: "torrents",
                context: "torrent-get",
            });
        }
        Some(value) => value.as_array().ok_or_else(|| MapError::InvalidType {
            field: "torrents",
            expected: "array",
            found: value.type_name(),
            context: "torrent-get",
        })?,
    };
    torrents.iter().map(torrent_from_value).collect()
}

/// Maps a single-torrent `torrent-get` response; an empty list is an error.
pub fn map_torrent(response: &Response) -> MapResult<Torrent> {
    map_torrents(response)?
        .into_iter()
        .next()
        .ok_or(MapError::EmptyCollection("torrent-get"))
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// Maps a `session-get` response and computes the compatibility verdict.
pub fn map_session_info(response: &Response) -> MapResult<SessionInfo> {
    let arguments = require_arguments(response, "session-get")?;

    let rpc_version = require_i64(arguments, "rpc-version", "session-get")?;
    let rpc_version_minimum = require_i64(arguments, "rpc-version-minimum", "session-get")?;

    Ok(SessionInfo {
        session_id: optional_string(arguments, "session-id", "session-get")?,
        rpc_version,
        rpc_version_minimum,
        server_version: optional_string(arguments, "version", "session-get")?,
        is_compatible: version::is_compatible(rpc_version, rpc_version_minimum),
    })
}

fn stats_detail(object: &Value, field: &'static str) -> MapResult<StatsDetail> {
    let block = match object.get(field) {
        None | Some(Value::Null) => {
            return Err(MapError::MissingField {
                field,
                context: "session-stats",
            });
        }
        Some(value) => value,
    };
    if block.as_object().is_none() {
        return Err(MapError::InvalidType {
            field,
            expected: "object",
            found: block.type_name(),
            context: "session-stats",
        });
    }
    Ok(StatsDetail {
        uploaded_bytes: optional_i64(block, "uploadedBytes", "session-stats")?,
        downloaded_bytes: optional_i64(block, "downloadedBytes", "session-stats")?,
        files_added: optional_i64(block, "filesAdded", "session-stats")?,
        session_count: optional_i64(block, "sessionCount", "session-stats")?,
        seconds_active: optional_i64(block, "secondsActive", "session-stats")?,
    })
}

/// Maps a `session-stats` response.
pub fn map_session_stats(response: &Response) -> MapResult<SessionStats> {
    let arguments = require_arguments(response, "session-stats")?;
    Ok(SessionStats {
        active_torrent_count: optional_i64(arguments, "activeTorrentCount", "session-stats")?,
        paused_torrent_count: optional_i64(arguments, "pausedTorrentCount", "session-stats")?,
        torrent_count: optional_i64(arguments, "torrentCount", "session-stats")?,
        download_speed: optional_i64(arguments, "downloadSpeed", "session-stats")?,
        upload_speed: optional_i64(arguments, "uploadSpeed", "session-stats")?,
        current: stats_detail(arguments, "current-stats")?,
        cumulative: stats_detail(arguments, "cumulative-stats")?,
    })
}

// ---------------------------------------------------------------------------
// torrent-add
// ---------------------------------------------------------------------------

/// Maps a `torrent-add` response, covering both the added and the
/// already-present cases.
pub fn map_added_torrent(response: &Response) -> MapResult<AddedTorrent> {
    let arguments = require_arguments(response, "torrent-add")?;

    let (entry, duplicate) = match (
        arguments.get("torrent-added"),
        arguments.get("torrent-duplicate"),
    ) {
        (Some(entry), _) => (entry, false),
        (None, Some(entry)) => (entry, true),
        (None, None) => {
            return Err(MapError::MissingField {
                field: "torrent-added",
                context: "torrent-add",
            });
        }
    };

    Ok(AddedTorrent {
        id: require_i64(entry, "id", "torrent-add")?,
        name: require_str(entry, "name", "torrent-add")?.to_owned(),
        hash_string: optional_string(entry, "hashString", "torrent-add")?,
        duplicate,
    })
}
