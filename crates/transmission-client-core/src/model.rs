//! Typed domain records mapped from wire responses.

use std::fmt;

/// Activity state of a torrent, as reported by `torrent-get`.
///
/// Wire values are a closed set of small integers; anything outside it is a
/// mapping error, not a variant here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TorrentStatus {
    Stopped,
    QueuedToVerify,
    Verifying,
    QueuedToDownload,
    Downloading,
    QueuedToSeed,
    Seeding,
}

impl TorrentStatus {
    /// Decodes the wire integer. Returns `None` for values outside 0..=6.
    pub fn from_wire(raw: i64) -> Option<Self> {
        match raw {
            0 => Some(TorrentStatus::Stopped),
            1 => Some(TorrentStatus::QueuedToVerify),
            2 => Some(TorrentStatus::Verifying),
            3 => Some(TorrentStatus::QueuedToDownload),
            4 => Some(TorrentStatus::Downloading),
            5 => Some(TorrentStatus::QueuedToSeed),
            6 => Some(TorrentStatus::Seeding),
            _ => None,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, TorrentStatus::Downloading | TorrentStatus::Seeding)
    }
}

impl fmt::Display for TorrentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TorrentStatus::Stopped => "stopped",
            TorrentStatus::QueuedToVerify => "queued to verify",
            TorrentStatus::Verifying => "verifying",
            TorrentStatus::QueuedToDownload => "queued to download",
            TorrentStatus::Downloading => "downloading",
            TorrentStatus::QueuedToSeed => "queued to seed",
            TorrentStatus::Seeding => "seeding",
        };
        f.write_str(label)
    }
}

/// One torrent as the daemon reports it.
///
/// `id`, `name` and `status` are mandatory on the wire; the numeric and
/// boolean fields default to 0/false when a daemon omits them.
#[derive(Debug, Clone, PartialEq)]
pub struct Torrent {
    pub id: i64,
    pub name: String,
    pub status: TorrentStatus,
    /// Completion as a fraction in 0.0..=1.0.
    pub percent_done: f64,
    pub total_size: i64,
    pub rate_download: i64,
    pub rate_upload: i64,
    pub uploaded_ever: i64,
    pub downloaded_ever: i64,
    /// Seconds remaining; negative values are daemon sentinels (unknown).
    pub eta: i64,
    pub upload_ratio: f64,
    pub is_finished: bool,
    pub added_date: i64,
    pub queue_position: i64,
    pub download_dir: Option<String>,
    pub hash_string: Option<String>,
    /// Present and non-empty when the daemon flags a per-torrent error.
    pub error_string: Option<String>,
}

/// Outcome of the initial `session-get` exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionInfo {
    /// Token reported in the body (daemons at RPC 16+); lets the client skip
    /// one 409 round trip.
    pub session_id: Option<String>,
    pub rpc_version: i64,
    pub rpc_version_minimum: i64,
    /// Human-readable daemon version, e.g. "4.0.5".
    pub server_version: Option<String>,
    pub is_compatible: bool,
}

/// Aggregate transfer counters from `session-stats`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStats {
    pub active_torrent_count: i64,
    pub paused_torrent_count: i64,
    pub torrent_count: i64,
    pub download_speed: i64,
    pub upload_speed: i64,
    pub current: StatsDetail,
    pub cumulative: StatsDetail,
}

/// Counter block shared by the current-session and all-time stats.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatsDetail {
    pub uploaded_bytes: i64,
    pub downloaded_bytes: i64,
    pub files_added: i64,
    pub session_count: i64,
    pub seconds_active: i64,
}

/// Result of a `torrent-add` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddedTorrent {
    pub id: i64,
    pub name: String,
    pub hash_string: Option<String>,
    /// True when the daemon already had this torrent.
    pub duplicate: bool,
}
