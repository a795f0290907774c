//! RPC transport.
//!
//! `TransmissionClient` owns one endpoint and orchestrates every call:
//! trust resolution → session-token handshake → network retry → status
//! mapping → envelope decode → result classification. The individual steps
//! live in their own modules; this one sequences them.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use bytes::Bytes;
use data_encoding::BASE64;
use reqwest::StatusCode;
use reqwest::header::{CONTENT_TYPE, HeaderMap};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use transmission_proto::envelope::{self, Request, Response, SESSION_ID_HEADER, Tag};
use transmission_proto::tls::config::build_client_tls_config;
use transmission_proto::tls::verifier::{ObservationSlot, PinnedCertVerifier};
use transmission_proto::trust::{MemoryPinStore, PinStore, ServerId};
use transmission_proto::value::Value;
use transmission_proto::version;

use crate::config::ClientOptions;
use crate::error::{ApiError, Result, classify_result, classify_status, is_retryable};
use crate::logging::{RpcLogger, TracingLogger, sanitize_headers, truncate_body};
use crate::mapper::{self, MapError};
use crate::model::{AddedTorrent, SessionInfo, SessionStats, Torrent};
use crate::prompt::DecisionHandler;
use crate::trust::TrustEvaluator;

/// Token-bearing retries allowed per call after a 409. The initial attempt
/// is not counted, so an always-conflicting server sees three requests.
const MAX_HANDSHAKE_RETRIES: u32 = 2;

/// Fields the typed torrent calls request from the daemon.
const TORRENT_FIELDS: &[&str] = &[
    "id",
    "name",
    "status",
    "percentDone",
    "totalSize",
    "rateDownload",
    "rateUpload",
    "uploadedEver",
    "downloadedEver",
    "eta",
    "uploadRatio",
    "isFinished",
    "addedDate",
    "queuePosition",
    "downloadDir",
    "hashString",
    "errorString",
];

/// Client for one Transmission RPC endpoint.
///
/// Cheap to share behind an `Arc`; independent calls run concurrently, each
/// with its own retry budget.
pub struct TransmissionClient {
    options: ClientOptions,
    http: reqwest::Client,
    /// Session token cache, rotated by the 409 handshake. One writer at a
    /// time; concurrent calls read the latest token.
    session_token: RwLock<Option<String>>,
    evaluator: TrustEvaluator,
    logger: Arc<dyn RpcLogger>,
    tag_counter: AtomicI64,
}

/// Configures the collaborators of a [`TransmissionClient`].
pub struct ClientBuilder {
    options: ClientOptions,
    pins: Option<Arc<dyn PinStore>>,
    handler: Option<DecisionHandler>,
    logger: Option<Arc<dyn RpcLogger>>,
}

impl ClientBuilder {
    /// Durable pin storage. Defaults to an in-memory store, which forgets
    /// every pin on drop; real applications pass their own.
    pub fn pin_store(mut self, pins: Arc<dyn PinStore>) -> Self {
        self.pins = Some(pins);
        self
    }

    /// Callback deciding trust challenges. Without one every untrusted
    /// certificate is denied.
    pub fn decision_handler(mut self, handler: DecisionHandler) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Log sink for sanitized request/response traffic.
    pub fn logger(mut self, logger: Arc<dyn RpcLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn build(self) -> Result<TransmissionClient> {
        let server = ServerId::from_url(&self.options.url)
            .ok_or_else(|| ApiError::Unknown("endpoint URL has no host".to_owned()))?;
        let pins = self.pins.unwrap_or_else(|| Arc::new(MemoryPinStore::new()));
        let observations = Arc::new(ObservationSlot::new());

        let mut http = reqwest::Client::builder().timeout(self.options.timeout);
        if server.is_secure() {
            let verifier =
                PinnedCertVerifier::new(server, Arc::clone(&pins), Arc::clone(&observations))
                    .map_err(|e| ApiError::TlsEvaluationFailed(e.to_string()))?;
            let tls = build_client_tls_config(Arc::new(verifier))
                .map_err(|e| ApiError::TlsEvaluationFailed(e.to_string()))?;
            http = http.use_preconfigured_tls(tls);
        }
        let http = http
            .build()
            .map_err(|e| ApiError::Unknown(format!("HTTP client construction: {e}")))?;

        Ok(TransmissionClient {
            evaluator: TrustEvaluator::new(pins, observations, self.handler),
            options: self.options,
            http,
            session_token: RwLock::new(None),
            logger: self.logger.unwrap_or_else(|| Arc::new(TracingLogger)),
            tag_counter: AtomicI64::new(1),
        })
    }
}

impl TransmissionClient {
    pub fn builder(options: ClientOptions) -> ClientBuilder {
        ClientBuilder {
            options,
            pins: None,
            handler: None,
            logger: None,
        }
    }

    /// Client with default collaborators: in-memory pins, deny-all trust,
    /// tracing log sink.
    pub fn new(options: ClientOptions) -> Result<Self> {
        Self::builder(options).build()
    }

    /// Issues one RPC call and returns the decoded successful envelope.
    ///
    /// Per call, in order:
    /// 1. Serialize the request with a fresh correlation tag.
    /// 2. Send; on a transport failure settle any pending trust challenge
    ///    (budget-free re-attempt), else retry allow-listed failures with
    ///    exponential backoff up to the configured budget.
    /// 3. On 409, adopt the rotated session token and re-send, at most
    ///    [`MAX_HANDSHAKE_RETRIES`] times.
    /// 4. Map non-2xx statuses, decode the body, classify a non-"success"
    ///    result string.
    pub async fn call(&self, method: &str, arguments: Option<Value>) -> Result<Response> {
        let sent_tag = Tag::Int(self.tag_counter.fetch_add(1, Ordering::Relaxed));
        let mut request = Request::new(method).with_tag(sent_tag.clone());
        request.arguments = arguments;
        let body = Bytes::from(
            serde_json::to_vec(&request)
                .map_err(|e| ApiError::DecodingFailed(format!("request encode: {e}")))?,
        );

        let mut network_attempt: u32 = 0;
        let mut handshake_retries: u32 = 0;
        loop {
            let (status, headers, bytes) = match self.send_once(method, &body).await {
                Ok(reply) => reply,
                Err(send_error) => {
                    // A rejected TLS handshake surfaces as a transport error
                    // with a pending observation; settle it outside the
                    // retry budget and re-attempt on success.
                    if self.evaluator.resolve_pending().await.map_err(|e| {
                        self.logger.log_error(method, &e);
                        e
                    })? {
                        continue;
                    }
                    if !is_retryable(&send_error) {
                        let error = ApiError::Unknown(send_error.to_string());
                        self.logger.log_error(method, &error);
                        return Err(error);
                    }
                    if network_attempt >= self.options.retry.max_retries {
                        let error = ApiError::NetworkUnavailable(send_error.to_string());
                        self.logger.log_error(method, &error);
                        return Err(error);
                    }
                    let delay = self.options.retry.delay_for(network_attempt);
                    debug!(method, attempt = network_attempt, ?delay, "transport failure, backing off");
                    tokio::time::sleep(delay).await;
                    network_attempt += 1;
                    continue;
                }
            };

            self.logger.log_response(
                method,
                status.as_u16(),
                &truncate_body(&String::from_utf8_lossy(&bytes)),
            );

            if status.as_u16() == 409 {
                // Token rotation, not a network failure: adopt the token the
                // server sent and replay the identical request.
                if handshake_retries >= MAX_HANDSHAKE_RETRIES {
                    let error = ApiError::SessionConflict;
                    self.logger.log_error(method, &error);
                    return Err(error);
                }
                let Some(token) = header_value(&headers, SESSION_ID_HEADER) else {
                    let error = ApiError::SessionConflict;
                    self.logger.log_error(method, &error);
                    return Err(error);
                };
                debug!(method, attempt = handshake_retries, "adopting rotated session token");
                *self.session_token.write().await = Some(token);
                handshake_retries += 1;
                continue;
            }

            if let Some(error) = classify_status(status.as_u16()) {
                self.logger.log_error(method, &error);
                return Err(error);
            }

            let response = match envelope::decode_response(&bytes) {
                Ok(response) => response,
                Err(decode_error) => {
                    let error = ApiError::DecodingFailed(decode_error.to_string());
                    self.logger.log_error(method, &error);
                    return Err(error);
                }
            };

            if !response.is_success() {
                let error = classify_result(&response.result);
                self.logger.log_error(method, &error);
                return Err(error);
            }

            // Correlation check: a stale or absent echo is suspicious but
            // not worth failing a successful reply over.
            if let Some(received) = &response.tag {
                if *received != sent_tag {
                    warn!(method, sent = ?sent_tag, received = ?received, "correlation tag mismatch");
                }
            }

            return Ok(response);
        }
    }

    /// One HTTP exchange: build, log sanitized, execute, read the body.
    async fn send_once(
        &self,
        method: &str,
        body: &Bytes,
    ) -> std::result::Result<(StatusCode, HeaderMap, Bytes), reqwest::Error> {
        let mut builder = self
            .http
            .post(self.options.url.clone())
            .header(CONTENT_TYPE, "application/json")
            .body(body.clone());
        if let Some(credentials) = &self.options.credentials {
            builder = builder.basic_auth(&credentials.username, Some(&credentials.password));
        }
        if let Some(token) = self.session_token.read().await.clone() {
            builder = builder.header(SESSION_ID_HEADER, token);
        }

        let request = builder.build()?;
        let logged_headers = sanitize_headers(
            request
                .headers()
                .iter()
                .map(|(name, value)| (name.as_str(), value.to_str().unwrap_or("<binary>"))),
        );
        self.logger.log_request(
            method,
            &logged_headers,
            &truncate_body(&String::from_utf8_lossy(body)),
        );

        let response = self.http.execute(request).await?;
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response.bytes().await?;
        Ok((status, headers, bytes))
    }

    // -----------------------------------------------------------------------
    // Typed surface
    // -----------------------------------------------------------------------

    /// Initial `session-get` exchange: caches a token the daemon reports and
    /// gates on protocol compatibility.
    ///
    /// An incompatible daemon fails with `VersionUnsupported` even though
    /// the transport call itself succeeded.
    pub async fn handshake(&self) -> Result<SessionInfo> {
        let response = self.call("session-get", None).await?;
        let info = mapper::map_session_info(&response).map_err(map_error_to_api)?;

        if let Some(token) = &info.session_id {
            *self.session_token.write().await = Some(token.clone());
        }
        if !info.is_compatible {
            return Err(ApiError::VersionUnsupported(format!(
                "server RPC version {} (minimum {}), supported {}..={}",
                info.rpc_version,
                info.rpc_version_minimum,
                version::MIN_SUPPORTED_RPC_VERSION,
                version::TARGET_RPC_VERSION,
            )));
        }

        info!(
            rpc_version = info.rpc_version,
            server_version = info.server_version.as_deref().unwrap_or("unknown"),
            "handshake complete"
        );
        Ok(info)
    }

    /// All torrents with the standard field set.
    pub async fn torrents(&self) -> Result<Vec<Torrent>> {
        let response = self.call("torrent-get", Some(torrent_get_args(None))).await?;
        mapper::map_torrents(&response).map_err(map_error_to_api)
    }

    /// A single torrent by id. The daemon answers unknown ids with an empty
    /// list, which surfaces as a decoding failure here.
    pub async fn torrent(&self, id: i64) -> Result<Torrent> {
        let response = self
            .call("torrent-get", Some(torrent_get_args(Some(id))))
            .await?;
        mapper::map_torrent(&response).map_err(map_error_to_api)
    }

    pub async fn torrent_start(&self, ids: &[i64]) -> Result<()> {
        self.call("torrent-start", Some(ids_args(ids))).await.map(|_| ())
    }

    pub async fn torrent_stop(&self, ids: &[i64]) -> Result<()> {
        self.call("torrent-stop", Some(ids_args(ids))).await.map(|_| ())
    }

    pub async fn torrent_verify(&self, ids: &[i64]) -> Result<()> {
        self.call("torrent-verify", Some(ids_args(ids))).await.map(|_| ())
    }

    pub async fn torrent_remove(&self, ids: &[i64], delete_local_data: bool) -> Result<()> {
        let arguments = [
            ("ids", ids.iter().copied().map(Value::from).collect()),
            ("delete-local-data", Value::from(delete_local_data)),
        ]
        .into_iter()
        .collect();
        self.call("torrent-remove", Some(arguments)).await.map(|_| ())
    }

    /// Adds a torrent by path, URL or magnet link.
    pub async fn torrent_add_file(
        &self,
        location: &str,
        download_dir: Option<&str>,
        paused: bool,
    ) -> Result<AddedTorrent> {
        let mut arguments = vec![
            ("filename", Value::from(location)),
            ("paused", Value::from(paused)),
        ];
        if let Some(dir) = download_dir {
            arguments.push(("download-dir", Value::from(dir)));
        }
        let response = self
            .call("torrent-add", Some(arguments.into_iter().collect()))
            .await?;
        mapper::map_added_torrent(&response).map_err(map_error_to_api)
    }

    /// Adds a torrent from raw `.torrent` bytes (sent base64-encoded).
    pub async fn torrent_add_metainfo(
        &self,
        metainfo: &[u8],
        download_dir: Option<&str>,
        paused: bool,
    ) -> Result<AddedTorrent> {
        let mut arguments = vec![
            ("metainfo", Value::from(BASE64.encode(metainfo))),
            ("paused", Value::from(paused)),
        ];
        if let Some(dir) = download_dir {
            arguments.push(("download-dir", Value::from(dir)));
        }
        let response = self
            .call("torrent-add", Some(arguments.into_iter().collect()))
            .await?;
        mapper::map_added_torrent(&response).map_err(map_error_to_api)
    }

    /// Aggregate transfer statistics.
    pub async fn session_stats(&self) -> Result<SessionStats> {
        let response = self.call("session-stats", None).await?;
        mapper::map_session_stats(&response).map_err(map_error_to_api)
    }
}

/// Mapping failures on the typed surface collapse into `DecodingFailed`;
/// callers needing the distinct taxonomy use [`crate::mapper`] directly.
fn map_error_to_api(error: MapError) -> ApiError {
    ApiError::DecodingFailed(error.to_string())
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(ToOwned::to_owned)
}

fn torrent_get_args(id: Option<i64>) -> Value {
    let fields: Value = TORRENT_FIELDS.iter().copied().map(Value::from).collect();
    match id {
        None => [("fields", fields)].into_iter().collect(),
        Some(id) => [
            ("fields", fields),
            ("ids", [Value::Int(id)].into_iter().collect()),
        ]
        .into_iter()
        .collect(),
    }
}

fn ids_args(ids: &[i64]) -> Value {
    [("ids", ids.iter().copied().map(Value::from).collect::<Value>())]
        .into_iter()
        .collect()
}
