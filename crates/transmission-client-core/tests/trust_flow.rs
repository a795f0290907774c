//! Integration tests: certificate trust lifecycle against a live TLS server.
//!
//! These spin up a real rustls server on localhost with a self-signed
//! certificate and drive the whole trust-on-first-use ceremony through the
//! client:
//!
//! 1. Unknown certificate, user grants: the call goes through and the pin
//!    is persisted with the certificate metadata.
//! 2. Same pin store, fresh client: no prompt, the call just works.
//! 3. Certificate rotation: the mismatch challenge names the old pin, a
//!    denial drops the stale pin and fails the call.
//! 4. No decision handler attached: fail closed.
//!
//! Run with `--nocapture` to see the ceremony narrated:
//! ```sh
//! cargo test -p transmission-client-core --test trust_flow -- --nocapture
//! ```

use std::io::{self, Read, Write};
use std::net::TcpListener;
use std::sync::{Arc, Mutex, RwLock};
use std::thread;

use rustls_pki_types::{PrivateKeyDer, PrivatePkcs8KeyDer};
use url::Url;

use transmission_client_core::prompt::DecisionHandler;
use transmission_client_core::{
    ApiError, ClientOptions, RetryPolicy, TransmissionClient, TrustPromptCenter,
};
use transmission_proto::trust::{
    CertificateInfo, ChallengeReason, Fingerprint, MemoryPinStore, PinRecord, PinStore, ServerId,
    TrustChallenge, TrustDecision,
};

/// Init tracing subscriber (idempotent across tests via try_init).
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_target(true)
        .with_level(true)
        .try_init();
}

// ---------------------------------------------------------------------------
// Self-signed certificates and a hot-swappable TLS server
// ---------------------------------------------------------------------------

struct TestCert {
    der: Vec<u8>,
    key: PrivateKeyDer<'static>,
}

fn make_cert(host: &str) -> TestCert {
    let params =
        rcgen::CertificateParams::new(vec![host.to_owned()]).expect("params should build");
    let keypair = rcgen::KeyPair::generate().expect("keypair generation should succeed");
    let cert = params
        .self_signed(&keypair)
        .expect("cert generation should succeed");
    TestCert {
        der: cert.der().to_vec(),
        key: PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(keypair.serialize_der())),
    }
}

fn server_config(cert: &TestCert) -> Arc<rustls::ServerConfig> {
    let config = rustls::ServerConfig::builder_with_provider(Arc::new(
        rustls::crypto::ring::default_provider(),
    ))
    .with_safe_default_protocol_versions()
    .expect("protocol versions should be valid")
    .with_no_client_auth()
    .with_single_cert(
        vec![rustls_pki_types::CertificateDer::from(cert.der.clone())],
        cert.key.clone_key(),
    )
    .expect("server config should build");
    Arc::new(config)
}

/// Minimal HTTPS double: answers every request with a successful envelope.
/// The served certificate can be swapped between connections to simulate
/// rotation.
struct TlsServer {
    endpoint: String,
    port: u16,
    config: Arc<RwLock<Arc<rustls::ServerConfig>>>,
}

impl TlsServer {
    fn start(cert: &TestCert) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind should succeed");
        let port = listener
            .local_addr()
            .expect("local_addr should succeed")
            .port();
        let config = Arc::new(RwLock::new(server_config(cert)));

        let serving = Arc::clone(&config);
        thread::spawn(move || {
            for incoming in listener.incoming() {
                let Ok(mut socket) = incoming else { continue };
                let current = Arc::clone(&serving.read().unwrap());
                let Ok(mut conn) = rustls::ServerConnection::new(current) else {
                    continue;
                };
                let mut tls = rustls::Stream::new(&mut conn, &mut socket);
                // A client that distrusts the certificate aborts the
                // handshake; that surfaces here as an io error. Ignore it
                // and keep serving.
                let _ = serve_one(&mut tls);
            }
        });

        TlsServer {
            endpoint: format!("https://127.0.0.1:{port}/transmission/rpc"),
            port,
            config,
        }
    }

    fn swap_certificate(&self, cert: &TestCert) {
        *self.config.write().unwrap() = server_config(cert);
    }

    fn server_id(&self) -> ServerId {
        ServerId::new("127.0.0.1", self.port, true)
    }
}

fn serve_one<S: Read + Write>(stream: &mut S) -> io::Result<()> {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        if let Some(header_end) = find_terminator(&buffer) {
            let head = String::from_utf8_lossy(&buffer[..header_end]).to_ascii_lowercase();
            let content_length = head
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .and_then(|value| value.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buffer.len() >= header_end + 4 + content_length {
                break;
            }
        }
        let n = stream.read(&mut chunk)?;
        if n == 0 {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "client hung up"));
        }
        buffer.extend_from_slice(&chunk[..n]);
    }

    let body = r#"{"result":"success","arguments":{}}"#;
    write!(
        stream,
        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    )?;
    stream.flush()
}

fn find_terminator(buffer: &[u8]) -> Option<usize> {
    buffer.windows(4).position(|window| window == b"\r\n\r\n")
}

// ---------------------------------------------------------------------------
// Client plumbing
// ---------------------------------------------------------------------------

/// Handler that records every challenge and answers with a fixed decision.
fn recording_handler(
    decision: TrustDecision,
    seen: Arc<Mutex<Vec<TrustChallenge>>>,
) -> DecisionHandler {
    Arc::new(move |challenge: TrustChallenge| {
        let seen = Arc::clone(&seen);
        Box::pin(async move {
            seen.lock().unwrap().push(challenge);
            decision
        })
    })
}

fn secure_client(
    server: &TlsServer,
    pins: Arc<MemoryPinStore>,
    handler: Option<DecisionHandler>,
) -> TransmissionClient {
    let options = ClientOptions::new(Url::parse(&server.endpoint).expect("url should parse"))
        .with_retry(RetryPolicy::disabled());
    let mut builder = TransmissionClient::builder(options).pin_store(pins);
    if let Some(handler) = handler {
        builder = builder.decision_handler(handler);
    }
    builder.build().expect("client should build")
}

// ---------------------------------------------------------------------------
// Test: first contact, user grants, pin persisted
// ---------------------------------------------------------------------------

#[tokio::test]
async fn granted_challenge_pins_the_certificate() {
    init_tracing();
    let cert = make_cert("localhost");
    let server = TlsServer::start(&cert);
    eprintln!("-- server with self-signed cert on {}", server.endpoint);

    let pins = Arc::new(MemoryPinStore::new());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let client = secure_client(
        &server,
        Arc::clone(&pins),
        Some(recording_handler(
            TrustDecision::TrustPermanently,
            Arc::clone(&seen),
        )),
    );

    let response = client
        .call("session-stats", None)
        .await
        .expect("granted trust should let the call through");
    assert!(response.is_success());
    eprintln!("   [ok] call succeeded after the grant");

    let challenges = seen.lock().unwrap();
    assert_eq!(challenges.len(), 1, "exactly one prompt for first contact");
    assert_eq!(challenges[0].reason, ChallengeReason::UntrustedCertificate);
    assert_eq!(challenges[0].server, server.server_id());

    let pinned = pins
        .load(&server.server_id())
        .expect("load should succeed")
        .expect("the grant must persist a pin");
    assert_eq!(pinned.fingerprint, Fingerprint::from_der(&cert.der));
    eprintln!("   [ok] pin persisted: {}", pinned.fingerprint);
}

// ---------------------------------------------------------------------------
// Test: a pinned server never prompts again
// ---------------------------------------------------------------------------

#[tokio::test]
async fn pinned_certificate_skips_the_prompt() {
    init_tracing();
    let cert = make_cert("localhost");
    let server = TlsServer::start(&cert);

    let pins = Arc::new(MemoryPinStore::new());
    pins.save(
        &server.server_id(),
        PinRecord {
            fingerprint: Fingerprint::from_der(&cert.der),
            certificate: CertificateInfo::from_der(&cert.der),
        },
    )
    .expect("save should succeed");

    // A Deny handler that must never run: the pin decides.
    let seen = Arc::new(Mutex::new(Vec::new()));
    let client = secure_client(
        &server,
        pins,
        Some(recording_handler(TrustDecision::Deny, Arc::clone(&seen))),
    );

    client
        .call("session-stats", None)
        .await
        .expect("pinned certificate should pass without a prompt");
    assert!(
        seen.lock().unwrap().is_empty(),
        "a pinned certificate must not prompt"
    );
}

// ---------------------------------------------------------------------------
// Test: full ceremony, then a fresh client on the same pin store
// ---------------------------------------------------------------------------

#[tokio::test]
async fn fresh_client_reuses_the_shared_pin_store() {
    init_tracing();
    let cert = make_cert("localhost");
    let server = TlsServer::start(&cert);
    let pins = Arc::new(MemoryPinStore::new());

    // First client: prompted once, grants.
    let first_prompts = Arc::new(Mutex::new(Vec::new()));
    let first = secure_client(
        &server,
        Arc::clone(&pins),
        Some(recording_handler(
            TrustDecision::TrustPermanently,
            Arc::clone(&first_prompts),
        )),
    );
    first
        .call("session-stats", None)
        .await
        .expect("first contact should succeed after the grant");
    assert_eq!(first_prompts.lock().unwrap().len(), 1);
    eprintln!("   [ok] first client prompted once and pinned");

    // Second client, same store: the earlier decision carries over.
    let second_prompts = Arc::new(Mutex::new(Vec::new()));
    let second = secure_client(
        &server,
        Arc::clone(&pins),
        Some(recording_handler(
            TrustDecision::Deny,
            Arc::clone(&second_prompts),
        )),
    );
    second
        .call("session-stats", None)
        .await
        .expect("second client should ride on the existing pin");
    assert!(
        second_prompts.lock().unwrap().is_empty(),
        "the shared pin must suppress the second prompt"
    );
    eprintln!("   [ok] second client connected silently");
}

// ---------------------------------------------------------------------------
// Test: rotation is challenged with the previous pin, denial clears it
// ---------------------------------------------------------------------------

#[tokio::test]
async fn denied_rotation_drops_the_stale_pin() {
    init_tracing();
    let old_cert = make_cert("localhost");
    let server = TlsServer::start(&old_cert);

    let pins = Arc::new(MemoryPinStore::new());
    pins.save(
        &server.server_id(),
        PinRecord {
            fingerprint: Fingerprint::from_der(&old_cert.der),
            certificate: CertificateInfo::from_der(&old_cert.der),
        },
    )
    .expect("save should succeed");

    let new_cert = make_cert("localhost");
    server.swap_certificate(&new_cert);
    eprintln!("-- server certificate rotated");

    let seen = Arc::new(Mutex::new(Vec::new()));
    let client = secure_client(
        &server,
        Arc::clone(&pins),
        Some(recording_handler(TrustDecision::Deny, Arc::clone(&seen))),
    );

    let err = client
        .call("session-stats", None)
        .await
        .expect_err("a denied rotation must fail the call");
    match err {
        ApiError::TlsTrustDeclined(challenge) => {
            assert_eq!(challenge.server, server.server_id());
            assert_eq!(
                challenge.reason,
                ChallengeReason::FingerprintMismatch {
                    previous: Fingerprint::from_der(&old_cert.der)
                },
                "the challenge must name the pin it contradicts"
            );
        }
        other => panic!("expected TlsTrustDeclined, got {other:?}"),
    }
    assert_eq!(seen.lock().unwrap().len(), 1);

    // Fail closed: the contradicted pin is gone, the next contact is a
    // fresh first-use decision.
    assert!(
        pins.load(&server.server_id())
            .expect("load should succeed")
            .is_none(),
        "a denied rotation must drop the stale pin"
    );
    eprintln!("   [ok] stale pin dropped after denial");
}

// ---------------------------------------------------------------------------
// Test: without a handler the default is denial
// ---------------------------------------------------------------------------

#[tokio::test]
async fn missing_handler_fails_closed() {
    init_tracing();
    let cert = make_cert("localhost");
    let server = TlsServer::start(&cert);
    let pins = Arc::new(MemoryPinStore::new());

    let client = secure_client(&server, Arc::clone(&pins), None);
    let err = client
        .call("session-stats", None)
        .await
        .expect_err("no handler means no trust");
    assert!(matches!(err, ApiError::TlsTrustDeclined(_)));
    assert!(
        pins.load(&server.server_id())
            .expect("load should succeed")
            .is_none(),
        "nothing may be pinned without an explicit grant"
    );
}

// ---------------------------------------------------------------------------
// Test: the prompt center carries the challenge to a consumer task
// ---------------------------------------------------------------------------

#[tokio::test]
async fn prompt_center_routes_the_decision() {
    init_tracing();
    let cert = make_cert("localhost");
    let server = TlsServer::start(&cert);
    let pins = Arc::new(MemoryPinStore::new());

    let center = TrustPromptCenter::new();
    let mut prompts = center
        .subscribe()
        .expect("first subscribe should yield the prompt stream");

    // The "UI": receives the challenge, inspects it, grants.
    let consumer = tokio::spawn(async move {
        let prompt = prompts.recv().await.expect("a prompt should arrive");
        let reason = prompt.challenge().reason.clone();
        eprintln!("-- consumer got challenge for {}", prompt.challenge().server);
        prompt.resolve(TrustDecision::TrustPermanently);
        reason
    });

    let client = secure_client(&server, Arc::clone(&pins), Some(center.handler()));
    client
        .call("session-stats", None)
        .await
        .expect("the consumer's grant should let the call through");

    let reason = consumer.await.expect("consumer should finish");
    assert_eq!(reason, ChallengeReason::UntrustedCertificate);
    assert!(
        pins.load(&server.server_id())
            .expect("load should succeed")
            .is_some(),
        "the grant must be pinned"
    );
}
