//! HTTP(S) probing of published container ports.
//!
//! A probe keeps issuing its request until the response satisfies the
//! predicate or the polling budget runs out. Refused connections, resets and
//! TLS handshake failures are all "not ready yet": the server inside the
//! container may simply not have bound its port.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use buildproof_common::error::{BuildproofError, Result};
use buildproof_common::retry::{Attempt, RetryPolicy, poll_until};
use reqwest::Method;
use reqwest::blocking::Client;

use crate::container::ContainerHandle;

/// Upper bound on a single request, so one hung attempt cannot eat the budget.
const ATTEMPT_TIMEOUT: Duration = Duration::from_secs(5);

/// Condition a response must satisfy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    /// Any HTTP response at all.
    Available,
    /// The body contains the given text.
    BodyContains(String),
    /// The response has the given status code.
    Status(u16),
}

impl Predicate {
    /// Tests a response.
    #[must_use]
    pub fn accepts(&self, response: &ProbeResponse) -> bool {
        match self {
            Self::Available => true,
            Self::BodyContains(text) => response.body.contains(text.as_str()),
            Self::Status(code) => response.status == *code,
        }
    }
}

/// URL scheme of a probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    /// Cleartext HTTP.
    Http,
    /// HTTP over TLS.
    Https,
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Http => write!(f, "http"),
            Self::Https => write!(f, "https"),
        }
    }
}

/// PEM-encoded client certificate and private key.
#[derive(Clone)]
pub struct TlsIdentity {
    cert_pem: Vec<u8>,
    key_pem: Vec<u8>,
}

impl TlsIdentity {
    /// Wraps PEM bytes.
    #[must_use]
    pub const fn from_pem(cert_pem: Vec<u8>, key_pem: Vec<u8>) -> Self {
        Self { cert_pem, key_pem }
    }

    /// Reads the certificate and key from PEM files.
    ///
    /// # Errors
    ///
    /// Returns an error if either file cannot be read.
    pub fn from_files(cert: &Path, key: &Path) -> Result<Self> {
        Ok(Self::from_pem(read_pem(cert)?, read_pem(key)?))
    }
}

impl fmt::Debug for TlsIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsIdentity").finish_non_exhaustive()
    }
}

/// Reads a PEM file into memory.
///
/// # Errors
///
/// Returns an error if the file cannot be read.
pub fn read_pem(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(|e| BuildproofError::Io {
        path: path.to_path_buf(),
        source: e,
    })
}

/// A request to issue against a published port.
#[derive(Debug, Clone)]
pub struct ProbeRequest {
    /// HTTP method.
    pub method: Method,
    /// URL scheme.
    pub scheme: Scheme,
    /// Host override; the probe's default host is used when absent.
    pub host: Option<String>,
    /// Host-side port.
    pub port: u16,
    /// Request path, starting with `/`.
    pub path: String,
    /// Client certificate presented during the TLS handshake.
    pub identity: Option<TlsIdentity>,
    /// PEM trust roots replacing the built-in ones.
    pub trust_roots: Vec<Vec<u8>>,
    /// Condition the response must satisfy.
    pub predicate: Predicate,
}

impl ProbeRequest {
    /// A cleartext `GET /` expecting any response.
    #[must_use]
    pub fn http(port: u16) -> Self {
        Self {
            method: Method::GET,
            scheme: Scheme::Http,
            host: None,
            port,
            path: "/".into(),
            identity: None,
            trust_roots: Vec::new(),
            predicate: Predicate::Available,
        }
    }

    /// A TLS `GET /` expecting any response.
    #[must_use]
    pub fn https(port: u16) -> Self {
        Self {
            scheme: Scheme::Https,
            ..Self::http(port)
        }
    }

    /// Sets the HTTP method.
    #[must_use]
    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Overrides the host.
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Sets the request path.
    #[must_use]
    pub fn path(mut self, path: impl Into<String>) -> Self {
        let path = path.into();
        self.path = if path.starts_with('/') { path } else { format!("/{path}") };
        self
    }

    /// Presents a client certificate.
    #[must_use]
    pub fn identity(mut self, identity: TlsIdentity) -> Self {
        self.identity = Some(identity);
        self
    }

    /// Trusts an additional PEM root; built-in roots are then disabled.
    #[must_use]
    pub fn trust_root(mut self, pem: Vec<u8>) -> Self {
        self.trust_roots.push(pem);
        self
    }

    /// Requires the body to contain `text`.
    #[must_use]
    pub fn body_contains(mut self, text: impl Into<String>) -> Self {
        self.predicate = Predicate::BodyContains(text.into());
        self
    }

    /// Requires a specific status code.
    #[must_use]
    pub fn status(mut self, code: u16) -> Self {
        self.predicate = Predicate::Status(code);
        self
    }

    /// Renders the URL against `default_host` when no host is set.
    #[must_use]
    pub fn url(&self, default_host: &str) -> String {
        let host = self.host.as_deref().unwrap_or(default_host);
        format!("{}://{host}:{}{}", self.scheme, self.port, self.path)
    }
}

/// Response captured by a probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body.
    pub body: String,
}

/// Why a single attempt produced no response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeFailure {
    /// The TCP connection could not be established.
    Connect(String),
    /// The TLS handshake failed or the peer rejected our certificate.
    Tls(String),
    /// The attempt exceeded its own timeout.
    Timeout(String),
    /// Anything else (reset mid-response, malformed HTTP).
    Other(String),
}

impl fmt::Display for ProbeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connect(detail) => write!(f, "connection failed: {detail}"),
            Self::Tls(detail) => write!(f, "TLS failure: {detail}"),
            Self::Timeout(detail) => write!(f, "request timed out: {detail}"),
            Self::Other(detail) => write!(f, "request failed: {detail}"),
        }
    }
}

/// Result of one probe attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeAttempt {
    /// The server answered.
    Response(ProbeResponse),
    /// No response was obtained.
    Failed(ProbeFailure),
}

/// Issues probes against published ports.
#[derive(Debug, Clone)]
pub struct NetworkProbe {
    host: String,
    policy: RetryPolicy,
}

impl NetworkProbe {
    /// Creates a probe that reaches ports on `host` with a default policy.
    #[must_use]
    pub fn new(host: impl Into<String>, policy: RetryPolicy) -> Self {
        Self {
            host: host.into(),
            policy,
        }
    }

    /// Returns the default polling policy.
    #[must_use]
    pub const fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Polls with the default policy.
    ///
    /// # Errors
    ///
    /// See [`NetworkProbe::poll_with`].
    pub fn poll(&self, request: &ProbeRequest) -> Result<ProbeResponse> {
        self.poll_with(request, &self.policy)
    }

    /// Polls until the predicate holds or `policy` expires.
    ///
    /// # Errors
    ///
    /// Returns `Config` if the TLS material is unusable, or `ProbeTimeout`
    /// carrying the last failure or body observed.
    pub fn poll_with(&self, request: &ProbeRequest, policy: &RetryPolicy) -> Result<ProbeResponse> {
        let url = request.url(&self.host);
        let client = build_client(request, policy.timeout.clamp(Duration::from_millis(100), ATTEMPT_TIMEOUT))?;
        tracing::debug!(url = %url, predicate = ?request.predicate, "probing");

        poll_until(
            policy,
            || {
                Ok(match attempt(&client, request, &url) {
                    ProbeAttempt::Response(response) if request.predicate.accepts(&response) => {
                        tracing::info!(url = %url, status = response.status, "probe satisfied");
                        Attempt::Ready(response)
                    }
                    ProbeAttempt::Response(response) => Attempt::Pending(format!(
                        "status {} with body {:?}",
                        response.status,
                        truncate(&response.body, 512)
                    )),
                    ProbeAttempt::Failed(failure) => Attempt::Pending(failure.to_string()),
                })
            },
            |expired| BuildproofError::ProbeTimeout {
                url: url.clone(),
                timeout: expired.timeout,
                last: expired.last,
            },
        )
    }

    /// Issues the request exactly once and reports what happened.
    ///
    /// # Errors
    ///
    /// Returns `Config` if the TLS material is unusable.
    pub fn probe_once(&self, request: &ProbeRequest) -> Result<ProbeAttempt> {
        let url = request.url(&self.host);
        let client = build_client(request, ATTEMPT_TIMEOUT)?;
        Ok(attempt(&client, request, &url))
    }

    /// Polls a container's published port over HTTP until the body
    /// contains `text`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the port was not published, or `ProbeTimeout`.
    pub fn serve(&self, handle: &ContainerHandle, container_port: u16, text: &str) -> Result<ProbeResponse> {
        let request = ProbeRequest::http(handle.host_port(container_port)?).body_contains(text);
        self.poll(&request)
    }
}

fn build_client(request: &ProbeRequest, attempt_timeout: Duration) -> Result<Client> {
    let tls_error = |e: reqwest::Error| BuildproofError::Config {
        message: format!("unusable TLS material: {e}"),
    };
    let mut builder = Client::builder()
        .use_rustls_tls()
        .no_proxy()
        .timeout(attempt_timeout)
        .connect_timeout(attempt_timeout);

    if !request.trust_roots.is_empty() {
        builder = builder.tls_built_in_root_certs(false);
        for pem in &request.trust_roots {
            builder = builder.add_root_certificate(reqwest::Certificate::from_pem(pem).map_err(tls_error)?);
        }
    }
    if let Some(identity) = &request.identity {
        let mut combined = identity.cert_pem.clone();
        combined.push(b'\n');
        combined.extend_from_slice(&identity.key_pem);
        builder = builder.identity(reqwest::Identity::from_pem(&combined).map_err(tls_error)?);
    }
    builder.build().map_err(tls_error)
}

fn attempt(client: &Client, request: &ProbeRequest, url: &str) -> ProbeAttempt {
    let response = match client.request(request.method.clone(), url).send() {
        Ok(response) => response,
        Err(e) => return ProbeAttempt::Failed(classify(&e)),
    };
    let status = response.status().as_u16();
    match response.text() {
        Ok(body) => ProbeAttempt::Response(ProbeResponse { status, body }),
        Err(e) => ProbeAttempt::Failed(classify(&e)),
    }
}

/// Maps a client error onto a failure kind using its full source chain.
fn classify(err: &reqwest::Error) -> ProbeFailure {
    let mut detail = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        detail.push_str(": ");
        detail.push_str(&cause.to_string());
        source = cause.source();
    }
    let lower = detail.to_ascii_lowercase();
    if lower.contains("certificate") || lower.contains("handshake") || lower.contains("tls") || lower.contains("alert") {
        ProbeFailure::Tls(detail)
    } else if err.is_timeout() {
        ProbeFailure::Timeout(detail)
    } else if err.is_connect() {
        ProbeFailure::Connect(detail)
    } else {
        ProbeFailure::Other(detail)
    }
}

fn truncate(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

#[cfg(test)]
mod tests {
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;
    use std::sync::Arc;
    use std::time::Instant;

    use rustls::pki_types::pem::PemObject;
    use rustls::pki_types::{CertificateDer, PrivateKeyDer};
    use rustls::server::WebPkiClientVerifier;
    use rustls::{RootCertStore, ServerConfig, ServerConnection, StreamOwned};

    use super::*;

    const CA: &[u8] = include_bytes!("../tests/testdata/tls/ca.pem");
    const SERVER_CERT: &[u8] = include_bytes!("../tests/testdata/tls/server_cert.pem");
    const SERVER_KEY: &[u8] = include_bytes!("../tests/testdata/tls/server_key.pem");
    const CLIENT_CERT: &[u8] = include_bytes!("../tests/testdata/tls/cert.pem");
    const CLIENT_KEY: &[u8] = include_bytes!("../tests/testdata/tls/key.pem");
    const UNTRUSTED_CERT: &[u8] = include_bytes!("../tests/testdata/tls/untrusted_cert.pem");
    const UNTRUSTED_KEY: &[u8] = include_bytes!("../tests/testdata/tls/untrusted_key.pem");

    /// Serves `body` with `status` to every connection on an ephemeral port.
    fn serve(status: &'static str, body: &'static str) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let port = listener.local_addr().expect("addr").port();
        let _ = std::thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(mut stream) = stream else { break };
                let mut reader = BufReader::new(stream.try_clone().expect("clone"));
                let mut line = String::new();
                while reader.read_line(&mut line).map(|n| n > 0).unwrap_or(false) {
                    if line == "\r\n" {
                        break;
                    }
                    line.clear();
                }
                let _ = write!(
                    stream,
                    "HTTP/1.1 {status}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
            }
        });
        port
    }

    /// Serves "Hello, World!" over TLS to clients holding a certificate
    /// signed by the test CA.
    fn serve_mutual_tls() -> u16 {
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let mut roots = RootCertStore::empty();
        roots.add(CertificateDer::from_pem_slice(CA).expect("ca")).expect("trust ca");
        let verifier = WebPkiClientVerifier::builder_with_provider(Arc::new(roots), Arc::clone(&provider))
            .build()
            .expect("client verifier");
        let chain = CertificateDer::pem_slice_iter(SERVER_CERT)
            .collect::<std::result::Result<Vec<_>, _>>()
            .expect("server chain");
        let key = PrivateKeyDer::from_pem_slice(SERVER_KEY).expect("server key");
        // TLS 1.2 rejects the client certificate inside the handshake, before
        // any request bytes are in flight.
        let config = Arc::new(
            ServerConfig::builder_with_provider(provider)
                .with_protocol_versions(&[&rustls::version::TLS12])
                .expect("protocol versions")
                .with_client_cert_verifier(verifier)
                .with_single_cert(chain, key)
                .expect("server config"),
        );

        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let port = listener.local_addr().expect("addr").port();
        let _ = std::thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(tcp) = stream else { break };
                let Ok(conn) = ServerConnection::new(Arc::clone(&config)) else { continue };
                let mut tls = StreamOwned::new(conn, tcp);
                let mut request = Vec::new();
                let mut buf = [0_u8; 1024];
                loop {
                    let n = match tls.read(&mut buf) {
                        Ok(0) => break,
                        Ok(n) => n,
                        Err(_) => {
                            // The alert is already written; drain so the
                            // close is not turned into a reset.
                            let _ = tls.sock.shutdown(std::net::Shutdown::Write);
                            let _ = tls.sock.set_read_timeout(Some(Duration::from_secs(1)));
                            let _ = std::io::copy(&mut tls.sock, &mut std::io::sink());
                            break;
                        }
                    };
                    request.extend_from_slice(&buf[..n]);
                    if request.windows(4).any(|w| w == b"\r\n\r\n") {
                        let body = "Hello, World!";
                        let _ = write!(
                            tls,
                            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                            body.len()
                        );
                        let _ = tls.flush();
                        tls.conn.send_close_notify();
                        let _ = tls.conn.complete_io(&mut tls.sock);
                        break;
                    }
                }
            }
        });
        port
    }

    fn dead_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        listener.local_addr().expect("addr").port()
    }

    fn probe(timeout_ms: u64) -> NetworkProbe {
        NetworkProbe::new(
            "127.0.0.1",
            RetryPolicy::new(Duration::from_millis(20), Duration::from_millis(timeout_ms)),
        )
    }

    #[test]
    fn url_rendering() {
        let req = ProbeRequest::https(49153).path("health");
        assert_eq!(req.url("localhost"), "https://localhost:49153/health");
        assert_eq!(req.host("127.0.0.1").url("localhost"), "https://127.0.0.1:49153/health");
    }

    #[test]
    fn poll_returns_matching_body() {
        let port = serve("200 OK", "Hello, World!");
        let response = probe(2_000)
            .poll(&ProbeRequest::http(port).body_contains("Hello, World!"))
            .expect("should serve");
        assert_eq!(response.status, 200);
    }

    #[test]
    fn mismatched_body_times_out_with_last_body() {
        let port = serve("200 OK", "Hello, Moon!");
        let err = probe(200)
            .poll(&ProbeRequest::http(port).body_contains("Hello, World!"))
            .expect_err("should time out");
        match err {
            BuildproofError::ProbeTimeout { last, .. } => assert!(last.contains("Hello, Moon!")),
            other => panic!("unexpected: {other}"),
        }
    }

    #[test]
    fn dead_port_times_out_instead_of_hanging() {
        let port = dead_port();
        let start = Instant::now();
        let err = probe(300)
            .poll(&ProbeRequest::http(port).body_contains("Hello"))
            .expect_err("nothing listens");
        assert!(err.is_timeout());
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn probe_once_reports_connection_failure() {
        let attempt = probe(100).probe_once(&ProbeRequest::http(dead_port())).expect("client");
        assert!(matches!(attempt, ProbeAttempt::Failed(ProbeFailure::Connect(_))));
    }

    #[test]
    fn status_and_availability_predicates() {
        let port = serve("503 Service Unavailable", "warming up");
        let p = probe(2_000);
        let available = p.poll(&ProbeRequest::http(port)).expect("any response");
        assert_eq!(available.status, 503);
        assert!(p.poll(&ProbeRequest::http(port).status(503)).is_ok());
        let short = probe(100);
        assert!(short.poll(&ProbeRequest::http(port).status(200)).is_err());
    }

    #[test]
    fn invalid_identity_is_config_error() {
        let req = ProbeRequest::https(443).identity(TlsIdentity::from_pem(b"nope".to_vec(), b"nope".to_vec()));
        assert!(matches!(probe(100).probe_once(&req), Err(BuildproofError::Config { .. })));
    }

    #[test]
    fn trusted_client_is_served_over_mutual_tls() {
        let port = serve_mutual_tls();
        let request = ProbeRequest::https(port)
            .trust_root(CA.to_vec())
            .identity(TlsIdentity::from_pem(CLIENT_CERT.to_vec(), CLIENT_KEY.to_vec()))
            .body_contains("Hello, World!");
        let response = probe(5_000).poll(&request).expect("trusted client is served");
        assert_eq!(response.status, 200);
    }

    #[test]
    fn untrusted_client_certificate_is_a_tls_failure() {
        let port = serve_mutual_tls();
        let request = ProbeRequest::https(port)
            .trust_root(CA.to_vec())
            .identity(TlsIdentity::from_pem(UNTRUSTED_CERT.to_vec(), UNTRUSTED_KEY.to_vec()));
        match probe(100).probe_once(&request).expect("client") {
            ProbeAttempt::Failed(ProbeFailure::Tls(_)) => {}
            other => panic!("expected the handshake to be rejected, got {other:?}"),
        }
    }

    #[test]
    fn server_outside_trust_roots_is_a_tls_failure() {
        let port = serve_mutual_tls();
        // The client certificate is not a CA, so nothing vouches for the server.
        let request = ProbeRequest::https(port)
            .trust_root(CLIENT_CERT.to_vec())
            .identity(TlsIdentity::from_pem(CLIENT_CERT.to_vec(), CLIENT_KEY.to_vec()));
        match probe(100).probe_once(&request).expect("client") {
            ProbeAttempt::Failed(ProbeFailure::Tls(_)) => {}
            other => panic!("expected server verification to fail, got {other:?}"),
        }
    }

    #[test]
    fn rejected_client_keeps_polling_until_timeout() {
        let port = serve_mutual_tls();
        let request = ProbeRequest::https(port)
            .trust_root(CA.to_vec())
            .identity(TlsIdentity::from_pem(UNTRUSTED_CERT.to_vec(), UNTRUSTED_KEY.to_vec()))
            .body_contains("Hello, World!");
        match probe(300).poll(&request) {
            Err(BuildproofError::ProbeTimeout { last, .. }) => assert!(last.starts_with("TLS failure")),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn serve_requires_published_port() {
        let handle = ContainerHandle::new(
            buildproof_common::types::ContainerId::new("abc"),
            "app",
            std::collections::BTreeMap::new(),
        );
        assert!(matches!(
            probe(100).serve(&handle, 8080, "Hello"),
            Err(BuildproofError::NotFound { .. })
        ));
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "h");
        assert_eq!(truncate("abc", 10), "abc");
    }
}
