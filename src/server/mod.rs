//! # Telemetry Server Module
//!
//! Serves the latest orientation snapshot over HTTP.
//!
//! This module handles:
//! - Binding the telemetry listener (fatal on failure)
//! - Running a single-worker accept loop until the cancellation token fires
//! - Serving one request per connection through hyper's HTTP/1 connection
//!   driver, then closing
//! - Logging and skipping any request that fails
//!
//! ## Lifecycle
//!
//! ```text
//! Idle --run()--> Listening --accept--> Serving --reply/error--> Listening
//!                     |                                              |
//!                     +--------------- cancel -----------------> Stopped
//! ```

pub mod router;

use std::future;
use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::header::{HeaderValue, CONTENT_LENGTH, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::time::{sleep, timeout, Duration};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::error::{ImuBridgeError, Result};
use crate::orientation::SharedMotion;
use router::{route, RouteOutcome};

/// Content type of every reply
pub const TEXT_PLAIN: &str = "text/plain; charset=utf-8";

/// Smallest read buffer hyper accepts for an HTTP/1 connection
pub const MIN_REQUEST_BUFFER_BYTES: usize = 8192;

/// Pause before accepting again after `accept()` fails
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(50);

/// Telemetry server lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// Bound but not yet accepting
    Idle,
    /// Waiting for a connection
    Listening,
    /// Handling one request
    Serving,
    /// Accept loop has exited; terminal
    Stopped,
}

/// Per-request limits
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    /// Budget for reading the request and writing the reply
    pub request_timeout: Duration,
    /// Upper bound on the request head size
    pub max_request_bytes: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_millis(2000),
            max_request_bytes: 8192,
        }
    }
}

impl From<&ServerConfig> for ServerSettings {
    fn from(config: &ServerConfig) -> Self {
        Self {
            request_timeout: Duration::from_millis(config.request_timeout_ms),
            max_request_bytes: config.max_request_bytes,
        }
    }
}

/// HTTP telemetry server bound to one listener
pub struct TelemetryServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    motion: SharedMotion,
    settings: ServerSettings,
    cancel: CancellationToken,
    state: watch::Sender<ServerState>,
}

impl std::fmt::Debug for TelemetryServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryServer")
            .field("local_addr", &self.local_addr)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl TelemetryServer {
    /// Bind the telemetry listener
    ///
    /// # Arguments
    ///
    /// * `addr` - Address to bind (`0.0.0.0:<port>` for all interfaces)
    /// * `motion` - Shared state read on every `/d` request
    /// * `settings` - Per-request limits
    /// * `cancel` - Token that ends the accept loop
    ///
    /// # Errors
    ///
    /// Returns `Bind` error if the listener cannot be created. There is no retry.
    pub async fn bind(
        addr: SocketAddr,
        motion: SharedMotion,
        settings: ServerSettings,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ImuBridgeError::Bind { addr, source })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| ImuBridgeError::Bind { addr, source })?;

        let (state, _) = watch::channel(ServerState::Idle);

        Ok(Self {
            listener,
            local_addr,
            motion,
            settings,
            cancel,
            state,
        })
    }

    /// Address the listener is actually bound to
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Subscribe to lifecycle state changes
    #[must_use]
    pub fn state(&self) -> watch::Receiver<ServerState> {
        self.state.subscribe()
    }

    /// Run the accept loop until cancelled
    ///
    /// A pending accept is raced against the cancellation token, so stopping
    /// never waits for another client. The listener is closed when this
    /// returns.
    ///
    /// # Returns
    ///
    /// Number of requests answered successfully
    pub async fn run(self) -> u64 {
        info!("Telemetry server listening on {}", self.local_addr);
        self.state.send_replace(ServerState::Listening);

        let mut served: u64 = 0;

        loop {
            let accepted = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                accepted = self.listener.accept() => accepted,
            };

            let (stream, peer) = match accepted {
                Ok(connection) => connection,
                Err(e) => {
                    warn!("Failed to accept connection: {}", e);
                    if !accept_backoff(&self.cancel).await {
                        break;
                    }
                    continue;
                }
            };

            self.state.send_replace(ServerState::Serving);

            let handled = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                handled = timeout(
                    self.settings.request_timeout,
                    serve_connection(stream, self.motion.clone(), &self.settings),
                ) => handled,
            };

            match handled {
                Ok(Ok(Some(path))) => {
                    served += 1;
                    debug!("Served {} to {}", path, peer);
                }
                Ok(Ok(None)) => debug!("{} closed the connection without a request", peer),
                Ok(Err(e)) => warn!("Request from {} failed: {}", peer, e),
                Err(_) => warn!(
                    "Request from {} timed out after {:?}",
                    peer, self.settings.request_timeout
                ),
            }

            self.state.send_replace(ServerState::Listening);
        }

        self.state.send_replace(ServerState::Stopped);
        info!("Telemetry server on {} stopped after {} requests", self.local_addr, served);
        served
    }
}

/// Wait before retrying a failed accept
///
/// Returns `false` if the token fired first.
async fn accept_backoff(cancel: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = sleep(ACCEPT_RETRY_DELAY) => true,
    }
}

/// Build a `200 OK` plain-text reply
fn text_response(body: String) -> Response<Full<Bytes>> {
    let length = body.len();
    let mut response = Response::new(Full::new(Bytes::from(body)));
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(TEXT_PLAIN));
    headers.insert(CONTENT_LENGTH, HeaderValue::from(length));
    response
}

/// Serve a single request on one connection, then close it
///
/// Keep-alive is off, so hyper answers with `Connection: close` and ends the
/// connection after the reply. Request heads that do not fit in
/// `max_request_bytes` are refused by hyper.
///
/// # Returns
///
/// The routed path, or `None` if the client closed the connection before
/// sending a request
///
/// # Errors
///
/// Returns `Hyper` error if the request is malformed or too large, the path
/// is unknown, or the reply cannot be written. Unknown paths get no response;
/// the connection is dropped.
pub async fn serve_connection<S>(
    stream: S,
    motion: SharedMotion,
    settings: &ServerSettings,
) -> Result<Option<String>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let served = Arc::new(OnceLock::new());

    let service = {
        let served = Arc::clone(&served);
        service_fn(move |request: Request<Incoming>| {
            let path = request.uri().path();
            let reply = match route(path, &motion) {
                RouteOutcome::Reply(body) => {
                    let _ = served.set(path.to_string());
                    Ok::<_, ImuBridgeError>(text_response(body))
                }
                RouteOutcome::UnknownPath(path) => {
                    debug!("Unknown command path {:?}, dropping connection", path);
                    Err(ImuBridgeError::Http(format!("unknown command path {:?}", path)))
                }
            };
            future::ready(reply)
        })
    };

    http1::Builder::new()
        .keep_alive(false)
        .title_case_headers(true)
        .max_buf_size(settings.max_request_bytes.max(MIN_REQUEST_BUFFER_BYTES))
        .serve_connection(TokioIo::new(stream), service)
        .await?;

    Ok(served.get().cloned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant as StdInstant;
    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;
    use tokio_test::io::Builder;

    async fn start_server(motion: SharedMotion, settings: ServerSettings) -> (SocketAddr, CancellationToken, tokio::task::JoinHandle<u64>, watch::Receiver<ServerState>) {
        let cancel = CancellationToken::new();
        let server = TelemetryServer::bind("127.0.0.1:0".parse().unwrap(), motion, settings, cancel.clone())
            .await
            .unwrap();
        let addr = server.local_addr();
        let state = server.state();
        let task = tokio::spawn(server.run());
        (addr, cancel, task, state)
    }

    async fn get(addr: SocketAddr, path: &str) -> std::io::Result<Vec<u8>> {
        let mut stream = TcpStream::connect(addr).await?;
        stream
            .write_all(format!("GET {} HTTP/1.1\r\nHost: test\r\n\r\n", path).as_bytes())
            .await?;
        let mut response = Vec::new();
        stream.read_to_end(&mut response).await?;
        Ok(response)
    }

    /// Send raw bytes through an in-memory stream and collect the reply
    async fn exchange(request: &[u8], settings: &ServerSettings) -> (Result<Option<String>>, Vec<u8>) {
        let (mut client, server) = duplex(64 * 1024);
        let client_side = async {
            client.write_all(request).await.unwrap();
            let mut response = Vec::new();
            let _ = client.read_to_end(&mut response).await;
            response
        };
        tokio::join!(serve_connection(server, SharedMotion::new(), settings), client_side)
    }

    fn body_of(response: &[u8]) -> String {
        let end = response.windows(4).position(|w| w == b"\r\n\r\n").unwrap() + 4;
        String::from_utf8(response[end..].to_vec()).unwrap()
    }

    fn head_of(response: &[u8]) -> String {
        let end = response.windows(4).position(|w| w == b"\r\n\r\n").unwrap();
        String::from_utf8_lossy(&response[..end]).to_string()
    }

    #[tokio::test]
    async fn test_serve_connection_replies_and_closes() {
        let (result, response) = exchange(b"GET /c HTTP/1.1\r\nHost: test\r\n\r\n", &ServerSettings::default()).await;

        assert_eq!(result.unwrap().as_deref(), Some("/c"));
        let head = head_of(&response);
        assert!(head.starts_with("HTTP/1.1 200 OK\r\n"), "got: {}", head);
        assert!(head.contains("Content-Type: text/plain; charset=utf-8"));
        assert!(head.contains("Connection: close"));
        assert_eq!(body_of(&response), "done");
    }

    #[tokio::test]
    async fn test_serve_connection_ignores_query_and_absolute_form() {
        let (result, response) = exchange(b"GET /p?x=1 HTTP/1.1\r\nHost: test\r\n\r\n", &ServerSettings::default()).await;
        assert_eq!(result.unwrap().as_deref(), Some("/p"));
        assert_eq!(body_of(&response), "0/0/0/0/0/0/0/0/0/0/0/0");

        let (result, response) = exchange(b"GET http://imu:2137/a HTTP/1.1\r\nHost: imu\r\n\r\n", &ServerSettings::default()).await;
        assert_eq!(result.unwrap().as_deref(), Some("/a"));
        assert_eq!(body_of(&response), "done");
    }

    #[tokio::test]
    async fn test_unknown_path_writes_nothing() {
        // The mock fails the test on any write
        let stream = Builder::new().read(b"GET /x HTTP/1.1\r\n\r\n").build();

        let result = serve_connection(stream, SharedMotion::new(), &ServerSettings::default()).await;
        assert!(matches!(result, Err(ImuBridgeError::Hyper(_))), "got: {:?}", result);
    }

    #[tokio::test]
    async fn test_oversized_request_head_is_refused() {
        let settings = ServerSettings::default();
        let padding = "a".repeat(settings.max_request_bytes + 1024);
        let request = format!("GET /d HTTP/1.1\r\nHost: test\r\nX-Padding: {}\r\n\r\n", padding);

        let (result, response) = exchange(request.as_bytes(), &settings).await;

        assert!(result.is_err(), "oversized head must not be served");
        assert!(!String::from_utf8_lossy(&response).contains("200 OK"));
    }

    #[tokio::test]
    async fn test_head_within_limit_is_served() {
        let settings = ServerSettings::default();
        let padding = "a".repeat(settings.max_request_bytes / 2);
        let request = format!("GET /d HTTP/1.1\r\nHost: test\r\nX-Padding: {}\r\n\r\n", padding);

        let (result, response) = exchange(request.as_bytes(), &settings).await;

        assert_eq!(result.unwrap().as_deref(), Some("/d"));
        assert_eq!(body_of(&response), "0/0/0/0/0/0/0");
    }

    #[tokio::test]
    async fn test_closed_before_request_is_not_counted() {
        let (client, server) = duplex(1024);
        drop(client);

        let result = serve_connection(server, SharedMotion::new(), &ServerSettings::default()).await;
        assert_eq!(result.unwrap(), None);
    }

    #[tokio::test]
    async fn test_accept_backoff_waits_then_yields_to_cancel() {
        let cancel = CancellationToken::new();

        let started = StdInstant::now();
        assert!(accept_backoff(&cancel).await);
        assert!(started.elapsed() >= ACCEPT_RETRY_DELAY);

        cancel.cancel();
        let started = StdInstant::now();
        assert!(!accept_backoff(&cancel).await);
        assert!(started.elapsed() < ACCEPT_RETRY_DELAY);
    }

    #[tokio::test]
    async fn test_bind_conflict_is_fatal() {
        let occupied = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = occupied.local_addr().unwrap();

        let result = TelemetryServer::bind(addr, SharedMotion::new(), ServerSettings::default(), CancellationToken::new()).await;

        match result {
            Err(ImuBridgeError::Bind { addr: failed, .. }) => assert_eq!(failed, addr),
            other => panic!("Expected Bind error, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_serves_all_commands() {
        let (addr, cancel, task, _) = start_server(SharedMotion::new(), ServerSettings::default()).await;

        assert_eq!(body_of(&get(addr, "/d").await.unwrap()), "0/0/0/0/0/0/0");
        assert_eq!(body_of(&get(addr, "/c").await.unwrap()), "done");
        assert_eq!(body_of(&get(addr, "/a").await.unwrap()), "done");
        assert_eq!(body_of(&get(addr, "/m").await.unwrap()), "done");
        assert_eq!(body_of(&get(addr, "/p").await.unwrap()), "0/0/0/0/0/0/0/0/0/0/0/0");

        cancel.cancel();
        assert_eq!(task.await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_bad_requests_do_not_stop_server() {
        let (addr, cancel, task, _) = start_server(SharedMotion::new(), ServerSettings::default()).await;

        // Unknown path: connection closed without a response
        assert!(get(addr, "/unknown").await.map_or(true, |r| r.is_empty()));

        // Garbage request line is never answered with a reply body
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(b"HELLO\r\n\r\n").await.unwrap();
        let mut response = Vec::new();
        let _ = stream.read_to_end(&mut response).await;
        assert!(!String::from_utf8_lossy(&response).contains("200 OK"));

        // Client that hangs up before sending anything
        let stream = TcpStream::connect(addr).await.unwrap();
        drop(stream);

        assert_eq!(body_of(&get(addr, "/c").await.unwrap()), "done");

        cancel.cancel();
        assert_eq!(task.await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_stalled_client_times_out() {
        let settings = ServerSettings {
            request_timeout: Duration::from_millis(100),
            ..ServerSettings::default()
        };
        let (addr, cancel, task, _) = start_server(SharedMotion::new(), settings).await;

        // Connect but never send a request
        let _stalled = TcpStream::connect(addr).await.unwrap();

        let response = get(addr, "/p").await.unwrap();
        assert_eq!(body_of(&response), "0/0/0/0/0/0/0/0/0/0/0/0");

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_cancel_interrupts_pending_accept() {
        let (addr, cancel, task, mut state) = start_server(SharedMotion::new(), ServerSettings::default()).await;

        state.wait_for(|s| *s == ServerState::Listening).await.unwrap();

        let started = StdInstant::now();
        cancel.cancel();
        timeout(Duration::from_secs(1), task)
            .await
            .expect("accept loop should stop within a second")
            .unwrap();
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(*state.borrow(), ServerState::Stopped);

        // Listener is closed
        assert!(TcpStream::connect(addr).await.is_err());
    }

    #[tokio::test]
    async fn test_content_length_matches_body() {
        let motion = SharedMotion::new();
        let t0 = tokio::time::Instant::now();
        motion.apply_angular_velocity(crate::orientation::Vector3::ZERO, t0);
        motion.apply_angular_velocity(
            crate::orientation::Vector3::new(0.123, 0.456, 0.789),
            t0 + Duration::from_millis(333),
        );
        let (addr, cancel, task, _) = start_server(motion, ServerSettings::default()).await;

        let response = get(addr, "/d").await.unwrap();
        let body = body_of(&response);
        assert!(head_of(&response).contains(&format!("Content-Length: {}", body.len())));
        assert_eq!(body.split('/').count(), 7);

        cancel.cancel();
        task.await.unwrap();
    }
}
