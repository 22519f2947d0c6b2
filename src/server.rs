//! HTTP server for the relay
//!
//! Routes:
//! - `GET /health` - liveness report
//! - `GET /metrics` - Prometheus metrics
//! - `GET /test-stream` - probe the configured channel manifest at the origin
//! - `GET /player-config.json` - stream URL and engine tuning for the page
//! - `GET {base_route}/*.m3u8|*.ts` - relayed HLS resources
//! - `GET /` - player page
//!
//! Every response carries permissive CORS headers so browser media engines
//! can fetch manifests and segments cross-origin.

use crate::config::RelayConfig;
use crate::diagnostics::probe_stream;
use crate::dispatcher::{full_body, text_response, RelayBody, RelayDispatcher};
use crate::error::{RelayError, Result};
use crate::health_check::HealthReport;
use crate::metrics::RelayMetrics;
use crate::player::PlayerConfig;
use futures::FutureExt;
use http::{header, HeaderMap, HeaderValue, Method, Request, Response, StatusCode};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use hyper_util::server::graceful::GracefulShutdown;
use std::convert::Infallible;
use std::future::Future;
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

const ALLOW_METHODS: &str = "GET, HEAD, OPTIONS";
const ALLOW_HEADERS: &str = "Origin, X-Requested-With, Content-Type, Accept, Range";
const EXPOSE_HEADERS: &str = "Content-Length, Content-Range, Accept-Ranges";

/// Shared state of a running relay
pub struct RelayState {
    config: RelayConfig,
    dispatcher: RelayDispatcher,
    metrics: RelayMetrics,
}

impl RelayState {
    pub fn new(config: RelayConfig) -> Result<Self> {
        config.validate()?;
        let metrics = RelayMetrics::new()
            .map_err(|e| RelayError::InternalError(format!("Failed to create metrics: {}", e)))?;
        let dispatcher = RelayDispatcher::new(&config, metrics.clone())?;
        Ok(Self::with_parts(config, dispatcher, metrics))
    }

    pub fn with_parts(
        config: RelayConfig,
        dispatcher: RelayDispatcher,
        metrics: RelayMetrics,
    ) -> Self {
        RelayState {
            config,
            dispatcher,
            metrics,
        }
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    pub fn dispatcher(&self) -> &RelayDispatcher {
        &self.dispatcher
    }

    pub fn metrics(&self) -> &RelayMetrics {
        &self.metrics
    }
}

/// The relay's HTTP server
pub struct RelayServer {
    state: Arc<RelayState>,
}

impl RelayServer {
    /// Create a server from configuration
    ///
    /// Invalid configuration is reported here, before anything is bound.
    pub fn new(config: RelayConfig) -> Result<Self> {
        Ok(Self::from_state(Arc::new(RelayState::new(config)?)))
    }

    pub fn from_state(state: Arc<RelayState>) -> Self {
        RelayServer { state }
    }

    pub fn state(&self) -> &Arc<RelayState> {
        &self.state
    }

    /// Bind the listening socket
    ///
    /// Address-in-use and permission failures come back as configuration
    /// errors: the process cannot usefully start without its port.
    pub async fn bind(&self) -> Result<TcpListener> {
        let address = self.state.config.listen_address();
        TcpListener::bind(&address).await.map_err(|e| {
            let reason = match e.kind() {
                ErrorKind::AddrInUse => "address already in use",
                ErrorKind::PermissionDenied => "permission denied",
                _ => "bind failed",
            };
            RelayError::ConfigError(format!("Cannot listen on {}: {} ({})", address, reason, e))
        })
    }

    /// Serve connections until `shutdown` resolves
    ///
    /// On shutdown the listener is closed first, then in-flight connections
    /// are allowed to finish.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        if let Ok(addr) = listener.local_addr() {
            info!("Server listening on http://{}", addr);
            info!("Health check: http://{}/health", addr);
            info!("Test stream: http://{}/test-stream", addr);
        }

        let graceful = GracefulShutdown::new();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, peer_addr) = match accepted {
                        Ok(conn) => conn,
                        Err(e) => {
                            warn!("Failed to accept connection: {}", e);
                            continue;
                        }
                    };
                    self.spawn_connection(&graceful, stream, peer_addr);
                }
                () = &mut shutdown => {
                    info!("Shutdown signal received, no longer accepting connections");
                    break;
                }
            }
        }

        drop(listener);
        graceful.shutdown().await;
        info!("All connections closed");
        Ok(())
    }

    fn spawn_connection(
        &self,
        graceful: &GracefulShutdown,
        stream: tokio::net::TcpStream,
        peer_addr: SocketAddr,
    ) {
        let io = TokioIo::new(stream);
        let state = Arc::clone(&self.state);

        let service = service_fn(move |req| {
            let state = Arc::clone(&state);
            async move { handle_request(state, req).await }
        });

        let conn = graceful.watch(http1::Builder::new().serve_connection(io, service));

        tokio::spawn(async move {
            if let Err(err) = conn.await {
                debug!("Connection error from {}: {}", peer_addr, err);
            }
        });
    }
}

/// Handle one request
///
/// Never fails and never panics outward: routing errors become responses and
/// a panicking handler is answered with 500.
pub async fn handle_request<B>(
    state: Arc<RelayState>,
    req: Request<B>,
) -> std::result::Result<Response<RelayBody>, Infallible> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    debug!("{} {}", method, path);

    let mut response = match AssertUnwindSafe(route(&state, &method, &path))
        .catch_unwind()
        .await
    {
        Ok(Ok(response)) => response,
        Ok(Err(err)) => {
            error!("Server error: {} {}: {}", method, path, err);
            text_response(StatusCode::INTERNAL_SERVER_ERROR, "Server error")
        }
        Err(_) => {
            error!("Server error: handler panicked for {} {}", method, path);
            text_response(StatusCode::INTERNAL_SERVER_ERROR, "Server error")
        }
    };

    apply_cors(response.headers_mut());
    Ok(response)
}

async fn route(state: &RelayState, method: &Method, path: &str) -> Result<Response<RelayBody>> {
    if method == Method::OPTIONS {
        let mut response = Response::new(full_body(""));
        *response.status_mut() = StatusCode::NO_CONTENT;
        return Ok(response);
    }

    if method != Method::GET && method != Method::HEAD {
        return Ok(text_response(
            StatusCode::METHOD_NOT_ALLOWED,
            "Method not allowed",
        ));
    }

    let prefix = state.config.route_prefix();
    if let Some(rest) = path.strip_prefix(prefix) {
        if rest.is_empty() || rest.starts_with('/') {
            return Ok(state.dispatcher.handle(rest).await);
        }
    }

    match path {
        "/health" => {
            let report = HealthReport::now(state.config.environment);
            json_response(StatusCode::OK, report.to_json())
        }
        "/metrics" => {
            let (content_type, body) = state
                .metrics
                .encode()
                .map_err(|e| RelayError::InternalError(format!("Failed to encode metrics: {}", e)))?;
            Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, content_type)
                .body(full_body(body))
                .map_err(|e| RelayError::InternalError(e.to_string()))
        }
        "/test-stream" => {
            let url = format!("{}{}", state.config.origin_base(), state.config.stream_path);
            let report = probe_stream(state.dispatcher.upstream(), &url).await;
            let status = StatusCode::from_u16(report.status).unwrap_or(StatusCode::BAD_GATEWAY);
            json_response(status, report.body.to_string())
        }
        "/player-config.json" => {
            let player = PlayerConfig::for_relay(&state.config);
            json_response(StatusCode::OK, player.to_json())
        }
        "/" | "/index.html" => serve_player_page(Path::new(&state.config.static_dir)).await,
        _ => Ok(text_response(StatusCode::NOT_FOUND, "Not found")),
    }
}

async fn serve_player_page(static_dir: &Path) -> Result<Response<RelayBody>> {
    let page = static_dir.join("index.html");
    match tokio::fs::read(&page).await {
        Ok(content) => Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "text/html; charset=utf-8")
            .body(full_body(content))
            .map_err(|e| RelayError::InternalError(e.to_string())),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            warn!("Player page not found: {}", page.display());
            Ok(text_response(StatusCode::NOT_FOUND, "Not found"))
        }
        Err(e) => Err(e.into()),
    }
}

fn json_response(status: StatusCode, body: String) -> Result<Response<RelayBody>> {
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/json")
        .body(full_body(body))
        .map_err(|e| RelayError::InternalError(e.to_string()))
}

fn apply_cors(headers: &mut HeaderMap) {
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static(ALLOW_METHODS),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static(ALLOW_HEADERS),
    );
    headers.insert(
        header::ACCESS_CONTROL_EXPOSE_HEADERS,
        HeaderValue::from_static(EXPOSE_HEADERS),
    );
}

/// Wait for SIGINT or SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { info!("Received Ctrl+C signal"); }
        () = terminate => { info!("Received SIGTERM signal"); }
    }
}
