use crate::config::Config;
use crate::streaming::{self, start_sweep_task, ManifestGenerator, ObjectCache, StreamingEngine};
use anyhow::{Context, Result};
use axum::{
    body::Body,
    http::{
        header, request::Parts, HeaderName, HeaderValue, Method, Request, Response, StatusCode,
    },
    middleware::{self, Next},
    Router,
};
use hyper_util::rt::{TokioIo, TokioTimer};
use hyper_util::service::TowerToHyperService;
use std::any::Any;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

pub mod request_id;
pub mod routes_api;

/// Shared application context
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<Config>,
    pub engine: StreamingEngine,
    /// Generates HLS master manifests when none is packaged
    pub manifests: ManifestGenerator,
    /// Object cache (None when caching is disabled)
    pub cache: Option<Arc<ObjectCache>>,
    pub started_at: Instant,
}

impl AppContext {
    pub fn new(config: Config) -> Self {
        let cache = config.cache.enabled.then(|| {
            Arc::new(ObjectCache::new(
                config.cache.max_size,
                Duration::from_secs(config.cache.idle_ttl_secs),
            ))
        });
        let engine = StreamingEngine::from_config(&config, cache.clone());
        let manifests = ManifestGenerator::new(engine.resolver().clone());

        Self {
            config: Arc::new(config),
            engine,
            manifests,
            cache,
            started_at: Instant::now(),
        }
    }
}

/// Create the Axum router with all routes
pub fn create_router(ctx: AppContext) -> Router {
    let cors = cors_layer(&ctx.config.server.allowed_origins);

    Router::new()
        .merge(routes_api::api_routes())
        .nest("/stream", streaming::stream_router())
        .nest("/hls", streaming::hls_router())
        .nest("/dash", streaming::dash_router())
        .nest("/thumb", streaming::thumbnail_router())
        .layer(middleware::from_fn(request_id::request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(middleware::from_fn(preflight_no_content))
        .layer(CatchPanicLayer::custom(handle_panic))
        .with_state(ctx)
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let allowed = allowed_origins.to_vec();

    CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(
            move |origin: &HeaderValue, _parts: &Parts| {
                origin
                    .to_str()
                    .map(|o| origin_allowed(o, &allowed))
                    .unwrap_or(false)
            },
        ))
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::HEAD, Method::OPTIONS])
        .allow_headers([
            header::RANGE,
            header::ACCEPT,
            header::ACCEPT_ENCODING,
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static("x-requested-with"),
        ])
        .expose_headers([
            header::CONTENT_LENGTH,
            header::CONTENT_RANGE,
            header::ACCEPT_RANGES,
            header::CONTENT_TYPE,
        ])
        .max_age(Duration::from_secs(86400))
}

/// Whether a browser origin may read responses: listed origins, a `*`
/// entry, or a development host.
pub fn origin_allowed(origin: &str, allowed: &[String]) -> bool {
    if allowed.iter().any(|o| o == "*" || o == origin) {
        return true;
    }
    let host = origin.split_once("://").map(|(_, h)| h).unwrap_or(origin);
    ["github.dev", "codespaces", "localhost", "127.0.0.1"]
        .iter()
        .any(|pattern| host.contains(pattern))
}

/// The CORS layer answers every OPTIONS request itself; report those as
/// `204 No Content`.
async fn preflight_no_content(request: Request<Body>, next: Next) -> Response<Body> {
    let is_options = request.method() == Method::OPTIONS;
    let mut response = next.run(request).await;
    if is_options && response.status() == StatusCode::OK {
        *response.status_mut() = StatusCode::NO_CONTENT;
    }
    response
}

fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response<Body> {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.as_str()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s
    } else {
        "unknown panic"
    };
    tracing::error!(panic = detail, "Handler panicked");

    let body = serde_json::json!({
        "error": "Internal server error",
        "code": "internal_error",
    });
    Response::builder()
        .status(StatusCode::INTERNAL_SERVER_ERROR)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap_or_else(|_| Response::new(Body::empty()))
}

/// Start the HTTP server and run until SIGINT/SIGTERM.
pub async fn start_server(config: Config) -> Result<()> {
    start_server_with_cancel(config, CancellationToken::new()).await
}

/// Start the HTTP server, stopping on a signal or when `cancel` fires.
pub async fn start_server_with_cancel(config: Config, cancel: CancellationToken) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address")?;

    let header_timeout = Duration::from_secs(config.server.header_timeout_secs);
    let keep_alive = config.server.keep_alive;
    let sweep_interval = Duration::from_secs(config.cache.sweep_interval_secs);

    let ctx = AppContext::new(config);

    tracing::info!(
        public_root = %ctx.config.storage.public_root.display(),
        private_root = %ctx.config.storage.private_root.display(),
        manifest_root = %ctx.config.storage.manifest_root.display(),
        cache_enabled = ctx.cache.is_some(),
        signatures_enforced = ctx.engine.validator().is_enforced(),
        "Streaming configuration"
    );

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    tracing::info!("Starting server on {}", addr);

    let sweeper = ctx
        .cache
        .clone()
        .map(|cache| start_sweep_task(cache, sweep_interval, cancel.clone()));

    let app = create_router(ctx);

    run_accept_loop(listener, app, header_timeout, keep_alive, cancel.clone()).await;

    cancel.cancel();
    if let Some(handle) = sweeper {
        let _ = handle.await;
    }

    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn run_accept_loop(
    listener: tokio::net::TcpListener,
    app: Router,
    header_timeout: Duration,
    keep_alive: bool,
    cancel: CancellationToken,
) {
    let shutdown = shutdown_signal(cancel);
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, peer)) => {
                        let app = app.clone();
                        tokio::spawn(async move {
                            handle_connection(stream, app, header_timeout, keep_alive).await;
                            tracing::trace!(%peer, "Connection closed");
                        });
                    }
                    Err(e) => {
                        tracing::debug!("Accept error: {e}");
                    }
                }
            }
            _ = &mut shutdown => break,
        }
    }
}

/// Serve one TCP connection. Only reading the request head is bounded by a
/// deadline; long-running response bodies are not.
async fn handle_connection(
    stream: tokio::net::TcpStream,
    app: Router,
    header_timeout: Duration,
    keep_alive: bool,
) {
    let io = TokioIo::new(stream);
    let hyper_service = TowerToHyperService::new(app.into_service());
    if let Err(e) = hyper::server::conn::http1::Builder::new()
        .timer(TokioTimer::new())
        .header_read_timeout(header_timeout)
        .keep_alive(keep_alive)
        .serve_connection(io, hyper_service)
        .await
    {
        tracing::debug!("Hyper connection error: {e}");
    }
}

async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => {}
            Err(e) => {
                tracing::error!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
        _ = cancel.cancelled() => {},
    }

    tracing::info!("Shutdown signal received");
}
