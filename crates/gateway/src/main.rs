//! PaperVault API Gateway
//!
//! The entry point for all external API requests.
//! Handles:
//! - Authentication and sessions
//! - Department, subject type and program type lookups
//! - Question paper search, download and removal
//! - Bulk archive import with optional streamed progress
//! - Observability (logging, metrics)

mod handlers;
mod middleware;

use anyhow::Context;
use axum::{
    extract::{DefaultBodyLimit, FromRef},
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use papervault_common::{
    auth::JwtManager,
    config::AppConfig,
    db::DbPool,
    metrics::{self, IMPORT_BUCKETS, LATENCY_BUCKETS, METRICS_PREFIX},
    Repository,
};
use papervault_ingestion::{BulkImporter, PaperStore};
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::Notify;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    services::ServeDir,
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use middleware::rate_limit::{self, LoginRateLimiter};

/// Multipart framing allowance on top of the archive size limit
const MULTIPART_OVERHEAD: u64 = 1024 * 1024;

/// How often idle login buckets are dropped
const LIMITER_CLEANUP_INTERVAL: Duration = Duration::from_secs(300);

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub repo: Repository,
    pub jwt: Arc<JwtManager>,
    pub login_limiter: Option<Arc<LoginRateLimiter>>,
    pub importer: BulkImporter,
}

impl FromRef<AppState> for Arc<JwtManager> {
    fn from_ref(state: &AppState) -> Self {
        state.jwt.clone()
    }
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.observability.log_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    if config.observability.json_logging {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Serve Prometheus metrics on their own port; port 0 disables the exporter
fn install_metrics_exporter(config: &AppConfig) -> anyhow::Result<()> {
    let port = config.observability.metrics_port;
    if port == 0 {
        info!("Metrics exporter disabled");
        return Ok(());
    }

    PrometheusBuilder::new()
        .with_http_listener(SocketAddr::from(([0, 0, 0, 0], port)))
        .set_buckets_for_metric(
            Matcher::Full(format!("{}_request_duration_seconds", METRICS_PREFIX)),
            LATENCY_BUCKETS,
        )?
        .set_buckets_for_metric(
            Matcher::Full(format!("{}_import_duration_seconds", METRICS_PREFIX)),
            IMPORT_BUCKETS,
        )?
        .install()
        .context("failed to install Prometheus exporter")?;

    info!(port, "Metrics exporter listening");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = AppConfig::load().context("failed to load configuration")?;
    let config = Arc::new(config);

    init_tracing(&config);
    info!("Starting PaperVault API Gateway v{}", papervault_common::VERSION);

    // Initialize metrics
    install_metrics_exporter(&config)?;
    metrics::register_metrics();

    let jwt = Arc::new(JwtManager::from_config(&config.auth)?);

    // Initialize database connection
    info!("Connecting to database...");
    let db = DbPool::new(&config.database).await?;
    db.migrate().await?;
    let repo = Repository::new(db);

    let store: Arc<dyn PaperStore> = Arc::new(repo.clone());
    let importer = BulkImporter::from_config(store, &config);
    importer
        .storage()
        .ensure_root()
        .await
        .with_context(|| format!("failed to create {}", importer.storage().root().display()))?;

    let login_limiter = rate_limit::create_login_limiter(&config.rate_limit);
    match &login_limiter {
        Some(limiter) => {
            rate_limit::spawn_cleanup(limiter.clone(), LIMITER_CLEANUP_INTERVAL);
        }
        None => warn!("Login rate limiting disabled"),
    }

    // Create app state
    let state = AppState {
        config: config.clone(),
        repo,
        jwt,
        login_limiter,
        importer,
    };

    // Build the router
    let app = create_router(state);

    // Start the server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("invalid server address")?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    let draining = Arc::new(Notify::new());
    let signal = draining.clone();
    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        shutdown_signal().await;
        signal.notify_one();
    });

    match bounded_drain(server, draining, config.shutdown_timeout()).await {
        Some(result) => result?,
        None => warn!(
            timeout_secs = config.server.shutdown_timeout_secs,
            "Connections still open after shutdown timeout, exiting"
        ),
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Create the main application router
fn create_router(state: AppState) -> Router {
    let config = state.config.clone();

    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Request ID propagation
    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    // Request/response routes, bounded by the request timeout
    let api_routes = Router::new()
        // Auth endpoints
        .route("/auth/register", post(handlers::auth::register))
        .route("/auth/login", post(handlers::auth::login))
        .route("/auth/logout", post(handlers::auth::logout))
        .route("/auth/me", get(handlers::auth::me))

        // Lookup endpoints
        .route(
            "/departments",
            get(handlers::lookups::list_departments).post(handlers::lookups::create_department),
        )
        .route(
            "/subject-types",
            get(handlers::lookups::list_subject_types).post(handlers::lookups::create_subject_type),
        )
        .route(
            "/program-types",
            get(handlers::lookups::list_program_types).post(handlers::lookups::create_program_type),
        )

        // Paper endpoints
        .route("/papers", get(handlers::papers::list_papers))
        .route(
            "/papers/{id}",
            get(handlers::papers::get_paper).delete(handlers::papers::delete_paper),
        )
        .route("/download/{id}", get(handlers::papers::download_paper))
        .layer(TimeoutLayer::new(config.request_timeout()));

    // Imports run as long as the archive takes
    let max_upload = config.import.max_archive_bytes.saturating_add(MULTIPART_OVERHEAD);
    let upload_routes = Router::new()
        .route("/admin/bulk-upload", post(handlers::bulk_upload::bulk_upload))
        .layer(DefaultBodyLimit::max(usize::try_from(max_upload).unwrap_or(usize::MAX)));

    // Compose the app
    Router::new()
        // Health endpoints (no auth)
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))
        .nest("/api", api_routes.merge(upload_routes))
        .route_layer(axum::middleware::from_fn(middleware::metrics::track_metrics))
        .nest_service(
            &config.storage.public_prefix,
            ServeDir::new(&config.storage.papers_dir),
        )
        .layer(
            ServiceBuilder::new()
                .layer(request_id)
                .layer(TraceLayer::new_for_http())
                .layer(propagate_id)
                .layer(cors),
        )
        .with_state(state)
}

/// Drive `server` to completion. Once `draining` is notified it has
/// `timeout` left; `None` means the deadline passed first.
async fn bounded_drain<F: IntoFuture>(
    server: F,
    draining: Arc<Notify>,
    timeout: Duration,
) -> Option<F::Output> {
    let deadline = async {
        draining.notified().await;
        tokio::time::sleep(timeout).await;
    };

    tokio::select! {
        output = server.into_future() => Some(output),
        _ = deadline => None,
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_drain_finishes_before_deadline() {
        let draining = Arc::new(Notify::new());
        draining.notify_one();

        let server = async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            7
        };
        assert_eq!(bounded_drain(server, draining, Duration::from_secs(5)).await, Some(7));
    }

    #[tokio::test]
    async fn test_drain_gives_up_after_deadline() {
        let draining = Arc::new(Notify::new());
        draining.notify_one();

        let stuck = std::future::pending::<()>();
        assert_eq!(bounded_drain(stuck, draining, Duration::from_millis(20)).await, None);
    }

    #[tokio::test]
    async fn test_no_deadline_without_shutdown() {
        let draining = Arc::new(Notify::new());
        let stuck = bounded_drain(std::future::pending::<()>(), draining, Duration::from_millis(1));

        assert!(tokio::time::timeout(Duration::from_millis(50), stuck).await.is_err());
    }
}
