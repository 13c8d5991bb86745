//! MedRAG API Gateway
//!
//! The HTTP entry point of the medical chatbot.
//! Handles:
//! - Chat turns through the shaping pipeline
//! - Audio upload and transcription
//! - Rate limiting
//! - Observability (logging, metrics, request ids)

mod handlers;
mod middleware;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use medrag_common::{
    audio::AudioServices,
    config::{AppConfig, ObservabilityConfig},
    metrics, ChatPipeline,
};
use metrics_exporter_prometheus::PrometheusBuilder;
use middleware::rate_limit::{rate_limit_middleware, RateLimit};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub pipeline: Arc<ChatPipeline>,
    pub audio: Option<AudioServices>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = AppConfig::load()?;

    // Initialize tracing
    init_tracing(&config.observability);

    info!("Starting MedRAG API Gateway v{}", medrag_common::VERSION);

    config.validate().map_err(|e| {
        tracing::error!(error = %e, "Invalid configuration");
        e
    })?;
    let config = Arc::new(config);

    // Initialize metrics
    if config.observability.metrics_port > 0 {
        let addr = SocketAddr::from(([0, 0, 0, 0], config.observability.metrics_port));
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .set_buckets(metrics::LATENCY_BUCKETS)?
            .install()?;
        info!("Metrics exporter listening on {}", addr);
    }
    metrics::register_metrics();

    // Build the pipeline and collaborators
    let pipeline = Arc::new(ChatPipeline::from_config(&config)?);
    let audio = config
        .audio
        .as_ref()
        .map(AudioServices::from_config)
        .transpose()?;
    if audio.is_none() {
        warn!("Audio section not configured, /audio routes will answer 503");
    }
    let rate_limit = RateLimit::from_config(&config.rate_limit)?;
    if let Some(limit) = &rate_limit {
        info!(
            requests_per_second = limit.requests_per_second(),
            burst = config.rate_limit.burst,
            "Rate limiting enabled"
        );
    }

    info!(
        variant = ?pipeline.variant(),
        citation_mode = ?config.chat.citation_mode,
        history_window = config.chat.history_window,
        "Chat pipeline ready"
    );

    // Create app state
    let state = AppState {
        config: config.clone(),
        pipeline,
        audio,
    };

    // Build the router
    let app = create_router(state, rate_limit);

    // Start the server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Install the global subscriber; `RUST_LOG` overrides the configured level
fn init_tracing(config: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    if config.json_logging {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Create the main application router
fn create_router(state: AppState, rate_limit: Option<RateLimit>) -> Router {
    let body_limit = state.config.server.body_limit_bytes;
    let request_timeout = state.config.request_timeout();

    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Request ID propagation
    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    // API routes
    let mut api_routes = Router::new()
        .route("/chat", post(handlers::chat::chat))
        .route("/audio/record", post(handlers::audio::record))
        .route("/audio/transcribe", post(handlers::audio::transcribe));

    if let Some(limit) = rate_limit {
        api_routes = api_routes.route_layer(axum::middleware::from_fn_with_state(
            limit,
            rate_limit_middleware,
        ));
    }

    // Compose the app
    Router::new()
        // Health endpoints (never rate limited)
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))
        .merge(api_routes)
        .route_layer(axum::middleware::from_fn(middleware::track_metrics))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(TimeoutLayer::new(request_timeout))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(propagate_id)
        .layer(request_id)
        .with_state(state)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
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
