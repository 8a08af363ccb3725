use axum::{routing::get, routing::post, Router};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use vto_fitting::app_state::AppState;
use vto_fitting::config::AppConfig;
use vto_fitting::db;
use vto_fitting::routes;
use vto_fitting::services::{
    bitstudio::BitstudioClient, media::MediaClient, queue::TaskQueue, storage::StorageClient,
};

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    // Load configuration from environment
    let config = AppConfig::from_env().expect("Failed to load configuration from environment");

    tracing::info!("Initializing vto-fitting server");

    // Initialize Prometheus metrics recorder
    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");
    let prometheus_handle = Arc::new(prometheus_handle);

    // Register application metrics
    metrics::describe_histogram!(
        "fitting_chord_seconds",
        "Time to aggregate an interactive try-on chord"
    );
    metrics::describe_counter!("fitting_fanouts_total", "Catalog fan-outs submitted");
    metrics::describe_counter!("fitting_tasks_total", "Task envelopes processed by workers");
    metrics::describe_counter!(
        "fitting_tasks_failed",
        "Task envelopes resolved to the failure sentinel"
    );
    metrics::describe_gauge!(
        "fitting_queue_depth",
        "Current number of pending task envelopes"
    );

    // Initialize database connection pool
    tracing::info!("Connecting to PostgreSQL database");
    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");

    // Run database migrations
    tracing::info!("Running database migrations");
    db::run_migrations(&db_pool)
        .await
        .expect("Failed to run database migrations");

    // Initialize storage client
    tracing::info!("Initializing S3 storage client");
    let storage = StorageClient::new(
        &config.s3_bucket,
        &config.s3_region,
        &config.s3_endpoint,
        &config.s3_access_key,
        &config.s3_secret_key,
        &config.cdn_domain,
    )
    .expect("Failed to initialize storage client");

    // Initialize Redis task queue
    tracing::info!("Connecting to Redis task queue");
    let queue = TaskQueue::new(&config.redis_url).expect("Failed to initialize task queue");

    // Initialize vendor clients
    tracing::info!("Initializing vendor clients");
    let bitstudio = BitstudioClient::new(&config.bitstudio_base_url, &config.bitstudio_api_key)
        .expect("Failed to initialize Bitstudio client");
    let media = MediaClient::new(&config.media_base_url, &config.media_api_key)
        .expect("Failed to initialize media client");

    // Create shared application state
    let polling = config.poll_settings();
    let state = AppState::new(db_pool, storage, queue, bitstudio, media, polling);

    // Build API routes
    let app = Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/api/v1/fittings", post(routes::fittings::submit_one_shot))
        .route(
            "/api/v1/fittings/catalog",
            post(routes::fittings::submit_catalog_fanout),
        )
        .route(
            "/api/v1/fittings/background",
            post(routes::fittings::edit_background),
        )
        .route(
            "/api/v1/fittings/{product_id}",
            get(routes::fittings::get_fitting_status),
        )
        .route(
            "/api/v1/fittings/{product_id}/videos",
            post(routes::videos::generate_video),
        )
        .route(
            "/api/v1/fittings/{product_id}/videos/status",
            get(routes::videos::video_status),
        )
        .with_state(state)
        // Prometheus metrics endpoint (separate state)
        .route(
            "/metrics",
            get(routes::metrics::prometheus_metrics).with_state(prometheus_handle),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(RequestBodyLimitLayer::new(10 * 1024 * 1024)); // 10 MB limit

    tracing::info!("Starting vto-fitting on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app).await.expect("Server error");
}
