use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::get;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};

use crate::core::config::AppConfig;
use crate::media::repository::MediaRepository;
use crate::storage::ObjectStore;

use super::handlers;
use super::middleware::RequestIdLayer;

// ---------------------------------------------------------------------------
// Gateway router
// ---------------------------------------------------------------------------

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<MediaRepository>,
    pub store: Arc<dyn ObjectStore>,
    pub config: AppConfig,
    pub start_time: std::time::Instant,
    /// Prometheus metrics handle for rendering the /metrics endpoint.
    pub metrics_handle: metrics_exporter_prometheus::PrometheusHandle,
}

/// Build the full Axum router with all routes.
///
/// Route table:
/// - `POST   /movies/upload/{filename}`   — Upload a movie
/// - `GET    /movies`                     — List all movies
/// - `GET    /movies/download/{filename}` — Full download (attachment)
/// - `GET    /movies/stream/{filename}`   — Range-aware streaming
/// - `GET    /movies/{filename}/metadata` — Metadata only
/// - `DELETE /movies/{filename}`          — Delete
/// - `GET /healthz`, `GET /readyz`, `GET /metrics`
pub fn build_router(state: AppState) -> Router {
    // CORS: streaming clients need Range in and the range headers out.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            http::Method::GET,
            http::Method::HEAD,
            http::Method::OPTIONS,
        ])
        .allow_headers([http::header::RANGE])
        .expose_headers([
            http::header::CONTENT_LENGTH,
            http::header::CONTENT_RANGE,
            http::header::ACCEPT_RANGES,
        ])
        .max_age(std::time::Duration::from_secs(86400));

    // Upload bodies are bounded by the configured maximum; the repository
    // enforces the same limit for callers that bypass HTTP.
    let body_limit = DefaultBodyLimit::max(state.config.upload.max_size_bytes as usize);

    Router::new()
        .route(
            "/movies",
            get(handlers::list_movies),
        )
        .route(
            "/movies/upload/{filename}",
            axum::routing::post(handlers::upload_movie),
        )
        .route(
            "/movies/download/{filename}",
            get(handlers::download_movie),
        )
        .route("/movies/stream/{filename}", get(handlers::stream_movie))
        .route(
            "/movies/{filename}/metadata",
            get(handlers::get_movie_metadata),
        )
        .route(
            "/movies/{filename}",
            axum::routing::delete(handlers::delete_movie),
        )
        // Health endpoints
        .route("/healthz", get(handlers::healthz))
        .route("/readyz", get(handlers::readyz))
        .route("/metrics", get(handlers::metrics_handler))
        .layer(cors)
        .layer(body_limit)
        .layer(RequestIdLayer)
        .with_state(state)
}
