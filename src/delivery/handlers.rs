use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::core::error::{DeliveryError, StoreError};
use crate::media::repository::MoviePatch;
use crate::observability::metrics as obs;

use super::range::{self, RangeRequest, ResolvedRange};
use super::router::AppState;

// ---------------------------------------------------------------------------
// Error response
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
    status: u16,
}

fn error_json(status: StatusCode, error: &str, message: &str) -> Response {
    let body = ErrorResponse {
        error: error.to_string(),
        message: message.to_string(),
        status: status.as_u16(),
    };
    (status, Json(body)).into_response()
}

fn delivery_error_response(e: DeliveryError) -> Response {
    let status =
        StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    error_json(status, e.error_code(), &e.to_string())
}

fn store_error_response(e: StoreError) -> Response {
    if !e.is_not_found() {
        error!(error = %e, "storage error");
    }
    delivery_error_response(DeliveryError::from(e))
}

// ---------------------------------------------------------------------------
// Upload
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct UploadQuery {
    pub title: Option<String>,
    pub description: Option<String>,
    pub year: Option<u32>,
    pub duration: Option<u32>,
    /// Comma-separated genre tags.
    pub genre: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub key: String,
}

/// `POST /movies/upload/{filename}` — raw binary body, `Content-Type`
/// header, optional metadata via query parameters.
pub async fn upload_movie(
    State(state): State<AppState>,
    Path(filename): Path<String>,
    Query(query): Query<UploadQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    let patch = MoviePatch {
        title: query.title,
        description: query.description,
        year: query.year,
        duration_mins: query.duration,
        genre: query
            .genre
            .map(|g| g.split(',').map(|s| s.trim().to_string()).collect()),
    };

    let size = body.len() as u64;
    let started = std::time::Instant::now();
    match state.repo.upload(&filename, body, &content_type, patch).await {
        Ok(key) => {
            obs::record_storage_put_duration(started.elapsed().as_secs_f64());
            obs::inc_upload("accepted");
            obs::record_upload_size(size as f64);
            (StatusCode::CREATED, Json(UploadResponse { key })).into_response()
        }
        Err(e) => {
            obs::inc_upload("rejected");
            debug!(%filename, error = %e, "upload rejected");
            let status = StatusCode::from_u16(e.status_code())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            error_json(status, e.error_code(), &e.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// Download (full object, attachment disposition)
// ---------------------------------------------------------------------------

/// `GET /movies/download/{filename}` — whole-file transfer with attachment
/// disposition and no-cache directives.
pub async fn download_movie(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Response {
    let started = std::time::Instant::now();
    let movie = match state.repo.fetch(&filename).await {
        Ok(m) => m,
        Err(e) => return store_error_response(e),
    };
    obs::record_storage_get_duration(started.elapsed().as_secs_f64());

    let total_size = movie.output.total_size;
    let content_type = movie.output.content_type.clone();

    obs::inc_delivery_request("200", "download");
    obs::add_delivery_bytes_sent(total_size);

    let stream = range::monitored_stream(
        crate::media::repository::MediaRepository::movie_key(&filename),
        movie.output.body,
    );

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, content_type),
            (header::CONTENT_LENGTH, total_size.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
            (header::CACHE_CONTROL, state.config.delivery.cache_control.clone()),
            (header::PRAGMA, "no-cache".to_string()),
            (header::EXPIRES, "0".to_string()),
        ],
        Body::from_stream(stream),
    )
        .into_response()
}

// ---------------------------------------------------------------------------
// Streaming (range-aware)
// ---------------------------------------------------------------------------

/// `GET /movies/stream/{filename}` with optional `Range: bytes=<start>-<end>`.
///
/// No range header → 200 full transfer. Range header → 206 with exactly the
/// requested byte window; the source stream is sliced before any byte
/// reaches the client. A malformed header is ignored (full transfer).
pub async fn stream_movie(
    State(state): State<AppState>,
    Path(filename): Path<String>,
    headers: HeaderMap,
) -> Response {
    let range_req = headers
        .get(header::RANGE)
        .and_then(|v| v.to_str().ok())
        .and_then(range::parse_range_header);

    let started = std::time::Instant::now();
    let movie = match state.repo.fetch(&filename).await {
        Ok(m) => m,
        Err(e) => return store_error_response(e),
    };
    obs::record_storage_get_duration(started.elapsed().as_secs_f64());

    let total_size = movie.output.total_size;
    let content_type = movie.output.content_type.clone();
    let key = crate::media::repository::MediaRepository::movie_key(&filename);

    match range_req {
        Some(req) => {
            partial_transfer(&state, key, movie.output.body, req, total_size, content_type)
        }
        None => {
            obs::inc_delivery_request("200", "stream");
            obs::add_delivery_bytes_sent(total_size);
            (
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, content_type),
                    (header::CONTENT_LENGTH, total_size.to_string()),
                    (header::ACCEPT_RANGES, "bytes".to_string()),
                ],
                Body::from_stream(range::monitored_stream(key, movie.output.body)),
            )
                .into_response()
        }
    }
}

fn partial_transfer(
    state: &AppState,
    key: String,
    body: crate::storage::ObjectBody,
    req: RangeRequest,
    total_size: u64,
    content_type: String,
) -> Response {
    let resolved =
        match ResolvedRange::resolve(req, total_size, state.config.delivery.chunk_size_bytes) {
            Ok(r) => r,
            Err(e) => {
                obs::inc_range_not_satisfiable();
                debug!(%key, start = req.start, total_size, "range not satisfiable");
                return (
                    StatusCode::RANGE_NOT_SATISFIABLE,
                    [(
                        header::CONTENT_RANGE,
                        range::unsatisfiable_content_range(total_size),
                    )],
                    Json(ErrorResponse {
                        error: e.error_code().to_string(),
                        message: e.to_string(),
                        status: 416,
                    }),
                )
                    .into_response();
            }
        };

    obs::inc_delivery_request("206", "stream");
    obs::add_delivery_bytes_sent(resolved.content_length());

    (
        StatusCode::PARTIAL_CONTENT,
        [
            (header::CONTENT_TYPE, content_type),
            (header::CONTENT_LENGTH, resolved.content_length().to_string()),
            (header::CONTENT_RANGE, resolved.content_range()),
            (header::ACCEPT_RANGES, "bytes".to_string()),
        ],
        Body::from_stream(range::slice_stream(key, body, resolved)),
    )
        .into_response()
}

// ---------------------------------------------------------------------------
// Listing and metadata
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct ListResponse {
    pub movies: Vec<crate::media::repository::ListedMovie>,
    pub total: usize,
    /// Entries dropped because their metadata fetch failed. The listing is
    /// best-effort by contract; this count keeps the loss observable.
    pub excluded: u64,
}

/// `GET /movies` — metadata for all stored movies.
pub async fn list_movies(State(state): State<AppState>) -> Response {
    match state.repo.list().await {
        Ok(listing) => {
            if listing.excluded > 0 {
                obs::add_list_excluded(listing.excluded);
            }
            let total = listing.movies.len();
            Json(ListResponse {
                movies: listing.movies,
                total,
                excluded: listing.excluded,
            })
            .into_response()
        }
        Err(e) => store_error_response(e),
    }
}

/// `GET /movies/{filename}/metadata` — metadata only, no payload.
pub async fn get_movie_metadata(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Response {
    match state.repo.stat(&filename).await {
        Ok(metadata) => Json(metadata).into_response(),
        Err(e) => store_error_response(e),
    }
}

// ---------------------------------------------------------------------------
// Delete
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub key: String,
    pub status: String,
}

/// `DELETE /movies/{filename}` — a repeat call returns 404, not a silent
/// success.
pub async fn delete_movie(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Response {
    match state.repo.remove(&filename).await {
        Ok(()) => {
            info!(%filename, "movie removed");
            Json(DeleteResponse {
                key: crate::media::repository::MediaRepository::movie_key(&filename),
                status: "deleted".to_string(),
            })
            .into_response()
        }
        Err(e) => store_error_response(e),
    }
}

// ---------------------------------------------------------------------------
// Health endpoints
// ---------------------------------------------------------------------------

/// `GET /metrics` — Prometheus metrics endpoint.
pub async fn metrics_handler(State(state): State<AppState>) -> Response {
    let metrics = state.metrics_handle.render();
    (
        StatusCode::OK,
        [(
            header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        metrics,
    )
        .into_response()
}

/// `GET /healthz` — Liveness probe.
pub async fn healthz(State(state): State<AppState>) -> Json<serde_json::Value> {
    let uptime = state.start_time.elapsed().as_secs();
    Json(serde_json::json!({
        "status": "healthy",
        "uptime_secs": uptime,
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// `GET /readyz` — Readiness probe: verifies the object store answers.
pub async fn readyz(State(state): State<AppState>) -> Response {
    match state.store.list("movies/").await {
        Ok(_) => Json(serde_json::json!({
            "status": "ready",
            "checks": { "storage": { "status": "ok" } },
        }))
        .into_response(),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({
                "status": "not_ready",
                "checks": { "storage": { "status": "error", "error": e.to_string() } },
            })),
        )
            .into_response(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::to_bytes;
    use axum::http::Request;
    use tower::ServiceExt;

    use crate::core::config::AppConfig;
    use crate::delivery::router;
    use crate::media::repository::MediaRepository;
    use crate::storage::memory::InMemoryObjectStore;
    use crate::storage::ObjectStore;

    use super::*;

    fn test_app() -> (axum::Router, Arc<InMemoryObjectStore>) {
        // Small chunks so range slicing crosses chunk boundaries in tests.
        let store = Arc::new(InMemoryObjectStore::with_chunk_size(4));
        let config = AppConfig::default();
        let dyn_store: Arc<dyn ObjectStore> = store.clone();
        let repo = Arc::new(MediaRepository::new(dyn_store.clone(), &config.upload));
        let state = AppState {
            repo,
            store: dyn_store,
            config,
            start_time: std::time::Instant::now(),
            metrics_handle: obs::test_metrics_handle(),
        };
        (router::build_router(state), store)
    }

    async fn body_bytes(response: Response) -> Bytes {
        to_bytes(response.into_body(), usize::MAX).await.unwrap()
    }

    fn upload_request(filename: &str, content_type: &str, body: &'static [u8]) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(format!("/movies/upload/{}", filename))
            .header("content-type", content_type)
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn test_upload_then_download_round_trip() {
        let (app, _store) = test_app();

        let response = app
            .clone()
            .oneshot(upload_request("t.mp4", "video/mp4", b"abcdefghij"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let body = body_bytes(response).await;
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed["key"], "movies/t.mp4");

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/movies/download/t.mp4")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "video/mp4"
        );
        assert_eq!(response.headers().get("content-length").unwrap(), "10");
        assert_eq!(
            response.headers().get("content-disposition").unwrap(),
            "attachment; filename=\"t.mp4\""
        );
        assert_eq!(
            response.headers().get("cache-control").unwrap(),
            "no-cache"
        );
        assert_eq!(body_bytes(response).await.as_ref(), b"abcdefghij");
    }

    #[tokio::test]
    async fn test_range_request_returns_exact_window() {
        let (app, _store) = test_app();
        app.clone()
            .oneshot(upload_request("t.mp4", "video/mp4", b"abcdefghij"))
            .await
            .unwrap();

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/movies/stream/t.mp4")
                    .header("range", "bytes=2-5")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(
            response.headers().get("content-range").unwrap(),
            "bytes 2-5/10"
        );
        assert_eq!(response.headers().get("content-length").unwrap(), "4");
        assert_eq!(response.headers().get("accept-ranges").unwrap(), "bytes");
        assert_eq!(body_bytes(response).await.as_ref(), b"cdef");
    }

    #[tokio::test]
    async fn test_stream_without_range_is_full_200() {
        let (app, _store) = test_app();
        app.clone()
            .oneshot(upload_request("t.mp4", "video/mp4", b"abcdefghij"))
            .await
            .unwrap();

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/movies/stream/t.mp4")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get("content-length").unwrap(), "10");
        assert_eq!(body_bytes(response).await.as_ref(), b"abcdefghij");
    }

    #[tokio::test]
    async fn test_range_start_beyond_size_is_416() {
        let (app, _store) = test_app();
        app.clone()
            .oneshot(upload_request("t.mp4", "video/mp4", b"abcdefghij"))
            .await
            .unwrap();

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/movies/stream/t.mp4")
                    .header("range", "bytes=100-200")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
        assert_eq!(
            response.headers().get("content-range").unwrap(),
            "bytes */10"
        );
    }

    #[tokio::test]
    async fn test_malformed_range_falls_back_to_full_transfer() {
        let (app, _store) = test_app();
        app.clone()
            .oneshot(upload_request("t.mp4", "video/mp4", b"abcdefghij"))
            .await
            .unwrap();

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/movies/stream/t.mp4")
                    .header("range", "bytes=-oops")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_bytes(response).await.as_ref(), b"abcdefghij");
    }

    #[tokio::test]
    async fn test_upload_unlisted_content_type_is_415() {
        let (app, store) = test_app();
        let response = app
            .oneshot(upload_request("doc.pdf", "application/pdf", b"%PDF"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
        assert_eq!(store.object_count().await, 0);
    }

    #[tokio::test]
    async fn test_stream_missing_movie_is_404() {
        let (app, _store) = test_app();
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/movies/stream/ghost.mp4")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_metadata_endpoint_returns_no_payload() {
        let (app, _store) = test_app();
        app.clone()
            .oneshot(upload_request(
                "t.mp4",
                "video/mp4",
                b"abcdefghij",
            ))
            .await
            .unwrap();

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/movies/t.mp4/metadata")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let parsed: serde_json::Value =
            serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(parsed["title"], "t.mp4");
        assert_eq!(parsed["size"], 10);
        assert_eq!(parsed["content_type"], "video/mp4");
    }

    #[tokio::test]
    async fn test_delete_twice_returns_404() {
        let (app, _store) = test_app();
        app.clone()
            .oneshot(upload_request("t.mp4", "video/mp4", b"abcdefghij"))
            .await
            .unwrap();

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri("/movies/t.mp4")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri("/movies/t.mp4")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_list_reports_excluded_count() {
        let (app, store) = test_app();
        app.clone()
            .oneshot(upload_request("a.mp4", "video/mp4", b"aaaa"))
            .await
            .unwrap();
        app.clone()
            .oneshot(upload_request("b.mp4", "video/mp4", b"bbbb"))
            .await
            .unwrap();
        store.poison_stat("movies/b.mp4").await;

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/movies")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let parsed: serde_json::Value =
            serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(parsed["total"], 1);
        assert_eq!(parsed["excluded"], 1);
        assert_eq!(parsed["movies"][0]["key"], "movies/a.mp4");
    }

    #[tokio::test]
    async fn test_upload_with_query_metadata() {
        let (app, _store) = test_app();
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/movies/upload/m.mp4?title=The%20Matrix&year=1999&genre=sci-fi,action")
                    .header("content-type", "video/mp4")
                    .body(Body::from(&b"payload"[..]))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/movies/m.mp4/metadata")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let parsed: serde_json::Value =
            serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(parsed["title"], "The Matrix");
        assert_eq!(parsed["year"], 1999);
        assert_eq!(parsed["genre"][0], "sci-fi");
        assert_eq!(parsed["genre"][1], "action");
    }
}
