use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tower_http::request_id::{
    MakeRequestUuid, PropagateRequestIdLayer, RequestId, SetRequestIdLayer,
};
use tower_http::trace::TraceLayer;

use crucible_config::Config;
use crucible_engine::orchestrator::Orchestrator;
use crucible_engine::rate_limiter::RateLimiter;
use crucible_engine::stream_hub::StreamHub;
use crucible_storage::artifact_store::ArtifactStore;
use crucible_storage::run_store::RunStore;

mod auth;
mod error;
mod files;
mod runs;
mod stream;

use error::AppError;

/// Room for a 10 MiB upload plus multipart framing.
const MAX_BODY_BYTES: usize = 12 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub orchestrator: Arc<Orchestrator>,
    pub store: Arc<ArtifactStore>,
    pub runs: Arc<RunStore>,
    pub limiter: Arc<RateLimiter>,
    pub hub: Arc<StreamHub>,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    ok: bool,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        ok: true,
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub fn router(state: AppState) -> Router {
    let request_id_header = axum::http::HeaderName::from_static("x-request-id");
    let trace_layer =
        TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
            let request_id = request
                .extensions()
                .get::<RequestId>()
                .and_then(|v| v.header_value().to_str().ok())
                .unwrap_or("-");
            tracing::info_span!(
                "http.request",
                request_id = %request_id,
                method = %request.method(),
                uri = %request.uri(),
            )
        });

    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/files", post(files::upload_file))
        .route("/v1/files/{id}", get(files::download_file))
        .route("/v1/runs", post(runs::create_run))
        .route("/v1/runs/{id}", get(runs::get_run))
        .route("/v1/runs/stream", post(stream::start_stream))
        .route("/v1/runs/{id}/stream", get(stream::subscribe))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(trace_layer)
        .layer(PropagateRequestIdLayer::new(request_id_header.clone()))
        .layer(SetRequestIdLayer::new(request_id_header, MakeRequestUuid))
        .with_state(state)
}

#[cfg(test)]
mod test_support;
