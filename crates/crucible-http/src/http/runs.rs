use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::HeaderMap;

use crucible_core::record::{RunRecord, RunRequest};

use super::auth::{admit, require_tenant};
use super::{AppError, AppState};

pub(in crate::http) async fn create_run(
    state: State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<RunRequest>, JsonRejection>,
) -> Result<Json<RunRecord>, AppError> {
    let tenant = require_tenant(&state, &headers)?;
    admit(&state, &tenant)?;
    let Json(request) = payload
        .map_err(|rejection| AppError::bad_request("validation", rejection.body_text()))?;

    let record = state.orchestrator.create_run(request, &tenant.label).await?;
    Ok(Json(record))
}

pub(in crate::http) async fn get_run(
    state: State<AppState>,
    headers: HeaderMap,
    Path(run_id): Path<String>,
) -> Result<Json<RunRecord>, AppError> {
    let _tenant = require_tenant(&state, &headers)?;
    state
        .runs
        .get(&run_id)
        .map(Json)
        .ok_or_else(|| AppError::not_found("not_found", "Run not found"))
}
