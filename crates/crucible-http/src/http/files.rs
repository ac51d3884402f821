use axum::Json;
use axum::body::Body;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use time::OffsetDateTime;
use tokio_util::io::ReaderStream;

use crucible_core::record::{FileMeta, MAX_STAGED_FILE_BYTES};

use super::auth::require_tenant;
use super::{AppError, AppState};

pub(in crate::http) async fn upload_file(
    state: State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<FileMeta>, AppError> {
    let _tenant = require_tenant(&state, &headers)?;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| AppError::bad_request("validation", "Invalid multipart body"))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let name = field
            .file_name()
            .map(str::to_string)
            .ok_or_else(|| AppError::bad_request("validation", "Missing file name"))?;
        let declared_type = field.content_type().map(str::to_string);
        let bytes = field
            .bytes()
            .await
            .map_err(|_| AppError::bad_request("validation", "Failed to read file field"))?;
        if bytes.len() as u64 > MAX_STAGED_FILE_BYTES {
            return Err(AppError::bad_request(
                "validation",
                format!("file exceeds {MAX_STAGED_FILE_BYTES} bytes"),
            ));
        }

        let content_type = declared_type.unwrap_or_else(|| {
            mime_guess::from_path(&name)
                .first_or_octet_stream()
                .to_string()
        });

        let store = state.store.clone();
        let meta = tokio::task::spawn_blocking(move || {
            store.save_upload(&name, &content_type, &bytes)
        })
        .await??;
        return Ok(Json(meta));
    }

    Err(AppError::bad_request("validation", "Missing `file` field"))
}

#[derive(Debug, Deserialize)]
pub(in crate::http) struct DownloadQuery {
    #[serde(default)]
    payload: String,
    #[serde(default)]
    sig: String,
}

/// Signed download; no bearer auth, the signature is the authorization.
pub(in crate::http) async fn download_file(
    state: State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<DownloadQuery>,
) -> Result<Response, AppError> {
    let request_path = format!("/v1/files/{id}");
    let now = OffsetDateTime::now_utc().unix_timestamp();
    state
        .store
        .signer()
        .verify(&request_path, &query.payload, &query.sig, now)?;

    let store = state.store.clone();
    let lookup_id = id.clone();
    let found = tokio::task::spawn_blocking(move || store.open_payload(&lookup_id)).await??;
    let Some(found) = found else {
        return Err(AppError::not_found("not_found", "File not found"));
    };

    let file = tokio::fs::File::open(&found.path).await?;
    let response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, found.meta.content_type.as_str())
        .header(header::CONTENT_LENGTH, found.meta.size.to_string())
        .body(Body::from_stream(ReaderStream::new(file)))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response());
    Ok(response)
}
