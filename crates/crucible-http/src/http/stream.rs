use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::Response;
use serde::Serialize;

use crucible_core::record::RunRequest;
use crucible_engine::stream_hub::{Frame, StreamHub};

use super::auth::{admit, require_tenant};
use super::{AppError, AppState};

#[derive(Debug, Serialize)]
pub(in crate::http) struct StartStreamResponse {
    id: String,
    status: &'static str,
    hint: String,
}

/// Admit and validate like the synchronous path, but return the run id at
/// once; the pipeline runs in the background feeding the stream hub.
pub(in crate::http) async fn start_stream(
    state: State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<RunRequest>, JsonRejection>,
) -> Result<Json<StartStreamResponse>, AppError> {
    let tenant = require_tenant(&state, &headers)?;
    admit(&state, &tenant)?;
    let Json(request) = payload
        .map_err(|rejection| AppError::bad_request("validation", rejection.body_text()))?;

    let run_id = state.orchestrator.submit_streaming(request, &tenant.label)?;
    let hint = format!("/v1/runs/{run_id}/stream");
    Ok(Json(StartStreamResponse {
        id: run_id,
        status: "starting",
        hint,
    }))
}

pub(in crate::http) async fn subscribe(
    state: State<AppState>,
    headers: HeaderMap,
    Path(run_id): Path<String>,
    ws: WebSocketUpgrade,
) -> Result<Response, AppError> {
    let _tenant = require_tenant(&state, &headers)?;
    let hub = state.hub.clone();
    Ok(ws.on_upgrade(move |socket| handle_stream_socket(hub, run_id, socket)))
}

/// Pump hub frames to the subscriber as JSON text messages. Frames emitted
/// before this attach are gone (no replay buffer); the socket closes right
/// after the terminal frame.
async fn handle_stream_socket(hub: Arc<StreamHub>, run_id: String, mut socket: WebSocket) {
    let mut rx = hub.attach(&run_id);

    loop {
        tokio::select! {
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(_)) => break,
                }
            }
            frame = rx.recv() => {
                let Some(frame) = frame else { break };
                let terminal = matches!(frame, Frame::Complete { .. } | Frame::Error { .. });
                let payload = match serde_json::to_string(&frame) {
                    Ok(payload) => payload,
                    Err(_) => continue,
                };
                if socket.send(Message::Text(payload.into())).await.is_err() {
                    break;
                }
                if terminal {
                    break;
                }
            }
        }
    }

    let _ = socket.send(Message::Close(None)).await;
}
