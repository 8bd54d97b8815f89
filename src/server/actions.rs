use axum::http::StatusCode;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::models::{HistoryRecord, HistoryResponse, ServerRequest, ServerResponse};
use super::state::ServerState;
use crate::data::{self, DataAttachment};
use crate::dispatch::{Event, InputSource};
use crate::session::SessionContext;

#[derive(Debug)]
pub(crate) struct ServerError {
    pub(crate) status: StatusCode,
    pub(crate) message: String,
}

impl ServerError {
    pub(crate) fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub(crate) fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    pub(crate) fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl From<anyhow::Error> for ServerError {
    fn from(err: anyhow::Error) -> Self {
        ServerError::internal(err.to_string())
    }
}

/// Runs one user action against its session and shapes the reply. A
/// blank or missing session id starts a fresh session; the reply always
/// carries the id so the client can keep it.
pub(crate) async fn apply_event(
    state: &ServerState,
    session_id: Option<&str>,
    event: Event,
) -> Result<ServerResponse, ServerError> {
    let (id, context) = resolve_session(state, session_id);
    let mut guard = context.lock().await;
    let render = state.presenter.handle(&mut guard, event).await?;
    Ok(ServerResponse::from_render(id, render))
}

pub(crate) fn resolve_session(
    state: &ServerState,
    requested: Option<&str>,
) -> (String, Arc<Mutex<SessionContext>>) {
    let id = match requested.map(str::trim).filter(|value| !value.is_empty()) {
        Some(id) => id.to_string(),
        None => state.sessions.create(),
    };
    let context = state.sessions.obtain(&id);
    (id, context)
}

pub(crate) fn attachment_from_request(
    request: &ServerRequest,
) -> Result<DataAttachment, ServerError> {
    let Some(encoded) = request.data_base64.as_deref() else {
        return Err(ServerError::bad_request("data_base64 is required"));
    };
    let bytes = BASE64
        .decode(encoded.trim())
        .map_err(|err| ServerError::bad_request(format!("invalid data_base64: {}", err)))?;
    let mime_hint = request
        .data_mime
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty());
    data::load_attachment_from_bytes(bytes, mime_hint, request.data_name.as_deref())
        .map_err(|err| ServerError::bad_request(err.to_string()))
}

pub(crate) fn text_from_request(request: &ServerRequest) -> Result<String, ServerError> {
    match request.text.clone() {
        Some(text) => Ok(text),
        None => Err(ServerError::bad_request("text is required")),
    }
}

/// Which input path a translate request names. Anything unrecognized
/// falls back to the typed-text path.
pub(crate) fn input_source(request: &ServerRequest) -> InputSource {
    match request.source.as_deref().map(str::trim) {
        Some("speech") => InputSource::Speech,
        Some("file") => InputSource::File,
        _ => InputSource::Text,
    }
}

pub(crate) async fn history(
    state: &ServerState,
    session_id: &str,
) -> Result<HistoryResponse, ServerError> {
    let (id, context) = resolve_session(state, Some(session_id));
    let guard = context.lock().await;
    let records = guard.history.iter().map(HistoryRecord::from).collect();
    Ok(HistoryResponse {
        session: id,
        records,
    })
}

pub(crate) async fn transcript(
    state: &ServerState,
    session_id: &str,
) -> Result<String, ServerError> {
    let (_, context) = resolve_session(state, Some(session_id));
    let guard = context.lock().await;
    if guard.history.is_empty() {
        return Err(ServerError::not_found("no translation history yet"));
    }
    Ok(guard.transcript())
}

pub(crate) async fn audio_bytes(
    state: &ServerState,
    session_id: &str,
    audio_id: &str,
) -> Result<Vec<u8>, ServerError> {
    let Some(context) = state.sessions.get(session_id.trim()) else {
        return Err(ServerError::not_found("unknown session"));
    };
    let guard = context.lock().await;
    let Some(path) = guard.audio.get(audio_id) else {
        return Err(ServerError::not_found("unknown audio clip"));
    };
    std::fs::read(path)
        .map_err(|err| ServerError::internal(format!("failed to read audio clip: {}", err)))
}

pub(crate) fn required_session(request_session: Option<&str>) -> Result<&str, ServerError> {
    match request_session.map(str::trim).filter(|value| !value.is_empty()) {
        Some(id) => Ok(id),
        None => Err(ServerError::bad_request("session is required")),
    }
}
