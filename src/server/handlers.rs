use anyhow::{Context, Result};
use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, HeaderValue, Method, Request, Response, StatusCode};
use axum::middleware::Next;
use axum::response::{Html, IntoResponse};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use std::sync::Arc;
use tera::{Context as TeraContext, Tera};
use tracing::info;

use super::actions::{self, ServerError};
use super::models::{ErrorResponse, HistoryResponse, ServerRequest, ServerResponse, SessionResponse};
use super::state::ServerState;
use crate::dispatch::Event;
use crate::settings::Settings;

const INDEX_TEMPLATE: &str = include_str!("templates/index.html.tera");

type ApiError = (StatusCode, Json<ErrorResponse>);

pub async fn run_server(settings: Settings, addr: String) -> Result<()> {
    let state = Arc::new(ServerState::new(settings)?);
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| "failed to bind server address")?;
    info!("listening on http://{}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/settings", get(settings_info))
        .route("/session", post(create_session))
        .route("/session/:id", delete(remove_session))
        .route("/capture", post(capture))
        .route("/upload", post(upload))
        .route("/text", post(enter_text))
        .route("/translate", post(translate))
        .route("/history", get(history))
        .route("/history/download", get(download_history))
        .route("/audio/:id", get(audio))
        .with_state(state)
        .layer(axum::middleware::from_fn(cors_middleware))
}

pub(crate) fn render_index() -> Result<String> {
    let mut context = TeraContext::new();
    context.insert("api_base_json", &serde_json::to_string("")?);
    context.insert("version", env!("CARGO_PKG_VERSION"));
    Tera::one_off(INDEX_TEMPLATE, &context, false)
        .with_context(|| "failed to render index template")
}

async fn index(State(state): State<Arc<ServerState>>) -> Html<String> {
    Html(state.index_html.clone())
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

async fn cors_middleware(req: Request<Body>, next: Next) -> Result<Response<Body>, StatusCode> {
    if req.method() == Method::OPTIONS {
        let mut response = Response::new(Body::empty());
        *response.status_mut() = StatusCode::NO_CONTENT;
        apply_cors_headers(response.headers_mut());
        return Ok(response);
    }
    let mut response = next.run(req).await;
    apply_cors_headers(response.headers_mut());
    Ok(response)
}

fn apply_cors_headers(headers: &mut HeaderMap) {
    headers.insert("access-control-allow-origin", HeaderValue::from_static("*"));
    headers.insert(
        "access-control-allow-methods",
        HeaderValue::from_static("GET,POST,DELETE,OPTIONS"),
    );
    headers.insert(
        "access-control-allow-headers",
        HeaderValue::from_static("content-type,authorization"),
    );
}

#[derive(serde::Serialize)]
struct SettingsInfo {
    languages: Vec<LanguageOption>,
    capture_seconds: u64,
}

#[derive(serde::Serialize)]
struct LanguageOption {
    value: String,
    label: String,
}

async fn settings_info(State(state): State<Arc<ServerState>>) -> Json<SettingsInfo> {
    let languages = state
        .presenter
        .registry()
        .entries()
        .into_iter()
        .map(|(code, name)| LanguageOption {
            value: code,
            label: name,
        })
        .collect();
    Json(SettingsInfo {
        languages,
        capture_seconds: state.settings.capture_seconds,
    })
}

async fn create_session(State(state): State<Arc<ServerState>>) -> Json<SessionResponse> {
    Json(SessionResponse {
        session: state.sessions.create(),
    })
}

async fn remove_session(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if state.sessions.remove(id.trim()) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(reject(ServerError::not_found("unknown session")))
    }
}

async fn capture(
    State(state): State<Arc<ServerState>>,
    Json(payload): Json<ServerRequest>,
) -> Result<Json<ServerResponse>, ApiError> {
    dispatch_event(state, payload.session, Event::CaptureSpeech).await
}

async fn upload(
    State(state): State<Arc<ServerState>>,
    Json(payload): Json<ServerRequest>,
) -> Result<Json<ServerResponse>, ApiError> {
    let attachment = actions::attachment_from_request(&payload).map_err(reject)?;
    dispatch_event(state, payload.session, Event::UploadDocument { attachment }).await
}

async fn enter_text(
    State(state): State<Arc<ServerState>>,
    Json(payload): Json<ServerRequest>,
) -> Result<Json<ServerResponse>, ApiError> {
    let text = actions::text_from_request(&payload).map_err(reject)?;
    dispatch_event(state, payload.session, Event::EnterText { text }).await
}

async fn translate(
    State(state): State<Arc<ServerState>>,
    Json(payload): Json<ServerRequest>,
) -> Result<Json<ServerResponse>, ApiError> {
    // Missing text or languages fall through to the presenter warning
    // rather than a request error.
    let source = actions::input_source(&payload);
    let text = payload.text.clone().unwrap_or_default();
    let languages = payload.languages.clone().unwrap_or_default();
    dispatch_event(
        state,
        payload.session,
        Event::Translate {
            source,
            text,
            languages,
        },
    )
    .await
}

/// Event handlers shell out to ffmpeg, pdftotext and tesseract, so they
/// run on the blocking pool like any other blocking work.
async fn dispatch_event(
    state: Arc<ServerState>,
    session: Option<String>,
    event: Event,
) -> Result<Json<ServerResponse>, ApiError> {
    let handle = tokio::runtime::Handle::current();
    let result = tokio::task::spawn_blocking(move || {
        handle.block_on(actions::apply_event(
            state.as_ref(),
            session.as_deref(),
            event,
        ))
    })
    .await
    .map_err(|err| reject(ServerError::internal(format!("server task failed: {}", err))))?;

    match result {
        Ok(response) => Ok(Json(response)),
        Err(err) => Err(reject(err)),
    }
}

#[derive(serde::Deserialize)]
struct SessionQuery {
    session: Option<String>,
}

async fn history(
    State(state): State<Arc<ServerState>>,
    Query(query): Query<SessionQuery>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let session = actions::required_session(query.session.as_deref()).map_err(reject)?;
    let response = actions::history(state.as_ref(), session)
        .await
        .map_err(reject)?;
    Ok(Json(response))
}

async fn download_history(
    State(state): State<Arc<ServerState>>,
    Query(query): Query<SessionQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let session = actions::required_session(query.session.as_deref()).map_err(reject)?;
    let transcript = actions::transcript(state.as_ref(), session)
        .await
        .map_err(reject)?;
    let headers = [
        (
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        ),
        (
            header::CONTENT_DISPOSITION,
            HeaderValue::from_static("attachment; filename=\"translation_history.txt\""),
        ),
    ];
    Ok((headers, transcript))
}

#[derive(serde::Deserialize)]
struct AudioQuery {
    session: Option<String>,
    download: Option<u8>,
}

async fn audio(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
    Query(query): Query<AudioQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let session = actions::required_session(query.session.as_deref()).map_err(reject)?;
    let bytes = actions::audio_bytes(state.as_ref(), session, &id)
        .await
        .map_err(reject)?;
    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("audio/mpeg"));
    if query.download == Some(1) {
        headers.insert(
            header::CONTENT_DISPOSITION,
            HeaderValue::from_static("attachment; filename=\"translated_audio.mp3\""),
        );
    }
    Ok((headers, bytes))
}

fn reject(err: ServerError) -> ApiError {
    (err.status, Json(ErrorResponse { error: err.message }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> Arc<ServerState> {
        Arc::new(ServerState::new(Settings::default()).unwrap())
    }

    #[test]
    fn index_template_renders() {
        let html = render_index().unwrap();
        assert!(html.contains("<html"));
        assert!(html.contains("const API_BASE"));
    }

    #[tokio::test]
    async fn sessions_can_be_created_and_removed() {
        let state = state();
        let Json(created) = create_session(State(state.clone())).await;
        assert_eq!(
            remove_session(State(state.clone()), Path(created.session.clone()))
                .await
                .unwrap(),
            StatusCode::NO_CONTENT
        );
        let err = remove_session(State(state), Path(created.session))
            .await
            .unwrap_err();
        assert_eq!(err.0, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn settings_report_the_language_table() {
        let Json(info) = settings_info(State(state())).await;
        assert!(info.languages.iter().any(|option| option.value == "fr"));
        assert_eq!(info.capture_seconds, 5);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn empty_text_events_round_trip() {
        let state = state();
        let Json(response) = enter_text(
            State(state),
            Json(ServerRequest {
                text: Some(String::new()),
                ..ServerRequest::default()
            }),
        )
        .await
        .unwrap();
        assert!(!response.session.is_empty());
        assert_eq!(response.source_text.as_deref(), Some(""));
        assert_eq!(response.detected_language, None);
    }

    #[tokio::test]
    async fn history_requires_a_session() {
        let err = history(
            State(state()),
            Query(SessionQuery { session: None }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn transcripts_404_until_something_was_translated() {
        let state = state();
        let id = state.sessions.create();
        let err = download_history(
            State(state),
            Query(SessionQuery { session: Some(id) }),
        )
        .await
        .err();
        assert_eq!(err.map(|(status, _)| status), Some(StatusCode::NOT_FOUND));
    }

    #[tokio::test]
    async fn unknown_audio_clips_404() {
        let state = state();
        let id = state.sessions.create();
        let err = audio(
            State(state),
            Path("deadbeef".to_string()),
            Query(AudioQuery {
                session: Some(id),
                download: None,
            }),
        )
        .await
        .err();
        assert_eq!(err.map(|(status, _)| status), Some(StatusCode::NOT_FOUND));
    }
}
