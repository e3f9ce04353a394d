use crate::error::ApiError;
use crate::page;
use crate::state::AppState;
use crate::store::SharedSession;
use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use inference::DetectionError;
use session::{SessionSnapshot, decode_upload};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};
use tracing::Instrument;

const UPLOAD_FIELD: &str = "file";

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/sessions", post(create_session))
        .route("/sessions/:id", get(get_session).delete(delete_session))
        .route(
            "/sessions/:id/upload",
            post(upload).layer(DefaultBodyLimit::max(state.settings.max_upload_bytes)),
        )
        .route("/sessions/:id/detect", post(detect))
        .route("/sessions/:id/reset", post(reset))
        .route("/sessions/:id/image", get(input_image))
        .route("/sessions/:id/annotated", get(annotated_image));

    Router::new()
        .route("/", get(page::index))
        .route("/health", get(health))
        .nest("/api", api)
        .nest_service("/assets", ServeDir::new(&state.settings.assets_dir))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

async fn create_session(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<SessionSnapshot>), ApiError> {
    let session = state.sessions.create().await?;
    let snapshot = session.lock().await.snapshot();
    Ok((StatusCode::CREATED, Json(snapshot)))
}

async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionSnapshot>, ApiError> {
    let session = state.sessions.get(&id).await?;
    let mut session = session.lock().await;
    session.touch();
    Ok(Json(session.snapshot()))
}

async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.sessions.remove(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[tracing::instrument(skip(state, multipart))]
async fn upload(
    State(state): State<AppState>,
    Path(id): Path<String>,
    mut multipart: Multipart,
) -> Result<Json<SessionSnapshot>, ApiError> {
    let session = state.sessions.get(&id).await?;

    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        let bytes = field.bytes().await?;
        tracing::debug!(file_name = %file_name, bytes = bytes.len(), "Received upload");

        let decoded = tokio::task::spawn_blocking(move || decode_upload(&file_name, &bytes))
            .await
            .map_err(|e| ApiError::Internal(format!("decode task failed: {}", e)))?;

        let mut session = session.lock().await;
        session.apply_upload(decoded)?;
        return Ok(Json(session.snapshot()));
    }

    Err(ApiError::BadRequest(format!(
        "multipart field `{}` is missing",
        UPLOAD_FIELD
    )))
}

/// Detection runs in its own task, so the session always leaves `Detecting`
/// even when the client goes away mid-request.
#[tracing::instrument(skip(state))]
async fn detect(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionSnapshot>, ApiError> {
    let session = state.sessions.get(&id).await?;
    let snapshot = tokio::spawn(run_detection(state, session).in_current_span())
        .await
        .map_err(|e| ApiError::Internal(format!("detection task failed: {}", e)))??;
    Ok(Json(snapshot))
}

/// The session lock is held for the whole call so interactions on one
/// session stay sequential.
async fn run_detection(
    state: AppState,
    session: SharedSession,
) -> Result<SessionSnapshot, ApiError> {
    let mut session = session.lock().await;
    let image = session.begin_detection()?;

    let detector = Arc::clone(&state.detector);
    let slot = Arc::clone(&state.detector_slot);
    let target_size = state.settings.input_size;
    let forward_pass = async move {
        let permit = slot
            .acquire_owned()
            .await
            .map_err(|e| DetectionError::Aborted(e.to_string()))?;
        let outcome = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            detector.predict(&image, target_size)
        })
        .await
        .map_err(|e| DetectionError::Aborted(e.to_string()))?;
        Ok::<_, DetectionError>(outcome)
    };

    match tokio::time::timeout(state.settings.detect_timeout(), forward_pass).await {
        Ok(Ok(outcome)) => session.finish_detection(outcome)?,
        Ok(Err(reason)) => return Err(session.abandon_detection(reason).into()),
        // A forward pass already started keeps its worker and the slot until
        // it completes. Its result is dropped.
        Err(_) => {
            let reason = DetectionError::Timeout(state.settings.detect_timeout_secs);
            return Err(session.abandon_detection(reason).into());
        }
    }

    Ok(session.snapshot())
}

async fn reset(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionSnapshot>, ApiError> {
    let session = state.sessions.get(&id).await?;
    let mut session = session.lock().await;
    session.reset();
    Ok(Json(session.snapshot()))
}

async fn input_image(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let session = state.sessions.get(&id).await?;
    let png = session.lock().await.input_png()?;
    png_response(png)
}

async fn annotated_image(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let session = state.sessions.get(&id).await?;
    let png = session.lock().await.annotated_png()?;
    png_response(png)
}

fn png_response(png: Option<Vec<u8>>) -> Result<Response, ApiError> {
    let png = png.ok_or(ApiError::ImageNotFound)?;
    Ok((
        [
            (header::CONTENT_TYPE, "image/png"),
            (header::CACHE_CONTROL, "no-store"),
        ],
        png,
    )
        .into_response())
}
