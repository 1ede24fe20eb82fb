// REST API for chronicles, files and compositions

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::composition::CompositionView;
use crate::db::schema::{ChronicleRecord, FileRecord};
use crate::error::{AdmissionError, ServiceError};
use crate::orchestrator::{ChronicleInput, Orchestrator};
use crate::page::{Page, PageParams};
use crate::types::{ChronicleId, CompositionId, FileId};

pub type AppState = Arc<Orchestrator>;

/// Error response with a `{"detail": ...}` body.
#[derive(Debug)]
pub struct ApiError(ServiceError);

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        Self(err)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            ServiceError::Admission(AdmissionError::ChronicleNotFound(_)) => StatusCode::NOT_FOUND,
            ServiceError::Admission(AdmissionError::AudioFileCount { .. }) => StatusCode::CONFLICT,
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::Conflict(_) => StatusCode::CONFLICT,
            ServiceError::Forbidden(_) => StatusCode::FORBIDDEN,
            ServiceError::Invalid(_) | ServiceError::Media(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ServiceError::UnsupportedMedia(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ServiceError::Storage(_) | ServiceError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self.0);
        }
        (status, Json(json!({ "detail": self.0.to_string() }))).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

pub fn create_router(state: AppState) -> Router {
    let uploads_dir = state.uploads().dir().to_path_buf();
    let uploads_prefix = state.config().uploads.url_prefix.clone();
    let max_upload_bytes = state.config().uploads.max_upload_bytes;

    Router::new()
        .route("/health", get(health_check))
        .route(
            "/api/chronicles",
            get(list_chronicles).post(create_chronicle),
        )
        .route(
            "/api/chronicles/{id}",
            get(get_chronicle)
                .put(update_chronicle)
                .delete(delete_chronicle),
        )
        .route(
            "/api/chronicles/{id}/files",
            get(list_files).post(upload_file),
        )
        .route(
            "/api/chronicles/{id}/files/{file_id}",
            get(get_file).delete(delete_file),
        )
        .route(
            "/api/chronicles/{id}/compositions",
            get(list_compositions).post(request_composition),
        )
        .route(
            "/api/chronicles/{id}/compositions/{composition_id}",
            get(get_composition).delete(delete_composition),
        )
        .nest_service(&uploads_prefix, ServeDir::new(uploads_dir))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn create_chronicle(
    State(state): State<AppState>,
    Json(input): Json<ChronicleInput>,
) -> ApiResult<(StatusCode, Json<ChronicleRecord>)> {
    let chronicle = state.create_chronicle(input).await?;
    Ok((StatusCode::CREATED, Json(chronicle)))
}

async fn list_chronicles(
    State(state): State<AppState>,
    Query(page): Query<PageParams>,
) -> ApiResult<Json<Page<ChronicleRecord>>> {
    Ok(Json(state.list_chronicles(page).await?))
}

async fn get_chronicle(
    State(state): State<AppState>,
    Path(id): Path<ChronicleId>,
) -> ApiResult<Json<ChronicleRecord>> {
    Ok(Json(state.get_chronicle(&id).await?))
}

async fn update_chronicle(
    State(state): State<AppState>,
    Path(id): Path<ChronicleId>,
    Json(input): Json<ChronicleInput>,
) -> ApiResult<Json<ChronicleRecord>> {
    Ok(Json(state.update_chronicle(&id, input).await?))
}

async fn delete_chronicle(
    State(state): State<AppState>,
    Path(id): Path<ChronicleId>,
) -> ApiResult<StatusCode> {
    state.delete_chronicle(&id).await?;
    Ok(StatusCode::OK)
}

/// The request body is the raw file; its type comes from `Content-Type`.
async fn upload_file(
    State(state): State<AppState>,
    Path(id): Path<ChronicleId>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<FileRecord>)> {
    let mime = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ServiceError::Invalid("Content-Type header is required".to_string()))?;

    let file = state.upload_file(&id, mime, &body).await?;
    Ok((StatusCode::CREATED, Json(file)))
}

async fn list_files(
    State(state): State<AppState>,
    Path(id): Path<ChronicleId>,
    Query(page): Query<PageParams>,
) -> ApiResult<Json<Page<FileRecord>>> {
    Ok(Json(state.list_files(&id, page).await?))
}

async fn get_file(
    State(state): State<AppState>,
    Path((id, file_id)): Path<(ChronicleId, FileId)>,
) -> ApiResult<Json<FileRecord>> {
    Ok(Json(state.get_file(&id, &file_id).await?))
}

async fn delete_file(
    State(state): State<AppState>,
    Path((id, file_id)): Path<(ChronicleId, FileId)>,
) -> ApiResult<StatusCode> {
    state.delete_file(&id, &file_id).await?;
    Ok(StatusCode::OK)
}

/// Accept a generation request; the composition is produced in the
/// background.
async fn request_composition(
    State(state): State<AppState>,
    Path(id): Path<ChronicleId>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let composition_id = state.request_generation(&id).await?;
    Ok((StatusCode::ACCEPTED, Json(json!({ "id": composition_id }))))
}

async fn list_compositions(
    State(state): State<AppState>,
    Path(id): Path<ChronicleId>,
    Query(page): Query<PageParams>,
) -> ApiResult<Json<Page<CompositionView>>> {
    Ok(Json(state.list_compositions(&id, page).await?))
}

async fn get_composition(
    State(state): State<AppState>,
    Path((id, composition_id)): Path<(ChronicleId, CompositionId)>,
) -> ApiResult<Json<CompositionView>> {
    Ok(Json(state.get_composition(&id, &composition_id).await?))
}

async fn delete_composition(
    State(state): State<AppState>,
    Path((id, composition_id)): Path<(ChronicleId, CompositionId)>,
) -> ApiResult<StatusCode> {
    state.delete_composition(&id, &composition_id).await?;
    Ok(StatusCode::OK)
}
