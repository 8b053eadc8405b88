//! Control API handlers. Each maps onto one registry operation.

use std::path::PathBuf;

use axum::Json;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::AppState;
use crate::hub::{FileRegistry, FileView, HubError, LogEntry};

/// Error body: `{"error": "..."}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<HubError> for ApiError {
    fn from(e: HubError) -> Self {
        let status = match &e {
            HubError::AlreadyRegistered { .. } => StatusCode::CONFLICT,
            HubError::NotRegistered { .. } => StatusCode::NOT_FOUND,
            HubError::ShutDown => StatusCode::SERVICE_UNAVAILABLE,
            HubError::Io { .. } | HubError::Render(_) | HubError::Watch(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
        };
        Self {
            status,
            message: e.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Serialize, Deserialize)]
pub struct WatchRequest {
    pub path: String,
    #[serde(default)]
    pub active: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct PathQuery {
    path: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RemovedCount {
    pub removed: usize,
}

fn absolute_path(raw: Option<&str>) -> ApiResult<PathBuf> {
    let raw = raw
        .map(str::trim)
        .filter(|raw| !raw.is_empty())
        .ok_or_else(|| ApiError::bad_request("missing path"))?;
    let path = PathBuf::from(raw);
    if !path.is_absolute() {
        return Err(ApiError::bad_request(format!("path must be absolute: {raw}")));
    }
    Ok(path)
}

/// Registry calls stat and render files under the registry lock, so they
/// run on the blocking pool.
async fn blocking<T, F>(registry: &FileRegistry, op: F) -> ApiResult<T>
where
    F: FnOnce(&FileRegistry) -> Result<T, HubError> + Send + 'static,
    T: Send + 'static,
{
    let registry = registry.clone();
    tokio::task::spawn_blocking(move || op(&registry))
        .await
        .map_err(|e| ApiError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: format!("registry task failed: {e}"),
        })?
        .map_err(ApiError::from)
}

pub async fn watch(
    State(state): State<AppState>,
    Json(request): Json<WatchRequest>,
) -> ApiResult<Json<FileView>> {
    let path = absolute_path(Some(&request.path))?;
    let active = request.active.unwrap_or(true);

    let view = blocking(&state.registry, move |registry| registry.register(&path, active)).await?;
    Ok(Json(view))
}

pub async fn remove(
    State(state): State<AppState>,
    Query(query): Query<PathQuery>,
) -> ApiResult<StatusCode> {
    let path = absolute_path(query.path.as_deref())?;
    blocking(&state.registry, move |registry| registry.remove(&path)).await?;
    Ok(StatusCode::OK)
}

pub async fn files(State(state): State<AppState>) -> Json<Vec<FileView>> {
    Json(state.registry.files())
}

pub async fn activate(
    State(state): State<AppState>,
    Query(query): Query<PathQuery>,
) -> ApiResult<StatusCode> {
    let path = absolute_path(query.path.as_deref())?;
    blocking(&state.registry, move |registry| registry.activate(&path)).await?;
    Ok(StatusCode::OK)
}

pub async fn deactivate(
    State(state): State<AppState>,
    Query(query): Query<PathQuery>,
) -> ApiResult<StatusCode> {
    let path = absolute_path(query.path.as_deref())?;
    blocking(&state.registry, move |registry| registry.deactivate(&path)).await?;
    Ok(StatusCode::OK)
}

pub async fn remove_deleted(State(state): State<AppState>) -> ApiResult<Json<RemovedCount>> {
    let removed = blocking(&state.registry, |registry| {
        Ok(registry.remove_all_deleted())
    })
    .await?;
    Ok(Json(RemovedCount { removed }))
}

pub async fn logs(State(state): State<AppState>) -> Json<Vec<LogEntry>> {
    Json(state.registry.logs())
}

pub async fn shutdown(State(state): State<AppState>) -> &'static str {
    crate::log_event!("server", "shutdown requested");
    state.shutdown.cancel();
    "shutting down"
}
