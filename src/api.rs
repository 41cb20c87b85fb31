//! HTTP API endpoints: login, room listing, image upload and log export.

use axum::{
    extract::{ConnectInfo, Multipart, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;

use crate::error::{ChatError, ErrorKind};
use crate::state::access::LoginResponse;
use crate::state::AppState;
use crate::storage::ImageMeta;
use crate::types::{normalize_ip, RoomId, RoomSummary};

/// Upload size limit for chat images
pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

/// Error body returned by every endpoint
#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub error: String,
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::PermissionDenied | ErrorKind::Banned => StatusCode::FORBIDDEN,
        ErrorKind::Unauthenticated => StatusCode::UNAUTHORIZED,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<ChatError> for ApiError {
    fn from(e: ChatError) -> Self {
        Self::new(status_for(e.kind()), e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ApiErrorBody {
                error: self.message,
            }),
        )
            .into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
}

#[derive(Debug, Deserialize)]
pub struct AdminLoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LogoutRequest {
    pub session: String,
}

#[derive(Debug, Deserialize)]
pub struct SessionQuery {
    pub session: Option<String>,
}

impl SessionQuery {
    fn require(self) -> Result<String, ApiError> {
        self.session
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ChatError::Unauthenticated.into())
    }
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub url: String,
}

/// POST /api/login
pub async fn login(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let ip = normalize_ip(addr.ip());
    Ok(Json(state.login(&req.username, &ip).await?))
}

/// POST /api/admin/login
pub async fn admin_login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AdminLoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    Ok(Json(state.admin_login(&req.username, &req.password).await?))
}

/// POST /api/logout
pub async fn logout(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LogoutRequest>,
) -> StatusCode {
    state.logout(&req.session).await;
    StatusCode::NO_CONTENT
}

/// GET /api/rooms
pub async fn list_rooms(State(state): State<Arc<AppState>>) -> Json<Vec<RoomSummary>> {
    Json(state.list_public().await)
}

/// POST /api/rooms/{room_id}/images?session=
///
/// Multipart form with a single `image` field.
pub async fn upload_image(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Path(room_id): Path<RoomId>,
    Query(query): Query<SessionQuery>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let session = query.require()?;
    let ip = normalize_ip(addr.ip());

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::new(StatusCode::BAD_REQUEST, e.body_text()))?
    {
        if field.name() != Some("image") {
            continue;
        }

        let content_type = field.content_type().unwrap_or_default().to_string();
        if !content_type.starts_with("image/") {
            return Err(ApiError::new(
                StatusCode::BAD_REQUEST,
                "Only image files are allowed.",
            ));
        }
        let meta = ImageMeta {
            content_type,
            file_name: field.file_name().map(str::to_string),
        };

        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::new(StatusCode::BAD_REQUEST, e.body_text()))?;
        if bytes.len() > MAX_IMAGE_BYTES {
            return Err(ApiError::new(
                StatusCode::PAYLOAD_TOO_LARGE,
                "Image is too large (max 5 MB).",
            ));
        }

        let url = state
            .upload_image(&session, &ip, &room_id, &bytes, &meta)
            .await?;
        return Ok(Json(UploadResponse { url }));
    }

    Err(ApiError::new(StatusCode::BAD_REQUEST, "No image uploaded."))
}

/// Keep log file names to a safe character set
pub fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// GET /api/admin/rooms/{room_id}/log?session=
///
/// Downloads the room's log as pretty-printed JSON.
pub async fn download_room_log(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<RoomId>,
    Query(query): Query<SessionQuery>,
) -> Result<Response, ApiError> {
    let session = query.require()?;
    let (name, logs) = state.admin_room_log(&session, &room_id).await?;

    let body = serde_json::to_string_pretty(&logs).map_err(|e| {
        tracing::error!("Log export failed: {}", e);
        ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "Log export failed")
    })?;
    let disposition = format!(
        "attachment; filename=\"log_{}_{}.json\"",
        sanitize_file_name(&name),
        room_id
    );

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/json".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    )
        .into_response())
}
