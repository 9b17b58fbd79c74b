// SPDX-FileCopyrightText: 2026 Leadbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP request handlers for the gateway REST API.
//!
//! Every authenticated handler acts on the session of the JWT subject; there
//! is no way to address another user's session or files.

use axum::{
    Extension, Json,
    extract::{Multipart, Path, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use leadbridge_core::envelope::OutboundMedia;
use leadbridge_core::types::{Conversation, Message, SessionSnapshot};
use leadbridge_core::{BridgeError, HealthStatus};
use leadbridge_whatsapp::media::content_type_for;
use serde::{Deserialize, Serialize};

use crate::auth::AuthUser;
use crate::server::GatewayState;

/// Messages returned by `GET /messages` when no `limit` is given.
pub const DEFAULT_HISTORY_LIMIT: usize = 200;
/// Upper bound on `GET /messages?limit=`.
pub const MAX_HISTORY_LIMIT: usize = 1000;

/// Request body for POST /send.
#[derive(Debug, Deserialize)]
pub struct SendRequest {
    pub phone: String,
    pub message: String,
}

/// Request body for POST /mark-read.
#[derive(Debug, Deserialize)]
pub struct MarkReadRequest {
    pub phone: String,
}

#[derive(Debug, Serialize)]
pub struct MarkReadResponse {
    /// Inbound messages that flipped to read.
    pub updated: u64,
}

#[derive(Debug, Serialize)]
pub struct DisconnectResponse {
    pub status: String,
}

/// Query string for GET /messages.
#[derive(Debug, Deserialize)]
pub struct MessagesQuery {
    pub phone: String,
    #[serde(default)]
    pub limit: Option<usize>,
}

/// Response body for GET /health.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// "ok", "degraded" or "unhealthy", from the storage check.
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error description.
    pub error: String,
}

/// A [`BridgeError`] rendered as an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub BridgeError);

impl From<BridgeError> for ApiError {
    fn from(e: BridgeError) -> Self {
        Self(e)
    }
}

/// HTTP status for a bridge error.
pub fn status_for(error: &BridgeError) -> StatusCode {
    match error {
        BridgeError::Validation(_) => StatusCode::BAD_REQUEST,
        BridgeError::NotFound(_) => StatusCode::NOT_FOUND,
        BridgeError::Connectivity { .. } => StatusCode::SERVICE_UNAVAILABLE,
        BridgeError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        BridgeError::Protocol { .. } | BridgeError::Media { .. } => StatusCode::BAD_GATEWAY,
        BridgeError::Config(_) | BridgeError::Storage { .. } | BridgeError::Internal(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %self.0, "request failed");
        } else {
            tracing::debug!(status = status.as_u16(), error = %self.0, "request rejected");
        }
        (
            status,
            Json(ErrorResponse {
                error: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

fn bad_multipart(e: impl std::fmt::Display) -> ApiError {
    ApiError(BridgeError::Validation(format!("invalid multipart body: {e}")))
}

/// GET /health
///
/// Unauthenticated liveness check backed by the storage health check.
pub async fn get_health(State(state): State<GatewayState>) -> Json<HealthResponse> {
    let status = match state.storage.health_check().await {
        Ok(HealthStatus::Healthy) => "ok",
        Ok(HealthStatus::Degraded(_)) => "degraded",
        Ok(HealthStatus::Unhealthy(_)) | Err(_) => "unhealthy",
    };
    Json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.health.start_time.elapsed().as_secs(),
    })
}

/// GET /metrics
///
/// Prometheus text exposition of the bridge counters and gauges.
pub async fn get_metrics(State(state): State<GatewayState>) -> Response {
    match &state.health.prometheus_render {
        Some(render) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            render(),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// GET /qr
///
/// Starts the caller's session if needed and waits briefly for a pairing QR.
pub async fn get_qr(
    State(state): State<GatewayState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
) -> Json<SessionSnapshot> {
    Json(state.registry.get_qr(&user_id, state.qr_timeout).await)
}

/// POST /disconnect
pub async fn post_disconnect(
    State(state): State<GatewayState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
) -> Result<Json<DisconnectResponse>, ApiError> {
    state.registry.disconnect(&user_id).await?;
    Ok(Json(DisconnectResponse {
        status: "disconnected".to_string(),
    }))
}

/// POST /send
pub async fn post_send(
    State(state): State<GatewayState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Json(body): Json<SendRequest>,
) -> Result<Json<Message>, ApiError> {
    let message = state
        .registry
        .send_text(&user_id, &body.phone, &body.message)
        .await?;
    Ok(Json(message))
}

/// POST /send-media
///
/// Multipart fields: `phone`, optional `caption`, and `file`.
pub async fn post_send_media(
    State(state): State<GatewayState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    mut multipart: Multipart,
) -> Result<Json<Message>, ApiError> {
    let mut phone = None;
    let mut caption = None;
    let mut media = None;

    while let Some(field) = multipart.next_field().await.map_err(bad_multipart)? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("phone") => phone = Some(field.text().await.map_err(bad_multipart)?),
            Some("caption") => caption = Some(field.text().await.map_err(bad_multipart)?),
            Some("file") => {
                let file_name = field.file_name().map(str::to_string);
                let mimetype = field.content_type().map(str::to_string).unwrap_or_default();
                let bytes = field.bytes().await.map_err(bad_multipart)?;
                media = Some(OutboundMedia {
                    bytes: bytes.to_vec(),
                    mimetype,
                    caption: None,
                    file_name,
                });
            }
            other => tracing::debug!(field = ?other, "ignoring multipart field"),
        }
    }

    let phone = phone.ok_or_else(|| BridgeError::Validation("missing 'phone' field".into()))?;
    let mut media = media.ok_or_else(|| BridgeError::Validation("missing 'file' field".into()))?;
    media.caption = caption;

    let message = state.registry.send_media(&user_id, &phone, media).await?;
    Ok(Json(message))
}

/// GET /messages?phone=&limit=
///
/// Stored history with one contact, oldest first.
pub async fn get_messages(
    State(state): State<GatewayState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Query(query): Query<MessagesQuery>,
) -> Result<Json<Vec<Message>>, ApiError> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .clamp(1, MAX_HISTORY_LIMIT);
    let messages = state
        .registry
        .bridge()
        .log()
        .history(&user_id, &query.phone, limit)
        .await?;
    Ok(Json(messages))
}

/// GET /conversations
pub async fn get_conversations(
    State(state): State<GatewayState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
) -> Result<Json<Vec<Conversation>>, ApiError> {
    let conversations = state.registry.bridge().conversations().list(&user_id).await?;
    Ok(Json(conversations))
}

/// POST /mark-read
pub async fn post_mark_read(
    State(state): State<GatewayState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Json(body): Json<MarkReadRequest>,
) -> Result<Json<MarkReadResponse>, ApiError> {
    let updated = state
        .registry
        .bridge()
        .log()
        .mark_read(&user_id, &body.phone)
        .await?;
    Ok(Json(MarkReadResponse { updated }))
}

/// GET /media/{owner}/{file}
///
/// Serves a stored media file. Only the caller's own files are visible.
pub async fn get_media(
    State(state): State<GatewayState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path((owner, file)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let media = state.registry.bridge().media();
    let not_found = || ApiError(BridgeError::NotFound(format!("media {owner}/{file}")));
    if !media.owned_by(&user_id, &owner) {
        return Err(not_found());
    }
    let path = media.resolve(&user_id, &file).ok_or_else(not_found)?;
    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(not_found()),
        Err(e) => {
            return Err(ApiError(BridgeError::Media {
                message: format!("cannot read {}", path.display()),
                source: Some(Box::new(e)),
            }));
        }
    };
    Ok(([(header::CONTENT_TYPE, content_type_for(&file))], bytes).into_response())
}
