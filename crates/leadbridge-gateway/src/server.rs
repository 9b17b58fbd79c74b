// SPDX-FileCopyrightText: 2026 Leadbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Gateway HTTP server built on axum.
//!
//! Sets up routes, middleware, and shared state for the gateway.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware as axum_middleware,
    routing::{get, post},
};
use leadbridge_core::BridgeError;
use leadbridge_core::traits::Adapter;
use leadbridge_whatsapp::SessionRegistry;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::auth::{AuthConfig, auth_middleware};
use crate::handlers;
use crate::sse;

/// Largest accepted request body; bounds multipart uploads.
pub const MAX_BODY_BYTES: usize = 64 * 1024 * 1024;

/// Health state for the unauthenticated health and metrics endpoints.
#[derive(Clone)]
pub struct HealthState {
    /// Process start time for uptime calculation.
    pub start_time: std::time::Instant,
    /// Prometheus text renderer; `/metrics` answers 404 without one.
    pub prometheus_render: Option<Arc<dyn Fn() -> String + Send + Sync>>,
}

/// Shared state for axum request handlers.
#[derive(Clone)]
pub struct GatewayState {
    pub registry: Arc<SessionRegistry>,
    /// Storage backend, consulted by `/health`.
    pub storage: Arc<dyn Adapter>,
    pub auth: AuthConfig,
    pub health: HealthState,
    /// How long `GET /qr` waits for a QR code or connection.
    pub qr_timeout: Duration,
}

/// Gateway server configuration (mirrors the `[server]` config section).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Build the gateway router.
///
/// - `GET /health` and `GET /metrics` are public.
/// - Everything else requires a bearer JWT (or `?token=` for `EventSource`
///   and `<img>` consumers of `/stream` and `/media`).
pub fn router(state: GatewayState) -> Router {
    let auth_state = state.auth.clone();

    let public_routes = Router::new()
        .route("/health", get(handlers::get_health))
        .route("/metrics", get(handlers::get_metrics))
        .with_state(state.clone());

    let api_routes = Router::new()
        .route("/qr", get(handlers::get_qr))
        .route("/disconnect", post(handlers::post_disconnect))
        .route("/send", post(handlers::post_send))
        .route("/send-media", post(handlers::post_send_media))
        .route("/messages", get(handlers::get_messages))
        .route("/conversations", get(handlers::get_conversations))
        .route("/mark-read", post(handlers::post_mark_read))
        .route("/stream", get(sse::get_stream))
        .route("/media/{owner}/{file}", get(handlers::get_media))
        .route_layer(axum_middleware::from_fn_with_state(
            auth_state,
            auth_middleware,
        ))
        .with_state(state);

    Router::new()
        .merge(public_routes)
        .merge(api_routes)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Bind and serve the gateway until `cancel` fires.
pub async fn start_server(
    config: &ServerConfig,
    state: GatewayState,
    cancel: CancellationToken,
) -> Result<(), BridgeError> {
    let app = router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| BridgeError::Connectivity {
            message: format!("failed to bind gateway to {addr}: {e}"),
        })?;

    tracing::info!("Gateway server listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .map_err(|e| BridgeError::Internal(format!("gateway server error: {e}")))?;

    tracing::info!("Gateway server stopped");
    Ok(())
}
