// SPDX-FileCopyrightText: 2026 Leadbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Server-Sent Events stream of a user's live messages.
//!
//! Each connection owns one hub subscription. The subscription lives inside
//! the response stream, so a client going away drops it and unsubscribes.

use std::convert::Infallible;

use axum::{
    Extension,
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::{self, Stream};

use crate::auth::AuthUser;
use crate::server::GatewayState;

/// `GET /stream`: one `message` event per live inbound or outbound message.
pub async fn get_stream(
    State(state): State<GatewayState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let subscription = state.registry.bridge().hub().subscribe(&user_id);
    tracing::info!(user_id = %user_id, "message stream opened");

    let events = stream::unfold(subscription, |mut subscription| async move {
        let message = subscription.recv().await?;
        let event = match Event::default().event("message").json_data(&message) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(message_id = %message.id, error = %e, "message not serializable for stream");
                Event::default().comment("dropped message")
            }
        };
        Some((Ok(event), subscription))
    });

    Sse::new(events).keep_alive(KeepAlive::default())
}
