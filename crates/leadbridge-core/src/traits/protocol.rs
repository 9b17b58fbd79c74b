// SPDX-FileCopyrightText: 2026 Leadbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Protocol client capability consumed by the bridge.
//!
//! The WhatsApp multi-device protocol (framing, encryption, pairing) lives
//! outside this workspace. A connector opens one client per user and pushes
//! every lifecycle and message event into the channel it is handed.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::envelope::{OutboundMedia, ProtocolEvent, RawMessage};
use crate::error::BridgeError;
use crate::traits::adapter::Adapter;

/// A live, per-user protocol connection.
#[async_trait]
pub trait ProtocolClient: Send + Sync {
    /// Sends a text message. Returns the protocol-assigned id when known.
    async fn send_text(&self, address: &str, text: &str) -> Result<Option<String>, BridgeError>;

    /// Uploads and sends a media message. Returns the protocol-assigned id when known.
    async fn send_media(
        &self,
        address: &str,
        media: &OutboundMedia,
    ) -> Result<Option<String>, BridgeError>;

    /// Downloads and decrypts the media referenced by a received message.
    async fn download_media(&self, message: &RawMessage) -> Result<Vec<u8>, BridgeError>;

    /// Invalidates the credentials on the remote side.
    async fn logout(&self) -> Result<(), BridgeError>;
}

/// Opens protocol clients.
///
/// Events must be sent in arrival order. When the connection ends for good
/// the connector drops its sender, which ends the session's worker loop.
#[async_trait]
pub trait ProtocolConnector: Adapter {
    async fn connect(
        &self,
        user_id: &str,
        credentials_dir: &Path,
        events: mpsc::Sender<ProtocolEvent>,
    ) -> Result<Arc<dyn ProtocolClient>, BridgeError>;
}
