// SPDX-FileCopyrightText: 2026 Leadbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock protocol connector for deterministic testing.
//!
//! `MockConnector` keeps the event sender of each user's latest connection so
//! tests can inject lifecycle and message events. Every session shares one
//! `MockClient`, which captures sends and serves registered media bytes.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc};

use leadbridge_core::envelope::{
    CloseReason, ConnectionUpdate, OutboundMedia, ProtocolEvent, RawMessage, UpsertKind,
};
use leadbridge_core::types::{AdapterType, HealthStatus};
use leadbridge_core::{Adapter, BridgeError, ProtocolClient, ProtocolConnector};

/// One captured outbound send.
#[derive(Debug, Clone)]
pub struct SentMessage {
    pub id: String,
    pub address: String,
    pub text: Option<String>,
    pub media: Option<OutboundMedia>,
}

pub struct MockClient {
    sent: Mutex<Vec<SentMessage>>,
    media: Mutex<HashMap<String, Vec<u8>>>,
    logged_out: AtomicBool,
    next_id: AtomicU64,
}

impl MockClient {
    fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            media: Mutex::new(HashMap::new()),
            logged_out: AtomicBool::new(false),
            next_id: AtomicU64::new(1),
        }
    }

    pub async fn sent_messages(&self) -> Vec<SentMessage> {
        self.sent.lock().await.clone()
    }

    pub async fn sent_count(&self) -> usize {
        self.sent.lock().await.len()
    }

    /// Bytes served by `download_media` for the message with this id.
    pub async fn register_media(&self, message_id: &str, bytes: Vec<u8>) {
        self.media.lock().await.insert(message_id.to_string(), bytes);
    }

    pub fn logged_out(&self) -> bool {
        self.logged_out.load(Ordering::SeqCst)
    }

    fn assign_id(&self) -> String {
        format!("MOCK{}", self.next_id.fetch_add(1, Ordering::SeqCst))
    }
}

#[async_trait]
impl ProtocolClient for MockClient {
    async fn send_text(&self, address: &str, text: &str) -> Result<Option<String>, BridgeError> {
        let id = self.assign_id();
        self.sent.lock().await.push(SentMessage {
            id: id.clone(),
            address: address.to_string(),
            text: Some(text.to_string()),
            media: None,
        });
        Ok(Some(id))
    }

    async fn send_media(&self, address: &str, media: &OutboundMedia) -> Result<Option<String>, BridgeError> {
        let id = self.assign_id();
        self.sent.lock().await.push(SentMessage {
            id: id.clone(),
            address: address.to_string(),
            text: media.caption.clone(),
            media: Some(media.clone()),
        });
        Ok(Some(id))
    }

    async fn download_media(&self, message: &RawMessage) -> Result<Vec<u8>, BridgeError> {
        let id = message.key.id.as_deref().unwrap_or_default();
        self.media
            .lock()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| BridgeError::protocol(format!("no media registered for {id}")))
    }

    async fn logout(&self) -> Result<(), BridgeError> {
        self.logged_out.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// A protocol connector driven entirely by the test.
pub struct MockConnector {
    client: Arc<MockClient>,
    senders: Mutex<HashMap<String, mpsc::Sender<ProtocolEvent>>>,
    credential_dirs: Mutex<HashMap<String, PathBuf>>,
    connects: AtomicUsize,
    auto_open: AtomicBool,
    fail_connect: AtomicBool,
}

impl MockConnector {
    pub fn new() -> Self {
        Self {
            client: Arc::new(MockClient::new()),
            senders: Mutex::new(HashMap::new()),
            credential_dirs: Mutex::new(HashMap::new()),
            connects: AtomicUsize::new(0),
            auto_open: AtomicBool::new(false),
            fail_connect: AtomicBool::new(false),
        }
    }

    /// Report every new connection as open right away.
    pub fn with_auto_open(self) -> Self {
        self.auto_open.store(true, Ordering::SeqCst);
        self
    }

    /// Make subsequent connect attempts fail.
    pub fn set_fail_connect(&self, fail: bool) {
        self.fail_connect.store(fail, Ordering::SeqCst);
    }

    pub fn client(&self) -> &Arc<MockClient> {
        &self.client
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub async fn credentials_dir(&self, user_id: &str) -> Option<PathBuf> {
        self.credential_dirs.lock().await.get(user_id).cloned()
    }

    /// Push an event into the user's live connection.
    pub async fn inject(&self, user_id: &str, event: ProtocolEvent) -> Result<(), BridgeError> {
        let tx = self
            .senders
            .lock()
            .await
            .get(user_id)
            .cloned()
            .ok_or_else(|| BridgeError::not_connected(format!("no mock connection for {user_id}")))?;
        tx.send(event)
            .await
            .map_err(|_| BridgeError::not_connected(format!("session worker for {user_id} is gone")))
    }

    pub async fn issue_qr(&self, user_id: &str, qr: &str) -> Result<(), BridgeError> {
        self.inject(user_id, ProtocolEvent::Connection(ConnectionUpdate::Qr(qr.to_string())))
            .await
    }

    pub async fn open(&self, user_id: &str) -> Result<(), BridgeError> {
        self.inject(user_id, ProtocolEvent::Connection(ConnectionUpdate::Open))
            .await
    }

    pub async fn close(&self, user_id: &str, reason: CloseReason) -> Result<(), BridgeError> {
        self.inject(user_id, ProtocolEvent::Connection(ConnectionUpdate::Close(reason)))
            .await
    }

    pub async fn deliver(&self, user_id: &str, messages: Vec<RawMessage>) -> Result<(), BridgeError> {
        self.inject(
            user_id,
            ProtocolEvent::Messages {
                kind: UpsertKind::Notify,
                messages,
            },
        )
        .await
    }

    /// Drop the user's event sender, as a connector does when the link dies.
    pub async fn hang_up(&self, user_id: &str) {
        self.senders.lock().await.remove(user_id);
    }
}

impl Default for MockConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Adapter for MockConnector {
    fn name(&self) -> &str {
        "mock-protocol"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Protocol
    }

    async fn health_check(&self) -> Result<HealthStatus, BridgeError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), BridgeError> {
        self.senders.lock().await.clear();
        Ok(())
    }
}

#[async_trait]
impl ProtocolConnector for MockConnector {
    async fn connect(
        &self,
        user_id: &str,
        credentials_dir: &Path,
        events: mpsc::Sender<ProtocolEvent>,
    ) -> Result<Arc<dyn ProtocolClient>, BridgeError> {
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(BridgeError::protocol("mock connect failure"));
        }
        if self.auto_open.load(Ordering::SeqCst) {
            events
                .send(ProtocolEvent::Connection(ConnectionUpdate::Open))
                .await
                .map_err(|_| BridgeError::Internal("event channel closed".into()))?;
        }
        self.credential_dirs
            .lock()
            .await
            .insert(user_id.to_string(), credentials_dir.to_path_buf());
        self.senders.lock().await.insert(user_id.to_string(), events);
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(self.client.clone())
    }
}
