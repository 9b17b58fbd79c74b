// SPDX-FileCopyrightText: 2026 Leadbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-user WhatsApp sessions.
//!
//! The [`SessionRegistry`] is built once at startup and shared by handle.
//! Each session owns one bounded event channel drained by a single worker
//! task, so events for a user are handled one at a time in arrival order.
//! Workers are tagged with a connection epoch; events from a superseded
//! connection are dropped.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use leadbridge_config::model::WhatsAppConfig;
use leadbridge_core::envelope::{OutboundMedia, ProtocolEvent};
use leadbridge_core::types::{MediaKind, SessionSnapshot};
use leadbridge_core::{BridgeError, Direction, Message, ProtocolClient, ProtocolConnector};
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::bridge::{Bridge, IngestOutcome, local_message_id};
use crate::identity::phone_address;
use crate::media::sanitize;
use crate::normalize::placeholder;
use crate::phone::normalize;
use crate::recording;
use crate::state::{SessionState, Transition};

struct SessionHandle {
    user_id: String,
    state: Mutex<SessionState>,
    client: Mutex<Option<Arc<dyn ProtocolClient>>>,
    reconnecting: AtomicBool,
    epoch: AtomicU64,
    cancel: CancellationToken,
}

impl SessionHandle {
    fn new(user_id: &str, cancel: CancellationToken) -> Self {
        Self {
            user_id: user_id.to_string(),
            state: Mutex::new(SessionState::default()),
            client: Mutex::new(None),
            reconnecting: AtomicBool::new(false),
            epoch: AtomicU64::new(0),
            cancel,
        }
    }

    fn is_reconnecting(&self) -> bool {
        self.reconnecting.load(Ordering::SeqCst)
    }

    async fn snapshot(&self) -> SessionSnapshot {
        self.state.lock().await.snapshot(self.is_reconnecting())
    }
}

/// Clears the reconnect flag when the attempt ends, including on panic or cancellation.
struct ReconnectGuard(Arc<SessionHandle>);

impl Drop for ReconnectGuard {
    fn drop(&mut self) {
        self.0.reconnecting.store(false, Ordering::SeqCst);
    }
}

pub struct SessionRegistry {
    connector: Arc<dyn ProtocolConnector>,
    bridge: Arc<Bridge>,
    config: WhatsAppConfig,
    sessions: DashMap<String, Arc<SessionHandle>>,
    shutdown: CancellationToken,
}

impl SessionRegistry {
    pub fn new(connector: Arc<dyn ProtocolConnector>, bridge: Arc<Bridge>, config: WhatsAppConfig) -> Arc<Self> {
        Arc::new(Self {
            connector,
            bridge,
            config,
            sessions: DashMap::new(),
            shutdown: CancellationToken::new(),
        })
    }

    pub fn bridge(&self) -> &Arc<Bridge> {
        &self.bridge
    }

    pub fn credentials_dir(&self, user_id: &str) -> PathBuf {
        Path::new(&self.config.data_dir)
            .join("credentials")
            .join(sanitize(user_id))
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    fn session(&self, user_id: &str) -> Arc<SessionHandle> {
        let handle = self
            .sessions
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(SessionHandle::new(user_id, self.shutdown.child_token())))
            .clone();
        recording::set_active_sessions(self.sessions.len());
        handle
    }

    /// Current state without creating a session.
    pub async fn status(&self, user_id: &str) -> SessionSnapshot {
        let handle = self.sessions.get(user_id).map(|h| Arc::clone(h.value()));
        match handle {
            Some(handle) => handle.snapshot().await,
            None => SessionState::default().snapshot(false),
        }
    }

    /// Start connecting unless a connection or reconnect is already under way.
    async fn ensure_started(self: &Arc<Self>, handle: &Arc<SessionHandle>) {
        if handle.is_reconnecting() {
            return;
        }
        if handle.state.lock().await.begin_connect() {
            self.spawn_connect(Arc::clone(handle));
        }
    }

    fn spawn_connect(self: &Arc<Self>, handle: Arc<SessionHandle>) {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            registry.connect(&handle).await;
        });
    }

    /// Open a protocol client for a session already moved to `connecting`.
    async fn connect(self: &Arc<Self>, handle: &Arc<SessionHandle>) {
        let epoch = handle.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        let user_id = handle.user_id.as_str();
        let dir = self.credentials_dir(user_id);
        if let Err(e) = tokio::fs::create_dir_all(&dir).await {
            error!(user_id, error = %e, dir = %dir.display(), "cannot create credentials directory");
            handle.state.lock().await.mark_disconnected();
            return;
        }

        let (tx, rx) = mpsc::channel(self.config.event_buffer);
        info!(user_id, epoch, "connecting WhatsApp session");
        match self.connector.connect(user_id, &dir, tx).await {
            Ok(client) if handle.cancel.is_cancelled() => {
                debug!(user_id, "session removed while connecting");
                drop(client);
            }
            Ok(client) => {
                *handle.client.lock().await = Some(Arc::clone(&client));
                let registry = Arc::clone(self);
                let handle = Arc::clone(handle);
                tokio::spawn(async move {
                    registry.run_worker(handle, epoch, client, rx).await;
                });
            }
            Err(e) => {
                warn!(user_id, error = %e, "connect attempt failed");
                handle.state.lock().await.mark_disconnected();
            }
        }
    }

    async fn run_worker(
        self: Arc<Self>,
        handle: Arc<SessionHandle>,
        epoch: u64,
        client: Arc<dyn ProtocolClient>,
        mut events: mpsc::Receiver<ProtocolEvent>,
    ) {
        loop {
            let event = tokio::select! {
                _ = handle.cancel.cancelled() => break,
                event = events.recv() => event,
            };
            if handle.epoch.load(Ordering::SeqCst) != epoch {
                debug!(user_id = %handle.user_id, epoch, "stale connection worker exiting");
                break;
            }
            let Some(event) = event else {
                if handle.state.lock().await.mark_disconnected() {
                    warn!(user_id = %handle.user_id, "protocol event stream ended");
                    handle.client.lock().await.take();
                    self.schedule_reconnect(&handle);
                }
                break;
            };
            self.handle_event(&handle, client.as_ref(), event).await;
        }
        debug!(user_id = %handle.user_id, epoch, "session worker stopped");
    }

    async fn handle_event(self: &Arc<Self>, handle: &Arc<SessionHandle>, client: &dyn ProtocolClient, event: ProtocolEvent) {
        let user_id = handle.user_id.as_str();
        match event {
            ProtocolEvent::Connection(update) => {
                let transition = handle.state.lock().await.apply(&update);
                match transition {
                    Transition::QrIssued => info!(user_id, "pairing QR issued"),
                    Transition::Opened => {
                        info!(user_id, "WhatsApp session connected");
                        if let Err(e) = self.bridge.log().warm(user_id).await {
                            warn!(user_id, error = %e, "message cache warm-up failed");
                        }
                    }
                    Transition::Closed(reason) => {
                        handle.client.lock().await.take();
                        warn!(user_id, ?reason, "WhatsApp connection closed");
                        if reason.is_logged_out() {
                            self.wipe_credentials(user_id).await;
                        }
                        self.schedule_reconnect(handle);
                    }
                    Transition::Ignored => debug!(user_id, ?update, "connection update ignored"),
                }
            }
            ProtocolEvent::Messages { kind, messages } => {
                for raw in &messages {
                    match self.bridge.ingest(user_id, client, raw, kind).await {
                        Ok(IngestOutcome::Stored(message)) => {
                            debug!(user_id, message_id = %message.id, direction = %message.direction, "message ingested");
                        }
                        Ok(IngestOutcome::Skipped(reason)) => trace!(user_id, ?reason, "message skipped"),
                        Err(e) => warn!(user_id, error = %e, "message ingestion failed"),
                    }
                }
            }
            ProtocolEvent::Contacts(records) => {
                let learned = self.bridge.identity().learn(&records);
                debug!(user_id, records = records.len(), learned, "contact metadata received");
            }
        }
    }

    /// Schedule one reconnect after the configured delay. A reconnect already
    /// pending for this session absorbs the request.
    fn schedule_reconnect(self: &Arc<Self>, handle: &Arc<SessionHandle>) {
        if handle.cancel.is_cancelled() {
            return;
        }
        if handle.reconnecting.swap(true, Ordering::SeqCst) {
            debug!(user_id = %handle.user_id, "reconnect already scheduled");
            return;
        }
        let registry = Arc::clone(self);
        let guard = ReconnectGuard(Arc::clone(handle));
        let delay = Duration::from_secs(self.config.reconnect_delay_secs);
        tokio::spawn(async move {
            let handle = Arc::clone(&guard.0);
            tokio::select! {
                _ = handle.cancel.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
            if handle.state.lock().await.begin_connect() {
                info!(user_id = %handle.user_id, "reconnecting WhatsApp session");
                registry.connect(&handle).await;
            }
            drop(guard);
        });
    }

    async fn wipe_credentials(&self, user_id: &str) {
        let dir = self.credentials_dir(user_id);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => info!(user_id, "credentials wiped"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(user_id, error = %e, dir = %dir.display(), "credential wipe failed"),
        }
    }

    /// Session state for pairing. Connected sessions and cached QR codes are
    /// returned at once; otherwise polls until a QR appears, the session
    /// connects, or `wait` elapses.
    pub async fn get_qr(self: &Arc<Self>, user_id: &str, wait: Duration) -> SessionSnapshot {
        let handle = self.session(user_id);
        {
            let state = handle.state.lock().await;
            if state.is_connected() || state.qr().is_some() {
                return state.snapshot(handle.is_reconnecting());
            }
        }

        self.ensure_started(&handle).await;
        let interval = Duration::from_millis(self.config.qr_poll_interval_ms);
        let poll = async {
            loop {
                {
                    let state = handle.state.lock().await;
                    if state.is_connected() || state.qr().is_some() {
                        return state.snapshot(handle.is_reconnecting());
                    }
                }
                tokio::time::sleep(interval).await;
            }
        };
        match tokio::time::timeout(wait, poll).await {
            Ok(snapshot) => snapshot,
            Err(_) => {
                debug!(user_id, ?wait, "no QR yet");
                handle.snapshot().await
            }
        }
    }

    /// Client of a connected session, waiting up to the send window for it.
    async fn wait_connected(self: &Arc<Self>, handle: &Arc<SessionHandle>) -> Result<Arc<dyn ProtocolClient>, BridgeError> {
        self.ensure_started(handle).await;
        let wait = Duration::from_secs(self.config.send_wait_secs);
        let interval = Duration::from_millis(self.config.qr_poll_interval_ms);
        let poll = async {
            loop {
                if handle.state.lock().await.is_connected()
                    && let Some(client) = handle.client.lock().await.clone()
                {
                    return client;
                }
                tokio::time::sleep(interval).await;
            }
        };
        tokio::time::timeout(wait, poll).await.map_err(|_| {
            BridgeError::not_connected(format!(
                "WhatsApp session for {} did not connect within {wait:?}",
                handle.user_id
            ))
        })
    }

    fn destination(&self, phone: &str) -> Result<String, BridgeError> {
        let digits = normalize(phone);
        if !self.bridge.matcher().is_phone_shaped(&digits) {
            return Err(BridgeError::Validation(format!("'{phone}' is not a phone number")));
        }
        Ok(self.bridge.matcher().format_for_send(&digits))
    }

    /// Sent messages are recorded best-effort; the send itself already happened.
    async fn record_outbound(&self, message: &Message) {
        if let Err(e) = self.bridge.publish(message, None, true).await {
            error!(user_id = %message.user_id, message_id = %message.id, error = %e, "sent message could not be recorded");
        }
    }

    pub async fn send_text(self: &Arc<Self>, user_id: &str, phone: &str, text: &str) -> Result<Message, BridgeError> {
        if text.trim().is_empty() {
            return Err(BridgeError::Validation("message text is empty".into()));
        }
        let phone = self.destination(phone)?;
        let handle = self.session(user_id);
        let client = self.wait_connected(&handle).await?;

        let id = client.send_text(&phone_address(&phone), text).await?;
        let message = Message {
            id: id.filter(|id| !id.is_empty()).unwrap_or_else(local_message_id),
            user_id: user_id.to_string(),
            phone,
            text: text.to_string(),
            media_url: None,
            media_type: None,
            direction: Direction::Out,
            occurred_at: Utc::now(),
            is_read: true,
        };
        self.record_outbound(&message).await;
        info!(user_id, message_id = %message.id, "text message sent");
        Ok(message)
    }

    pub async fn send_media(
        self: &Arc<Self>,
        user_id: &str,
        phone: &str,
        media: OutboundMedia,
    ) -> Result<Message, BridgeError> {
        if media.bytes.is_empty() {
            return Err(BridgeError::Validation("media file is empty".into()));
        }
        let phone = self.destination(phone)?;
        let handle = self.session(user_id);
        let client = self.wait_connected(&handle).await?;

        let id = client
            .send_media(&phone_address(&phone), &media)
            .await?
            .filter(|id| !id.is_empty())
            .unwrap_or_else(local_message_id);
        let kind = MediaKind::from_mimetype(&media.mimetype);
        let mimetype = Some(media.mimetype.as_str()).filter(|m| !m.trim().is_empty());
        let media_url = match self.bridge.media().save(user_id, &id, &media.bytes, mimetype).await {
            Ok(url) => Some(url),
            Err(e) => {
                warn!(user_id, message_id = %id, error = %e, "sent media could not be stored locally");
                None
            }
        };

        let message = Message {
            id,
            user_id: user_id.to_string(),
            phone,
            text: media
                .caption
                .filter(|c| !c.trim().is_empty())
                .unwrap_or_else(|| placeholder(kind).to_string()),
            media_url,
            media_type: Some(kind.to_string()),
            direction: Direction::Out,
            occurred_at: Utc::now(),
            is_read: true,
        };
        self.record_outbound(&message).await;
        info!(user_id, message_id = %message.id, kind = %kind, "media message sent");
        Ok(message)
    }

    /// Log out, drop the session and wipe its credentials and media.
    pub async fn disconnect(&self, user_id: &str) -> Result<(), BridgeError> {
        if let Some((_, handle)) = self.sessions.remove(user_id) {
            let client = handle.client.lock().await.take();
            if let Some(client) = client
                && let Err(e) = client.logout().await
            {
                warn!(user_id, error = %e, "logout failed, tearing down anyway");
            }
            handle.cancel.cancel();
            handle.state.lock().await.mark_disconnected();
            recording::set_active_sessions(self.sessions.len());
        }
        self.bridge.log().forget(user_id);
        self.wipe_credentials(user_id).await;
        self.bridge.media().wipe(user_id).await?;
        info!(user_id, "session disconnected");
        Ok(())
    }

    /// Stop every session, keeping credentials so they resume on restart.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        let count = self.sessions.len();
        self.sessions.clear();
        recording::set_active_sessions(0);
        info!(sessions = count, "session registry shut down");
    }
}
