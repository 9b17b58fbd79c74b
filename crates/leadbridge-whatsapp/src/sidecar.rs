// SPDX-FileCopyrightText: 2026 Leadbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Protocol connector backed by an external WhatsApp sidecar process.
//!
//! One WebSocket per session at `<sidecar_url>/sessions/<user>`. The sidecar
//! pushes `connection`, `messages` and `contacts` frames; commands sent by the
//! bridge carry a `request_id` answered by a `reply` frame. Media travels as
//! base64. Replies are routed as soon as they are read; events reach the
//! session through a relay task so a busy session never stalls the socket.
//!
//! ```text
//! -> {"type":"open","credentials":"/var/lib/leadbridge/credentials/u1"}
//! <- {"type":"connection","update":"qr","qr":"2@..."}
//! -> {"type":"send_text","request_id":"..","to":"5511987654321@s.whatsapp.net","text":"oi"}
//! <- {"type":"reply","request_id":"..","ok":true,"id":"3EB0..."}
//! ```

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use leadbridge_config::model::WhatsAppConfig;
use leadbridge_core::envelope::{
    CloseReason, ContactRecord, ConnectionUpdate, OutboundMedia, ProtocolEvent, RawMessage, UpsertKind,
};
use leadbridge_core::types::{AdapterType, HealthStatus};
use leadbridge_core::{Adapter, BridgeError, ProtocolClient, ProtocolConnector};
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, warn};

use crate::media::sanitize;

type Pending = Arc<DashMap<String, oneshot::Sender<Reply>>>;

/// Upper bound for the WebSocket handshake with the sidecar.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ServerFrame {
    Connection {
        update: String,
        #[serde(default)]
        qr: Option<String>,
        #[serde(default)]
        status_code: Option<u16>,
    },
    Messages {
        #[serde(default)]
        kind: Option<String>,
        messages: Vec<RawMessage>,
    },
    Contacts {
        contacts: Vec<ContactRecord>,
    },
    Reply(Reply),
}

#[derive(Debug, Deserialize)]
struct Reply {
    request_id: String,
    #[serde(default)]
    ok: bool,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    data: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Command<'a> {
    Open {
        credentials: &'a str,
    },
    SendText {
        request_id: &'a str,
        to: &'a str,
        text: &'a str,
    },
    SendMedia {
        request_id: &'a str,
        to: &'a str,
        data: String,
        mimetype: &'a str,
        caption: Option<&'a str>,
        file_name: Option<&'a str>,
    },
    Download {
        request_id: &'a str,
        message: &'a RawMessage,
    },
    Logout {
        request_id: &'a str,
    },
}

fn encode(command: &Command<'_>) -> Result<String, BridgeError> {
    serde_json::to_string(command).map_err(|e| BridgeError::Internal(format!("cannot encode sidecar command: {e}")))
}

impl ServerFrame {
    fn into_event(self) -> Option<ProtocolEvent> {
        match self {
            ServerFrame::Connection { update, qr, status_code } => {
                let update = match (update.as_str(), qr) {
                    ("qr", Some(qr)) => ConnectionUpdate::Qr(qr),
                    ("open", _) => ConnectionUpdate::Open,
                    ("close", _) => ConnectionUpdate::Close(CloseReason::from_status_code(status_code)),
                    (other, _) => {
                        warn!(update = other, "unknown connection update from sidecar");
                        return None;
                    }
                };
                Some(ProtocolEvent::Connection(update))
            }
            ServerFrame::Messages { kind, messages } => {
                let kind = match kind.as_deref() {
                    Some("history") | Some("append") => UpsertKind::History,
                    _ => UpsertKind::Notify,
                };
                Some(ProtocolEvent::Messages { kind, messages })
            }
            ServerFrame::Contacts { contacts } => Some(ProtocolEvent::Contacts(contacts)),
            ServerFrame::Reply(_) => None,
        }
    }
}

/// Opens one sidecar WebSocket per session.
pub struct SidecarConnector {
    base_url: String,
    request_timeout: Duration,
    connect_timeout: Duration,
}

impl SidecarConnector {
    pub fn new(base_url: impl Into<String>, request_timeout: Duration) -> Self {
        Self {
            base_url: base_url.into(),
            request_timeout,
            connect_timeout: CONNECT_TIMEOUT,
        }
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    pub fn from_config(config: &WhatsAppConfig) -> Self {
        Self::new(
            config.sidecar_url.clone(),
            Duration::from_secs(config.media_download_timeout_secs),
        )
    }
}

#[async_trait]
impl Adapter for SidecarConnector {
    fn name(&self) -> &str {
        "sidecar"
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
        Ok(())
    }
}

#[async_trait]
impl ProtocolConnector for SidecarConnector {
    async fn connect(
        &self,
        user_id: &str,
        credentials_dir: &Path,
        events: mpsc::Sender<ProtocolEvent>,
    ) -> Result<Arc<dyn ProtocolClient>, BridgeError> {
        let url = format!("{}/sessions/{}", self.base_url.trim_end_matches('/'), sanitize(user_id));
        let (ws, _) = tokio::time::timeout(self.connect_timeout, connect_async(url.as_str()))
            .await
            .map_err(|_| {
                warn!(user_id, url = %url, timeout = ?self.connect_timeout, "sidecar handshake timed out");
                BridgeError::Timeout {
                    duration: self.connect_timeout,
                }
            })?
            .map_err(|e| BridgeError::Protocol {
                message: format!("cannot reach sidecar at {url}"),
                source: Some(Box::new(e)),
            })?;
        debug!(user_id, url = %url, "sidecar connected");

        let (commands, command_rx) = mpsc::channel(64);
        let credentials = credentials_dir.display().to_string();
        commands
            .send(encode(&Command::Open { credentials: &credentials })?)
            .await
            .map_err(|_| BridgeError::not_connected("sidecar connection closed"))?;

        let pending: Pending = Arc::new(DashMap::new());
        tokio::spawn(pump(user_id.to_string(), ws, command_rx, events, Arc::clone(&pending)));

        Ok(Arc::new(SidecarClient {
            commands,
            pending,
            timeout: self.request_timeout,
        }))
    }
}

/// Moves frames between the socket and the session until either side ends.
async fn pump(
    user_id: String,
    mut ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
    mut commands: mpsc::Receiver<String>,
    events: mpsc::Sender<ProtocolEvent>,
    pending: Pending,
) {
    let (relay, relay_rx) = mpsc::unbounded_channel();
    tokio::spawn(forward(user_id.clone(), relay_rx, events));

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(frame) => {
                    if let Err(e) = ws.send(WsMessage::text(frame)).await {
                        warn!(user_id = %user_id, error = %e, "sidecar write failed");
                        break;
                    }
                }
                None => {
                    let _ = ws.close(None).await;
                    break;
                }
            },
            frame = ws.next() => match frame {
                Some(Ok(WsMessage::Text(text))) => {
                    if !dispatch(&user_id, text.as_str(), &relay, &pending) {
                        break;
                    }
                }
                Some(Ok(WsMessage::Ping(data))) => {
                    let _ = ws.send(WsMessage::Pong(data)).await;
                }
                Some(Ok(WsMessage::Close(frame))) => {
                    info!(user_id = %user_id, ?frame, "sidecar closed the session socket");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(user_id = %user_id, error = %e, "sidecar read failed");
                    break;
                }
                None => break,
            },
        }
    }
    // Waiting requests fail once their reply senders are dropped.
    pending.clear();
    debug!(user_id = %user_id, "sidecar pump stopped");
}

/// Hands relayed events to the session in arrival order. The session channel
/// closes once the pump is gone and the backlog is delivered.
async fn forward(
    user_id: String,
    mut relay: mpsc::UnboundedReceiver<ProtocolEvent>,
    events: mpsc::Sender<ProtocolEvent>,
) {
    while let Some(event) = relay.recv().await {
        if events.send(event).await.is_err() {
            debug!(user_id = %user_id, "session stopped listening");
            break;
        }
    }
}

/// Route one server frame. Returns false when the session stopped listening.
fn dispatch(
    user_id: &str,
    text: &str,
    relay: &mpsc::UnboundedSender<ProtocolEvent>,
    pending: &Pending,
) -> bool {
    let frame = match serde_json::from_str::<ServerFrame>(text) {
        Ok(frame) => frame,
        Err(e) => {
            warn!(user_id, error = %e, "unparseable sidecar frame");
            return true;
        }
    };
    if let ServerFrame::Reply(reply) = frame {
        match pending.remove(&reply.request_id) {
            Some((_, tx)) => {
                let _ = tx.send(reply);
            }
            None => debug!(user_id, request_id = %reply.request_id, "reply for unknown request"),
        }
        return true;
    }
    match frame.into_event() {
        Some(event) => relay.send(event).is_ok(),
        None => true,
    }
}

/// Command side of one sidecar session.
pub struct SidecarClient {
    commands: mpsc::Sender<String>,
    pending: Pending,
    timeout: Duration,
}

impl SidecarClient {
    async fn request(&self, request_id: String, frame: String) -> Result<Reply, BridgeError> {
        let (tx, rx) = oneshot::channel();
        self.pending.insert(request_id.clone(), tx);
        if self.commands.send(frame).await.is_err() {
            self.pending.remove(&request_id);
            return Err(BridgeError::not_connected("sidecar connection is closed"));
        }

        let reply = match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(_)) => return Err(BridgeError::not_connected("sidecar connection closed before replying")),
            Err(_) => {
                self.pending.remove(&request_id);
                return Err(BridgeError::Timeout { duration: self.timeout });
            }
        };
        if !reply.ok {
            return Err(BridgeError::protocol(
                reply.error.unwrap_or_else(|| "sidecar rejected the request".into()),
            ));
        }
        Ok(reply)
    }

    fn request_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

#[async_trait]
impl ProtocolClient for SidecarClient {
    async fn send_text(&self, address: &str, text: &str) -> Result<Option<String>, BridgeError> {
        let request_id = Self::request_id();
        let frame = encode(&Command::SendText {
            request_id: &request_id,
            to: address,
            text,
        })?;
        Ok(self.request(request_id, frame).await?.id)
    }

    async fn send_media(&self, address: &str, media: &OutboundMedia) -> Result<Option<String>, BridgeError> {
        let request_id = Self::request_id();
        let frame = encode(&Command::SendMedia {
            request_id: &request_id,
            to: address,
            data: STANDARD.encode(&media.bytes),
            mimetype: &media.mimetype,
            caption: media.caption.as_deref(),
            file_name: media.file_name.as_deref(),
        })?;
        Ok(self.request(request_id, frame).await?.id)
    }

    async fn download_media(&self, message: &RawMessage) -> Result<Vec<u8>, BridgeError> {
        let request_id = Self::request_id();
        let frame = encode(&Command::Download {
            request_id: &request_id,
            message,
        })?;
        let data = self.request(request_id, frame).await?.data.unwrap_or_default();
        STANDARD.decode(data.as_bytes()).map_err(|e| BridgeError::Media {
            message: "sidecar returned invalid base64 media".into(),
            source: Some(Box::new(e)),
        })
    }

    async fn logout(&self) -> Result<(), BridgeError> {
        let request_id = Self::request_id();
        let frame = encode(&Command::Logout { request_id: &request_id })?;
        self.request(request_id, frame).await.map(|_| ())
    }
}
