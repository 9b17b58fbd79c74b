// SPDX-FileCopyrightText: 2026 Leadbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Raw event shapes emitted by the WhatsApp protocol client.
//!
//! These mirror the protocol's own JSON envelope (camelCase keys, nested
//! wrapper messages) so a sidecar can forward records without translation.
//! Nothing here is normalized; see the bridge's normalizer for that.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Addressing part of a protocol message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageKey {
    /// Chat address: `<digits>@s.whatsapp.net`, `<digits>@lid`, `<id>@g.us`, ...
    pub remote_jid: String,
    #[serde(default)]
    pub from_me: bool,
    #[serde(default)]
    pub id: Option<String>,
    /// Sender inside multi-recipient contexts.
    #[serde(default)]
    pub participant: Option<String>,
    /// Phone-bearing address attached by the protocol to LID-addressed messages.
    #[serde(default)]
    pub remote_jid_alt: Option<String>,
}

/// One message as delivered in an upsert or history-sync batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawMessage {
    pub key: MessageKey,
    #[serde(default)]
    pub message: Option<MessageContent>,
    #[serde(default)]
    pub push_name: Option<String>,
    /// Unix seconds.
    #[serde(default)]
    pub message_timestamp: Option<i64>,
}

/// Text-bearing payload (`extendedTextMessage`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextPayload {
    #[serde(default)]
    pub text: Option<String>,
}

/// Media payload; download coordinates are kept opaque in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaPayload {
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub mimetype: Option<String>,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ButtonsResponse {
    #[serde(default)]
    pub selected_display_text: Option<String>,
    #[serde(default)]
    pub selected_button_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SingleSelectReply {
    #[serde(default)]
    pub selected_row_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResponse {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub single_select_reply: Option<SingleSelectReply>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateButtonReply {
    #[serde(default)]
    pub selected_display_text: Option<String>,
    #[serde(default)]
    pub selected_id: Option<String>,
}

/// A wrapper layer (ephemeral, view-once) around inner content.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Wrapped {
    #[serde(default)]
    pub message: Option<MessageContent>,
}

/// Content envelope. Exactly one kind is normally set; wrappers nest.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageContent {
    #[serde(default)]
    pub conversation: Option<String>,
    #[serde(default)]
    pub extended_text_message: Option<TextPayload>,
    #[serde(default)]
    pub image_message: Option<MediaPayload>,
    #[serde(default)]
    pub video_message: Option<MediaPayload>,
    #[serde(default)]
    pub audio_message: Option<MediaPayload>,
    #[serde(default)]
    pub document_message: Option<MediaPayload>,
    #[serde(default)]
    pub sticker_message: Option<MediaPayload>,
    #[serde(default)]
    pub buttons_response_message: Option<ButtonsResponse>,
    #[serde(default)]
    pub list_response_message: Option<ListResponse>,
    #[serde(default)]
    pub template_button_reply_message: Option<TemplateButtonReply>,
    #[serde(default)]
    pub ephemeral_message: Option<Box<Wrapped>>,
    #[serde(default)]
    pub view_once_message: Option<Box<Wrapped>>,
    #[serde(default)]
    pub view_once_message_v2: Option<Box<Wrapped>>,
    #[serde(default)]
    pub view_once_message_v2_extension: Option<Box<Wrapped>>,
    #[serde(default)]
    pub protocol_message: Option<Value>,
    #[serde(default)]
    pub reaction_message: Option<Value>,
    #[serde(default)]
    pub sender_key_distribution_message: Option<Value>,
    #[serde(default)]
    pub message_context_info: Option<Value>,
    /// Kinds the bridge does not model.
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

/// Contact or chat metadata record from the protocol's sync events.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactRecord {
    pub id: String,
    #[serde(default)]
    pub lid: Option<String>,
    #[serde(default, alias = "jid")]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub notify: Option<String>,
}

/// Why the protocol connection closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// The remote side invalidated the credentials; a fresh pairing is required.
    LoggedOut,
    /// Network loss, timeout, or a restart requested by the server.
    ConnectionLost,
    /// Another client took over this session.
    Replaced,
    /// Anything else, carrying the raw status code when known.
    Other(Option<u16>),
}

impl CloseReason {
    /// Maps the protocol's numeric disconnect codes.
    pub fn from_status_code(code: Option<u16>) -> Self {
        match code {
            Some(401) => CloseReason::LoggedOut,
            Some(440) => CloseReason::Replaced,
            Some(408) | Some(428) | Some(500) | Some(503) | Some(515) => {
                CloseReason::ConnectionLost
            }
            other => CloseReason::Other(other),
        }
    }

    pub fn is_logged_out(&self) -> bool {
        matches!(self, CloseReason::LoggedOut)
    }
}

/// Connection lifecycle notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionUpdate {
    /// A pairing QR was issued.
    Qr(String),
    /// The connection is open and authenticated.
    Open,
    /// The connection closed.
    Close(CloseReason),
}

/// Whether a message batch is live traffic or history replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertKind {
    Notify,
    History,
}

/// Every event a protocol client can push into a session's channel.
#[derive(Debug, Clone)]
pub enum ProtocolEvent {
    Connection(ConnectionUpdate),
    Messages {
        kind: UpsertKind,
        messages: Vec<RawMessage>,
    },
    Contacts(Vec<ContactRecord>),
}

/// Media to upload with an outbound message.
#[derive(Debug, Clone)]
pub struct OutboundMedia {
    pub bytes: Vec<u8>,
    pub mimetype: String,
    pub caption: Option<String>,
    pub file_name: Option<String>,
}
