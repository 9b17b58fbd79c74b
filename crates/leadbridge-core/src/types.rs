// SPDX-FileCopyrightText: 2026 Leadbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types used across adapter traits and the bridge.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the kind of adapter behind a trait object.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Storage,
    Protocol,
}

/// Which side of the conversation produced a message.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Direction {
    /// Received from the contact.
    In,
    /// Sent by the account owner (through the API or another linked device).
    Out,
}

/// Connection state of one user's WhatsApp session.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SessionStatus {
    Connecting,
    QrPending,
    Connected,
    Disconnected,
}

/// Kind of media attached to a message.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
    Audio,
    Document,
    Sticker,
}

impl MediaKind {
    /// Best-effort kind for a MIME type, used for outbound uploads.
    pub fn from_mimetype(mimetype: &str) -> Self {
        let mime = mimetype.to_ascii_lowercase();
        if mime == "image/webp" {
            MediaKind::Sticker
        } else if mime.starts_with("image/") {
            MediaKind::Image
        } else if mime.starts_with("video/") {
            MediaKind::Video
        } else if mime.starts_with("audio/") {
            MediaKind::Audio
        } else {
            MediaKind::Document
        }
    }
}

/// A persisted WhatsApp message, inbound or outbound.
///
/// `phone` is always the canonical form (country code ensured). The only
/// field that changes after persistence is `is_read`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub user_id: String,
    pub phone: String,
    pub text: String,
    pub media_url: Option<String>,
    pub media_type: Option<String>,
    pub direction: Direction,
    pub occurred_at: DateTime<Utc>,
    pub is_read: bool,
}

/// A CRM lead as seen by the bridge.
///
/// Leads are owned by the CRM; the bridge creates them and writes `name`,
/// `status` and `metadata`, but never deletes them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lead {
    pub id: String,
    pub name: Option<String>,
    pub phone: Option<String>,
    pub status: Option<String>,
    pub company_id: Option<String>,
    pub user_id: String,
    pub origin: Option<String>,
    /// Free-form JSON object stored as text.
    pub metadata: Option<String>,
}

/// Fields for a lead created automatically from WhatsApp activity.
#[derive(Debug, Clone)]
pub struct NewLead {
    pub name: String,
    pub phone: String,
    pub status: String,
    pub company_id: Option<String>,
    pub user_id: String,
    pub origin: String,
}

/// Which directions have been observed in a conversation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DirectionSummary {
    pub has_inbound: bool,
    pub has_outbound: bool,
}

/// Latest stored message for one phone plus its unread inbound count.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationHead {
    pub last: Message,
    pub unread: u32,
}

/// Read-side aggregate of one conversation, keyed by canonical phone.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub phone: String,
    pub last_message: String,
    pub last_at: DateTime<Utc>,
    pub last_direction: Direction,
    pub unread_count: u32,
    pub lead_id: Option<String>,
    pub lead_name: Option<String>,
}

/// Point-in-time view of a session, as reported to API callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub status: SessionStatus,
    pub qr: Option<String>,
    pub updated_at: DateTime<Utc>,
    pub reconnecting: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn direction_uses_lowercase_wire_names() {
        assert_eq!(serde_json::to_string(&Direction::In).unwrap(), "\"in\"");
        assert_eq!(Direction::Out.to_string(), "out");
        assert_eq!(Direction::from_str("in").unwrap(), Direction::In);
    }

    #[test]
    fn session_status_uses_snake_case() {
        assert_eq!(
            serde_json::to_string(&SessionStatus::QrPending).unwrap(),
            "\"qr_pending\""
        );
        assert_eq!(SessionStatus::QrPending.to_string(), "qr_pending");
    }

    #[test]
    fn media_kind_from_mimetype() {
        assert_eq!(MediaKind::from_mimetype("image/jpeg"), MediaKind::Image);
        assert_eq!(MediaKind::from_mimetype("image/webp"), MediaKind::Sticker);
        assert_eq!(MediaKind::from_mimetype("audio/ogg; codecs=opus"), MediaKind::Audio);
        assert_eq!(MediaKind::from_mimetype("video/mp4"), MediaKind::Video);
        assert_eq!(MediaKind::from_mimetype(""), MediaKind::Document);
    }

    #[test]
    fn message_serializes_camel_case() {
        let msg = Message {
            id: "m1".into(),
            user_id: "u1".into(),
            phone: "5511987654321".into(),
            text: "oi".into(),
            media_url: None,
            media_type: None,
            direction: Direction::In,
            occurred_at: Utc::now(),
            is_read: false,
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert!(json.get("mediaUrl").is_some());
        assert!(json.get("occurredAt").is_some());
        assert_eq!(json["direction"], "in");
    }
}
