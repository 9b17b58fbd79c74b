// SPDX-FileCopyrightText: 2026 Leadbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message pipeline shared by every session.
//!
//! Inbound: normalize, resolve the sender, dedup, fetch media, persist, emit,
//! then link the lead in the background. History-sync batches skip the emit. Outbound sends enter at
//! [`Bridge::publish`] so both directions leave the same trail.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use leadbridge_config::model::LeadbridgeConfig;
use leadbridge_core::envelope::{RawMessage, UpsertKind};
use leadbridge_core::{BridgeError, Direction, LeadStore, Message, MessageStore, ProtocolClient};
use tracing::{debug, warn};

use crate::conversations::ConversationView;
use crate::hub::SubscriptionHub;
use crate::identity::{IdentityResolver, address_user, is_non_direct};
use crate::leads::LeadLinker;
use crate::log::MessageLog;
use crate::media::MediaStore;
use crate::normalize::{classify_media, extract_text, unwrap};
use crate::phone::PhoneMatcher;
use crate::recording;

/// Why an inbound record did not become a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Group, broadcast or newsletter traffic.
    NonDirect,
    /// Receipts, reactions and other records with nothing to show.
    NoContent,
    /// The remote address is not phone-shaped.
    InvalidPhone,
    /// Already stored under the same id.
    Duplicate,
    /// The protocol echoing a message this bridge just sent.
    Echo,
}

#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    Stored(Message),
    Skipped(SkipReason),
}

/// Message id for sends the protocol did not assign one to.
pub fn local_message_id() -> String {
    let simple = uuid::Uuid::new_v4().simple().to_string();
    format!("LB{}{}", Utc::now().timestamp_millis(), &simple[..8]).to_uppercase()
}

fn timestamp(seconds: Option<i64>) -> DateTime<Utc> {
    seconds
        .filter(|s| *s > 0)
        .and_then(|s| Utc.timestamp_opt(s, 0).single())
        .unwrap_or_else(Utc::now)
}

pub struct Bridge {
    matcher: PhoneMatcher,
    identity: IdentityResolver,
    log: MessageLog,
    linker: Arc<LeadLinker>,
    hub: Arc<SubscriptionHub>,
    media: MediaStore,
    conversations: ConversationView,
    echo_window: Duration,
    download_timeout: Duration,
    link_history: bool,
}

impl Bridge {
    pub fn new(
        config: &LeadbridgeConfig,
        messages: Arc<dyn MessageStore>,
        leads: Arc<dyn LeadStore>,
    ) -> Arc<Self> {
        let matcher = PhoneMatcher::from_config(&config.phone);
        let wa = &config.whatsapp;
        Arc::new(Self {
            identity: IdentityResolver::new(),
            log: MessageLog::new(messages.clone(), matcher.clone(), wa.recent_cache_size),
            linker: Arc::new(LeadLinker::new(
                leads.clone(),
                messages.clone(),
                matcher.clone(),
                config.leads.clone(),
            )),
            hub: SubscriptionHub::new(wa.subscriber_buffer),
            media: MediaStore::new(std::path::Path::new(&wa.data_dir).join("media")),
            conversations: ConversationView::new(messages, leads, matcher.clone()),
            echo_window: Duration::from_secs(wa.echo_window_secs),
            download_timeout: Duration::from_secs(wa.media_download_timeout_secs),
            link_history: config.leads.link_history,
            matcher,
        })
    }

    pub fn matcher(&self) -> &PhoneMatcher {
        &self.matcher
    }

    pub fn identity(&self) -> &IdentityResolver {
        &self.identity
    }

    pub fn log(&self) -> &MessageLog {
        &self.log
    }

    pub fn linker(&self) -> &LeadLinker {
        &self.linker
    }

    pub fn hub(&self) -> &Arc<SubscriptionHub> {
        &self.hub
    }

    pub fn media(&self) -> &MediaStore {
        &self.media
    }

    pub fn conversations(&self) -> &ConversationView {
        &self.conversations
    }

    /// Turn one raw protocol record into a stored message, or say why not.
    pub async fn ingest(
        &self,
        user_id: &str,
        client: &dyn ProtocolClient,
        raw: &RawMessage,
        kind: UpsertKind,
    ) -> Result<IngestOutcome, BridgeError> {
        if is_non_direct(&raw.key.remote_jid) {
            return Ok(IngestOutcome::Skipped(SkipReason::NonDirect));
        }
        let Some(content) = raw.message.as_ref().map(unwrap) else {
            return Ok(IngestOutcome::Skipped(SkipReason::NoContent));
        };
        let Some(text) = extract_text(content) else {
            return Ok(IngestOutcome::Skipped(SkipReason::NoContent));
        };

        let resolution = self.identity.resolve(&raw.key, &self.matcher);
        let phone = if resolution.is_unresolved() {
            resolution.digits
        } else if self.matcher.is_phone_shaped(&resolution.digits) {
            self.matcher.ensure_country_code(&resolution.digits)
        } else {
            debug!(user_id, remote = address_user(&raw.key.remote_jid), "address is not a phone");
            return Ok(IngestOutcome::Skipped(SkipReason::InvalidPhone));
        };
        if phone.is_empty() {
            return Ok(IngestOutcome::Skipped(SkipReason::InvalidPhone));
        }

        let direction = if raw.key.from_me { Direction::Out } else { Direction::In };
        let id = raw
            .key
            .id
            .clone()
            .filter(|id| !id.is_empty())
            .unwrap_or_else(local_message_id);

        if self.log.contains(user_id, &id).await? {
            return Ok(IngestOutcome::Skipped(SkipReason::Duplicate));
        }
        if direction == Direction::Out
            && self
                .log
                .is_duplicate_outgoing(user_id, &phone, &text, self.echo_window)
        {
            debug!(user_id, message_id = %id, "outbound echo suppressed");
            return Ok(IngestOutcome::Skipped(SkipReason::Echo));
        }

        let mut media_url = None;
        let mut media_type = None;
        if let Some(info) = classify_media(content) {
            media_type = Some(info.kind.to_string());
            media_url = self
                .fetch_media(user_id, &id, client, raw, info.mimetype())
                .await;
        }

        let message = Message {
            id,
            user_id: user_id.to_string(),
            phone,
            text,
            media_url,
            media_type,
            direction,
            occurred_at: timestamp(raw.message_timestamp),
            is_read: direction == Direction::Out,
        };

        let display_name = match direction {
            Direction::In => raw.push_name.clone(),
            Direction::Out => None,
        };
        self.publish(&message, display_name, kind == UpsertKind::Notify)
            .await?;
        Ok(IngestOutcome::Stored(message))
    }

    /// Download and store media. Any failure leaves the message without a URL.
    async fn fetch_media(
        &self,
        user_id: &str,
        message_id: &str,
        client: &dyn ProtocolClient,
        raw: &RawMessage,
        mimetype: Option<&str>,
    ) -> Option<String> {
        let bytes = match tokio::time::timeout(self.download_timeout, client.download_media(raw)).await {
            Ok(Ok(bytes)) => bytes,
            Ok(Err(e)) => {
                warn!(user_id, message_id, error = %e, "media download failed");
                return None;
            }
            Err(_) => {
                warn!(user_id, message_id, timeout = ?self.download_timeout, "media download timed out");
                return None;
            }
        };
        match self.media.save(user_id, message_id, &bytes, mimetype).await {
            Ok(url) => Some(url),
            Err(e) => {
                warn!(user_id, message_id, error = %e, "media write failed");
                None
            }
        }
    }

    /// Persist a message and link it to a lead. Only live messages are
    /// emitted; history is linked unless `leads.link_history` is off.
    pub async fn publish(
        &self,
        message: &Message,
        display_name: Option<String>,
        live: bool,
    ) -> Result<(), BridgeError> {
        self.log.persist(message).await?;
        recording::record_message(message.direction);
        if live {
            self.hub.emit(&message.user_id, message);
        } else if !self.link_history {
            return Ok(());
        }

        let linker = Arc::clone(&self.linker);
        let message = message.clone();
        tokio::spawn(async move {
            linker.on_message(&message, display_name.as_deref()).await;
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use leadbridge_core::envelope::{MessageKey, OutboundMedia};
    use leadbridge_storage::SqliteStorage;
    use serde_json::json;

    /// Client that serves fixed media bytes, or fails when none are set.
    struct FixedMedia(Option<Vec<u8>>);

    #[async_trait]
    impl ProtocolClient for FixedMedia {
        async fn send_text(&self, _: &str, _: &str) -> Result<Option<String>, BridgeError> {
            Ok(None)
        }
        async fn send_media(&self, _: &str, _: &OutboundMedia) -> Result<Option<String>, BridgeError> {
            Ok(None)
        }
        async fn download_media(&self, _: &RawMessage) -> Result<Vec<u8>, BridgeError> {
            self.0.clone().ok_or_else(|| BridgeError::protocol("gone"))
        }
        async fn logout(&self) -> Result<(), BridgeError> {
            Ok(())
        }
    }

    async fn bridge(dir: &tempfile::TempDir) -> Arc<Bridge> {
        let mut config = LeadbridgeConfig::default();
        config.whatsapp.data_dir = dir.path().display().to_string();
        let store = Arc::new(SqliteStorage::in_memory().await.unwrap());
        Bridge::new(&config, store.clone(), store)
    }

    fn raw(remote: &str, id: &str, from_me: bool, message: serde_json::Value) -> RawMessage {
        RawMessage {
            key: MessageKey {
                remote_jid: remote.into(),
                from_me,
                id: Some(id.into()),
                participant: None,
                remote_jid_alt: None,
            },
            message: Some(serde_json::from_value(message).unwrap()),
            push_name: Some("Maria".into()),
            message_timestamp: Some(1_700_000_000),
        }
    }

    #[tokio::test]
    async fn inbound_text_is_stored_with_canonical_phone() {
        let dir = tempfile::tempdir().unwrap();
        let bridge = bridge(&dir).await;
        let mut sub = bridge.hub().subscribe("u1");

        let outcome = bridge
            .ingest(
                "u1",
                &FixedMedia(None),
                &raw("551187654321@s.whatsapp.net", "A1", false, json!({"conversation": "oi"})),
                UpsertKind::Notify,
            )
            .await
            .unwrap();
        let IngestOutcome::Stored(message) = outcome else {
            panic!("expected a stored message, got {outcome:?}");
        };
        assert_eq!(message.phone, "5511987654321");
        assert_eq!(message.direction, Direction::In);
        assert!(!message.is_read);
        assert_eq!(message.occurred_at.timestamp(), 1_700_000_000);
        assert_eq!(sub.recv().await.unwrap().id, "A1");
    }

    #[tokio::test]
    async fn group_and_empty_records_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let bridge = bridge(&dir).await;
        let client = FixedMedia(None);

        let group = raw("1203630@g.us", "G1", false, json!({"conversation": "hi all"}));
        assert_eq!(
            bridge.ingest("u1", &client, &group, UpsertKind::Notify).await.unwrap(),
            IngestOutcome::Skipped(SkipReason::NonDirect)
        );

        let reaction = raw(
            "5511987654321@s.whatsapp.net",
            "R1",
            false,
            json!({"reactionMessage": {"text": "👍"}}),
        );
        assert_eq!(
            bridge.ingest("u1", &client, &reaction, UpsertKind::Notify).await.unwrap(),
            IngestOutcome::Skipped(SkipReason::NoContent)
        );
        assert!(bridge.log().recent("u1", 10).is_empty());
    }

    #[tokio::test]
    async fn repeated_id_is_a_duplicate() {
        let dir = tempfile::tempdir().unwrap();
        let bridge = bridge(&dir).await;
        let client = FixedMedia(None);
        let msg = raw("5511987654321@s.whatsapp.net", "D1", false, json!({"conversation": "oi"}));

        bridge.ingest("u1", &client, &msg, UpsertKind::History).await.unwrap();
        assert_eq!(
            bridge.ingest("u1", &client, &msg, UpsertKind::Notify).await.unwrap(),
            IngestOutcome::Skipped(SkipReason::Duplicate)
        );
    }

    #[tokio::test]
    async fn echo_of_sent_message_is_suppressed() {
        let dir = tempfile::tempdir().unwrap();
        let bridge = bridge(&dir).await;
        let sent = Message {
            id: local_message_id(),
            user_id: "u1".into(),
            phone: "5511987654321".into(),
            text: "proposta enviada".into(),
            media_url: None,
            media_type: None,
            direction: Direction::Out,
            occurred_at: Utc::now(),
            is_read: true,
        };
        bridge.publish(&sent, None, true).await.unwrap();

        let mut echo = raw(
            "5511987654321@s.whatsapp.net",
            "PROTO1",
            true,
            json!({"conversation": "proposta enviada"}),
        );
        echo.message_timestamp = None;
        assert_eq!(
            bridge.ingest("u1", &FixedMedia(None), &echo, UpsertKind::Notify).await.unwrap(),
            IngestOutcome::Skipped(SkipReason::Echo)
        );
    }

    #[tokio::test]
    async fn media_without_mimetype_is_saved_as_bin() {
        let dir = tempfile::tempdir().unwrap();
        let bridge = bridge(&dir).await;
        let msg = raw(
            "5511987654321@s.whatsapp.net",
            "M1",
            false,
            json!({"documentMessage": {"fileName": "x"}}),
        );
        let outcome = bridge
            .ingest("u1", &FixedMedia(Some(vec![1, 2, 3])), &msg, UpsertKind::Notify)
            .await
            .unwrap();
        let IngestOutcome::Stored(message) = outcome else {
            panic!("expected a stored message");
        };
        assert_eq!(message.text, "[documento]");
        assert_eq!(message.media_url.as_deref(), Some("/media/u1/M1.bin"));
        assert_eq!(message.media_type.as_deref(), Some("document"));
        assert!(dir.path().join("media/u1/M1.bin").exists());
    }

    #[tokio::test]
    async fn failed_download_keeps_the_message() {
        let dir = tempfile::tempdir().unwrap();
        let bridge = bridge(&dir).await;
        let msg = raw(
            "5511987654321@s.whatsapp.net",
            "M2",
            false,
            json!({"imageMessage": {"mimetype": "image/jpeg", "caption": "foto"}}),
        );
        let outcome = bridge
            .ingest("u1", &FixedMedia(None), &msg, UpsertKind::Notify)
            .await
            .unwrap();
        let IngestOutcome::Stored(message) = outcome else {
            panic!("expected a stored message");
        };
        assert_eq!(message.text, "foto");
        assert_eq!(message.media_url, None);
        assert_eq!(message.media_type.as_deref(), Some("image"));
    }

    async fn linked_leads(link_history: bool) -> (Arc<Bridge>, Arc<SqliteStorage>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let mut config = LeadbridgeConfig::default();
        config.whatsapp.data_dir = dir.path().display().to_string();
        config.leads.link_history = link_history;
        let store = Arc::new(SqliteStorage::in_memory().await.unwrap());
        let bridge = Bridge::new(&config, store.clone(), store.clone());
        let msg = raw("5511987654321@s.whatsapp.net", "H1", false, json!({"conversation": "oi"}));
        let outcome = bridge
            .ingest("u1", &FixedMedia(None), &msg, UpsertKind::History)
            .await
            .unwrap();
        assert!(matches!(outcome, IngestOutcome::Stored(_)));
        (bridge, store, dir)
    }

    #[tokio::test]
    async fn history_inbound_creates_a_lead() {
        let (_bridge, store, _dir) = linked_leads(true).await;
        for _ in 0..200 {
            if !store.active_leads("u1").await.unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let leads = store.active_leads("u1").await.unwrap();
        assert_eq!(leads.len(), 1);
        assert_eq!(leads[0].name.as_deref(), Some("Maria"));
        assert_eq!(leads[0].status.as_deref(), Some("novo"));
    }

    #[tokio::test]
    async fn history_linking_switched_off_leaves_leads_alone() {
        let (_bridge, store, _dir) = linked_leads(false).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(store.active_leads("u1").await.unwrap().is_empty());
    }

    #[test]
    fn local_ids_are_unique() {
        assert_ne!(local_message_id(), local_message_id());
    }
}
