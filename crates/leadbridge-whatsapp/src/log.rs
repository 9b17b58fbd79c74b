// SPDX-FileCopyrightText: 2026 Leadbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable message log with a per-user recent cache.
//!
//! The store is the source of truth. The cache holds the newest messages per
//! user for fast reads and outbound echo detection.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use leadbridge_core::{BridgeError, Direction, Message, MessageStore};
use tracing::{debug, warn};

use crate::phone::PhoneMatcher;

pub struct MessageLog {
    store: Arc<dyn MessageStore>,
    matcher: PhoneMatcher,
    cache: DashMap<String, VecDeque<Message>>,
    cap: usize,
}

impl MessageLog {
    pub fn new(store: Arc<dyn MessageStore>, matcher: PhoneMatcher, cap: usize) -> Self {
        Self {
            store,
            matcher,
            cache: DashMap::new(),
            cap: cap.max(1),
        }
    }

    pub fn store(&self) -> &Arc<dyn MessageStore> {
        &self.store
    }

    /// Write a message durably, then record it in the user's cache.
    pub async fn persist(&self, message: &Message) -> Result<(), BridgeError> {
        self.store.insert_message(message).await?;
        self.remember(message.clone());
        debug!(
            user_id = %message.user_id,
            message_id = %message.id,
            direction = %message.direction,
            "message persisted"
        );
        Ok(())
    }

    /// Insert into the cache keeping newest-first order and the size cap.
    fn remember(&self, message: Message) {
        let mut entry = self.cache.entry(message.user_id.clone()).or_default();
        let cached = entry.value_mut();
        if cached.iter().any(|m| m.id == message.id) {
            return;
        }
        let at = cached
            .iter()
            .position(|m| m.occurred_at <= message.occurred_at)
            .unwrap_or(cached.len());
        cached.insert(at, message);
        cached.truncate(self.cap);
    }

    /// Load a user's newest messages from the store unless already cached.
    pub async fn warm(&self, user_id: &str) -> Result<(), BridgeError> {
        if self.cache.contains_key(user_id) {
            return Ok(());
        }
        let messages = self.store.recent_messages(user_id, self.cap).await?;
        debug!(user_id, count = messages.len(), "message cache warmed");
        self.cache
            .entry(user_id.to_string())
            .or_insert_with(|| messages.into_iter().collect());
        Ok(())
    }

    /// Newest-first cached messages, at most `limit`.
    pub fn recent(&self, user_id: &str, limit: usize) -> Vec<Message> {
        self.cache
            .get(user_id)
            .map(|c| c.iter().take(limit).cloned().collect())
            .unwrap_or_default()
    }

    /// Whether an identical outbound (phone, text) was recorded within `window`.
    pub fn is_duplicate_outgoing(&self, user_id: &str, phone: &str, text: &str, window: Duration) -> bool {
        self.is_duplicate_outgoing_at(user_id, phone, text, window, Utc::now())
    }

    /// [`is_duplicate_outgoing`](Self::is_duplicate_outgoing) against an explicit clock.
    pub fn is_duplicate_outgoing_at(
        &self,
        user_id: &str,
        phone: &str,
        text: &str,
        window: Duration,
        now: DateTime<Utc>,
    ) -> bool {
        let Ok(window) = chrono::Duration::from_std(window) else {
            return false;
        };
        let Some(cached) = self.cache.get(user_id) else {
            return false;
        };
        cached.iter().any(|m| {
            m.direction == Direction::Out
                && m.phone == phone
                && m.text == text
                && now.signed_duration_since(m.occurred_at) <= window
        })
    }

    /// Whether a message id has already been stored for this user.
    pub async fn contains(&self, user_id: &str, message_id: &str) -> Result<bool, BridgeError> {
        if let Some(cached) = self.cache.get(user_id)
            && cached.iter().any(|m| m.id == message_id)
        {
            return Ok(true);
        }
        self.store.message_exists(user_id, message_id).await
    }

    /// Mark unread inbound messages from `phone` (by contact match) as read.
    ///
    /// Returns the number of stored rows changed.
    pub async fn mark_read(&self, user_id: &str, phone: &str) -> Result<u64, BridgeError> {
        let phones: Vec<String> = self
            .store
            .unread_inbound_phones(user_id)
            .await?
            .into_iter()
            .filter(|p| self.matcher.same_contact(p, phone))
            .collect();
        if phones.is_empty() {
            return Ok(0);
        }

        let changed = self.store.mark_read(user_id, &phones).await?;
        if let Some(mut cached) = self.cache.get_mut(user_id) {
            for m in cached.iter_mut() {
                if m.direction == Direction::In && !m.is_read && phones.contains(&m.phone) {
                    m.is_read = true;
                }
            }
        }
        debug!(user_id, phone, changed, "messages marked read");
        Ok(changed)
    }

    /// Durable conversation history with `phone`, oldest first.
    pub async fn history(&self, user_id: &str, phone: &str, limit: usize) -> Result<Vec<Message>, BridgeError> {
        let variants: Vec<String> = self.matcher.variants(phone).into_iter().collect();
        if variants.is_empty() {
            warn!(user_id, phone, "history requested for a phone without digits");
            return Ok(Vec::new());
        }
        self.store.messages_for_phones(user_id, &variants, limit).await
    }

    pub fn forget(&self, user_id: &str) {
        self.cache.remove(user_id);
    }
}
