// SPDX-FileCopyrightText: 2026 Leadbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Storage traits for the message log and the CRM's lead table.

use async_trait::async_trait;

use crate::error::BridgeError;
use crate::traits::adapter::Adapter;
use crate::types::{ConversationHead, DirectionSummary, Lead, Message, NewLead};

/// Durable, append-only message history.
///
/// Phone filters take a set of equivalent digit strings; the caller decides
/// what counts as the same contact.
#[async_trait]
pub trait MessageStore: Adapter {
    /// Persists a message. Inserting an id that already exists is a no-op.
    async fn insert_message(&self, message: &Message) -> Result<(), BridgeError>;

    async fn message_exists(&self, user_id: &str, message_id: &str) -> Result<bool, BridgeError>;

    /// Most recent messages for a user, newest first.
    async fn recent_messages(&self, user_id: &str, limit: usize)
        -> Result<Vec<Message>, BridgeError>;

    /// Messages exchanged with any of `phones`, oldest first, keeping the newest `limit`.
    async fn messages_for_phones(
        &self,
        user_id: &str,
        phones: &[String],
        limit: usize,
    ) -> Result<Vec<Message>, BridgeError>;

    /// Distinct phones that have unread inbound messages.
    async fn unread_inbound_phones(&self, user_id: &str) -> Result<Vec<String>, BridgeError>;

    /// Marks unread inbound messages from any of `phones` as read. Returns the row count.
    async fn mark_read(&self, user_id: &str, phones: &[String]) -> Result<u64, BridgeError>;

    /// Newest message per distinct phone, with that phone's unread inbound count.
    async fn conversation_heads(&self, user_id: &str)
        -> Result<Vec<ConversationHead>, BridgeError>;

    /// Which directions have been seen with any of `phones`.
    async fn direction_summary(
        &self,
        user_id: &str,
        phones: &[String],
    ) -> Result<DirectionSummary, BridgeError>;
}

/// The subset of the CRM lead table the bridge reads and writes.
#[async_trait]
pub trait LeadStore: Adapter {
    /// Company the user belongs to, if any.
    async fn company_for_user(&self, user_id: &str) -> Result<Option<String>, BridgeError>;

    /// The user's leads that are not soft-deleted.
    async fn active_leads(&self, user_id: &str) -> Result<Vec<Lead>, BridgeError>;

    async fn create_lead(&self, lead: &NewLead) -> Result<Lead, BridgeError>;

    async fn rename_lead(&self, lead_id: &str, name: &str) -> Result<(), BridgeError>;

    /// Sets the funnel status and replaces the metadata document.
    async fn update_lead_status(
        &self,
        lead_id: &str,
        status: &str,
        metadata: Option<&str>,
    ) -> Result<(), BridgeError>;

    async fn append_history(
        &self,
        lead_id: &str,
        action: &str,
        detail: &str,
    ) -> Result<(), BridgeError>;

    /// Whether any of `phones` is on the company's blocklist.
    async fn is_blocked(&self, company_id: &str, phones: &[String]) -> Result<bool, BridgeError>;
}
