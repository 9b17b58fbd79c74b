// SPDX-FileCopyrightText: 2026 Leadbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Read-side conversation list, recomputed from the message log on every call.

use std::sync::Arc;

use leadbridge_core::types::{Conversation, ConversationHead, Lead};
use leadbridge_core::{BridgeError, LeadStore, MessageStore};

use crate::phone::PhoneMatcher;

pub struct ConversationView {
    messages: Arc<dyn MessageStore>,
    leads: Arc<dyn LeadStore>,
    matcher: PhoneMatcher,
}

impl ConversationView {
    pub fn new(messages: Arc<dyn MessageStore>, leads: Arc<dyn LeadStore>, matcher: PhoneMatcher) -> Self {
        Self {
            messages,
            leads,
            matcher,
        }
    }

    /// Conversations for `user_id`, most recently active first.
    pub async fn list(&self, user_id: &str) -> Result<Vec<Conversation>, BridgeError> {
        let heads = self.messages.conversation_heads(user_id).await?;
        let leads = self.leads.active_leads(user_id).await?;
        Ok(build(&self.matcher, heads, &leads))
    }
}

/// Merge per-phone heads that denote the same contact, attach the matching
/// lead, and sort by last activity.
pub fn build(matcher: &PhoneMatcher, heads: Vec<ConversationHead>, leads: &[Lead]) -> Vec<Conversation> {
    let mut conversations: Vec<Conversation> = Vec::with_capacity(heads.len());

    for head in heads {
        let existing = conversations
            .iter_mut()
            .find(|c| matcher.same_contact(&c.phone, &head.last.phone));
        match existing {
            Some(conv) => {
                conv.unread_count += head.unread;
                if head.last.occurred_at > conv.last_at {
                    conv.phone = head.last.phone;
                    conv.last_message = head.last.text;
                    conv.last_at = head.last.occurred_at;
                    conv.last_direction = head.last.direction;
                }
            }
            None => conversations.push(Conversation {
                phone: head.last.phone,
                last_message: head.last.text,
                last_at: head.last.occurred_at,
                last_direction: head.last.direction,
                unread_count: head.unread,
                lead_id: None,
                lead_name: None,
            }),
        }
    }

    for conv in &mut conversations {
        let lead = leads.iter().find(|lead| {
            lead.phone
                .as_deref()
                .is_some_and(|p| matcher.same_contact(p, &conv.phone))
        });
        if let Some(lead) = lead {
            conv.lead_id = Some(lead.id.clone());
            conv.lead_name = lead.name.clone();
        }
    }

    conversations.sort_by(|a, b| b.last_at.cmp(&a.last_at));
    conversations
}
