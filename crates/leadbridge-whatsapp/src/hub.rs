// SPDX-FileCopyrightText: 2026 Leadbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-user fan-out of live messages to streaming clients.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use leadbridge_core::Message;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, trace};

struct Subscriber {
    id: u64,
    tx: mpsc::Sender<Message>,
}

pub struct SubscriptionHub {
    subscribers: DashMap<String, Vec<Subscriber>>,
    next_id: AtomicU64,
    buffer: usize,
}

impl SubscriptionHub {
    /// `buffer` is the per-subscriber queue depth.
    pub fn new(buffer: usize) -> Arc<Self> {
        Arc::new(Self {
            subscribers: DashMap::new(),
            next_id: AtomicU64::new(1),
            buffer: buffer.max(1),
        })
    }

    /// Start receiving live messages for `user_id`. Dropping the
    /// subscription unsubscribes it.
    pub fn subscribe(self: &Arc<Self>, user_id: &str) -> Subscription {
        let (tx, rx) = mpsc::channel(self.buffer);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers
            .entry(user_id.to_string())
            .or_default()
            .push(Subscriber { id, tx });
        debug!(user_id, subscriber = id, "stream subscriber added");
        Subscription {
            user_id: user_id.to_string(),
            id,
            rx,
            hub: Arc::downgrade(self),
        }
    }

    /// Deliver to every live subscriber without waiting. A subscriber whose
    /// queue is full misses this message; a closed one is removed.
    pub fn emit(&self, user_id: &str, message: &Message) {
        let Some(mut subs) = self.subscribers.get_mut(user_id) else {
            return;
        };
        subs.retain(|sub| match sub.tx.try_send(message.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                trace!(user_id, subscriber = sub.id, "subscriber queue full, message skipped");
                true
            }
            Err(TrySendError::Closed(_)) => false,
        });
        let empty = subs.is_empty();
        drop(subs);
        if empty {
            self.subscribers.remove_if(user_id, |_, subs| subs.is_empty());
        }
    }

    fn unsubscribe(&self, user_id: &str, id: u64) {
        if let Some(mut subs) = self.subscribers.get_mut(user_id) {
            subs.retain(|sub| sub.id != id);
        }
        self.subscribers.remove_if(user_id, |_, subs| subs.is_empty());
        debug!(user_id, subscriber = id, "stream subscriber removed");
    }

    pub fn subscriber_count(&self, user_id: &str) -> usize {
        self.subscribers.get(user_id).map(|s| s.len()).unwrap_or(0)
    }
}

/// A live message feed for one user.
pub struct Subscription {
    user_id: String,
    id: u64,
    rx: mpsc::Receiver<Message>,
    hub: Weak<SubscriptionHub>,
}

impl Subscription {
    /// Next message, or `None` once the hub is gone.
    pub async fn recv(&mut self) -> Option<Message> {
        self.rx.recv().await
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(hub) = self.hub.upgrade() {
            hub.unsubscribe(&self.user_id, self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use leadbridge_core::Direction;

    fn msg(id: &str) -> Message {
        Message {
            id: id.into(),
            user_id: "u1".into(),
            phone: "5511987654321".into(),
            text: "oi".into(),
            media_url: None,
            media_type: None,
            direction: Direction::In,
            occurred_at: Utc::now(),
            is_read: false,
        }
    }

    #[tokio::test]
    async fn fans_out_to_every_subscriber_of_the_user() {
        let hub = SubscriptionHub::new(8);
        let mut a = hub.subscribe("u1");
        let mut b = hub.subscribe("u1");
        let mut other = hub.subscribe("u2");

        hub.emit("u1", &msg("m1"));
        assert_eq!(a.recv().await.unwrap().id, "m1");
        assert_eq!(b.recv().await.unwrap().id, "m1");
        assert!(other.rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn drop_unsubscribes() {
        let hub = SubscriptionHub::new(8);
        let a = hub.subscribe("u1");
        let _b = hub.subscribe("u1");
        assert_eq!(hub.subscriber_count("u1"), 2);
        drop(a);
        assert_eq!(hub.subscriber_count("u1"), 1);
    }

    #[tokio::test]
    async fn full_subscriber_does_not_block_others() {
        let hub = SubscriptionHub::new(1);
        let _slow = hub.subscribe("u1");
        let mut fast = hub.subscribe("u1");

        hub.emit("u1", &msg("m1"));
        assert_eq!(fast.recv().await.unwrap().id, "m1");
        hub.emit("u1", &msg("m2"));
        assert_eq!(fast.recv().await.unwrap().id, "m2");
        assert_eq!(hub.subscriber_count("u1"), 2);
    }

    #[tokio::test]
    async fn closed_subscriber_is_pruned_on_emit() {
        let hub = SubscriptionHub::new(4);
        let mut sub = hub.subscribe("u1");
        sub.rx.close();
        hub.emit("u1", &msg("m1"));
        assert_eq!(hub.subscriber_count("u1"), 0);
    }

    #[test]
    fn emit_without_subscribers_is_a_no_op() {
        let hub = SubscriptionHub::new(4);
        hub.emit("nobody", &msg("m1"));
        assert_eq!(hub.subscriber_count("nobody"), 0);
    }
}
