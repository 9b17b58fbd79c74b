// SPDX-FileCopyrightText: 2026 Leadbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end integration testing.
//!
//! `TestHarness` assembles the full bridge with a [`MockConnector`], a temp
//! SQLite database and temp data directory, using short waits so tests run
//! quickly.

use std::sync::Arc;
use std::time::Duration;

use leadbridge_config::model::LeadbridgeConfig;
use leadbridge_core::envelope::{MessageContent, MessageKey, RawMessage};
use leadbridge_core::types::Lead;
use leadbridge_core::{BridgeError, LeadStore, Message, SessionStatus};
use leadbridge_storage::SqliteStorage;
use leadbridge_whatsapp::{Bridge, SessionRegistry};

use crate::mock_protocol::MockConnector;

const POLL: Duration = Duration::from_millis(10);
const WAIT: Duration = Duration::from_secs(5);

/// An inbound text message from `phone` as the protocol would deliver it.
pub fn text_message(phone: &str, id: &str, text: &str, push_name: Option<&str>) -> RawMessage {
    RawMessage {
        key: MessageKey {
            remote_jid: format!("{phone}@s.whatsapp.net"),
            from_me: false,
            id: Some(id.to_string()),
            participant: None,
            remote_jid_alt: None,
        },
        message: Some(MessageContent {
            conversation: Some(text.to_string()),
            ..Default::default()
        }),
        push_name: push_name.map(str::to_string),
        message_timestamp: Some(unix_now()),
    }
}

fn unix_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

/// Builder for test environments.
pub struct TestHarnessBuilder {
    config: LeadbridgeConfig,
    auto_open: bool,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        let mut config = LeadbridgeConfig::default();
        config.whatsapp.reconnect_delay_secs = 0;
        config.whatsapp.qr_poll_interval_ms = 10;
        config.whatsapp.send_wait_secs = 1;
        config.whatsapp.qr_timeout_secs = 1;
        config.server.jwt_secret = Some("test-secret".to_string());
        Self {
            config,
            auto_open: false,
        }
    }

    /// Adjust configuration before the stack is built.
    pub fn with_config(mut self, edit: impl FnOnce(&mut LeadbridgeConfig)) -> Self {
        edit(&mut self.config);
        self
    }

    /// Connections open as soon as they are made.
    pub fn with_auto_open(mut self) -> Self {
        self.auto_open = true;
        self
    }

    pub async fn build(mut self) -> Result<TestHarness, BridgeError> {
        let temp_dir = tempfile::TempDir::new().map_err(|e| BridgeError::Storage { source: e.into() })?;
        self.config.storage.database_path = temp_dir.path().join("test.db").to_string_lossy().to_string();
        self.config.whatsapp.data_dir = temp_dir.path().join("data").to_string_lossy().to_string();

        let storage = SqliteStorage::new(self.config.storage.clone());
        storage.initialize().await?;
        let storage = Arc::new(storage);

        let connector = if self.auto_open {
            MockConnector::new().with_auto_open()
        } else {
            MockConnector::new()
        };
        let connector = Arc::new(connector);

        let bridge = Bridge::new(&self.config, storage.clone(), storage.clone());
        let registry = SessionRegistry::new(connector.clone(), bridge, self.config.whatsapp.clone());

        Ok(TestHarness {
            registry,
            storage,
            connector,
            config: self.config,
            _temp_dir: temp_dir,
        })
    }
}

/// A complete bridge over mock protocol sessions.
pub struct TestHarness {
    pub registry: Arc<SessionRegistry>,
    pub storage: Arc<SqliteStorage>,
    pub connector: Arc<MockConnector>,
    pub config: LeadbridgeConfig,
    _temp_dir: tempfile::TempDir,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    pub async fn new() -> Result<Self, BridgeError> {
        Self::builder().build().await
    }

    pub fn bridge(&self) -> &Arc<Bridge> {
        self.registry.bridge()
    }

    /// Pair and open a session for `user_id`, waiting until it is connected.
    pub async fn connect(&self, user_id: &str) -> Result<(), BridgeError> {
        let before = self.connector.connect_count();
        self.registry.get_qr(user_id, Duration::from_millis(20)).await;

        let deadline = tokio::time::Instant::now() + WAIT;
        while self.connector.connect_count() == before
            && self.registry.status(user_id).await.status != SessionStatus::Connected
        {
            if tokio::time::Instant::now() > deadline {
                return Err(BridgeError::Timeout { duration: WAIT });
            }
            tokio::time::sleep(POLL).await;
        }
        if self.registry.status(user_id).await.status != SessionStatus::Connected {
            self.connector.open(user_id).await?;
        }
        self.wait_for_status(user_id, SessionStatus::Connected).await
    }

    pub async fn wait_for_status(&self, user_id: &str, status: SessionStatus) -> Result<(), BridgeError> {
        let deadline = tokio::time::Instant::now() + WAIT;
        while self.registry.status(user_id).await.status != status {
            if tokio::time::Instant::now() > deadline {
                return Err(BridgeError::Timeout { duration: WAIT });
            }
            tokio::time::sleep(POLL).await;
        }
        Ok(())
    }

    /// Newest-first cached messages, once at least `count` exist.
    pub async fn wait_for_messages(&self, user_id: &str, count: usize) -> Result<Vec<Message>, BridgeError> {
        let deadline = tokio::time::Instant::now() + WAIT;
        loop {
            let messages = self.bridge().log().recent(user_id, usize::MAX);
            if messages.len() >= count {
                return Ok(messages);
            }
            if tokio::time::Instant::now() > deadline {
                return Err(BridgeError::Timeout { duration: WAIT });
            }
            tokio::time::sleep(POLL).await;
        }
    }

    /// Active leads for a user, once `check` accepts them.
    pub async fn wait_for_leads(
        &self,
        user_id: &str,
        check: impl Fn(&[Lead]) -> bool,
    ) -> Result<Vec<Lead>, BridgeError> {
        let deadline = tokio::time::Instant::now() + WAIT;
        loop {
            let leads = self.storage.active_leads(user_id).await?;
            if check(&leads) {
                return Ok(leads);
            }
            if tokio::time::Instant::now() > deadline {
                return Err(BridgeError::Timeout { duration: WAIT });
            }
            tokio::time::sleep(POLL).await;
        }
    }

    /// Run raw SQL against the harness database, for seeding CRM tables.
    pub async fn execute(&self, sql: &'static str) -> Result<(), BridgeError> {
        self.storage
            .database()?
            .connection()
            .call(move |conn| -> Result<(), rusqlite::Error> { conn.execute_batch(sql) })
            .await
            .map_err(|e| BridgeError::Storage { source: Box::new(e) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn harness_connects_a_session() {
        let harness = TestHarness::new().await.unwrap();
        harness.connect("u1").await.unwrap();
        assert_eq!(harness.connector.connect_count(), 1);
        assert!(harness.connector.credentials_dir("u1").await.is_some());
    }

    #[tokio::test]
    async fn auto_open_harness_connects_without_injection() {
        let harness = TestHarness::builder().with_auto_open().build().await.unwrap();
        harness.connect("u1").await.unwrap();
        assert_eq!(
            harness.registry.status("u1").await.status,
            SessionStatus::Connected
        );
    }

    #[tokio::test]
    async fn delivered_text_is_logged() {
        let harness = TestHarness::new().await.unwrap();
        harness.connect("u1").await.unwrap();
        harness
            .connector
            .deliver("u1", vec![text_message("5511987654321", "T1", "oi", Some("Maria"))])
            .await
            .unwrap();
        let messages = harness.wait_for_messages("u1", 1).await.unwrap();
        assert_eq!(messages[0].text, "oi");
    }
}
