// SPDX-FileCopyrightText: 2026 Leadbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the message and lead store traits.

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::debug;

use leadbridge_config::model::StorageConfig;
use leadbridge_core::types::{ConversationHead, DirectionSummary, Lead, NewLead};
use leadbridge_core::{
    Adapter, AdapterType, BridgeError, HealthStatus, LeadStore, Message, MessageStore,
};

use crate::database::{Database, map_tr_err};
use crate::queries;

/// SQLite-backed store for messages and leads.
///
/// The database is opened lazily by [`SqliteStorage::initialize`]; every
/// other call fails with a storage error until then.
pub struct SqliteStorage {
    config: StorageConfig,
    db: OnceCell<Database>,
}

impl SqliteStorage {
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            db: OnceCell::new(),
        }
    }

    /// An initialized store over a fresh in-memory database.
    pub async fn in_memory() -> Result<Self, BridgeError> {
        let storage = Self::new(StorageConfig {
            database_path: ":memory:".to_string(),
            wal_mode: false,
        });
        let db = Database::open_in_memory().await?;
        storage
            .db
            .set(db)
            .map_err(|_| BridgeError::Internal("storage already initialized".into()))?;
        Ok(storage)
    }

    pub async fn initialize(&self) -> Result<(), BridgeError> {
        let db = Database::open(&self.config.database_path, self.config.wal_mode).await?;
        self.db.set(db).map_err(|_| BridgeError::Storage {
            source: "storage already initialized".into(),
        })?;
        debug!(path = %self.config.database_path, "SQLite storage initialized");
        Ok(())
    }

    /// The underlying database, for callers that need raw access.
    pub fn database(&self) -> Result<&Database, BridgeError> {
        self.db.get().ok_or_else(|| BridgeError::Storage {
            source: "storage not initialized, call initialize() first".into(),
        })
    }
}

#[async_trait]
impl Adapter for SqliteStorage {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Storage
    }

    async fn health_check(&self) -> Result<HealthStatus, BridgeError> {
        self.database()?
            .connection()
            .call(|conn| -> Result<(), rusqlite::Error> { conn.execute_batch("SELECT 1;") })
            .await
            .map_err(map_tr_err)?;
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), BridgeError> {
        if let Some(db) = self.db.get() {
            db.checkpoint().await?;
            debug!("shutdown: WAL checkpoint complete");
        }
        Ok(())
    }
}

#[async_trait]
impl MessageStore for SqliteStorage {
    async fn insert_message(&self, message: &Message) -> Result<(), BridgeError> {
        queries::messages::insert_message(self.database()?, message)
            .await
            .map(|_| ())
    }

    async fn message_exists(&self, user_id: &str, message_id: &str) -> Result<bool, BridgeError> {
        queries::messages::message_exists(self.database()?, user_id, message_id).await
    }

    async fn recent_messages(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<Message>, BridgeError> {
        queries::messages::recent_messages(self.database()?, user_id, limit).await
    }

    async fn messages_for_phones(
        &self,
        user_id: &str,
        phones: &[String],
        limit: usize,
    ) -> Result<Vec<Message>, BridgeError> {
        queries::messages::messages_for_phones(self.database()?, user_id, phones, limit).await
    }

    async fn unread_inbound_phones(&self, user_id: &str) -> Result<Vec<String>, BridgeError> {
        queries::messages::unread_inbound_phones(self.database()?, user_id).await
    }

    async fn mark_read(&self, user_id: &str, phones: &[String]) -> Result<u64, BridgeError> {
        queries::messages::mark_read(self.database()?, user_id, phones).await
    }

    async fn conversation_heads(
        &self,
        user_id: &str,
    ) -> Result<Vec<ConversationHead>, BridgeError> {
        queries::messages::conversation_heads(self.database()?, user_id).await
    }

    async fn direction_summary(
        &self,
        user_id: &str,
        phones: &[String],
    ) -> Result<DirectionSummary, BridgeError> {
        queries::messages::direction_summary(self.database()?, user_id, phones).await
    }
}

#[async_trait]
impl LeadStore for SqliteStorage {
    async fn company_for_user(&self, user_id: &str) -> Result<Option<String>, BridgeError> {
        queries::leads::company_for_user(self.database()?, user_id).await
    }

    async fn active_leads(&self, user_id: &str) -> Result<Vec<Lead>, BridgeError> {
        queries::leads::active_leads(self.database()?, user_id).await
    }

    async fn create_lead(&self, lead: &NewLead) -> Result<Lead, BridgeError> {
        queries::leads::create_lead(self.database()?, lead).await
    }

    async fn rename_lead(&self, lead_id: &str, name: &str) -> Result<(), BridgeError> {
        queries::leads::rename_lead(self.database()?, lead_id, name).await
    }

    async fn update_lead_status(
        &self,
        lead_id: &str,
        status: &str,
        metadata: Option<&str>,
    ) -> Result<(), BridgeError> {
        queries::leads::update_lead_status(self.database()?, lead_id, status, metadata).await
    }

    async fn append_history(
        &self,
        lead_id: &str,
        action: &str,
        detail: &str,
    ) -> Result<(), BridgeError> {
        queries::leads::append_history(self.database()?, lead_id, action, detail).await
    }

    async fn is_blocked(&self, company_id: &str, phones: &[String]) -> Result<bool, BridgeError> {
        queries::leads::is_blocked(self.database()?, company_id, phones).await
    }
}
