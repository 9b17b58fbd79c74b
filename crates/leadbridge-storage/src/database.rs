// SPDX-FileCopyrightText: 2026 Leadbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Connection management: PRAGMA setup, WAL mode, migrations and lifecycle.
//!
//! Every statement runs on tokio-rusqlite's single background thread, which
//! serializes writes. Do not open a second connection for writing.

use std::path::Path;

use leadbridge_core::BridgeError;
use tracing::debug;

/// Handle to the bridge's SQLite database.
pub struct Database {
    conn: tokio_rusqlite::Connection,
}

impl Database {
    /// Open (creating if needed) the database at `path` and run migrations.
    pub async fn open(path: &str, wal_mode: bool) -> Result<Self, BridgeError> {
        if let Some(parent) = Path::new(path).parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| BridgeError::Storage {
                source: Box::new(e),
            })?;
        }

        let conn = tokio_rusqlite::Connection::open(path)
            .await
            .map_err(|e| BridgeError::Storage {
                source: Box::new(e),
            })?;
        let db = Self { conn };
        db.prepare(wal_mode).await?;
        debug!(path, wal_mode, "database opened");
        Ok(db)
    }

    /// Fresh in-memory database with the full schema. Used by tests.
    pub async fn open_in_memory() -> Result<Self, BridgeError> {
        let conn = tokio_rusqlite::Connection::open_in_memory()
            .await
            .map_err(|e| BridgeError::Storage {
                source: Box::new(e),
            })?;
        let db = Self { conn };
        db.prepare(false).await?;
        Ok(db)
    }

    /// Wrap an existing connection without touching its schema.
    pub fn from_connection(conn: tokio_rusqlite::Connection) -> Self {
        Self { conn }
    }

    pub fn connection(&self) -> &tokio_rusqlite::Connection {
        &self.conn
    }

    /// Checkpoint the WAL and close the background connection.
    pub async fn close(self) -> Result<(), BridgeError> {
        self.checkpoint().await?;
        self.conn.close().await.map_err(map_tr_err)
    }

    pub async fn checkpoint(&self) -> Result<(), BridgeError> {
        self.conn
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")
            })
            .await
            .map_err(map_tr_err)
    }

    async fn prepare(&self, wal_mode: bool) -> Result<(), BridgeError> {
        self.conn
            .call(move |conn| -> Result<(), BridgeError> {
                let journal = if wal_mode { "WAL" } else { "DELETE" };
                conn.execute_batch(&format!(
                    "PRAGMA journal_mode = {journal};
                     PRAGMA synchronous = NORMAL;
                     PRAGMA foreign_keys = ON;
                     PRAGMA busy_timeout = 5000;"
                ))
                .map_err(|e| BridgeError::Storage {
                    source: Box::new(e),
                })?;
                crate::migrations::run_migrations(conn)
            })
            .await
            .map_err(map_tr_err)
    }
}

/// Convert a tokio-rusqlite error into [`BridgeError::Storage`].
pub(crate) fn map_tr_err<E>(e: tokio_rusqlite::Error<E>) -> BridgeError
where
    E: std::error::Error + Send + Sync + 'static,
{
    BridgeError::Storage {
        source: Box::new(e),
    }
}
