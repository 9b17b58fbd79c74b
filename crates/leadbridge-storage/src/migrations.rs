// SPDX-FileCopyrightText: 2026 Leadbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedded schema migrations.
//!
//! SQL files under `migrations/` are compiled in with `embed_migrations!`
//! and applied whenever a [`Database`](crate::Database) is opened.

use leadbridge_core::BridgeError;

mod embedded {
    use refinery::embed_migrations;
    embed_migrations!("migrations");
}

/// Apply every pending migration. Refinery records progress in
/// `refinery_schema_history`.
pub fn run_migrations(conn: &mut rusqlite::Connection) -> Result<(), BridgeError> {
    let report = embedded::migrations::runner()
        .run(conn)
        .map_err(|e| BridgeError::Storage {
            source: Box::new(e),
        })?;
    for applied in report.applied_migrations() {
        tracing::debug!(version = applied.version(), name = applied.name(), "migration applied");
    }
    Ok(())
}
