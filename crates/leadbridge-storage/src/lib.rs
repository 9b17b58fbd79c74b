// SPDX-FileCopyrightText: 2026 Leadbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence for the Leadbridge WhatsApp bridge.
//!
//! WAL-mode SQLite with embedded refinery migrations, a single-writer
//! connection through `tokio-rusqlite`, and typed queries for the message
//! log and the CRM lead tables the bridge touches.

pub mod adapter;
pub mod database;
pub mod migrations;
pub mod queries;

pub use adapter::SqliteStorage;
pub use database::Database;
pub use queries::messages::{INSERT_CHAIN, InsertStrategy};
