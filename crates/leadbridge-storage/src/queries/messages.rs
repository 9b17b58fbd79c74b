// SPDX-FileCopyrightText: 2026 Leadbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message log queries.
//!
//! Writes go through an ordered chain of insert strategies: the full row
//! first, then only the columns every deployment is guaranteed to have.
//! The first strategy that succeeds wins.

use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use leadbridge_core::types::{ConversationHead, DirectionSummary};
use leadbridge_core::{BridgeError, Direction, Message};
use rusqlite::types::{Type, Value};
use rusqlite::{Row, params, params_from_iter};
use tracing::{debug, warn};

use super::{placeholders, user_and_phones};
use crate::database::{Database, map_tr_err};

const MESSAGE_COLUMNS: &str =
    "id, user_id, phone, text, media_url, media_type, direction, occurred_at, is_read";

/// One way of writing a message row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertStrategy {
    /// Every column, including media and read state.
    Full,
    /// Guaranteed columns only, for stores whose schema predates media support.
    Narrow,
}

/// Strategies in the order they are attempted.
pub const INSERT_CHAIN: [InsertStrategy; 2] = [InsertStrategy::Full, InsertStrategy::Narrow];

impl InsertStrategy {
    fn execute(self, conn: &rusqlite::Connection, msg: &Message) -> rusqlite::Result<usize> {
        let occurred_at = format_timestamp(&msg.occurred_at);
        match self {
            InsertStrategy::Full => conn.execute(
                "INSERT OR IGNORE INTO messages
                 (id, user_id, phone, text, media_url, media_type, direction, occurred_at, is_read)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    msg.id,
                    msg.user_id,
                    msg.phone,
                    msg.text,
                    msg.media_url,
                    msg.media_type,
                    msg.direction.to_string(),
                    occurred_at,
                    msg.is_read,
                ],
            ),
            InsertStrategy::Narrow => conn.execute(
                "INSERT OR IGNORE INTO messages (id, user_id, phone, text, direction, occurred_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    msg.id,
                    msg.user_id,
                    msg.phone,
                    msg.text,
                    msg.direction.to_string(),
                    occurred_at,
                ],
            ),
        }
    }
}

/// Insert a message, walking [`INSERT_CHAIN`] until one strategy succeeds.
///
/// Returns the strategy that stored the row.
pub async fn insert_message(db: &Database, msg: &Message) -> Result<InsertStrategy, BridgeError> {
    let msg = msg.clone();
    db.connection()
        .call(move |conn| -> Result<InsertStrategy, rusqlite::Error> {
            let mut last_err = None;
            for strategy in INSERT_CHAIN {
                match strategy.execute(conn, &msg) {
                    Ok(_) => return Ok(strategy),
                    Err(e) => {
                        warn!(?strategy, message_id = %msg.id, error = %e, "message insert strategy failed");
                        last_err = Some(e);
                    }
                }
            }
            Err(last_err.unwrap_or(rusqlite::Error::QueryReturnedNoRows))
        })
        .await
        .map_err(map_tr_err)
        .inspect(|strategy| {
            if *strategy != InsertStrategy::Full {
                debug!(?strategy, "message stored with reduced column set");
            }
        })
}

pub async fn message_exists(
    db: &Database,
    user_id: &str,
    message_id: &str,
) -> Result<bool, BridgeError> {
    let user_id = user_id.to_string();
    let message_id = message_id.to_string();
    db.connection()
        .call(move |conn| -> Result<bool, rusqlite::Error> {
            conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM messages WHERE user_id = ?1 AND id = ?2)",
                params![user_id, message_id],
                |row| row.get(0),
            )
        })
        .await
        .map_err(map_tr_err)
}

/// Newest messages for a user across all phones.
pub async fn recent_messages(
    db: &Database,
    user_id: &str,
    limit: usize,
) -> Result<Vec<Message>, BridgeError> {
    let user_id = user_id.to_string();
    db.connection()
        .call(move |conn| -> Result<Vec<Message>, rusqlite::Error> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages WHERE user_id = ?1
                 ORDER BY occurred_at DESC, rowid DESC LIMIT ?2"
            ))?;
            let rows = stmt.query_map(params![user_id, limit as i64], row_to_message)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

/// Conversation history with any of `phones`, oldest first, at most `limit` rows.
pub async fn messages_for_phones(
    db: &Database,
    user_id: &str,
    phones: &[String],
    limit: usize,
) -> Result<Vec<Message>, BridgeError> {
    if phones.is_empty() {
        return Ok(Vec::new());
    }
    let sql = format!(
        "SELECT {MESSAGE_COLUMNS} FROM messages WHERE user_id = ? AND phone IN ({})
         ORDER BY occurred_at DESC, rowid DESC LIMIT ?",
        placeholders(phones.len())
    );
    let mut values = user_and_phones(user_id, phones);
    values.push(Value::Integer(limit as i64));
    db.connection()
        .call(move |conn| -> Result<Vec<Message>, rusqlite::Error> {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(values.iter()), row_to_message)?;
            let mut messages = rows.collect::<Result<Vec<_>, _>>()?;
            messages.reverse();
            Ok(messages)
        })
        .await
        .map_err(map_tr_err)
}

pub async fn unread_inbound_phones(db: &Database, user_id: &str) -> Result<Vec<String>, BridgeError> {
    let user_id = user_id.to_string();
    db.connection()
        .call(move |conn| -> Result<Vec<String>, rusqlite::Error> {
            let mut stmt = conn.prepare(
                "SELECT DISTINCT phone FROM messages
                 WHERE user_id = ?1 AND direction = 'in' AND is_read = 0",
            )?;
            let rows = stmt.query_map(params![user_id], |row| row.get(0))?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

/// Flag unread inbound messages from any of `phones` as read.
pub async fn mark_read(db: &Database, user_id: &str, phones: &[String]) -> Result<u64, BridgeError> {
    if phones.is_empty() {
        return Ok(0);
    }
    let sql = format!(
        "UPDATE messages SET is_read = 1
         WHERE user_id = ? AND phone IN ({}) AND direction = 'in' AND is_read = 0",
        placeholders(phones.len())
    );
    let values = user_and_phones(user_id, phones);
    db.connection()
        .call(move |conn| -> Result<u64, rusqlite::Error> {
            let changed = conn.execute(&sql, params_from_iter(values.iter()))?;
            Ok(changed as u64)
        })
        .await
        .map_err(map_tr_err)
}

pub async fn conversation_heads(
    db: &Database,
    user_id: &str,
) -> Result<Vec<ConversationHead>, BridgeError> {
    let user_id = user_id.to_string();
    db.connection()
        .call(move |conn| -> Result<Vec<ConversationHead>, rusqlite::Error> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {MESSAGE_COLUMNS},
                    (SELECT COUNT(*) FROM messages u
                     WHERE u.user_id = m.user_id AND u.phone = m.phone
                       AND u.direction = 'in' AND u.is_read = 0) AS unread
                 FROM messages m
                 WHERE m.user_id = ?1
                   AND m.rowid = (SELECT x.rowid FROM messages x
                                  WHERE x.user_id = m.user_id AND x.phone = m.phone
                                  ORDER BY x.occurred_at DESC, x.rowid DESC LIMIT 1)
                 ORDER BY m.occurred_at DESC"
            ))?;
            let rows = stmt.query_map(params![user_id], |row| {
                Ok(ConversationHead {
                    last: row_to_message(row)?,
                    unread: row.get(9)?,
                })
            })?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

pub async fn direction_summary(
    db: &Database,
    user_id: &str,
    phones: &[String],
) -> Result<DirectionSummary, BridgeError> {
    if phones.is_empty() {
        return Ok(DirectionSummary::default());
    }
    let sql = format!(
        "SELECT DISTINCT direction FROM messages WHERE user_id = ? AND phone IN ({})",
        placeholders(phones.len())
    );
    let values = user_and_phones(user_id, phones);
    db.connection()
        .call(move |conn| -> Result<DirectionSummary, rusqlite::Error> {
            let mut stmt = conn.prepare(&sql)?;
            let directions = stmt
                .query_map(params_from_iter(values.iter()), |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(DirectionSummary {
                has_inbound: directions.iter().any(|d| d == "in"),
                has_outbound: directions.iter().any(|d| d == "out"),
            })
        })
        .await
        .map_err(map_tr_err)
}

fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn row_to_message(row: &Row<'_>) -> rusqlite::Result<Message> {
    let direction: String = row.get(6)?;
    let direction = Direction::from_str(&direction)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(6, Type::Text, Box::new(e)))?;
    let occurred_at: String = row.get(7)?;
    let occurred_at = DateTime::parse_from_rfc3339(&occurred_at)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(7, Type::Text, Box::new(e)))?
        .with_timezone(&Utc);
    Ok(Message {
        id: row.get(0)?,
        user_id: row.get(1)?,
        phone: row.get(2)?,
        text: row.get(3)?,
        media_url: row.get(4)?,
        media_type: row.get(5)?,
        direction,
        occurred_at,
        is_read: row.get(8)?,
    })
}
