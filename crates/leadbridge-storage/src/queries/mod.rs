// SPDX-FileCopyrightText: 2026 Leadbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Query modules for the bridge's tables.

pub mod leads;
pub mod messages;

use rusqlite::types::Value;

/// `?, ?, ?` with one placeholder per value.
pub(crate) fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

/// Bind values for `user_id = ? AND phone IN (...)` filters.
pub(crate) fn user_and_phones(user_id: &str, phones: &[String]) -> Vec<Value> {
    std::iter::once(user_id)
        .chain(phones.iter().map(String::as_str))
        .map(|s| Value::Text(s.to_string()))
        .collect()
}

/// Current UTC time in the millisecond RFC 3339 form used by every table.
pub(crate) fn now_timestamp() -> String {
    chrono::Utc::now()
        .to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}
