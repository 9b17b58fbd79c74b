// SPDX-FileCopyrightText: 2026 Leadbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Leadbridge WhatsApp bridge.

use thiserror::Error;

/// The primary error type used across all Leadbridge adapter traits and bridge operations.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database connection, query failure, schema mismatch).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The session is not connected, or did not connect within the allowed wait.
    #[error("not connected: {message}")]
    Connectivity { message: String },

    /// The protocol client rejected or failed a request.
    #[error("protocol error: {message}")]
    Protocol {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Media download or write failure.
    #[error("media error: {message}")]
    Media {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Input that does not describe a deliverable message (bad phone, empty text).
    #[error("invalid input: {0}")]
    Validation(String),

    /// A requested entity does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl BridgeError {
    /// Shorthand for a [`BridgeError::Connectivity`] with the given message.
    pub fn not_connected(message: impl Into<String>) -> Self {
        Self::Connectivity {
            message: message.into(),
        }
    }

    /// Shorthand for a [`BridgeError::Protocol`] without an underlying source.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
            source: None,
        }
    }
}
