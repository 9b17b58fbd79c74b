// SPDX-FileCopyrightText: 2026 Leadbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Leadbridge WhatsApp bridge.
//!
//! This crate provides the error type, domain types, raw protocol envelope
//! shapes, and the adapter traits the bridge is written against. Storage
//! backends and protocol connectors implement traits defined here.

pub mod envelope;
pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::BridgeError;
pub use types::{AdapterType, Direction, HealthStatus, Message, SessionStatus};

pub use traits::{Adapter, LeadStore, MessageStore, ProtocolClient, ProtocolConnector};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bridge_error_variants_render() {
        let errors = [
            BridgeError::Config("bad".into()),
            BridgeError::Storage {
                source: Box::new(std::io::Error::other("disk")),
            },
            BridgeError::not_connected("session u1 is disconnected"),
            BridgeError::protocol("rejected"),
            BridgeError::Media {
                message: "write failed".into(),
                source: None,
            },
            BridgeError::Validation("empty text".into()),
            BridgeError::NotFound("lead".into()),
            BridgeError::Timeout {
                duration: std::time::Duration::from_secs(10),
            },
            BridgeError::Internal("boom".into()),
        ];
        for e in &errors {
            assert!(!e.to_string().is_empty());
        }
        assert!(errors[2].to_string().contains("not connected"));
    }

    #[test]
    fn adapter_type_round_trips() {
        use std::str::FromStr;
        for variant in [AdapterType::Storage, AdapterType::Protocol] {
            let parsed = AdapterType::from_str(&variant.to_string()).expect("should parse back");
            assert_eq!(variant, parsed);
        }
    }

    #[test]
    fn all_traits_are_exported() {
        fn _assert_adapter<T: Adapter>() {}
        fn _assert_message_store<T: MessageStore>() {}
        fn _assert_lead_store<T: LeadStore>() {}
        fn _assert_connector<T: ProtocolConnector>() {}
        fn _assert_client<T: ProtocolClient>() {}
    }
}
