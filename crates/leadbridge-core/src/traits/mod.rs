// SPDX-FileCopyrightText: 2026 Leadbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapter trait definitions.
//!
//! All adapters extend the [`Adapter`] base trait and use `#[async_trait]`
//! for dynamic dispatch compatibility.

pub mod adapter;
pub mod protocol;
pub mod storage;

pub use adapter::Adapter;
pub use protocol::{ProtocolClient, ProtocolConnector};
pub use storage::{LeadStore, MessageStore};
