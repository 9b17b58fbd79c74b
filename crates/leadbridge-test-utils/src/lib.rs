// SPDX-FileCopyrightText: 2026 Leadbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Leadbridge integration tests.
//!
//! Provides a scriptable protocol connector and a harness that assembles the
//! bridge over a temporary SQLite database, so the full pipeline can be
//! driven in tests without a WhatsApp sidecar.
//!
//! # Components
//!
//! - [`MockConnector`] - protocol connector with event injection and captured sends
//! - [`TestHarness`] - registry, storage and connector wired together

pub mod harness;
pub mod mock_protocol;

pub use harness::{TestHarness, text_message};
pub use mock_protocol::{MockClient, MockConnector, SentMessage};
