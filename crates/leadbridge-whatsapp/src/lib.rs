// SPDX-FileCopyrightText: 2026 Leadbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! WhatsApp session bridge for the Leadbridge CRM.
//!
//! Runs one protocol session per CRM user, turns raw protocol events into
//! stored [`Message`](leadbridge_core::Message)s, keeps CRM leads and their
//! funnel stage in step with conversation activity, and fans live messages
//! out to streaming clients.
//!
//! The [`SessionRegistry`] is the entry point: build a [`Bridge`] over the
//! storage adapters, then hand both to the registry with a
//! [`ProtocolConnector`](leadbridge_core::ProtocolConnector).

pub mod bridge;
pub mod conversations;
pub mod hub;
pub mod identity;
pub mod leads;
pub mod log;
pub mod media;
pub mod normalize;
pub mod phone;
pub mod recording;
pub mod session;
pub mod sidecar;
pub mod state;

pub use bridge::{Bridge, IngestOutcome, SkipReason};
pub use conversations::ConversationView;
pub use hub::{Subscription, SubscriptionHub};
pub use identity::IdentityResolver;
pub use leads::{LeadLinker, LinkOutcome};
pub use log::MessageLog;
pub use media::MediaStore;
pub use phone::PhoneMatcher;
pub use session::SessionRegistry;
pub use sidecar::SidecarConnector;
