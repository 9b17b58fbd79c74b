// SPDX-FileCopyrightText: 2026 Leadbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP gateway for the Leadbridge WhatsApp bridge.
//!
//! Exposes pairing, sending, history, conversation and live-stream endpoints
//! over axum. Every route except `/health` requires an HS256 bearer JWT whose
//! `sub` claim names the CRM user that owns the WhatsApp session.

pub mod auth;
pub mod handlers;
pub mod server;
pub mod sse;

pub use auth::{AuthConfig, AuthUser, issue_token};
pub use server::{GatewayState, HealthState, ServerConfig, router, start_server};
