// SPDX-FileCopyrightText: 2026 Leadbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Connection state machine for one session.
//!
//! ```text
//! connecting   -> qr_pending | connected | disconnected
//! qr_pending   -> connected | disconnected
//! connected    -> disconnected
//! disconnected -> connecting
//! ```
//!
//! A QR payload is held only while the session is `qr_pending`.

use chrono::{DateTime, Utc};
use leadbridge_core::SessionStatus;
use leadbridge_core::envelope::{CloseReason, ConnectionUpdate};
use leadbridge_core::types::SessionSnapshot;

/// Effect of a connection update on the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    QrIssued,
    Opened,
    Closed(CloseReason),
    /// The update does not apply in the current state.
    Ignored,
}

#[derive(Debug, Clone)]
pub struct SessionState {
    status: SessionStatus,
    qr: Option<String>,
    updated_at: DateTime<Utc>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            status: SessionStatus::Disconnected,
            qr: None,
            updated_at: Utc::now(),
        }
    }
}

impl SessionState {
    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn qr(&self) -> Option<&str> {
        self.qr.as_deref()
    }

    pub fn is_connected(&self) -> bool {
        self.status == SessionStatus::Connected
    }

    fn set(&mut self, status: SessionStatus, qr: Option<String>) {
        self.status = status;
        self.qr = qr;
        self.updated_at = Utc::now();
    }

    /// `disconnected -> connecting`. Returns false if a connection is
    /// already starting or live.
    pub fn begin_connect(&mut self) -> bool {
        if self.status != SessionStatus::Disconnected {
            return false;
        }
        self.set(SessionStatus::Connecting, None);
        true
    }

    /// Force `disconnected`. Returns false if it already was.
    pub fn mark_disconnected(&mut self) -> bool {
        if self.status == SessionStatus::Disconnected {
            return false;
        }
        self.set(SessionStatus::Disconnected, None);
        true
    }

    pub fn apply(&mut self, update: &ConnectionUpdate) -> Transition {
        use SessionStatus::*;
        match (update, self.status) {
            (ConnectionUpdate::Qr(payload), Connecting | QrPending) => {
                self.set(QrPending, Some(payload.clone()));
                Transition::QrIssued
            }
            (ConnectionUpdate::Open, Connecting | QrPending) => {
                self.set(Connected, None);
                Transition::Opened
            }
            (ConnectionUpdate::Close(reason), Connecting | QrPending | Connected) => {
                self.set(Disconnected, None);
                Transition::Closed(reason.clone())
            }
            _ => Transition::Ignored,
        }
    }

    pub fn snapshot(&self, reconnecting: bool) -> SessionSnapshot {
        SessionSnapshot {
            status: self.status,
            qr: self.qr.clone(),
            updated_at: self.updated_at,
            reconnecting,
        }
    }
}
