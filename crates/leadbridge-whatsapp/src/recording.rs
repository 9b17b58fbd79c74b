// SPDX-FileCopyrightText: 2026 Leadbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Metric registration and recording helpers.
//!
//! Uses the metrics-rs facade; the binary installs a Prometheus recorder
//! and the gateway renders it on `/metrics`. Without a recorder these are
//! no-ops.

use leadbridge_core::Direction;
use metrics::{describe_counter, describe_gauge};

pub const UNRESOLVED_LIDS: &str = "leadbridge_unresolved_lids_total";
pub const ACTIVE_SESSIONS: &str = "leadbridge_active_sessions";
pub const MESSAGES: &str = "leadbridge_messages_total";

/// Register all bridge metric descriptions.
///
/// Called once at startup after the recorder is installed.
pub fn register_metrics() {
    describe_counter!(UNRESOLVED_LIDS, "LID-addressed messages that could not be mapped to a phone");
    describe_gauge!(ACTIVE_SESSIONS, "Sessions currently held by the registry");
    describe_counter!(MESSAGES, "Messages persisted, by direction");
}

pub fn record_unresolved_lid() {
    metrics::counter!(UNRESOLVED_LIDS).increment(1);
}

pub fn set_active_sessions(count: usize) {
    metrics::gauge!(ACTIVE_SESSIONS).set(count as f64);
}

/// Record a persisted message.
pub fn record_message(direction: Direction) {
    metrics::counter!(MESSAGES, "direction" => direction.to_string()).increment(1);
}

#[cfg(test)]
pub(crate) mod tests {
    use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

    use super::*;

    /// Run `f` against a private Prometheus recorder and return the rendered text.
    pub(crate) fn rendered(f: impl FnOnce()) -> String {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle: PrometheusHandle = recorder.handle();
        metrics::with_local_recorder(&recorder, || {
            register_metrics();
            f();
        });
        handle.render()
    }

    /// Value of the first sample of `name` whose labels contain `label`.
    pub(crate) fn sample(rendered: &str, name: &str, label: &str) -> Option<f64> {
        rendered
            .lines()
            .filter(|line| !line.starts_with('#'))
            .filter(|line| {
                line.strip_prefix(name)
                    .is_some_and(|rest| rest.starts_with(' ') || rest.starts_with('{'))
            })
            .find(|line| line.contains(label))
            .and_then(|line| line.rsplit(' ').next())
            .and_then(|value| value.parse().ok())
    }

    #[test]
    fn counters_and_gauges_render() {
        let text = rendered(|| {
            record_unresolved_lid();
            record_unresolved_lid();
            set_active_sessions(3);
            record_message(Direction::In);
            record_message(Direction::Out);
            record_message(Direction::In);
        });
        assert_eq!(sample(&text, UNRESOLVED_LIDS, ""), Some(2.0));
        assert_eq!(sample(&text, ACTIVE_SESSIONS, ""), Some(3.0));
        assert_eq!(sample(&text, MESSAGES, "direction=\"in\""), Some(2.0));
        assert_eq!(sample(&text, MESSAGES, "direction=\"out\""), Some(1.0));
        assert!(text.contains("# HELP leadbridge_active_sessions"));
    }

    #[test]
    fn recording_without_a_recorder_is_a_no_op() {
        record_unresolved_lid();
        set_active_sessions(1);
    }
}
