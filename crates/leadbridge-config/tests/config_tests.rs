// SPDX-FileCopyrightText: 2026 Leadbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the Leadbridge configuration system.

use leadbridge_config::diagnostic::ConfigError;
use leadbridge_config::{load_and_validate_str, load_config_from_str};

#[test]
fn full_toml_deserializes() {
    let toml = r#"
[server]
host = "0.0.0.0"
port = 8080
jwt_secret = "topsecret"
log_level = "debug"

[storage]
database_path = "/tmp/leadbridge-test.db"
wal_mode = false

[whatsapp]
data_dir = "/tmp/leadbridge-data"
sidecar_url = "ws://10.0.0.2:3100"
recent_cache_size = 50
echo_window_secs = 90
send_wait_secs = 5

[leads]
initial_stage = "new"
contact_stage = "contacted"
terminal_stages = ["won", "lost"]

[phone]
country_code = "1"
suffix_match = false
"#;

    let config = load_config_from_str(toml).expect("valid TOML should deserialize");
    assert_eq!(config.server.host, "0.0.0.0");
    assert_eq!(config.server.port, 8080);
    assert_eq!(config.server.jwt_secret.as_deref(), Some("topsecret"));
    assert_eq!(config.storage.database_path, "/tmp/leadbridge-test.db");
    assert!(!config.storage.wal_mode);
    assert_eq!(config.whatsapp.recent_cache_size, 50);
    assert_eq!(config.whatsapp.echo_window_secs, 90);
    assert_eq!(config.whatsapp.qr_timeout_secs, 20);
    assert_eq!(config.leads.terminal_stages, vec!["won", "lost"]);
    assert_eq!(config.phone.country_code, "1");
    assert!(!config.phone.suffix_match);
}

#[test]
fn empty_toml_uses_defaults() {
    let config = load_and_validate_str("").expect("defaults must validate");
    assert_eq!(config.server.port, 3001);
    assert_eq!(config.whatsapp.echo_window_secs, 120);
    assert_eq!(config.leads.initial_stage, "novo");
}

#[test]
fn typo_produces_unknown_key_with_suggestion() {
    let toml = "[whatsapp]\nsidecar_ulr = \"ws://x\"\n";
    let errors = load_and_validate_str(toml).expect_err("typo must be rejected");
    assert_eq!(errors.len(), 1);
    match &errors[0] {
        ConfigError::UnknownKey {
            key,
            suggestion,
            span,
            ..
        } => {
            assert_eq!(key, "sidecar_ulr");
            assert_eq!(suggestion.as_deref(), Some("sidecar_url"));
            assert!(span.is_some());
        }
        other => panic!("expected UnknownKey, got {other:?}"),
    }
}

#[test]
fn unknown_section_is_rejected() {
    let toml = "[telegram]\nbot_token = \"x\"\n";
    let errors = load_and_validate_str(toml).expect_err("unknown section must be rejected");
    assert!(matches!(errors[0], ConfigError::UnknownKey { .. }));
}

#[test]
fn wrong_type_is_reported() {
    let toml = "[server]\nport = \"not a number\"\n";
    let errors = load_and_validate_str(toml).expect_err("wrong type must be rejected");
    assert!(matches!(errors[0], ConfigError::InvalidType { .. }));
}

#[test]
fn semantic_errors_surface_after_parse() {
    let toml = "[leads]\ninitial_stage = \"x\"\ncontact_stage = \"x\"\n";
    let errors = load_and_validate_str(toml).expect_err("equal stages must be rejected");
    assert!(
        errors
            .iter()
            .all(|e| matches!(e, ConfigError::Validation { .. }))
    );
}
