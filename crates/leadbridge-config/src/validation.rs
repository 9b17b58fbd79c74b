// SPDX-FileCopyrightText: 2026 Leadbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde attributes,
//! such as valid bind addresses, non-empty paths, and coherent funnel stages.

use crate::diagnostic::ConfigError;
use crate::model::LeadbridgeConfig;

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &LeadbridgeConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    let host = config.server.host.trim();
    if host.is_empty() {
        errors.push(ConfigError::Validation {
            message: "server.host must not be empty".to_string(),
        });
    } else {
        let is_valid_ip = host.parse::<std::net::IpAddr>().is_ok();
        let is_valid_hostname = host
            .chars()
            .all(|c| c.is_alphanumeric() || c == '.' || c == '-' || c == ':');
        if !is_valid_ip && !is_valid_hostname {
            errors.push(ConfigError::Validation {
                message: format!("server.host `{host}` is not a valid IP address or hostname"),
            });
        }
    }

    if let Some(secret) = &config.server.jwt_secret
        && secret.trim().is_empty()
    {
        errors.push(ConfigError::Validation {
            message: "server.jwt_secret must not be empty when set".to_string(),
        });
    }

    if config.storage.database_path.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "storage.database_path must not be empty".to_string(),
        });
    }

    if config.whatsapp.data_dir.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "whatsapp.data_dir must not be empty".to_string(),
        });
    }

    let sidecar = config.whatsapp.sidecar_url.trim();
    if !(sidecar.starts_with("ws://") || sidecar.starts_with("wss://")) {
        errors.push(ConfigError::Validation {
            message: format!("whatsapp.sidecar_url `{sidecar}` must start with ws:// or wss://"),
        });
    }

    for (key, value) in [
        ("whatsapp.recent_cache_size", config.whatsapp.recent_cache_size),
        ("whatsapp.event_buffer", config.whatsapp.event_buffer),
        ("whatsapp.subscriber_buffer", config.whatsapp.subscriber_buffer),
    ] {
        if value == 0 {
            errors.push(ConfigError::Validation {
                message: format!("{key} must be at least 1"),
            });
        }
    }

    if config.whatsapp.qr_poll_interval_ms == 0 {
        errors.push(ConfigError::Validation {
            message: "whatsapp.qr_poll_interval_ms must be at least 1".to_string(),
        });
    }

    let leads = &config.leads;
    if leads.initial_stage.trim().is_empty() || leads.contact_stage.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "leads.initial_stage and leads.contact_stage must not be empty".to_string(),
        });
    }
    if leads.initial_stage == leads.contact_stage {
        errors.push(ConfigError::Validation {
            message: format!(
                "leads.initial_stage and leads.contact_stage must differ, both are `{}`",
                leads.initial_stage
            ),
        });
    }
    for stage in [&leads.initial_stage, &leads.contact_stage] {
        if leads.terminal_stages.contains(stage) {
            errors.push(ConfigError::Validation {
                message: format!("leads.terminal_stages must not contain `{stage}`"),
            });
        }
    }

    let cc = &config.phone.country_code;
    if cc.is_empty() || cc.len() > 3 || !cc.chars().all(|c| c.is_ascii_digit()) {
        errors.push(ConfigError::Validation {
            message: format!("phone.country_code `{cc}` must be 1 to 3 digits"),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
