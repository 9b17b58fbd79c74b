// SPDX-FileCopyrightText: 2026 Leadbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./leadbridge.toml` > `~/.config/leadbridge/leadbridge.toml`
//! > `/etc/leadbridge/leadbridge.toml` with environment variable overrides via
//! the `LEADBRIDGE_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::LeadbridgeConfig;

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/leadbridge/leadbridge.toml` (system-wide)
/// 3. `~/.config/leadbridge/leadbridge.toml` (user XDG config)
/// 4. `./leadbridge.toml` (local directory)
/// 5. `LEADBRIDGE_*` environment variables
pub fn load_config() -> Result<LeadbridgeConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no XDG lookup, no env).
pub fn load_config_from_str(toml_content: &str) -> Result<LeadbridgeConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(LeadbridgeConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<LeadbridgeConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(LeadbridgeConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Build the Figment used for config loading, before extraction.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(LeadbridgeConfig::default()))
        .merge(Toml::file("/etc/leadbridge/leadbridge.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("leadbridge/leadbridge.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("leadbridge.toml"))
        .merge(env_provider())
}

/// Environment provider with explicit section-to-dot mapping.
///
/// Uses `Env::map()` rather than `Env::split("_")` because key names contain
/// underscores: `LEADBRIDGE_SERVER_JWT_SECRET` must map to `server.jwt_secret`,
/// not `server.jwt.secret`.
fn env_provider() -> Env {
    Env::prefixed("LEADBRIDGE_").map(|key| {
        let mapped = key
            .as_str()
            .replacen("server_", "server.", 1)
            .replacen("storage_", "storage.", 1)
            .replacen("whatsapp_", "whatsapp.", 1)
            .replacen("leads_", "leads.", 1)
            .replacen("phone_", "phone.", 1);
        mapped.into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_overrides_file_values() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "leadbridge.toml",
                r#"
[server]
port = 4000

[whatsapp]
sidecar_url = "ws://sidecar:3100"
"#,
            )?;
            jail.set_env("LEADBRIDGE_SERVER_PORT", "5000");
            jail.set_env("LEADBRIDGE_SERVER_JWT_SECRET", "s3cret");
            jail.set_env("LEADBRIDGE_WHATSAPP_ECHO_WINDOW_SECS", "60");

            let config = load_config()?;
            assert_eq!(config.server.port, 5000);
            assert_eq!(config.server.jwt_secret.as_deref(), Some("s3cret"));
            assert_eq!(config.whatsapp.sidecar_url, "ws://sidecar:3100");
            assert_eq!(config.whatsapp.echo_window_secs, 60);
            Ok(())
        });
    }

    #[test]
    fn from_path_reads_the_given_file() {
        figment::Jail::expect_with(|jail| {
            jail.create_file("custom.toml", "[leads]\ninitial_stage = \"new\"\n")?;
            let config = load_config_from_path(Path::new("custom.toml"))?;
            assert_eq!(config.leads.initial_stage, "new");
            Ok(())
        });
    }
}
