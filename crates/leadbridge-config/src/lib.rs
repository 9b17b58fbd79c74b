// SPDX-FileCopyrightText: 2026 Leadbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration system for the Leadbridge WhatsApp bridge.
//!
//! TOML files in the XDG hierarchy are merged with `LEADBRIDGE_*` environment
//! overrides, checked with `deny_unknown_fields`, then validated semantically.
//! Failures render as miette diagnostics with typo suggestions.
//!
//! ```no_run
//! use leadbridge_config::load_and_validate;
//!
//! let config = load_and_validate().expect("config errors");
//! println!("listening on {}:{}", config.server.host, config.server.port);
//! ```

pub mod diagnostic;
pub mod loader;
pub mod model;
pub mod validation;

use std::path::Path;

pub use diagnostic::{ConfigError, render_errors};
pub use loader::{load_config, load_config_from_path, load_config_from_str};
pub use model::LeadbridgeConfig;

/// Load configuration from the XDG hierarchy and validate it.
pub fn load_and_validate() -> Result<LeadbridgeConfig, Vec<ConfigError>> {
    finish(loader::load_config(), collect_toml_sources)
}

/// Load a single TOML file (plus env overrides) and validate it.
pub fn load_and_validate_path(path: &Path) -> Result<LeadbridgeConfig, Vec<ConfigError>> {
    finish(loader::load_config_from_path(path), || {
        std::fs::read_to_string(path)
            .map(|content| vec![(path.display().to_string(), content)])
            .unwrap_or_default()
    })
}

/// Load configuration from a TOML string and validate it.
pub fn load_and_validate_str(toml_content: &str) -> Result<LeadbridgeConfig, Vec<ConfigError>> {
    finish(loader::load_config_from_str(toml_content), || {
        vec![("<inline>".to_string(), toml_content.to_string())]
    })
}

fn finish(
    loaded: Result<LeadbridgeConfig, figment::Error>,
    sources: impl FnOnce() -> Vec<(String, String)>,
) -> Result<LeadbridgeConfig, Vec<ConfigError>> {
    match loaded {
        Ok(config) => {
            validation::validate_config(&config)?;
            Ok(config)
        }
        Err(err) => Err(diagnostic::figment_to_config_errors(err, &sources())),
    }
}

/// Read whichever config files exist, for source span resolution.
fn collect_toml_sources() -> Vec<(String, String)> {
    let mut candidates = vec![
        std::env::current_dir()
            .map(|d| d.join("leadbridge.toml"))
            .unwrap_or_else(|_| "leadbridge.toml".into()),
    ];
    if let Some(dir) = dirs::config_dir() {
        candidates.push(dir.join("leadbridge/leadbridge.toml"));
    }
    candidates.push("/etc/leadbridge/leadbridge.toml".into());

    candidates
        .into_iter()
        .filter_map(|path| {
            std::fs::read_to_string(&path)
                .ok()
                .map(|content| (path.display().to_string(), content))
        })
        .collect()
}
