// SPDX-FileCopyrightText: 2026 Leadbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Leadbridge bridge.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use serde::{Deserialize, Serialize};

/// Top-level Leadbridge configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LeadbridgeConfig {
    /// HTTP listener and authentication.
    #[serde(default)]
    pub server: ServerConfig,

    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// WhatsApp session, media, and message log settings.
    #[serde(default)]
    pub whatsapp: WhatsAppConfig,

    /// Automatic lead creation and funnel stages.
    #[serde(default)]
    pub leads: LeadsConfig,

    /// Phone number matching rules.
    #[serde(default)]
    pub phone: PhoneConfig,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Host address to bind.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to bind.
    #[serde(default = "default_port")]
    pub port: u16,

    /// HS256 secret used to verify bearer tokens. `None` rejects every request.
    #[serde(default)]
    pub jwt_secret: Option<String>,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            jwt_secret: None,
            log_level: default_log_level(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3001
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("leadbridge").join("leadbridge.db"))
        .unwrap_or_else(|| "leadbridge.db".into())
        .display()
        .to_string()
}

fn default_wal_mode() -> bool {
    true
}

/// WhatsApp bridge configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WhatsAppConfig {
    /// Root for per-user `credentials/<user>` and `media/<user>` directories.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// WebSocket base URL of the protocol sidecar.
    #[serde(default = "default_sidecar_url")]
    pub sidecar_url: String,

    /// Messages kept in memory per user for fast reads and echo detection.
    #[serde(default = "default_recent_cache_size")]
    pub recent_cache_size: usize,

    /// Window in which an identical outbound (phone, text) counts as an echo.
    #[serde(default = "default_echo_window_secs")]
    pub echo_window_secs: u64,

    /// How long `GET /qr` waits for a QR or a connection.
    #[serde(default = "default_qr_timeout_secs")]
    pub qr_timeout_secs: u64,

    /// Poll interval while waiting for a QR.
    #[serde(default = "default_qr_poll_interval_ms")]
    pub qr_poll_interval_ms: u64,

    /// How long a send waits for the session to connect.
    #[serde(default = "default_send_wait_secs")]
    pub send_wait_secs: u64,

    /// Delay before the single reconnect attempt after a close.
    #[serde(default = "default_reconnect_delay_secs")]
    pub reconnect_delay_secs: u64,

    /// Upper bound for one media download.
    #[serde(default = "default_media_download_timeout_secs")]
    pub media_download_timeout_secs: u64,

    /// Capacity of each session's protocol event channel.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,

    /// Capacity of each live-stream subscriber's queue.
    #[serde(default = "default_subscriber_buffer")]
    pub subscriber_buffer: usize,
}

impl Default for WhatsAppConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            sidecar_url: default_sidecar_url(),
            recent_cache_size: default_recent_cache_size(),
            echo_window_secs: default_echo_window_secs(),
            qr_timeout_secs: default_qr_timeout_secs(),
            qr_poll_interval_ms: default_qr_poll_interval_ms(),
            send_wait_secs: default_send_wait_secs(),
            reconnect_delay_secs: default_reconnect_delay_secs(),
            media_download_timeout_secs: default_media_download_timeout_secs(),
            event_buffer: default_event_buffer(),
            subscriber_buffer: default_subscriber_buffer(),
        }
    }
}

fn default_data_dir() -> String {
    dirs::data_dir()
        .map(|p| p.join("leadbridge").join("whatsapp"))
        .unwrap_or_else(|| "whatsapp-data".into())
        .display()
        .to_string()
}

fn default_sidecar_url() -> String {
    "ws://127.0.0.1:3100".to_string()
}

fn default_recent_cache_size() -> usize {
    300
}

fn default_echo_window_secs() -> u64 {
    120
}

fn default_qr_timeout_secs() -> u64 {
    20
}

fn default_qr_poll_interval_ms() -> u64 {
    500
}

fn default_send_wait_secs() -> u64 {
    10
}

fn default_reconnect_delay_secs() -> u64 {
    3
}

fn default_media_download_timeout_secs() -> u64 {
    30
}

fn default_event_buffer() -> usize {
    256
}

fn default_subscriber_buffer() -> usize {
    64
}

/// Lead linking configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LeadsConfig {
    /// Lifetime of the per-(user, phone) guard against duplicate lead creation.
    #[serde(default = "default_inflight_ttl_secs")]
    pub inflight_ttl_secs: u64,

    /// Funnel stage for leads that have only written to us.
    #[serde(default = "default_initial_stage")]
    pub initial_stage: String,

    /// Funnel stage once both sides have spoken.
    #[serde(default = "default_contact_stage")]
    pub contact_stage: String,

    /// Stages the bridge never changes.
    #[serde(default = "default_terminal_stages")]
    pub terminal_stages: Vec<String>,

    /// Prefix of the placeholder name given to auto-created leads.
    #[serde(default = "default_placeholder_prefix")]
    pub placeholder_prefix: String,

    /// Link history-sync messages to leads as well as live ones.
    #[serde(default = "default_link_history")]
    pub link_history: bool,
}

impl Default for LeadsConfig {
    fn default() -> Self {
        Self {
            inflight_ttl_secs: default_inflight_ttl_secs(),
            initial_stage: default_initial_stage(),
            contact_stage: default_contact_stage(),
            terminal_stages: default_terminal_stages(),
            placeholder_prefix: default_placeholder_prefix(),
            link_history: default_link_history(),
        }
    }
}

fn default_inflight_ttl_secs() -> u64 {
    30
}

fn default_initial_stage() -> String {
    "novo".to_string()
}

fn default_contact_stage() -> String {
    "em_contato".to_string()
}

fn default_terminal_stages() -> Vec<String> {
    vec!["ganho".to_string(), "perdido".to_string()]
}

fn default_placeholder_prefix() -> String {
    "WhatsApp ".to_string()
}

fn default_link_history() -> bool {
    true
}

/// Phone matching configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PhoneConfig {
    /// Country code prepended to national numbers.
    #[serde(default = "default_country_code")]
    pub country_code: String,

    /// Treat numbers as the same contact when one variant ends with another.
    #[serde(default = "default_suffix_match")]
    pub suffix_match: bool,
}

impl Default for PhoneConfig {
    fn default() -> Self {
        Self {
            country_code: default_country_code(),
            suffix_match: default_suffix_match(),
        }
    }
}

fn default_country_code() -> String {
    "55".to_string()
}

fn default_suffix_match() -> bool {
    true
}
