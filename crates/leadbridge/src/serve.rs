// SPDX-FileCopyrightText: 2026 Leadbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `leadbridge serve` command implementation.
//!
//! Opens SQLite storage, wires the WhatsApp bridge to the protocol sidecar,
//! and serves the HTTP gateway until a shutdown signal arrives.

use std::sync::Arc;
use std::time::Duration;

use leadbridge_config::LeadbridgeConfig;
use leadbridge_core::BridgeError;
use leadbridge_core::traits::Adapter;
use leadbridge_gateway::{AuthConfig, GatewayState, HealthState, ServerConfig};
use leadbridge_storage::SqliteStorage;
use leadbridge_whatsapp::{Bridge, SessionRegistry, SidecarConnector, recording};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::{error, info, warn};

use crate::shutdown;

/// Runs the `leadbridge serve` command.
pub async fn run_serve(config: LeadbridgeConfig) -> Result<(), BridgeError> {
    init_tracing(&config.server.log_level);
    let prometheus_render = install_metrics();

    let storage = SqliteStorage::new(config.storage.clone());
    storage.initialize().await?;
    let storage = Arc::new(storage);
    info!(path = %config.storage.database_path, "storage initialized");

    let connector = Arc::new(SidecarConnector::from_config(&config.whatsapp));
    let bridge = Bridge::new(&config, storage.clone(), storage.clone());
    let registry = SessionRegistry::new(connector, bridge, config.whatsapp.clone());
    info!(
        sidecar = %config.whatsapp.sidecar_url,
        data_dir = %config.whatsapp.data_dir,
        "whatsapp bridge ready"
    );

    if config.server.jwt_secret.is_none() {
        warn!("server.jwt_secret is not set; every authenticated route will return 401");
    }

    let state = GatewayState {
        registry: registry.clone(),
        storage: storage.clone(),
        auth: AuthConfig {
            jwt_secret: config.server.jwt_secret.clone(),
        },
        health: HealthState {
            start_time: std::time::Instant::now(),
            prometheus_render,
        },
        qr_timeout: Duration::from_secs(config.whatsapp.qr_timeout_secs),
    };
    let server_config = ServerConfig {
        host: config.server.host.clone(),
        port: config.server.port,
    };

    let cancel = shutdown::install_signal_handler();
    let result = leadbridge_gateway::start_server(&server_config, state, cancel.clone()).await;
    // A bind failure returns before any signal; stop the signal task too.
    cancel.cancel();

    registry.shutdown();
    if let Err(e) = storage.shutdown().await {
        error!(error = %e, "storage shutdown failed");
    }
    info!("leadbridge stopped");
    result
}

/// Installs the global Prometheus recorder and returns its renderer for `/metrics`.
fn install_metrics() -> Option<Arc<dyn Fn() -> String + Send + Sync>> {
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            recording::register_metrics();
            info!("prometheus metrics recorder installed");
            Some(Arc::new(move || handle.render()) as Arc<dyn Fn() -> String + Send + Sync>)
        }
        Err(e) => {
            warn!(error = %e, "failed to install prometheus recorder, /metrics disabled");
            None
        }
    }
}

/// Initializes the tracing subscriber. `RUST_LOG` overrides the configured level.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("leadbridge={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}
