// SPDX-FileCopyrightText: 2026 Leadbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Leadbridge - WhatsApp messaging bridge for a multi-tenant CRM.
//!
//! This is the binary entry point.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod serve;
mod shutdown;

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use leadbridge_config::LeadbridgeConfig;

/// Leadbridge - WhatsApp messaging bridge for a multi-tenant CRM.
#[derive(Parser, Debug)]
#[command(name = "leadbridge", version, about, long_about = None)]
struct Cli {
    /// Load configuration from this file instead of the standard locations.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the bridge and its HTTP gateway.
    Serve,
    /// Validate configuration and exit.
    CheckConfig,
    /// Mint a bearer token for a user, signed with `server.jwt_secret`.
    Token {
        /// CRM user id placed in the `sub` claim.
        user_id: String,
        /// Token lifetime in hours.
        #[arg(long, default_value_t = 24)]
        hours: u64,
    },
}

fn load(path: Option<&std::path::Path>) -> LeadbridgeConfig {
    let loaded = match path {
        Some(path) => leadbridge_config::load_and_validate_path(path),
        None => leadbridge_config::load_and_validate(),
    };
    match loaded {
        Ok(config) => config,
        Err(errors) => {
            leadbridge_config::render_errors(&errors);
            std::process::exit(1);
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = load(cli.config.as_deref());

    match cli.command {
        Some(Commands::Serve) => {
            if let Err(e) = serve::run_serve(config).await {
                eprintln!("leadbridge: {e}");
                std::process::exit(1);
            }
        }
        Some(Commands::CheckConfig) => {
            println!(
                "leadbridge: config ok (gateway {}:{}, sidecar {})",
                config.server.host, config.server.port, config.whatsapp.sidecar_url
            );
            if config.server.jwt_secret.is_none() {
                eprintln!("leadbridge: warning: server.jwt_secret is not set, the gateway will reject every request");
            }
        }
        Some(Commands::Token { user_id, hours }) => {
            let Some(secret) = config.server.jwt_secret.as_deref() else {
                eprintln!("leadbridge: server.jwt_secret is not set");
                std::process::exit(1);
            };
            let ttl = Duration::from_secs(hours.saturating_mul(3600));
            match leadbridge_gateway::issue_token(secret, &user_id, ttl) {
                Ok(token) => println!("{token}"),
                Err(e) => {
                    eprintln!("leadbridge: {e}");
                    std::process::exit(1);
                }
            }
        }
        None => {
            println!("leadbridge: use --help for available commands");
        }
    }
}
