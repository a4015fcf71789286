//! # Relink - Scenario Runner
//!
//! The command-line driver for the relink-core resolvers.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                  apps/relink (THE BINARY)                │
//! │                                                          │
//! │   ┌─────────────┐        ┌──────────────────────────┐    │
//! │   │    CLI      │ ─────▶ │  Scenario + Replay (lib) │    │
//! │   │   (clap)    │        │  (toml, serde)           │    │
//! │   └─────────────┘        └────────────┬─────────────┘    │
//! │                                       ▼                  │
//! │                              ┌─────────────────┐         │
//! │                              │   relink-core   │         │
//! │                              │   (THE LOGIC)   │         │
//! │                              └─────────────────┘         │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! relink replay -s demos/friends.toml
//! relink resolve -s demos/friends.toml -f UserCard --id 1
//! relink check -s demos/friends.toml --json-mode
//! ```

mod cli;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

fn main() {
    // RELINK_LOG_FORMAT=json enables machine-parseable logs.
    let log_format = std::env::var("RELINK_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "relink=info,relink_core=warn".into());

    // Logs go to stderr; stdout carries command output.
    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(std::io::stderr),
                )
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }

    let cli = cli::Cli::parse();

    if let Err(e) = cli::execute(cli) {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}
