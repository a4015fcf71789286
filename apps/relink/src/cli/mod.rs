//! # Relink CLI Module
//!
//! This module implements the CLI interface for Relink.
//!
//! ## Available Commands
//!
//! - `replay` - Replay a scenario and report result identity per step
//! - `resolve` - Resolve one fragment against a scenario's store
//! - `check` - Validate a scenario file

mod commands;

use clap::{Parser, Subcommand};
use relink_core::{RecordId, RelinkError};
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// Relink - fragment resolution with stable result identity
///
/// Replays store mutations against fragment resolvers and shows which
/// results kept their identity.
#[derive(Parser, Debug)]
#[command(name = "relink")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress headers and summaries
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Replay a scenario file
    Replay {
        /// Path to the scenario (TOML)
        #[arg(short, long)]
        scenario: PathBuf,
    },

    /// Resolve a fragment against the scenario's initial store
    Resolve {
        /// Path to the scenario (TOML)
        #[arg(short, long)]
        scenario: PathBuf,

        /// Fragment name
        #[arg(short, long)]
        fragment: String,

        /// Record identifier; repeat for a plural resolution
        #[arg(long = "id", required = true)]
        ids: Vec<String>,
    },

    /// Validate a scenario file
    Check {
        /// Path to the scenario (TOML)
        #[arg(short, long)]
        scenario: PathBuf,
    },
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub fn execute(cli: Cli) -> Result<(), RelinkError> {
    let output = Output {
        json_mode: cli.json_mode,
        quiet: cli.quiet,
        verbose: cli.verbose,
    };

    match cli.command {
        Commands::Replay { scenario } => cmd_replay(&scenario, output),
        Commands::Resolve {
            scenario,
            fragment,
            ids,
        } => {
            let ids: Vec<RecordId> = ids.into_iter().map(RecordId::new).collect();
            cmd_resolve(&scenario, output, &fragment, ids)
        }
        Commands::Check { scenario } => cmd_check(&scenario, output),
    }
}
