//! CLI argument definitions using clap
//!
//! Commands:
//! - xatm check-config --config <path>
//! - xatm recover --config <path>

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// xatm - transaction manager with XA crash recovery
#[derive(Parser, Debug)]
#[command(name = "xatm")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Validate a configuration file and print the effective settings
    CheckConfig {
        /// Path to configuration file
        #[arg(long, default_value = "./xatm.json")]
        config: PathBuf,
    },

    /// Start the transaction manager, run recovery for the configured
    /// resources, print the report and stop
    Recover {
        /// Path to configuration file
        #[arg(long, default_value = "./xatm.json")]
        config: PathBuf,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
