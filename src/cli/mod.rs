//! CLI module for xatm
//!
//! Provides command-line interface for:
//! - check-config: Validate configuration
//! - recover: Boot, run crash recovery for configured resources, stop

mod args;
mod commands;
mod errors;
mod io;

pub use args::{Cli, Command};
pub use commands::{check_config, recover, run, run_command};
pub use errors::{CliError, CliErrorCode, CliResult};
pub use io::{write_error, write_response};
