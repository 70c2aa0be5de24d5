//! CLI command implementations
//!
//! `recover` follows the full boot sequence: load config, construct the
//! transaction manager, register resources, run recovery, then stop.

use std::path::Path;
use std::sync::Arc;

use tracing::info;

use crate::config::TxConfig;
use crate::observability::{init_logging, Event};
use crate::recovery::{RecoveryRegistrar, RecoveryReport, ResourceEntry, StaticResourceSource};
use crate::tx::TransactionManager;
use crate::xa::MemoryResource;

use super::args::Command;
use super::errors::CliResult;
use super::io::write_response;

/// Parse arguments and run the selected command
pub fn run() -> CliResult<()> {
    let cli = super::args::Cli::parse_args();
    run_command(cli.command)
}

/// Run the appropriate command based on CLI args
pub fn run_command(cmd: Command) -> CliResult<()> {
    match cmd {
        Command::CheckConfig { config } => check_config(&config),
        Command::Recover { config } => {
            let report = recover(&config)?;
            write_response(serde_json::to_value(&report)?)
        }
    }
}

/// Validate the configuration and print the effective settings
pub fn check_config(config_path: &Path) -> CliResult<()> {
    let config = TxConfig::load(config_path)?;
    write_response(serde_json::to_value(&config)?)
}

/// Boot, recover the configured resources, and stop.
///
/// The configured resources are served by in-memory resource managers.
pub fn recover(config_path: &Path) -> CliResult<RecoveryReport> {
    let config = TxConfig::load(config_path)?;
    init_logging(&config.log_level);
    info!(
        event = %Event::ConfigLoaded,
        path = %config_path.display(),
        resources = config.resources.len(),
        "configuration loaded"
    );

    let manager = Arc::new(TransactionManager::start(&config)?);

    let source: StaticResourceSource = config
        .resources
        .iter()
        .map(|name| ResourceEntry::new(name.clone(), Arc::new(MemoryResource::new(name.clone()))))
        .collect();

    let registrar = RecoveryRegistrar::new(manager);
    let report = registrar.init(&source);
    registrar.stop();

    Ok(report?)
}
