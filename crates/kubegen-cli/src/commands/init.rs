//! `kubegen init`: write a default configuration file.

use std::path::PathBuf;

use tracing::info;

use crate::{
    cli::InitArgs,
    config::{AppConfig, LOCAL_CONFIG},
    error::{CliError, CliResult, IntoCli},
    output::OutputManager,
};

pub fn execute(args: InitArgs, output: OutputManager) -> CliResult<()> {
    let path = if args.local {
        PathBuf::from(LOCAL_CONFIG)
    } else {
        AppConfig::global_path().ok_or_else(|| CliError::ConfigError {
            message: "No home directory to place the configuration in; use --local".into(),
            source: None,
        })?
    };

    if path.exists() && !args.force {
        return Err(CliError::ConfigExists { path });
    }

    let toml = AppConfig::default()
        .to_toml()
        .map_err(|e| CliError::ConfigError {
            message: format!("Failed to serialise default config: {e}"),
            source: Some(Box::new(e)),
        })?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_cli_context(|| format!("Failed to create '{}'", parent.display()))?;
    }
    std::fs::write(&path, toml)
        .with_cli_context(|| format!("Failed to write '{}'", path.display()))?;

    info!(path = %path.display(), "Configuration written");
    output.success(&format!("Configuration created at {}", path.display()))?;
    Ok(())
}
