//! Configuration commands.

use std::path::Path;

use crate::config::CliConfig;
use crate::error::{CliError, CliResult};

/// Print the configuration as TOML with secrets masked.
pub fn dump(config: &CliConfig) -> CliResult<()> {
    let text = toml::to_string_pretty(&config.redacted())
        .map_err(|e| CliError::Config(format!("failed to serialize config: {}", e)))?;
    print!("{}", text);
    Ok(())
}

/// Validate the configuration.
pub fn validate(config: &CliConfig) -> CliResult<()> {
    config.validate()?;
    // Secret references are only checked when they resolve.
    config.enabled_sources()?;
    println!(
        "Configuration is valid ({} source(s), {} enabled).",
        config.sources.len(),
        config.sources.iter().filter(|s| s.enabled).count()
    );
    Ok(())
}

/// Print the configuration file path.
pub fn path(path: &Path) {
    println!("{}", path.display());
}
