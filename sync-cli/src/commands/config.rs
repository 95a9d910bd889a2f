//! Print the effective configuration.

use anyhow::{Context, Result};
use sync_client::EngineConfig;

/// Run the config command.
pub fn run(config: &EngineConfig) -> Result<()> {
    println!("{}", render(config)?);
    Ok(())
}

fn render(config: &EngineConfig) -> Result<String> {
    toml::to_string_pretty(config).context("Failed to render configuration")
}
