//! Init command implementation

use anyhow::{Result, bail};
use std::path::PathBuf;

use physio_quest::EngineConfig;

/// Write the built-in rules and catalog as an editable config file
pub fn init_command(config_path: Option<PathBuf>, force: bool) -> Result<()> {
    let config_path = config_path.unwrap_or_else(EngineConfig::global_config_path);

    if config_path.exists() && !force {
        bail!(
            "Configuration already exists: {}\nUse --force to overwrite.",
            config_path.display()
        );
    }

    EngineConfig::with_defaults().save_to_file(&config_path)?;
    println!("Created: {}", config_path.display());

    Ok(())
}
