//! `oxpilot config` — show or initialize the configuration file.

use anyhow::Context;
use clap::Subcommand;
use oxpilot_config::AppConfig;

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the active configuration file
    Show,
    /// Write a default configuration file
    Init,
}

pub fn run(action: ConfigAction) -> anyhow::Result<()> {
    let path = AppConfig::config_dir().join("config.toml");

    match action {
        ConfigAction::Show => {
            if !path.exists() {
                println!("Config file not found at {}", path.display());
                println!("Run 'oxpilot config init' to create a new configuration file.");
                return Ok(());
            }
            let content = std::fs::read_to_string(&path).context("Failed to read config file")?;
            println!("--- oxpilot configuration ---");
            println!("File: {}\n", path.display());
            println!("{content}");
        }
        ConfigAction::Init => {
            if path.exists() {
                println!("Config file already exists at {}", path.display());
                return Ok(());
            }
            let config = AppConfig::default();
            config.save_to(&path).context("Failed to write config file")?;
            println!("Wrote default configuration to {}", path.display());
        }
    }

    Ok(())
}
