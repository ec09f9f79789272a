//! Config command implementation.

use anyhow::{Context, Result};

use crate::cli::ConfigAction;
use crate::config::Config;
use crate::style;

pub fn cmd_config(action: &ConfigAction, no_color: bool) -> Result<()> {
    let path = Config::path();
    match action {
        ConfigAction::Path => {
            println!("{}", path.display());
        }
        ConfigAction::Show => {
            let config = Config::load();
            if config == Config::default() {
                println!("(no configuration set)");
                println!("Config file: {}", path.display());
            } else {
                let content =
                    toml::to_string_pretty(&config).context("Failed to serialize config")?;
                print!("{}", content);
            }
        }
        ConfigAction::Get { key } => {
            let config = Config::load();
            match config.get(key.as_str()) {
                Some(value) => println!("{}", value),
                None => println!("(not set)"),
            }
        }
        ConfigAction::Set { key, value } => {
            let mut config = Config::load();
            config.set(key.as_str(), value)?;
            config.save()?;
            println!(
                "{}",
                style::format_success(&format!("Set {} = {}", key.as_str(), value), no_color)
            );
        }
        ConfigAction::Unset { key } => {
            let mut config = Config::load();
            config.unset(key.as_str())?;
            config.save()?;
            println!(
                "{}",
                style::format_success(&format!("Unset {}", key.as_str()), no_color)
            );
        }
    }
    Ok(())
}
