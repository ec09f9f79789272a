//! spplink: connect to a Bluetooth Classic device by name over SPP.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `connect` | Find a device by name, resolve its SPP channel and connect |
//! | `scan` | List nearby Bluetooth Classic devices |
//! | `config` | Manage CLI configuration |
//! | `completions` | Generate shell completions |
//!
//! # Configuration
//!
//! Settings live in `~/.config/spplink/config.toml` (or platform
//! equivalent): `device`, `timeout`, `hold` and `no_color`.
//!
//! # Environment Variables
//!
//! - `SPPLINK_DEVICE`: Default device name (overridden by `--name`)
//! - `SPPLINK_ADAPTER`: Bluetooth adapter to use (same as `--adapter`)
//! - `NO_COLOR`: Disable colored output when set
//! - `RUST_LOG`: Log filter when neither `-v` nor `-q` is given
//!
//! # Exit Codes
//!
//! `0` on success, `1` when any stage fails, `130` when interrupted with
//! Ctrl+C while holding a connection.

mod cli;
mod commands;
mod config;
mod style;

use std::io;
use std::process::ExitCode;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};
use commands::HoldEnd;
use config::Config;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    human_panic::setup_panic!();

    let cli = Cli::parse();

    // Handle completions command early (before tracing init)
    if let Commands::Completions { shell } = cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(shell, &mut cmd, "spplink", &mut io::stdout());
        return Ok(ExitCode::SUCCESS);
    }

    let filter = if cli.quiet {
        EnvFilter::new("warn")
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let config = Config::load();
    let no_color = cli.no_color || config.no_color;

    match &cli.command {
        Commands::Connect(args) => {
            let radio = commands::radio(cli.adapter.as_deref())?;
            let end = commands::cmd_connect(
                radio,
                args,
                &config,
                cli.quiet,
                no_color,
                &mut io::stdout(),
                tokio::signal::ctrl_c(),
            )
            .await?;
            if end == HoldEnd::Interrupted {
                return Ok(ExitCode::from(130));
            }
        }
        Commands::Scan { scan, json } => {
            let radio = commands::radio(cli.adapter.as_deref())?;
            commands::cmd_scan(radio, scan, *json, &config, cli.quiet, no_color).await?;
        }
        Commands::Config { action } => {
            commands::cmd_config(action, no_color)?;
        }
        Commands::Completions { .. } => unreachable!("handled above"),
    }

    Ok(ExitCode::SUCCESS)
}
