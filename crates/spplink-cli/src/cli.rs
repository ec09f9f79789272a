//! CLI argument definitions using clap.

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::config::MAX_TIMEOUT_SECS;

#[derive(Parser)]
#[command(name = "spplink")]
#[command(
    author,
    version,
    about = "Connect to a Bluetooth Classic device by name over the Serial Port Profile",
    long_about = None
)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    pub no_color: bool,

    /// Bluetooth adapter to use, e.g. hci1 [default: system default]
    #[arg(long, global = true, env = "SPPLINK_ADAPTER")]
    pub adapter: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Timeouts shared by commands that talk to the radio
#[derive(Debug, Clone, Args)]
pub struct ScanArgs {
    /// Discovery timeout in seconds [default: config or 10]
    #[arg(short, long, value_parser = clap::value_parser!(u64).range(1..=MAX_TIMEOUT_SECS))]
    pub timeout: Option<u64>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Find a device by name, resolve its SPP channel and connect
    Connect(ConnectArgs),

    /// List nearby Bluetooth Classic devices
    Scan {
        #[command(flatten)]
        scan: ScanArgs,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Manage CLI configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Debug, Clone, Args)]
pub struct ConnectArgs {
    /// Advertised device name, or use SPPLINK_DEVICE env var
    #[arg(short, long, env = "SPPLINK_DEVICE")]
    pub name: Option<String>,

    #[command(flatten)]
    pub scan: ScanArgs,

    /// SPP channel query timeout in seconds
    #[arg(long, default_value = "15", value_parser = clap::value_parser!(u64).range(1..=MAX_TIMEOUT_SECS))]
    pub channel_timeout: u64,

    /// Connection handshake timeout in seconds
    #[arg(long, default_value = "15", value_parser = clap::value_parser!(u64).range(1..=MAX_TIMEOUT_SECS))]
    pub connect_timeout: u64,

    /// Seconds to keep the connection open, printing what arrives [default: config or 5]
    #[arg(long)]
    pub hold: Option<u64>,

    /// Retry the whole session this many times on transient failures
    #[arg(long, default_value = "0")]
    pub retries: u32,

    /// Match names ignoring case and surrounding whitespace
    #[arg(long)]
    pub ignore_case: bool,
}

/// Configuration keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ConfigKey {
    /// Default device name
    Device,
    /// Default discovery timeout in seconds
    Timeout,
    /// Seconds to hold a connection open
    Hold,
    /// Disable colored output
    NoColor,
}

impl ConfigKey {
    /// Key name as written in the config file
    pub fn as_str(self) -> &'static str {
        match self {
            ConfigKey::Device => "device",
            ConfigKey::Timeout => "timeout",
            ConfigKey::Hold => "hold",
            ConfigKey::NoColor => "no_color",
        }
    }
}

/// Configuration subcommands
#[derive(Subcommand)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Get a configuration value
    Get {
        /// Configuration key
        #[arg(value_enum)]
        key: ConfigKey,
    },

    /// Set a configuration value
    Set {
        /// Configuration key
        #[arg(value_enum)]
        key: ConfigKey,
        /// Configuration value
        value: String,
    },

    /// Unset (remove) a configuration value
    Unset {
        /// Configuration key to remove
        #[arg(value_enum)]
        key: ConfigKey,
    },

    /// Show configuration file path
    Path,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_connect_defaults() {
        let cli = Cli::try_parse_from(["spplink", "connect", "-n", "Rover"]).unwrap();
        let Commands::Connect(args) = cli.command else {
            panic!("expected connect");
        };
        assert_eq!(args.name.as_deref(), Some("Rover"));
        assert_eq!(args.scan.timeout, None);
        assert_eq!(args.channel_timeout, 15);
        assert_eq!(args.connect_timeout, 15);
        assert_eq!(args.hold, None);
        assert_eq!(args.retries, 0);
        assert!(!args.ignore_case);
    }

    #[test]
    fn test_zero_timeout_rejected() {
        assert!(Cli::try_parse_from(["spplink", "connect", "-t", "0"]).is_err());
        assert!(Cli::try_parse_from(["spplink", "scan", "--timeout", "0"]).is_err());
    }

    #[test]
    fn test_oversized_timeout_rejected() {
        let huge = u64::MAX.to_string();
        assert!(Cli::try_parse_from(["spplink", "connect", "-t", &huge]).is_err());
        assert!(Cli::try_parse_from(["spplink", "connect", "--connect-timeout", "3601"]).is_err());
        assert!(Cli::try_parse_from(["spplink", "scan", "-t", "3600"]).is_ok());
    }

    #[test]
    fn test_adapter_is_global() {
        let cli = Cli::try_parse_from(["spplink", "scan", "--adapter", "hci1"]).unwrap();
        assert_eq!(cli.adapter.as_deref(), Some("hci1"));
        let cli = Cli::try_parse_from(["spplink", "connect"]).unwrap();
        assert_eq!(cli.adapter, None);
    }

    #[test]
    fn test_verbose_and_quiet_conflict() {
        assert!(Cli::try_parse_from(["spplink", "-v", "-q", "scan"]).is_err());
    }

    #[test]
    fn test_config_set_parses_key() {
        let cli = Cli::try_parse_from(["spplink", "config", "set", "no-color", "true"]).unwrap();
        match cli.command {
            Commands::Config {
                action: ConfigAction::Set { key, value },
            } => {
                assert_eq!(key.as_str(), "no_color");
                assert_eq!(value, "true");
            }
            _ => panic!("expected config set"),
        }
    }
}
