//! Command implementations for the CLI.

mod config;
mod connect;
mod scan;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use spplink_core::RadioStack;

pub use config::cmd_config;
pub use connect::{HoldEnd, cmd_connect};
pub use scan::cmd_scan;

/// The platform radio stack this build talks to.
///
/// `adapter` picks a specific controller such as `hci1`; `None` uses the
/// system default.
#[cfg(all(target_os = "linux", feature = "bluez"))]
pub fn radio(adapter: Option<&str>) -> Result<Arc<dyn RadioStack>> {
    let radio = match adapter {
        Some(name) => spplink_core::BluezRadio::with_adapter(name),
        None => spplink_core::BluezRadio::new(),
    };
    Ok(Arc::new(radio))
}

/// The platform radio stack this build talks to.
#[cfg(not(all(target_os = "linux", feature = "bluez")))]
pub fn radio(_adapter: Option<&str>) -> Result<Arc<dyn RadioStack>> {
    anyhow::bail!(
        "This build has no Bluetooth backend. Rebuild on Linux with the `bluez` feature enabled."
    )
}

fn secs(value: u64) -> Duration {
    Duration::from_secs(value)
}
