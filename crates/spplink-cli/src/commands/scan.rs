//! Scan command implementation.

use anyhow::{Context, Result};
use spplink_core::{DiscoveredDevice, Discoverer, RadioStack};

use super::secs;
use crate::cli::ScanArgs;
use crate::config::{Config, DEFAULT_TIMEOUT_SECS, resolve_secs};
use crate::style;

pub async fn cmd_scan<R: RadioStack>(
    radio: R,
    args: &ScanArgs,
    json: bool,
    config: &Config,
    quiet: bool,
    no_color: bool,
) -> Result<()> {
    let timeout = resolve_secs(args.timeout, config.timeout, DEFAULT_TIMEOUT_SECS);

    // JSON output stays machine-readable
    let spinner = style::scanning_spinner(None, timeout, quiet || json);

    let devices = Discoverer::new(&radio)
        .scan(secs(timeout))
        .await
        .context("Failed to scan for devices")?;

    spinner.finish_and_clear();

    let content = if json {
        serde_json::to_string_pretty(&devices).context("Failed to serialize devices")?
    } else {
        format_scan_text(&devices, !quiet, no_color)
    };
    println!("{}", content);
    Ok(())
}

fn format_scan_text(devices: &[DiscoveredDevice], show_tips: bool, no_color: bool) -> String {
    if devices.is_empty() {
        let mut out = style::format_warning("No devices found.", no_color);
        if show_tips {
            out.push_str(
                "\n\nMake sure the device is powered on, in range and discoverable, \
                 then try a longer scan with --timeout.",
            );
        }
        return out;
    }

    let mut lines = vec![style::format_title(
        &format!("Found {} device(s)", devices.len()),
        no_color,
    )];
    lines.extend(devices.iter().map(|d| style::format_device_row(d, no_color)));

    if show_tips {
        lines.push(String::new());
        lines.push("Connect with: spplink connect --name <NAME>".to_string());
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_scan_text_has_hint() {
        let text = format_scan_text(&[], true, true);
        assert!(text.starts_with("[!!] No devices found."));
        assert!(text.contains("--timeout"));
    }

    #[test]
    fn test_scan_text_lists_devices_in_order() {
        let devices = vec![
            DiscoveredDevice::named("AA:BB", "Other"),
            DiscoveredDevice::named("CC:DD", "RobotSpider"),
        ];
        let text = format_scan_text(&devices, false, true);
        assert!(text.starts_with("Found 2 device(s)"));
        let other = text.find("Other").unwrap();
        let spider = text.find("RobotSpider").unwrap();
        assert!(other < spider);
        assert!(!text.contains("spplink connect"));
    }

    #[test]
    fn test_scan_json_shape() {
        let devices = vec![DiscoveredDevice::new("AA:BB", None)];
        let json = serde_json::to_value(&devices).unwrap();
        assert_eq!(json[0]["address"], "AA:BB");
        assert!(json[0]["name"].is_null());
    }
}
