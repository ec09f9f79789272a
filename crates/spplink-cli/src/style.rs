//! Terminal output helpers: spinners for the radio waits, `[OK]`-style
//! status markers and boxed failure reports.

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::{AnsiColors, OwoColorize};

use spplink_core::DiscoveredDevice;

/// Braille dots, one frame per tick.
const FRAMES: &str = "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏";
const TICK: Duration = Duration::from_millis(80);

fn spinner_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner:.cyan} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_chars(FRAMES)
}

/// Create a spinner with `message`, or a hidden one when `quiet`.
pub fn spinner(message: impl Into<String>, quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new_spinner()
        .with_style(spinner_style())
        .with_message(message.into());
    bar.enable_steady_tick(TICK);
    bar
}

/// Create a spinner for the discovery wait.
pub fn scanning_spinner(target: Option<&str>, timeout_secs: u64, quiet: bool) -> ProgressBar {
    let message = match target {
        Some(name) => format!("Scanning for \"{}\"... ({}s)", name, timeout_secs),
        None => format!("Scanning for devices... ({}s)", timeout_secs),
    };
    spinner(message, quiet)
}

/// Print to stderr above a running spinner.
pub fn print_suspended(spinner: &ProgressBar, message: &str) {
    spinner.suspend(|| eprintln!("{}", message));
}

/// Width of the error box, borders included.
const BOX_WIDTH: usize = 60;

/// Render a titled error box, with numbered hints under "Troubleshooting".
pub fn format_error_box(title: &str, message: &str, suggestions: &[&str]) -> String {
    let fill = BOX_WIDTH.saturating_sub(title.chars().count() + 4);
    let mut out = vec![format!("┌─ {} {}", title, "─".repeat(fill)), "│".into()];
    out.extend(message.lines().map(|line| format!("│  {}", line)));

    if !suggestions.is_empty() {
        out.push("│".into());
        out.push("│  Troubleshooting:".into());
        out.extend(
            suggestions
                .iter()
                .enumerate()
                .map(|(i, hint)| format!("│    {}. {}", i + 1, hint)),
        );
    }

    out.push("│".into());
    out.push(format!("└{}┘", "─".repeat(BOX_WIDTH - 2)));
    out.join("\n")
}

#[derive(Clone, Copy)]
enum Marker {
    Ok,
    Info,
    Warn,
}

fn marked(marker: Marker, message: &str, no_color: bool) -> String {
    let (tag, color) = match marker {
        Marker::Ok => ("[OK]", AnsiColors::Green),
        Marker::Info => ("[--]", AnsiColors::Cyan),
        Marker::Warn => ("[!!]", AnsiColors::Yellow),
    };
    if no_color {
        format!("{} {}", tag, message)
    } else {
        format!("{} {}", tag.color(color), message)
    }
}

pub fn format_success(message: &str, no_color: bool) -> String {
    marked(Marker::Ok, message, no_color)
}

pub fn format_info(message: &str, no_color: bool) -> String {
    marked(Marker::Info, message, no_color)
}

pub fn format_warning(message: &str, no_color: bool) -> String {
    marked(Marker::Warn, message, no_color)
}

/// A title underlined with a heavy rule.
pub fn format_title(title: &str, no_color: bool) -> String {
    let rule = "━".repeat(title.chars().count());
    if no_color {
        format!("{}\n{}", title, rule)
    } else {
        format!("{}\n{}", title.bold(), rule.dimmed())
    }
}

/// One discovered device as an indented `name  address` row.
pub fn format_device_row(device: &DiscoveredDevice, no_color: bool) -> String {
    let name = device.name.as_deref().unwrap_or("(no name)");
    if no_color {
        format!("  {:<24} {}", name, device.address)
    } else {
        format!("  {:<24} {}", name.cyan(), device.address.dimmed())
    }
}
