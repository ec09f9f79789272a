//! Connect command implementation.
//!
//! Runs one session (or several, with `--retries`), then holds the
//! connection open for a while and prints whatever the device sends.

use std::future::Future;
use std::io::{self, Write};

use anyhow::{Result, bail};
use indicatif::ProgressBar;
use spplink_core::{
    ConnectionEvent, EventReceiver, NameMatch, NoChannelError, NotFoundCause, NotFoundError,
    RadioStack, RetryConfig, SessionError, SessionEvent, SessionOrchestrator, SessionPolicy,
};
use tokio::sync::broadcast::error::RecvError;

use super::secs;
use crate::cli::ConnectArgs;
use crate::config::{
    Config, DEFAULT_HOLD_SECS, DEFAULT_TIMEOUT_SECS, print_device_source_feedback,
    resolve_device, resolve_secs,
};
use crate::style;

/// How the hold phase after a successful connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoldEnd {
    /// The hold time ran out.
    Elapsed,
    /// The device closed the stream.
    DeviceClosed,
    /// The stream failed.
    Lost,
    /// The user interrupted with Ctrl+C.
    Interrupted,
}

/// Connect to the configured device over `radio`, copy inbound data to
/// `out` until the hold time ends, then close.
///
/// Stage failures are reported on stderr and returned as a short error.
/// `interrupt` resolving ends the hold phase early.
pub async fn cmd_connect<R, W, I>(
    radio: R,
    args: &ConnectArgs,
    config: &Config,
    quiet: bool,
    no_color: bool,
    out: &mut W,
    interrupt: I,
) -> Result<HoldEnd>
where
    R: RadioStack,
    W: Write,
    I: Future<Output = io::Result<()>>,
{
    let (name, source) = resolve_device(args.name.clone(), config);
    print_device_source_feedback(&name, source, quiet);

    let timeout = resolve_secs(args.scan.timeout, config.timeout, DEFAULT_TIMEOUT_SECS);
    let hold = resolve_secs(args.hold, config.hold, DEFAULT_HOLD_SECS);
    let policy = SessionPolicy::new()
        .discovery_timeout(secs(timeout))
        .channel_timeout(secs(args.channel_timeout))
        .connect_timeout(secs(args.connect_timeout))
        .name_match(if args.ignore_case {
            NameMatch::IgnoreCaseTrimmed
        } else {
            NameMatch::Exact
        });
    policy.validate()?;

    let session = SessionOrchestrator::new(radio);
    let spinner = style::scanning_spinner(Some(&name), timeout, quiet);
    let progress = tokio::spawn(report_progress(
        session.subscribe(),
        spinner.clone(),
        quiet,
        no_color,
    ));

    let result = if args.retries > 0 {
        let retry = RetryConfig::for_session().max_retries(args.retries);
        session.run_with_retry(&name, &policy, &retry).await
    } else {
        session.run(&name, &policy).await
    };

    progress.abort();
    spinner.finish_and_clear();

    let mut conn = match result {
        Ok(conn) => conn,
        Err(e) => {
            eprintln!("{}", describe_failure(&e, &name, args.ignore_case));
            bail!("Could not connect to \"{}\": {} failed", name, e.stage());
        }
    };

    if !quiet {
        eprintln!(
            "{}",
            style::format_success(
                &format!(
                    "Connected to {} ({}) on channel {}",
                    name,
                    conn.address(),
                    conn.channel()
                ),
                no_color
            )
        );
        if hold > 0 {
            eprintln!(
                "{}",
                style::format_info(
                    &format!("Holding connection for {}s (Ctrl+C to stop)", hold),
                    no_color
                )
            );
        }
    }

    let deadline = tokio::time::sleep(secs(hold));
    tokio::pin!(deadline);
    tokio::pin!(interrupt);
    let mut can_interrupt = true;

    let end = loop {
        tokio::select! {
            () = &mut deadline => break HoldEnd::Elapsed,
            signal = &mut interrupt, if can_interrupt => match signal {
                Ok(()) => {
                    tracing::debug!("Interrupted");
                    break HoldEnd::Interrupted;
                }
                Err(e) => {
                    tracing::warn!("Ctrl+C handling unavailable: {}", e);
                    can_interrupt = false;
                }
            },
            event = conn.next_event() => match event {
                Some(ConnectionEvent::Data(bytes)) => {
                    write!(out, "{}", String::from_utf8_lossy(&bytes))?;
                    out.flush()?;
                }
                Some(ConnectionEvent::Closed) | None => {
                    if !quiet {
                        eprintln!("{}", style::format_info("Device closed the connection", no_color));
                    }
                    break HoldEnd::DeviceClosed;
                }
                Some(ConnectionEvent::Failure(e)) => {
                    eprintln!(
                        "{}",
                        style::format_warning(&format!("Connection lost: {}", e), no_color)
                    );
                    break HoldEnd::Lost;
                }
            }
        }
    };

    conn.close().await?;
    if !quiet {
        eprintln!("{}", style::format_success("Connection closed", no_color));
    }
    Ok(end)
}

async fn report_progress(
    mut events: EventReceiver,
    spinner: ProgressBar,
    quiet: bool,
    no_color: bool,
) {
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(_)) => continue,
            Err(RecvError::Closed) => break,
        };
        match event {
            SessionEvent::DeviceObserved { device } if !quiet => {
                style::print_suspended(
                    &spinner,
                    &style::format_info(&format!("Found: {}", device), no_color),
                );
            }
            SessionEvent::TargetFound { device } => {
                spinner.set_message(format!("Resolving SPP channel on {}...", device.address));
            }
            SessionEvent::ChannelResolved { address, channel } => {
                spinner.set_message(format!("Connecting to {} on channel {}...", address, channel));
            }
            SessionEvent::RetryStarted { attempt, delay } if !quiet => {
                style::print_suspended(
                    &spinner,
                    &style::format_warning(
                        &format!("Retrying (attempt {}) in {:.1}s", attempt, delay.as_secs_f64()),
                        no_color,
                    ),
                );
            }
            _ => {}
        }
    }
}

/// Render a session failure as a boxed diagnostic with troubleshooting hints.
fn describe_failure(err: &SessionError, target: &str, ignore_case: bool) -> String {
    match err {
        SessionError::NotFound(e) => describe_not_found(e, target, ignore_case),
        SessionError::NoChannel(NoChannelError::NotAdvertised { address }) => {
            style::format_error_box(
                "No Serial Port",
                &format!(
                    "Found \"{}\" at {}, but it does not advertise an SPP channel.",
                    target, address
                ),
                &[
                    "Make sure the device exposes the Serial Port Profile (SPP)",
                    "Pair the device first: bluetoothctl pair <ADDRESS>",
                    "Some modules only advertise SPP while no other host is connected",
                ],
            )
        }
        SessionError::NoChannel(e) => style::format_error_box(
            "Channel Query Failed",
            &format!(
                "Found \"{}\" at {}, but its SPP channel could not be queried:\n{}",
                target,
                e.address(),
                e
            ),
            &[
                "Move closer to the device and try again",
                "Increase --channel-timeout",
                "Retry transient failures with --retries 3",
            ],
        ),
        SessionError::Connect(e) => style::format_error_box(
            "Connection Failed",
            &format!(
                "Found \"{}\" at {} (channel {}), but the connection failed:\n{}",
                target, e.address, e.channel, e.source
            ),
            &[
                "Pair and trust the device: bluetoothctl pair/trust <ADDRESS>",
                "The device may already be connected to another host",
                "Increase --connect-timeout",
                "Retry transient failures with --retries 3",
            ],
        ),
    }
}

fn describe_not_found(err: &NotFoundError, target: &str, ignore_case: bool) -> String {
    if let NotFoundCause::Radio(radio) = &err.cause
        && radio.is_host_problem()
    {
        return style::format_error_box(
            "Bluetooth Unavailable",
            &format!("Could not start a scan: {}", radio),
            &[
                "Check that a Bluetooth adapter is present: bluetoothctl list",
                "Power it on: bluetoothctl power on",
                "Make sure bluetoothd is running: systemctl status bluetooth",
            ],
        );
    }

    let mut message = format!("No device named \"{}\" was found ({}).", target, err.cause);
    if err.observed.is_empty() {
        message.push_str("\nNo devices responded to the inquiry.");
    } else {
        message.push_str("\nDevices seen:");
        for device in &err.observed {
            message.push_str(&format!("\n  - {}", device));
        }
    }

    if !ignore_case
        && let Some(close) = err.observed.iter().find_map(|d| {
            d.name
                .as_deref()
                .filter(|n| NameMatch::IgnoreCaseTrimmed.matches(target, Some(n)))
        })
    {
        message.push_str(&format!(
            "\nDid you mean \"{}\"? Names are case-sensitive; try --ignore-case.",
            close
        ));
    }

    style::format_error_box(
        "Device Not Found",
        &message,
        &[
            "Check the device is powered on and in range",
            "Make sure it is discoverable and not connected to another host",
            "List nearby devices with: spplink scan",
            "Scan longer with --timeout",
        ],
    )
}

#[cfg(test)]
mod tests {
    use std::future::{pending, ready};
    use std::time::Duration;

    use super::*;
    use crate::cli::ScanArgs;
    use spplink_core::{Address, Channel, ConnectError, DiscoveredDevice, MockRadio, RadioError};

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn args(hold: u64) -> ConnectArgs {
        ConnectArgs {
            name: Some("RobotSpider".to_string()),
            scan: ScanArgs { timeout: Some(5) },
            channel_timeout: 15,
            connect_timeout: 15,
            hold: Some(hold),
            retries: 0,
            ignore_case: false,
        }
    }

    fn spider_radio() -> spplink_core::MockRadioBuilder {
        MockRadio::builder().device(ms(10), DiscoveredDevice::named("CC:DD", "RobotSpider"))
    }

    async fn run(radio: MockRadio, hold: u64) -> (Result<HoldEnd>, Vec<u8>) {
        let mut out = Vec::new();
        let result = cmd_connect(
            radio,
            &args(hold),
            &Config::default(),
            true,
            true,
            &mut out,
            pending(),
        )
        .await;
        (result, out)
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_prints_data_until_device_closes() {
        let radio = spider_radio().channel("CC:DD", 1).build();
        let device = {
            let radio = radio.clone();
            tokio::spawn(async move {
                let peer = loop {
                    if let Some(peer) = radio.last_peer() {
                        break peer;
                    }
                    tokio::time::sleep(ms(5)).await;
                };
                peer.send(b"hello ");
                peer.send(b"world\n");
                peer.close();
            })
        };

        let (result, out) = run(radio.clone(), 30).await;
        device.await.unwrap();

        assert_eq!(result.unwrap(), HoldEnd::DeviceClosed);
        assert_eq!(out, b"hello world\n");
        assert!(radio.last_peer().unwrap().is_shutdown());
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_closes_when_hold_elapses() {
        let radio = spider_radio().channel("CC:DD", 2).build();
        let started = tokio::time::Instant::now();

        let (result, out) = run(radio.clone(), 3).await;

        assert_eq!(result.unwrap(), HoldEnd::Elapsed);
        assert!(out.is_empty());
        assert!(started.elapsed() >= Duration::from_secs(3));
        assert!(radio.last_peer().unwrap().is_shutdown());
    }

    #[tokio::test(start_paused = true)]
    async fn test_interrupt_ends_hold() {
        let radio = spider_radio().channel("CC:DD", 1).build();
        let mut out = Vec::new();

        let end = cmd_connect(
            radio.clone(),
            &args(60),
            &Config::default(),
            true,
            true,
            &mut out,
            ready(Ok(())),
        )
        .await
        .unwrap();

        assert_eq!(end, HoldEnd::Interrupted);
        assert!(radio.last_peer().unwrap().is_shutdown());
    }

    #[tokio::test(start_paused = true)]
    async fn test_each_stage_failure_is_an_error() {
        let missing = MockRadio::builder()
            .device(ms(10), DiscoveredDevice::named("AA:BB", "Other"))
            .finish(ms(20))
            .build();
        let no_spp = spider_radio().build();
        let refused = spider_radio()
            .channel("CC:DD", 1)
            .connect_error("CC:DD", RadioError::backend("connection refused"))
            .build();

        for (radio, stage) in [
            (missing, "discovery"),
            (no_spp, "channel resolution"),
            (refused, "connection"),
        ] {
            let (result, out) = run(radio.clone(), 5).await;
            let err = result.unwrap_err().to_string();
            assert!(err.contains(stage), "{err}");
            assert!(out.is_empty());
            assert!(radio.peers().is_empty());
        }
    }

    fn not_found(observed: Vec<DiscoveredDevice>, cause: NotFoundCause) -> SessionError {
        NotFoundError {
            target: "RobotSpider".to_string(),
            observed,
            cause,
        }
        .into()
    }

    #[test]
    fn test_not_found_lists_observed_devices() {
        let err = not_found(
            vec![
                DiscoveredDevice::named("AA:BB", "Other"),
                DiscoveredDevice::new("EE:FF", None),
            ],
            NotFoundCause::ScanFinished,
        );
        let text = describe_failure(&err, "RobotSpider", false);
        assert!(text.contains("Device Not Found"));
        assert!(text.contains("- Other (AA:BB)"));
        assert!(text.contains("- Unknown (EE:FF)"));
        assert!(!text.contains("Did you mean"));
    }

    #[test]
    fn test_not_found_without_devices_has_hint() {
        let err = not_found(
            Vec::new(),
            NotFoundCause::Timeout {
                duration: Duration::from_secs(10),
            },
        );
        let text = describe_failure(&err, "RobotSpider", false);
        assert!(text.contains("No devices responded"));
        assert!(text.contains("Troubleshooting"));
    }

    #[test]
    fn test_not_found_suggests_case_insensitive_match() {
        let err = not_found(
            vec![DiscoveredDevice::named("CC:DD", "robotspider")],
            NotFoundCause::ScanFinished,
        );
        let text = describe_failure(&err, "RobotSpider", false);
        assert!(text.contains("Did you mean \"robotspider\""));
    }

    #[test]
    fn test_missing_adapter_gets_host_advice() {
        let err = not_found(Vec::new(), NotFoundCause::Radio(RadioError::NoAdapter));
        let text = describe_failure(&err, "RobotSpider", false);
        assert!(text.contains("Bluetooth Unavailable"));
        assert!(text.contains("bluetoothctl list"));
    }

    #[test]
    fn test_no_channel_and_connect_are_distinct() {
        let no_channel: SessionError = NoChannelError::NotAdvertised {
            address: Address::new("CC:DD"),
        }
        .into();
        let connect: SessionError = ConnectError {
            address: Address::new("CC:DD"),
            channel: Channel::new(1).unwrap(),
            source: RadioError::backend("timeout"),
        }
        .into();

        let a = describe_failure(&no_channel, "RobotSpider", false);
        let b = describe_failure(&connect, "RobotSpider", false);
        assert!(a.contains("No Serial Port"));
        assert!(b.contains("Connection Failed"));
        assert!(b.contains("channel 1"));
        assert!(b.contains("timeout"));
    }
}
