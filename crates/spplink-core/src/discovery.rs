//! Device discovery by advertised name.
//!
//! This module runs a Bluetooth Classic inquiry through a [`RadioStack`] and
//! resolves as soon as a device advertising the target name is observed.
//!
//! Two signals can end an unsuccessful scan: the inquiry reporting that every
//! device has been enumerated, and the discovery deadline. Both are arms of
//! one `select!`, so whichever fires first decides the outcome and the other
//! is never observed.

use std::time::Duration;

use futures::StreamExt;
use tokio::time::{Instant, sleep_until, timeout_at};
use tracing::{debug, info, warn};

use spplink_types::DiscoveredDevice;

use crate::error::{NotFoundCause, NotFoundError, RadioError};
use crate::events::{EventDispatcher, SessionEvent};
use crate::radio::{InquiryEvent, RadioStack};

/// Default discovery timeout.
pub const DEFAULT_DISCOVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Roughly 30 years; stands in for deadlines that would overflow `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// `timeout` from now, saturating at [`FAR_FUTURE`].
fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout).unwrap_or_else(|| now + FAR_FUTURE)
}

/// How an advertised name is compared with the target name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NameMatch {
    /// Byte-for-byte, case-sensitive equality.
    #[default]
    Exact,
    /// Equality after trimming whitespace and ignoring ASCII case.
    IgnoreCaseTrimmed,
}

impl NameMatch {
    /// Check an advertised name against the target. An absent name never matches.
    ///
    /// # Examples
    ///
    /// ```
    /// use spplink_core::NameMatch;
    ///
    /// assert!(NameMatch::Exact.matches("RobotSpider", Some("RobotSpider")));
    /// assert!(!NameMatch::Exact.matches("RobotSpider", Some("robotspider")));
    /// assert!(NameMatch::IgnoreCaseTrimmed.matches("RobotSpider", Some(" robotspider ")));
    /// assert!(!NameMatch::IgnoreCaseTrimmed.matches("RobotSpider", None));
    /// ```
    #[must_use]
    pub fn matches(self, target: &str, advertised: Option<&str>) -> bool {
        let Some(name) = advertised else {
            return false;
        };
        match self {
            NameMatch::Exact => name == target,
            NameMatch::IgnoreCaseTrimmed => name.trim().eq_ignore_ascii_case(target.trim()),
        }
    }
}

/// State of one discovery attempt.
///
/// Created when the scan starts and consumed when it resolves, whichever way
/// it resolves.
#[derive(Debug)]
pub struct ScanSession {
    target_name: String,
    deadline: Instant,
    found: bool,
    discovered: Vec<DiscoveredDevice>,
}

impl ScanSession {
    /// Start a session whose deadline is `timeout` from now.
    pub fn new(target_name: impl Into<String>, timeout: Duration) -> Self {
        Self {
            target_name: target_name.into(),
            deadline: deadline_after(timeout),
            found: false,
            discovered: Vec::new(),
        }
    }

    /// The name being searched for.
    pub fn target_name(&self) -> &str {
        &self.target_name
    }

    /// When the scan gives up.
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Whether the target has been observed.
    pub fn found(&self) -> bool {
        self.found
    }

    /// Devices observed so far, in observation order.
    pub fn discovered(&self) -> &[DiscoveredDevice] {
        &self.discovered
    }

    /// Record an observed device and report whether it is the target.
    ///
    /// Once the target has been found, later devices are ignored.
    pub fn observe(&mut self, device: DiscoveredDevice, name_match: NameMatch) -> bool {
        if self.found {
            return false;
        }
        let is_target = name_match.matches(&self.target_name, device.name.as_deref());
        self.discovered.push(device);
        self.found = is_target;
        is_target
    }

    /// Consume the session into a not-found error.
    pub fn into_not_found(self, cause: NotFoundCause) -> NotFoundError {
        NotFoundError {
            target: self.target_name,
            observed: self.discovered,
            cause,
        }
    }
}

/// Scans for a device by name.
#[derive(Debug)]
pub struct Discoverer<'r, R: ?Sized> {
    radio: &'r R,
    name_match: NameMatch,
    events: Option<EventDispatcher>,
}

impl<'r, R> Discoverer<'r, R>
where
    R: RadioStack + ?Sized,
{
    /// Create a discoverer using exact name matching.
    pub fn new(radio: &'r R) -> Self {
        Self {
            radio,
            name_match: NameMatch::Exact,
            events: None,
        }
    }

    /// Set the name comparison policy.
    #[must_use]
    pub fn name_match(mut self, name_match: NameMatch) -> Self {
        self.name_match = name_match;
        self
    }

    /// Publish progress on `events`.
    #[must_use]
    pub fn with_events(mut self, events: EventDispatcher) -> Self {
        self.events = Some(events);
        self
    }

    fn publish(&self, event: SessionEvent) {
        if let Some(events) = &self.events {
            events.send(event);
        }
    }

    /// Scan until a device named `target_name` is observed.
    ///
    /// Resolves with the first matching device. Fails with [`NotFoundError`]
    /// carrying every observed device if the inquiry finishes or `timeout`
    /// elapses first. The inquiry is stopped on every exit path.
    ///
    /// # Example
    ///
    /// ```
    /// use std::time::Duration;
    /// use spplink_core::{Discoverer, MockRadio};
    /// use spplink_types::DiscoveredDevice;
    ///
    /// # #[tokio::main]
    /// # async fn main() {
    /// let radio = MockRadio::builder()
    ///     .device(Duration::from_millis(10), DiscoveredDevice::named("CC:DD", "RobotSpider"))
    ///     .build();
    ///
    /// let device = Discoverer::new(&radio)
    ///     .discover("RobotSpider", Duration::from_secs(1))
    ///     .await
    ///     .unwrap();
    /// assert_eq!(device.address.as_str(), "CC:DD");
    /// # }
    /// ```
    #[tracing::instrument(level = "info", skip_all, fields(target = %target_name, timeout_secs = timeout.as_secs()))]
    pub async fn discover(
        &self,
        target_name: &str,
        timeout: Duration,
    ) -> Result<DiscoveredDevice, NotFoundError> {
        let mut session = ScanSession::new(target_name, timeout);

        info!("Scanning for \"{}\"...", target_name);
        self.publish(SessionEvent::ScanStarted {
            target: target_name.to_string(),
            timeout,
        });

        let mut inquiry = match timeout_at(session.deadline(), self.radio.inquire()).await {
            Ok(Ok(inquiry)) => inquiry,
            Ok(Err(e)) => {
                warn!("Inquiry could not start: {}", e);
                return Err(session.into_not_found(NotFoundCause::Radio(e)));
            }
            Err(_) => {
                warn!("Inquiry did not start before the deadline");
                return Err(session.into_not_found(NotFoundCause::Timeout { duration: timeout }));
            }
        };

        let deadline = sleep_until(session.deadline());
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                biased;
                event = inquiry.next() => match event {
                    Some(InquiryEvent::DeviceFound(device)) => {
                        info!("Found: {}", device);
                        self.publish(SessionEvent::DeviceObserved { device: device.clone() });

                        if session.observe(device.clone(), self.name_match) {
                            info!("Found \"{}\" at {}", target_name, device.address);
                            self.publish(SessionEvent::TargetFound { device: device.clone() });
                            return Ok(device);
                        }
                    }
                    Some(InquiryEvent::Finished) | None => {
                        warn!(
                            "Discovery finished; \"{}\" not found among {} device(s)",
                            target_name,
                            session.discovered().len()
                        );
                        return Err(session.into_not_found(NotFoundCause::ScanFinished));
                    }
                },
                () = &mut deadline => {
                    warn!(
                        "Discovery timed out after {:?}; \"{}\" not found among {} device(s)",
                        timeout,
                        target_name,
                        session.discovered().len()
                    );
                    return Err(session.into_not_found(NotFoundCause::Timeout { duration: timeout }));
                }
            }
        }
    }

    /// Scan until the inquiry finishes or `timeout` elapses and return every
    /// device observed, in order.
    ///
    /// Reaching the deadline is not an error here; only failing to start the
    /// inquiry is.
    #[tracing::instrument(level = "info", skip_all, fields(timeout_secs = timeout.as_secs()))]
    pub async fn scan(&self, timeout: Duration) -> Result<Vec<DiscoveredDevice>, RadioError> {
        let deadline = deadline_after(timeout);
        info!("Starting inquiry for {} seconds...", timeout.as_secs());

        let mut inquiry = timeout_at(deadline, self.radio.inquire())
            .await
            .map_err(|_| RadioError::timeout("start inquiry", timeout))??;

        let mut devices: Vec<DiscoveredDevice> = Vec::new();
        let sleep = sleep_until(deadline);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                biased;
                event = inquiry.next() => match event {
                    Some(InquiryEvent::DeviceFound(device)) => {
                        if devices.iter().any(|d| d.address == device.address) {
                            debug!("Duplicate report for {}", device.address);
                            continue;
                        }
                        info!("Found: {}", device);
                        self.publish(SessionEvent::DeviceObserved { device: device.clone() });
                        devices.push(device);
                    }
                    Some(InquiryEvent::Finished) | None => break,
                },
                () = &mut sleep => break,
            }
        }

        info!("Scan complete. Found {} device(s)", devices.len());
        Ok(devices)
    }
}
