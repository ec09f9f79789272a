//! Session orchestration.
//!
//! A session takes a device name and ends with an open [`Connection`] or a
//! [`SessionError`] naming the stage that failed:
//!
//! ```text
//! discover(name) ──▶ resolve_channel(address) ──▶ open(address, channel)
//! ```
//!
//! Each stage runs exactly once per attempt and its radio handles are
//! released before the next stage starts. Retrying whole attempts is opt-in
//! via [`SessionOrchestrator::run_with_retry`].

use std::time::Duration;

use tracing::{info, warn};

use crate::channel::ChannelResolver;
use crate::connection::{Connection, ConnectionManager};
use crate::discovery::{DEFAULT_DISCOVERY_TIMEOUT, Discoverer, NameMatch};
use crate::error::{Error, Result, SessionError};
use crate::events::{EventDispatcher, EventReceiver, SessionEvent};
use crate::radio::RadioStack;
use crate::retry::{RetryConfig, with_retry_notify};

/// Timeouts and matching rules for one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionPolicy {
    /// How long discovery may run.
    pub discovery_timeout: Duration,
    /// Bound on the SPP channel query. `None` defers to the radio stack.
    pub channel_timeout: Option<Duration>,
    /// Bound on the connection handshake. `None` defers to the radio stack.
    pub connect_timeout: Option<Duration>,
    /// How advertised names are compared with the target.
    pub name_match: NameMatch,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            discovery_timeout: DEFAULT_DISCOVERY_TIMEOUT,
            channel_timeout: None,
            connect_timeout: None,
            name_match: NameMatch::Exact,
        }
    }
}

impl SessionPolicy {
    /// Create a policy with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the discovery timeout.
    #[must_use]
    pub fn discovery_timeout(mut self, timeout: Duration) -> Self {
        self.discovery_timeout = timeout;
        self
    }

    /// Bound the channel query.
    #[must_use]
    pub fn channel_timeout(mut self, timeout: Duration) -> Self {
        self.channel_timeout = Some(timeout);
        self
    }

    /// Bound the connection handshake.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Set the name comparison policy.
    #[must_use]
    pub fn name_match(mut self, name_match: NameMatch) -> Self {
        self.name_match = name_match;
        self
    }

    /// Validate the policy.
    ///
    /// Zero timeouts would fail every session without touching the radio.
    pub fn validate(&self) -> Result<()> {
        if self.discovery_timeout.is_zero() {
            return Err(Error::invalid_config("discovery timeout must be positive"));
        }
        if self.channel_timeout.is_some_and(|t| t.is_zero()) {
            return Err(Error::invalid_config("channel timeout must be positive"));
        }
        if self.connect_timeout.is_some_and(|t| t.is_zero()) {
            return Err(Error::invalid_config("connect timeout must be positive"));
        }
        Ok(())
    }
}

/// Runs discovery, channel resolution and connection in order.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use spplink_core::{MockRadio, SessionOrchestrator, SessionPolicy};
/// use spplink_types::DiscoveredDevice;
///
/// # #[tokio::main]
/// # async fn main() {
/// let radio = MockRadio::builder()
///     .device(Duration::from_millis(10), DiscoveredDevice::named("CC:DD", "RobotSpider"))
///     .channel("CC:DD", 1)
///     .build();
///
/// let session = SessionOrchestrator::new(radio);
/// let conn = session.run("RobotSpider", &SessionPolicy::default()).await.unwrap();
/// assert_eq!(conn.channel().get(), 1);
/// conn.close().await.unwrap();
/// # }
/// ```
#[derive(Debug)]
pub struct SessionOrchestrator<R> {
    radio: R,
    events: EventDispatcher,
}

impl<R: RadioStack> SessionOrchestrator<R> {
    /// Create an orchestrator over `radio`.
    pub fn new(radio: R) -> Self {
        Self::with_events(radio, EventDispatcher::default())
    }

    /// Create an orchestrator that publishes on an existing dispatcher.
    pub fn with_events(radio: R, events: EventDispatcher) -> Self {
        Self { radio, events }
    }

    /// The radio stack in use.
    pub fn radio(&self) -> &R {
        &self.radio
    }

    /// Subscribe to progress events.
    pub fn subscribe(&self) -> EventReceiver {
        self.events.subscribe()
    }

    /// Run one session attempt for `target_name`.
    ///
    /// The stages run strictly in order and the first failure is returned
    /// as-is. On success the returned connection is already reading.
    #[tracing::instrument(level = "info", skip_all, fields(target = %target_name))]
    pub async fn run(
        &self,
        target_name: &str,
        policy: &SessionPolicy,
    ) -> std::result::Result<Connection, SessionError> {
        let result = self.run_stages(target_name, policy).await;
        if let Err(e) = &result {
            warn!("Session failed during {}: {}", e.stage(), e);
            self.events.send(SessionEvent::StageFailed {
                stage: e.stage(),
                error: e.to_string(),
            });
        }
        result
    }

    async fn run_stages(
        &self,
        target_name: &str,
        policy: &SessionPolicy,
    ) -> std::result::Result<Connection, SessionError> {
        let device = Discoverer::new(&self.radio)
            .name_match(policy.name_match)
            .with_events(self.events.clone())
            .discover(target_name, policy.discovery_timeout)
            .await?;

        let channel = ChannelResolver::new(&self.radio)
            .timeout(policy.channel_timeout)
            .resolve_channel(&device.address)
            .await?;
        self.events.send(SessionEvent::ChannelResolved {
            address: device.address.clone(),
            channel,
        });

        let connection = ConnectionManager::new(&self.radio)
            .timeout(policy.connect_timeout)
            .open(&device.address, channel)
            .await?;
        self.events.send(SessionEvent::Connected {
            address: device.address.clone(),
            channel,
        });

        info!(
            "Session established with {} on channel {}",
            device.display_name(),
            channel
        );
        Ok(connection)
    }

    /// Run sessions until one succeeds, a non-retryable error occurs, or
    /// `retry` is exhausted.
    pub async fn run_with_retry(
        &self,
        target_name: &str,
        policy: &SessionPolicy,
        retry: &RetryConfig,
    ) -> std::result::Result<Connection, SessionError> {
        with_retry_notify(
            retry,
            "session",
            move || self.run(target_name, policy),
            |attempt, delay| {
                self.events
                    .send(SessionEvent::RetryStarted { attempt, delay });
            },
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{NoChannelError, RadioError, SessionStage};
    use crate::mock::MockRadio;
    use spplink_types::DiscoveredDevice;

    fn spider() -> DiscoveredDevice {
        DiscoveredDevice::named("CC:DD", "RobotSpider")
    }

    #[test]
    fn test_default_policy() {
        let policy = SessionPolicy::default();
        assert_eq!(policy.discovery_timeout, Duration::from_secs(10));
        assert_eq!(policy.channel_timeout, None);
        assert_eq!(policy.connect_timeout, None);
        assert_eq!(policy.name_match, NameMatch::Exact);
        assert!(policy.validate().is_ok());
    }

    #[test]
    fn test_policy_rejects_zero_timeouts() {
        assert!(
            SessionPolicy::new()
                .discovery_timeout(Duration::ZERO)
                .validate()
                .is_err()
        );
        assert!(
            SessionPolicy::new()
                .connect_timeout(Duration::ZERO)
                .validate()
                .is_err()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_discovery_timeout_still_connects() {
        let radio = MockRadio::builder()
            .device(Duration::from_millis(10), spider())
            .channel("CC:DD", 3)
            .build();
        let session = SessionOrchestrator::new(radio);
        let policy = SessionPolicy::new().discovery_timeout(Duration::from_secs(u64::MAX));

        let conn = session.run("RobotSpider", &policy).await.unwrap();
        assert_eq!(conn.channel().get(), 3);
        conn.close().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_stages_not_reached_after_discovery_failure() {
        let radio = MockRadio::builder()
            .device(Duration::from_millis(10), DiscoveredDevice::named("AA:BB", "Other"))
            .finish(Duration::from_millis(10))
            .build();
        let session = SessionOrchestrator::new(radio.clone());

        let err = session
            .run("RobotSpider", &SessionPolicy::default())
            .await
            .unwrap_err();

        assert_eq!(err.stage(), SessionStage::Discovery);
        assert_eq!(radio.channel_queries(), 0);
        assert_eq!(radio.connect_attempts(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_is_published() {
        let radio = MockRadio::builder()
            .device(Duration::from_millis(10), spider())
            .channel("CC:DD", 0)
            .build();
        let session = SessionOrchestrator::new(radio);
        let mut rx = session.subscribe();

        let err = session
            .run("RobotSpider", &SessionPolicy::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SessionError::NoChannel(NoChannelError::NotAdvertised { .. })
        ));

        let mut last = None;
        while let Ok(event) = rx.try_recv() {
            last = Some(event);
        }
        assert!(matches!(
            last,
            Some(SessionEvent::StageFailed {
                stage: SessionStage::ChannelResolution,
                ..
            })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_recovers_from_connect_failure() {
        let radio = MockRadio::builder()
            .device(Duration::from_millis(10), spider())
            .channel("CC:DD", 1)
            .connect_error("CC:DD", RadioError::backend("device busy"))
            .build();
        let session = SessionOrchestrator::new(radio.clone());
        let mut rx = session.subscribe();

        let conn = session
            .run_with_retry("RobotSpider", &SessionPolicy::default(), &RetryConfig::quick())
            .await
            .unwrap();

        assert!(conn.is_open());
        assert_eq!(radio.inquiries(), 2);
        assert_eq!(radio.connect_attempts(), 2);
        assert_eq!(radio.live_inquiries(), 0);

        let mut retried = false;
        while let Ok(event) = rx.try_recv() {
            if let SessionEvent::RetryStarted { attempt, .. } = event {
                assert_eq!(attempt, 2);
                retried = true;
            }
        }
        assert!(retried);
        conn.close().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_stops_on_missing_service() {
        let radio = MockRadio::builder()
            .device(Duration::from_millis(10), spider())
            .build();
        let session = SessionOrchestrator::new(radio.clone());

        let err = session
            .run_with_retry("RobotSpider", &SessionPolicy::default(), &RetryConfig::quick())
            .await
            .unwrap_err();

        assert_eq!(err.stage(), SessionStage::ChannelResolution);
        assert_eq!(radio.inquiries(), 1);
    }
}
