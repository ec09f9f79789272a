//! Error types for spplink-core.
//!
//! Every session stage has its own error type so callers can tell exactly
//! where a session stopped:
//!
//! | Stage | Error | Typical cause |
//! |-------|-------|---------------|
//! | Discovery | [`NotFoundError`] | Target powered off, out of range, or advertising a different name |
//! | Channel resolution | [`NoChannelError`] | Device has no SPP service, or the service query failed |
//! | Connection | [`ConnectError`] | Handshake refused or timed out |
//!
//! [`SessionError`] is the tagged union of the three returned by
//! [`crate::SessionOrchestrator::run`]. Failures that happen *after* a
//! connection is established are not errors at all: they arrive as
//! [`crate::ConnectionEvent::Failure`] on the connection's event channel.
//!
//! ## Retry classification
//!
//! | Error | Retryable | Rationale |
//! |-------|-----------|-----------|
//! | [`NotFoundError`] (timeout / scan finished) | Yes | Device may come into range |
//! | [`NotFoundError`] (no adapter) | No | Fix the host first |
//! | [`NoChannelError::NotAdvertised`] | No | Device does not offer SPP |
//! | [`NoChannelError::QueryFailed`] | Yes | Service queries fail transiently |
//! | [`ConnectError`] | Yes | Device may be busy with another client |
//!
//! See [`crate::retry`] for layering retries on top of a session.

use std::time::Duration;

use thiserror::Error;

use spplink_types::{Address, Channel, DiscoveredDevice, ParseError};

/// Errors reported by a radio stack implementation.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RadioError {
    /// No Bluetooth adapter is present.
    #[error("no Bluetooth adapter available")]
    NoAdapter,

    /// The adapter exists but is powered off.
    #[error("Bluetooth adapter is powered off")]
    AdapterOff,

    /// A radio operation did not complete in time.
    #[error("Operation '{operation}' timed out after {duration:?}")]
    Timeout {
        /// The operation that timed out.
        operation: String,
        /// The timeout duration.
        duration: Duration,
    },

    /// The backend could not interpret an address.
    #[error(transparent)]
    InvalidAddress(#[from] ParseError),

    /// Socket-level I/O error.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Any other error reported by the radio stack, verbatim.
    #[error("{0}")]
    Backend(String),
}

impl RadioError {
    /// Create a timeout error with operation context.
    pub fn timeout(operation: impl Into<String>, duration: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration,
        }
    }

    /// Create a backend error from a message.
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend(message.into())
    }

    /// Whether the host itself is unusable (no adapter, adapter off).
    #[must_use]
    pub fn is_host_problem(&self) -> bool {
        matches!(self, RadioError::NoAdapter | RadioError::AdapterOff)
    }
}

#[cfg(all(target_os = "linux", feature = "bluez"))]
impl From<bluer::Error> for RadioError {
    fn from(err: bluer::Error) -> Self {
        match err.kind {
            bluer::ErrorKind::NotReady => RadioError::AdapterOff,
            _ => RadioError::Backend(err.to_string()),
        }
    }
}

/// Why discovery ended without finding the target.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum NotFoundCause {
    /// The inquiry enumerated every device in range.
    #[error("scan finished")]
    ScanFinished,

    /// The discovery deadline elapsed first.
    #[error("scan timed out after {duration:?}")]
    Timeout {
        /// The configured discovery timeout.
        duration: Duration,
    },

    /// The inquiry could not be started.
    #[error("scan could not start: {0}")]
    Radio(RadioError),
}

/// The target device was not observed during discovery.
///
/// Carries every device that *was* observed, in observation order, to help
/// diagnose name mismatches.
#[derive(Debug, Error)]
#[error("Device '{target}' not found ({cause}); {count} device(s) observed", count = .observed.len())]
pub struct NotFoundError {
    /// The name that was searched for.
    pub target: String,
    /// Every device reported before the scan ended.
    pub observed: Vec<DiscoveredDevice>,
    /// Which signal ended the scan.
    pub cause: NotFoundCause,
}

impl NotFoundError {
    /// Whether the inquiry ended because of its deadline.
    #[must_use]
    pub fn timed_out(&self) -> bool {
        matches!(self.cause, NotFoundCause::Timeout { .. })
    }
}

/// The device was found but exposes no usable SPP channel.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum NoChannelError {
    /// The query succeeded but reported channel `0` or no serial service.
    #[error("Device {address} does not advertise an SPP channel")]
    NotAdvertised {
        /// The device that was queried.
        address: Address,
    },

    /// The channel query itself failed.
    #[error("SPP channel query for {address} failed: {source}")]
    QueryFailed {
        /// The device that was queried.
        address: Address,
        /// The underlying radio error.
        #[source]
        source: RadioError,
    },
}

impl NoChannelError {
    /// The device the query was made against.
    #[must_use]
    pub fn address(&self) -> &Address {
        match self {
            NoChannelError::NotAdvertised { address } => address,
            NoChannelError::QueryFailed { address, .. } => address,
        }
    }
}

/// The connection handshake failed.
#[derive(Debug, Error)]
#[error("Connection to {address} on channel {channel} failed: {source}")]
pub struct ConnectError {
    /// Target device.
    pub address: Address,
    /// Target channel.
    pub channel: Channel,
    /// The underlying transport error.
    #[source]
    pub source: RadioError,
}

/// The pipeline stage a session failed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStage {
    /// Scanning for the named device.
    Discovery,
    /// Querying the SPP channel.
    ChannelResolution,
    /// Opening the byte stream.
    Connection,
}

impl std::fmt::Display for SessionStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Discovery => write!(f, "discovery"),
            Self::ChannelResolution => write!(f, "channel resolution"),
            Self::Connection => write!(f, "connection"),
        }
    }
}

/// A session failure, tagged by the stage that failed.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Discovery did not find the target.
    #[error(transparent)]
    NotFound(#[from] NotFoundError),

    /// Channel resolution failed.
    #[error(transparent)]
    NoChannel(#[from] NoChannelError),

    /// The connection handshake failed.
    #[error(transparent)]
    Connect(#[from] ConnectError),
}

impl SessionError {
    /// The stage that produced this error.
    #[must_use]
    pub fn stage(&self) -> SessionStage {
        match self {
            SessionError::NotFound(_) => SessionStage::Discovery,
            SessionError::NoChannel(_) => SessionStage::ChannelResolution,
            SessionError::Connect(_) => SessionStage::Connection,
        }
    }

    /// Whether running the session again could succeed.
    ///
    /// See the module-level retry classification table.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            SessionError::NotFound(err) => match &err.cause {
                NotFoundCause::Radio(radio) => !radio.is_host_problem(),
                _ => true,
            },
            SessionError::NoChannel(NoChannelError::NotAdvertised { .. }) => false,
            SessionError::NoChannel(NoChannelError::QueryFailed { .. }) => true,
            SessionError::Connect(_) => true,
        }
    }
}

/// General errors for operations on an established connection.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Operation attempted on a closed or failed connection.
    #[error("Not connected to device")]
    NotConnected,

    /// I/O error on the byte stream.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Radio stack error.
    #[error(transparent)]
    Radio(#[from] RadioError),

    /// A session stage failed.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Create a configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }
}

/// Result type alias using spplink-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;
