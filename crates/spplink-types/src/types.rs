//! Core value types for SPP discovery and connection.

use core::fmt;
use core::num::NonZeroU8;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::ParseError;

/// Name shown for devices that did not report one during inquiry.
pub const UNKNOWN_NAME: &str = "Unknown";

/// Opaque hardware identifier of a remote device.
///
/// The radio stack decides what the string looks like; on BlueZ it is the
/// familiar `AA:BB:CC:DD:EE:FF` form. The core never interprets it beyond
/// equality, so backends that need a typed address call [`Address::parse_mac`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct Address(String);

impl Address {
    /// Wrap a backend-reported identifier.
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    /// Borrow the identifier string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parse the identifier as a 48-bit MAC address.
    ///
    /// Accepts upper- or lower-case hex, colon separated, most significant
    /// octet first.
    ///
    /// # Examples
    ///
    /// ```
    /// use spplink_types::Address;
    ///
    /// let addr = Address::new("AA:BB:CC:00:11:22");
    /// assert_eq!(addr.parse_mac().unwrap(), [0xAA, 0xBB, 0xCC, 0x00, 0x11, 0x22]);
    /// assert!(Address::new("CC:DD").parse_mac().is_err());
    /// ```
    pub fn parse_mac(&self) -> Result<[u8; 6], ParseError> {
        let invalid = || ParseError::InvalidAddress(self.0.clone());
        let mut octets = [0u8; 6];
        let mut parts = self.0.split(':');

        for octet in &mut octets {
            let part = parts.next().ok_or_else(invalid)?;
            if part.len() != 2 || !part.bytes().all(|b| b.is_ascii_hexdigit()) {
                return Err(invalid());
            }
            *octet = u8::from_str_radix(part, 16).map_err(|_| invalid())?;
        }

        if parts.next().is_some() {
            return Err(invalid());
        }
        Ok(octets)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Address {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Address {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl AsRef<str> for Address {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// An SPP (RFCOMM) channel number on a specific device.
///
/// Channel `0` is the "no channel" sentinel some radio stacks report, so it
/// cannot be represented here: a `Channel` is always a usable endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "u8", into = "u8"))]
pub struct Channel(NonZeroU8);

impl Channel {
    /// Build a channel from a raw number, rejecting the `0` sentinel.
    ///
    /// # Examples
    ///
    /// ```
    /// use spplink_types::Channel;
    ///
    /// assert_eq!(Channel::new(1).map(Channel::get), Some(1));
    /// assert!(Channel::new(0).is_none());
    /// ```
    #[must_use]
    pub const fn new(raw: u8) -> Option<Self> {
        match NonZeroU8::new(raw) {
            Some(n) => Some(Self(n)),
            None => None,
        }
    }

    /// The raw channel number (always `>= 1`).
    #[must_use]
    pub const fn get(self) -> u8 {
        self.0.get()
    }
}

impl TryFrom<u8> for Channel {
    type Error = ParseError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value).ok_or(ParseError::InvalidChannel(value))
    }
}

impl From<Channel> for u8 {
    fn from(channel: Channel) -> Self {
        channel.get()
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.get())
    }
}

/// A device observed during an inquiry.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DiscoveredDevice {
    /// Hardware identifier reported by the radio stack.
    pub address: Address,
    /// Advertised name, if the stack resolved one.
    pub name: Option<String>,
}

impl DiscoveredDevice {
    /// Create a device record.
    pub fn new(address: impl Into<Address>, name: Option<String>) -> Self {
        Self {
            address: address.into(),
            name,
        }
    }

    /// Create a device record with a known name.
    pub fn named(address: impl Into<Address>, name: impl Into<String>) -> Self {
        Self::new(address, Some(name.into()))
    }

    /// The advertised name, or `"Unknown"` when absent.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(UNKNOWN_NAME)
    }
}

impl fmt::Display for DiscoveredDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.display_name(), self.address)
    }
}

/// Lifecycle state of an SPP connection.
///
/// `Closed` and `Failed` are terminal: no I/O is valid after either.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[repr(u8)]
pub enum ConnectionState {
    /// The byte stream is usable.
    Open = 0,
    /// Ended gracefully by the peer or locally.
    Closed = 1,
    /// Ended by a transport error after establishment.
    Failed = 2,
}

impl ConnectionState {
    /// Whether the state is `Closed` or `Failed`.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, ConnectionState::Open)
    }
}

impl TryFrom<u8> for ConnectionState {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ConnectionState::Open),
            1 => Ok(ConnectionState::Closed),
            2 => Ok(ConnectionState::Failed),
            other => Err(other),
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Open => write!(f, "open"),
            ConnectionState::Closed => write!(f, "closed"),
            ConnectionState::Failed => write!(f, "failed"),
        }
    }
}
