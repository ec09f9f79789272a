//! Error types for value parsing in spplink-types.

use thiserror::Error;

/// Errors that can occur when parsing spplink value types.
///
/// This error type is platform-agnostic and does not include
/// radio-specific errors (those belong in spplink-core).
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ParseError {
    /// The string is not a `AA:BB:CC:DD:EE:FF` hardware address.
    #[error("Invalid address '{0}': expected six colon-separated hex octets")]
    InvalidAddress(String),

    /// Channel numbers must be strictly positive.
    #[error("Invalid channel {0}: SPP channels start at 1")]
    InvalidChannel(u8),
}
