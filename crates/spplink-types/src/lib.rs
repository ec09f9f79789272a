//! Platform-agnostic types for Bluetooth Serial Port Profile sessions.
//!
//! This crate provides the value types shared by the session core
//! (spplink-core) and its front-ends, with no dependency on a radio stack.
//!
//! # Features
//!
//! - Opaque device [`Address`] with optional MAC parsing
//! - [`Channel`] numbers that cannot hold the `0` sentinel
//! - [`DiscoveredDevice`] records produced by inquiry
//! - [`ConnectionState`] for open/closed/failed byte streams
//! - Service UUID constants for SPP
//!
//! # Example
//!
//! ```
//! use spplink_types::{Channel, DiscoveredDevice};
//!
//! let device = DiscoveredDevice::named("CC:DD", "RobotSpider");
//! assert_eq!(device.display_name(), "RobotSpider");
//! assert!(Channel::new(0).is_none());
//! ```

pub mod error;
pub mod types;
pub mod uuid;

pub use error::ParseError;
pub use types::{Address, Channel, ConnectionState, DiscoveredDevice, UNKNOWN_NAME};
pub use uuid as uuids;
