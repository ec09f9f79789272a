//! Connect to a Bluetooth Classic device by name over the Serial Port Profile.
//!
//! This crate runs the three-stage session that turns a human-readable
//! device name into an open RFCOMM byte stream:
//!
//! 1. **Discovery**: run an inquiry until a device advertising the target
//!    name shows up, the inquiry finishes, or a deadline passes
//! 2. **Channel resolution**: ask the device which RFCOMM channel its SPP
//!    service listens on
//! 3. **Connection**: open the stream and read from it on a background task
//!
//! Each stage fails with its own error type and the session reports which
//! stage failed. Nothing is retried unless you ask for it with
//! [`SessionOrchestrator::run_with_retry`].
//!
//! # Radio stacks
//!
//! All radio access goes through the [`RadioStack`] trait:
//!
//! | Implementation | Platform | Feature |
//! |----------------|----------|---------|
//! | `BluezRadio` | Linux (BlueZ) | `bluez` |
//! | [`MockRadio`] | any | always available |
//!
//! # Quick Start
//!
//! ```no_run
//! use spplink_core::{ConnectionEvent, SessionOrchestrator, SessionPolicy};
//!
//! # #[cfg(all(target_os = "linux", feature = "bluez"))]
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let session = SessionOrchestrator::new(spplink_core::BluezRadio::new());
//!     let mut conn = session.run("RobotSpider", &SessionPolicy::default()).await?;
//!
//!     conn.send(b"hello\r\n").await?;
//!     while let Some(event) = conn.next_event().await {
//!         match event {
//!             ConnectionEvent::Data(bytes) => println!("{:?}", bytes),
//!             ConnectionEvent::Closed => break,
//!             ConnectionEvent::Failure(e) => return Err(e.into()),
//!         }
//!     }
//!     Ok(())
//! }
//! # #[cfg(not(all(target_os = "linux", feature = "bluez")))]
//! # fn main() {}
//! ```

pub mod channel;
pub mod connection;
pub mod discovery;
pub mod error;
pub mod events;
pub mod mock;
pub mod radio;
pub mod retry;
pub mod session;

#[cfg(all(target_os = "linux", feature = "bluez"))]
pub mod bluez;

pub use spplink_types::{Address, Channel, ConnectionState, DiscoveredDevice, uuids};

pub use channel::ChannelResolver;
pub use connection::{Connection, ConnectionEvent, ConnectionEvents, ConnectionManager};
pub use discovery::{DEFAULT_DISCOVERY_TIMEOUT, Discoverer, NameMatch, ScanSession};
pub use error::{
    ConnectError, Error, NoChannelError, NotFoundCause, NotFoundError, RadioError, Result,
    SessionError, SessionStage,
};
pub use events::{DEFAULT_EVENT_CAPACITY, EventDispatcher, EventReceiver, SessionEvent};
pub use mock::{MockPeer, MockRadio, MockRadioBuilder};
pub use radio::{BoxedSerialStream, InquiryEvent, InquiryStream, RadioStack, SerialStream};
pub use retry::{Retryable, RetryConfig, with_retry, with_retry_notify};
pub use session::{SessionOrchestrator, SessionPolicy};

#[cfg(all(target_os = "linux", feature = "bluez"))]
pub use bluez::BluezRadio;
