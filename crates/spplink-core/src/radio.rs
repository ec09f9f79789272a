//! Trait abstraction over the platform radio stack.
//!
//! This module provides the [`RadioStack`] trait that abstracts over a real
//! Bluetooth Classic stack and the scripted [`crate::MockRadio`] used in tests.
//! The session core only ever talks to a radio through this trait.

use std::future::Future;
use std::pin::Pin;

use async_trait::async_trait;
use futures::stream::{Stream, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};

use spplink_types::{Address, Channel, DiscoveredDevice};

use crate::error::RadioError;

/// An event reported by a running inquiry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InquiryEvent {
    /// A device answered the inquiry.
    DeviceFound(DiscoveredDevice),
    /// Every device in range has been enumerated.
    Finished,
}

/// Stream of inquiry events.
///
/// The inquiry runs for as long as the stream is alive; dropping it stops
/// the scan and releases the radio handle. A stream that ends without
/// yielding [`InquiryEvent::Finished`] is treated as finished.
pub type InquiryStream = Pin<Box<dyn Stream<Item = InquiryEvent> + Send>>;

/// A connected RFCOMM byte stream.
pub trait SerialStream: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T> SerialStream for T where T: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

/// Boxed serial stream returned by [`RadioStack::connect`].
pub type BoxedSerialStream = Box<dyn SerialStream>;

/// Trait abstracting the Bluetooth Classic operations a session needs.
///
/// Each method owns whatever platform handle it needs for the duration of
/// the call (or, for [`RadioStack::inquire`], for the lifetime of the
/// returned stream). Implementations must not keep handles alive between
/// calls.
///
/// # Example
///
/// ```ignore
/// use spplink_core::{RadioStack, RadioError};
/// use spplink_types::Address;
///
/// async fn print_channel<R: RadioStack>(radio: &R) -> Result<(), RadioError> {
///     let raw = radio.find_serial_port_channel(&Address::new("CC:DD")).await?;
///     println!("SPP channel: {}", raw);
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait RadioStack: Send + Sync {
    /// Start a device inquiry.
    async fn inquire(&self) -> Result<InquiryStream, RadioError>;

    /// Query the SPP channel of the device at `address`.
    ///
    /// Returns the raw channel number as the stack reports it; `0` means the
    /// query succeeded but no serial service is advertised.
    async fn find_serial_port_channel(&self, address: &Address) -> Result<u8, RadioError>;

    /// Open an RFCOMM byte stream to `address` on `channel`.
    async fn connect(
        &self,
        address: &Address,
        channel: Channel,
    ) -> Result<BoxedSerialStream, RadioError>;
}

#[async_trait]
impl<R> RadioStack for std::sync::Arc<R>
where
    R: RadioStack + ?Sized,
{
    async fn inquire(&self) -> Result<InquiryStream, RadioError> {
        (**self).inquire().await
    }

    async fn find_serial_port_channel(&self, address: &Address) -> Result<u8, RadioError> {
        (**self).find_serial_port_channel(address).await
    }

    async fn connect(
        &self,
        address: &Address,
        channel: Channel,
    ) -> Result<BoxedSerialStream, RadioError> {
        (**self).connect(address, channel).await
    }
}

/// Wait for the incoming request that an outgoing profile connect produces.
///
/// Stacks that hand out profile connections as requests on a separate stream
/// deliver the request while `connect` is still in flight, so both are
/// polled together. A failed `connect` ends the wait with its error since no
/// request will follow it.
#[cfg_attr(not(all(target_os = "linux", feature = "bluez")), allow(dead_code))]
pub(crate) async fn await_profile_request<C, E, S>(
    connect: C,
    requests: &mut S,
) -> Result<S::Item, RadioError>
where
    C: Future<Output = Result<(), E>>,
    E: Into<RadioError>,
    S: Stream + Unpin,
{
    tokio::pin!(connect);
    let request = tokio::select! {
        connected = &mut connect => {
            connected.map_err(Into::into)?;
            requests.next().await
        }
        request = requests.next() => request,
    };
    request.ok_or_else(|| RadioError::backend("profile handle closed before connecting"))
}
