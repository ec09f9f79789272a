//! Scripted radio stack for testing.
//!
//! This module provides a [`RadioStack`] implementation that needs no
//! Bluetooth hardware. Inquiry results, channel answers and connection
//! outcomes are scripted up front with [`MockRadioBuilder`]; every connected
//! stream is backed by a [`MockPeer`] the test drives by hand.
//!
//! # Features
//!
//! - **Scripted inquiries**: devices arrive after configurable delays, with
//!   or without a final "finished" signal
//! - **Failure injection**: queued one-shot errors per operation and address
//! - **Latency simulation**: fixed delays on channel queries and connects
//! - **Handle tracking**: [`MockRadio::live_inquiries`] reports inquiry
//!   streams that have not been dropped yet
//!
//! Time is driven by `tokio::time`, so scripts run instantly under
//! `#[tokio::test(start_paused = true)]`.

use std::collections::{HashMap, VecDeque};
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, Stream};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::sync::mpsc;

use spplink_types::{Address, Channel, DiscoveredDevice};

use crate::error::RadioError;
use crate::radio::{BoxedSerialStream, InquiryEvent, InquiryStream, RadioStack};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug, Default)]
struct MockState {
    script: Vec<(Duration, InquiryEvent)>,
    close_when_exhausted: bool,
    inquiry_errors: Mutex<VecDeque<RadioError>>,
    channels: HashMap<Address, u8>,
    channel_errors: Mutex<HashMap<Address, VecDeque<RadioError>>>,
    channel_delay: Duration,
    connect_errors: Mutex<HashMap<Address, VecDeque<RadioError>>>,
    connect_delay: Duration,
    peers: Mutex<Vec<MockPeer>>,
    inquiries: AtomicU32,
    live_inquiries: AtomicUsize,
    delivered: AtomicU32,
    channel_queries: AtomicU32,
    connect_attempts: AtomicU32,
}

/// A scripted radio stack.
///
/// Cloning is cheap and every clone shares the same script and counters, so
/// a test can hand one clone to the code under test and assert on another.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use spplink_core::{MockRadio, RadioStack};
/// use spplink_types::{Address, DiscoveredDevice};
///
/// # #[tokio::main]
/// # async fn main() {
/// let radio = MockRadio::builder()
///     .device(Duration::from_millis(50), DiscoveredDevice::named("CC:DD", "RobotSpider"))
///     .finish(Duration::from_millis(50))
///     .channel("CC:DD", 1)
///     .build();
///
/// assert_eq!(radio.find_serial_port_channel(&Address::new("CC:DD")).await.unwrap(), 1);
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MockRadio {
    state: Arc<MockState>,
}

impl MockRadio {
    /// Start building a mock radio.
    #[must_use]
    pub fn builder() -> MockRadioBuilder {
        MockRadioBuilder::new()
    }

    /// Number of inquiries started.
    pub fn inquiries(&self) -> u32 {
        self.state.inquiries.load(Ordering::Relaxed)
    }

    /// Number of inquiry streams still alive.
    pub fn live_inquiries(&self) -> usize {
        self.state.live_inquiries.load(Ordering::Relaxed)
    }

    /// Number of inquiry events handed to consumers, across all inquiries.
    pub fn inquiry_events_delivered(&self) -> u32 {
        self.state.delivered.load(Ordering::Relaxed)
    }

    /// Number of channel queries made.
    pub fn channel_queries(&self) -> u32 {
        self.state.channel_queries.load(Ordering::Relaxed)
    }

    /// Number of connection attempts made.
    pub fn connect_attempts(&self) -> u32 {
        self.state.connect_attempts.load(Ordering::Relaxed)
    }

    /// Peer of the most recent successful connection.
    pub fn last_peer(&self) -> Option<MockPeer> {
        lock(&self.state.peers).last().cloned()
    }

    /// Peers of every successful connection, oldest first.
    pub fn peers(&self) -> Vec<MockPeer> {
        lock(&self.state.peers).clone()
    }

    fn scripted_inquiry(&self) -> InquiryStream {
        let steps: VecDeque<(Duration, InquiryEvent)> = self.state.script.iter().cloned().collect();
        let hang = !self.state.close_when_exhausted;
        let state = Arc::clone(&self.state);

        Box::pin(stream::unfold(steps, move |mut steps| {
            let state = Arc::clone(&state);
            async move {
                match steps.pop_front() {
                    Some((delay, event)) => {
                        if !delay.is_zero() {
                            tokio::time::sleep(delay).await;
                        }
                        state.delivered.fetch_add(1, Ordering::Relaxed);
                        Some((event, steps))
                    }
                    None => {
                        if hang {
                            futures::future::pending::<()>().await;
                        }
                        None
                    }
                }
            }
        }))
    }
}

#[async_trait]
impl RadioStack for MockRadio {
    async fn inquire(&self) -> Result<InquiryStream, RadioError> {
        self.state.inquiries.fetch_add(1, Ordering::Relaxed);
        let queued = lock(&self.state.inquiry_errors).pop_front();
        if let Some(err) = queued {
            return Err(err);
        }

        self.state.live_inquiries.fetch_add(1, Ordering::Relaxed);
        Ok(Box::pin(TrackedInquiry {
            inner: self.scripted_inquiry(),
            _live: LiveInquiry(Arc::clone(&self.state)),
        }))
    }

    async fn find_serial_port_channel(&self, address: &Address) -> Result<u8, RadioError> {
        self.state.channel_queries.fetch_add(1, Ordering::Relaxed);
        if !self.state.channel_delay.is_zero() {
            tokio::time::sleep(self.state.channel_delay).await;
        }

        let queued = lock(&self.state.channel_errors)
            .get_mut(address)
            .and_then(VecDeque::pop_front);
        if let Some(err) = queued {
            return Err(err);
        }
        // Unknown devices answer like a device without a serial record.
        Ok(self.state.channels.get(address).copied().unwrap_or(0))
    }

    async fn connect(
        &self,
        address: &Address,
        _channel: Channel,
    ) -> Result<BoxedSerialStream, RadioError> {
        self.state.connect_attempts.fetch_add(1, Ordering::Relaxed);
        if !self.state.connect_delay.is_zero() {
            tokio::time::sleep(self.state.connect_delay).await;
        }

        let queued = lock(&self.state.connect_errors)
            .get_mut(address)
            .and_then(VecDeque::pop_front);
        if let Some(err) = queued {
            return Err(err);
        }

        let (stream, peer) = MockSerialStream::pair();
        lock(&self.state.peers).push(peer);
        Ok(Box::new(stream))
    }
}

/// Decrements the live-inquiry counter when the inquiry is dropped.
#[derive(Debug)]
struct LiveInquiry(Arc<MockState>);

impl Drop for LiveInquiry {
    fn drop(&mut self) {
        self.0.live_inquiries.fetch_sub(1, Ordering::Relaxed);
    }
}

struct TrackedInquiry {
    inner: InquiryStream,
    _live: LiveInquiry,
}

impl Stream for TrackedInquiry {
    type Item = InquiryEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

/// Builder for [`MockRadio`].
#[derive(Debug, Default)]
pub struct MockRadioBuilder {
    state: MockState,
}

impl MockRadioBuilder {
    /// Create a new builder with an empty, never-finishing inquiry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Report `device` after `delay` (relative to the previous step).
    #[must_use]
    pub fn device(mut self, delay: Duration, device: DiscoveredDevice) -> Self {
        self.state
            .script
            .push((delay, InquiryEvent::DeviceFound(device)));
        self
    }

    /// Report that the inquiry finished after `delay`.
    #[must_use]
    pub fn finish(mut self, delay: Duration) -> Self {
        self.state.script.push((delay, InquiryEvent::Finished));
        self
    }

    /// End the inquiry stream once the script runs out instead of hanging.
    #[must_use]
    pub fn close_when_exhausted(mut self) -> Self {
        self.state.close_when_exhausted = true;
        self
    }

    /// Fail the next inquiry with `err`. Queued errors are used in order.
    #[must_use]
    pub fn inquiry_error(self, err: RadioError) -> Self {
        lock(&self.state.inquiry_errors).push_back(err);
        self
    }

    /// Answer channel queries for `address` with `raw`.
    #[must_use]
    pub fn channel(mut self, address: impl Into<Address>, raw: u8) -> Self {
        self.state.channels.insert(address.into(), raw);
        self
    }

    /// Fail the next channel query for `address` with `err`.
    #[must_use]
    pub fn channel_error(self, address: impl Into<Address>, err: RadioError) -> Self {
        lock(&self.state.channel_errors)
            .entry(address.into())
            .or_default()
            .push_back(err);
        self
    }

    /// Delay every channel query.
    #[must_use]
    pub fn channel_delay(mut self, delay: Duration) -> Self {
        self.state.channel_delay = delay;
        self
    }

    /// Fail the next connection attempt to `address` with `err`.
    #[must_use]
    pub fn connect_error(self, address: impl Into<Address>, err: RadioError) -> Self {
        lock(&self.state.connect_errors)
            .entry(address.into())
            .or_default()
            .push_back(err);
        self
    }

    /// Delay every connection attempt.
    #[must_use]
    pub fn connect_delay(mut self, delay: Duration) -> Self {
        self.state.connect_delay = delay;
        self
    }

    /// Build the radio.
    #[must_use]
    pub fn build(self) -> MockRadio {
        MockRadio {
            state: Arc::new(self.state),
        }
    }
}

#[derive(Debug)]
enum PeerAction {
    Data(Bytes),
    Close,
    Fail(String),
}

#[derive(Debug, Default)]
struct PeerShared {
    written: Mutex<Vec<u8>>,
    shutdown: AtomicBool,
}

/// The device side of a mock connection.
#[derive(Debug, Clone)]
pub struct MockPeer {
    actions: mpsc::UnboundedSender<PeerAction>,
    shared: Arc<PeerShared>,
}

impl MockPeer {
    /// Deliver `data` to the host. Empty chunks are ignored.
    pub fn send(&self, data: &[u8]) {
        if !data.is_empty() {
            let _ = self
                .actions
                .send(PeerAction::Data(Bytes::copy_from_slice(data)));
        }
    }

    /// Close the stream from the device side.
    pub fn close(&self) {
        let _ = self.actions.send(PeerAction::Close);
    }

    /// Make the host's next read fail with `message`.
    pub fn fail(&self, message: impl Into<String>) {
        let _ = self.actions.send(PeerAction::Fail(message.into()));
    }

    /// Everything the host has written so far.
    pub fn written(&self) -> Vec<u8> {
        lock(&self.shared.written).clone()
    }

    /// Whether the host shut down its write side.
    pub fn is_shutdown(&self) -> bool {
        self.shared.shutdown.load(Ordering::Acquire)
    }
}

/// Host side of a mock connection.
#[derive(Debug)]
struct MockSerialStream {
    actions: mpsc::UnboundedReceiver<PeerAction>,
    pending: Bytes,
    eof: bool,
    shared: Arc<PeerShared>,
}

impl MockSerialStream {
    fn pair() -> (Self, MockPeer) {
        let (tx, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(PeerShared::default());
        let stream = Self {
            actions: rx,
            pending: Bytes::new(),
            eof: false,
            shared: Arc::clone(&shared),
        };
        (stream, MockPeer { actions: tx, shared })
    }

    fn fill(&mut self, buf: &mut ReadBuf<'_>, mut data: Bytes) {
        let n = data.len().min(buf.remaining());
        buf.put_slice(&data.split_to(n));
        self.pending = data;
    }
}

impl AsyncRead for MockSerialStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = &mut *self;
        if !this.pending.is_empty() {
            let pending = std::mem::take(&mut this.pending);
            this.fill(buf, pending);
            return Poll::Ready(Ok(()));
        }
        if this.eof {
            return Poll::Ready(Ok(()));
        }

        match this.actions.poll_recv(cx) {
            Poll::Ready(Some(PeerAction::Data(data))) => {
                this.fill(buf, data);
                Poll::Ready(Ok(()))
            }
            Poll::Ready(Some(PeerAction::Close)) | Poll::Ready(None) => {
                this.eof = true;
                Poll::Ready(Ok(()))
            }
            Poll::Ready(Some(PeerAction::Fail(message))) => {
                Poll::Ready(Err(io::Error::new(io::ErrorKind::ConnectionReset, message)))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl AsyncWrite for MockSerialStream {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        if self.shared.shutdown.load(Ordering::Acquire) {
            return Poll::Ready(Err(io::Error::from(io::ErrorKind::BrokenPipe)));
        }
        lock(&self.shared.written).extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.shared.shutdown.store(true, Ordering::Release);
        Poll::Ready(Ok(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test(start_paused = true)]
    async fn test_inquiry_follows_script() {
        let radio = MockRadio::builder()
            .device(Duration::from_millis(10), DiscoveredDevice::new("AA:BB", None))
            .finish(Duration::from_millis(10))
            .close_when_exhausted()
            .build();

        let events: Vec<_> = radio.inquire().await.unwrap().collect().await;
        assert_eq!(
            events,
            vec![
                InquiryEvent::DeviceFound(DiscoveredDevice::new("AA:BB", None)),
                InquiryEvent::Finished,
            ]
        );
        assert_eq!(radio.inquiry_events_delivered(), 2);
    }

    #[tokio::test]
    async fn test_live_inquiries_tracks_drops() {
        let radio = MockRadio::builder().build();
        let first = radio.inquire().await.unwrap();
        let second = radio.inquire().await.unwrap();
        assert_eq!(radio.live_inquiries(), 2);
        drop(first);
        assert_eq!(radio.live_inquiries(), 1);
        drop(second);
        assert_eq!(radio.live_inquiries(), 0);
        assert_eq!(radio.inquiries(), 2);
    }

    #[tokio::test]
    async fn test_queued_errors_are_one_shot() {
        let radio = MockRadio::builder()
            .channel("CC:DD", 4)
            .channel_error("CC:DD", RadioError::backend("busy"))
            .build();
        let addr = Address::new("CC:DD");

        assert!(radio.find_serial_port_channel(&addr).await.is_err());
        assert_eq!(radio.find_serial_port_channel(&addr).await.unwrap(), 4);
        assert_eq!(
            radio
                .find_serial_port_channel(&Address::new("EE:FF"))
                .await
                .unwrap(),
            0
        );
        assert_eq!(radio.channel_queries(), 3);
    }

    #[tokio::test]
    async fn test_peer_drives_stream() {
        let radio = MockRadio::builder().build();
        let mut stream = radio
            .connect(&Address::new("CC:DD"), Channel::new(1).unwrap())
            .await
            .unwrap();
        let peer = radio.last_peer().unwrap();

        peer.send(b"hello");
        peer.close();

        let mut received = Vec::new();
        stream.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, b"hello");

        stream.write_all(b"ack").await.unwrap();
        stream.shutdown().await.unwrap();
        assert_eq!(peer.written(), b"ack");
        assert!(peer.is_shutdown());
    }

    #[tokio::test]
    async fn test_large_chunk_is_split_by_reader_buffer() {
        let (mut stream, peer) = MockSerialStream::pair();
        peer.send(&[7u8; 10]);

        let mut buf = [0u8; 4];
        assert_eq!(stream.read(&mut buf).await.unwrap(), 4);
        assert_eq!(stream.read(&mut buf).await.unwrap(), 4);
        assert_eq!(stream.read(&mut buf).await.unwrap(), 2);
    }
}
