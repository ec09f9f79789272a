//! Open RFCOMM connections.
//!
//! A [`Connection`] owns the byte stream to one device. Reading happens on a
//! background task that forwards everything it sees as [`ConnectionEvent`]s:
//! zero or more [`ConnectionEvent::Data`] chunks followed by at most one
//! terminal [`ConnectionEvent::Closed`] or [`ConnectionEvent::Failure`].
//! No data is delivered after a terminal event, and the event channel ends
//! once the reader task exits.
//!
//! # Lifecycle
//!
//! ```text
//!            peer EOF / close()
//!   Open ─────────────────────────▶ Closed
//!     │
//!     │ read error
//!     └───────────────────────────▶ Failed
//! ```
//!
//! Dropping an open connection cancels the reader task and logs a warning;
//! call [`Connection::close`] to shut down explicitly.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use spplink_types::{Address, Channel, ConnectionState};

use crate::error::{ConnectError, Error, RadioError, Result};
use crate::radio::{BoxedSerialStream, RadioStack};

/// Size of the reader task's buffer. Chunks larger than this arrive split.
pub const READ_BUFFER_SIZE: usize = 1024;

/// Something that happened on an open connection.
#[derive(Debug)]
pub enum ConnectionEvent {
    /// Bytes received from the device.
    Data(Bytes),
    /// The stream closed, by the peer or by [`Connection::close`].
    Closed,
    /// The stream failed.
    Failure(std::io::Error),
}

impl ConnectionEvent {
    /// Whether this event ends the connection.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ConnectionEvent::Data(_))
    }
}

/// Receiving end of a connection's events.
pub type ConnectionEvents = mpsc::UnboundedReceiver<ConnectionEvent>;

/// An open byte stream to a device.
pub struct Connection {
    address: Address,
    channel: Channel,
    state: Arc<AtomicU8>,
    writer: Mutex<Option<WriteHalf<BoxedSerialStream>>>,
    events: Option<ConnectionEvents>,
    reader: Mutex<Option<JoinHandle<()>>>,
    cancel: CancellationToken,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("address", &self.address)
            .field("channel", &self.channel)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// Wrap an already-open stream and start its reader task.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn from_stream(stream: BoxedSerialStream, address: Address, channel: Channel) -> Self {
        let (read_half, write_half) = tokio::io::split(stream);
        let state = Arc::new(AtomicU8::new(ConnectionState::Open as u8));
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let reader = tokio::spawn(read_loop(
            read_half,
            Arc::clone(&state),
            tx,
            cancel.clone(),
            address.clone(),
        ));

        Self {
            address,
            channel,
            state,
            writer: Mutex::new(Some(write_half)),
            events: Some(rx),
            reader: Mutex::new(Some(reader)),
            cancel,
        }
    }

    /// The connected device.
    pub fn address(&self) -> &Address {
        &self.address
    }

    /// The RFCOMM channel in use.
    pub fn channel(&self) -> Channel {
        self.channel
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        ConnectionState::try_from(self.state.load(Ordering::Acquire))
            .unwrap_or(ConnectionState::Failed)
    }

    /// Whether the connection is still open.
    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Take the event receiver to consume it elsewhere.
    ///
    /// Returns `None` if it was already taken.
    pub fn take_events(&mut self) -> Option<ConnectionEvents> {
        self.events.take()
    }

    /// Wait for the next event.
    ///
    /// Returns `None` once the event channel has ended or if the receiver
    /// was taken with [`Connection::take_events`].
    pub async fn next_event(&mut self) -> Option<ConnectionEvent> {
        match self.events.as_mut() {
            Some(events) => events.recv().await,
            None => None,
        }
    }

    /// Write `data` to the device and flush it.
    pub async fn send(&self, data: &[u8]) -> Result<()> {
        if !self.is_open() {
            return Err(Error::NotConnected);
        }
        let mut writer = self.writer.lock().await;
        let writer = writer.as_mut().ok_or(Error::NotConnected)?;
        writer.write_all(data).await?;
        writer.flush().await?;
        debug!(bytes = data.len(), "Sent to {}", self.address);
        Ok(())
    }

    /// Close the connection.
    ///
    /// Stops the reader task, which emits [`ConnectionEvent::Closed`] if the
    /// connection was still open, then shuts down the write side. Closing
    /// an already closed or failed connection does nothing.
    pub async fn close(&self) -> Result<()> {
        self.cancel.cancel();

        if let Some(reader) = self.reader.lock().await.take()
            && let Err(e) = reader.await
        {
            warn!("Reader task for {} ended abnormally: {}", self.address, e);
        }

        if let Some(mut writer) = self.writer.lock().await.take() {
            if let Err(e) = writer.shutdown().await {
                debug!("Shutdown of {} reported: {}", self.address, e);
            }
            info!("Closed connection to {}", self.address);
        }
        Ok(())
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if self.is_open() {
            warn!(
                address = %self.address,
                "Connection dropped while open; call close() for a clean shutdown"
            );
        }
        self.cancel.cancel();
    }
}

/// Move `state` from `Open` to `to`. Only the first terminal transition wins.
fn finish(state: &AtomicU8, to: ConnectionState) -> bool {
    state
        .compare_exchange(
            ConnectionState::Open as u8,
            to as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        )
        .is_ok()
}

async fn read_loop(
    mut reader: ReadHalf<BoxedSerialStream>,
    state: Arc<AtomicU8>,
    tx: mpsc::UnboundedSender<ConnectionEvent>,
    cancel: CancellationToken,
    address: Address,
) {
    let mut buf = vec![0u8; READ_BUFFER_SIZE];
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                if finish(&state, ConnectionState::Closed) {
                    debug!("Reader for {} cancelled", address);
                    let _ = tx.send(ConnectionEvent::Closed);
                }
                break;
            }
            read = reader.read(&mut buf) => match read {
                Ok(0) => {
                    if finish(&state, ConnectionState::Closed) {
                        info!("{} closed the connection", address);
                        let _ = tx.send(ConnectionEvent::Closed);
                    }
                    break;
                }
                Ok(n) => {
                    debug!(bytes = n, "Received from {}", address);
                    let _ = tx.send(ConnectionEvent::Data(Bytes::copy_from_slice(&buf[..n])));
                }
                Err(e) => {
                    if finish(&state, ConnectionState::Failed) {
                        warn!("Connection to {} failed: {}", address, e);
                        let _ = tx.send(ConnectionEvent::Failure(e));
                    }
                    break;
                }
            }
        }
    }
}

/// Opens connections through a radio stack.
#[derive(Debug)]
pub struct ConnectionManager<'r, R: ?Sized> {
    radio: &'r R,
    timeout: Option<Duration>,
}

impl<'r, R> ConnectionManager<'r, R>
where
    R: RadioStack + ?Sized,
{
    /// Create a manager with no handshake timeout.
    pub fn new(radio: &'r R) -> Self {
        Self {
            radio,
            timeout: None,
        }
    }

    /// Bound the handshake. `None` waits for the stack's own timeout.
    #[must_use]
    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Open a byte stream to `address` on `channel`.
    #[tracing::instrument(level = "info", skip_all, fields(address = %address, channel = %channel))]
    pub async fn open(
        &self,
        address: &Address,
        channel: Channel,
    ) -> std::result::Result<Connection, ConnectError> {
        info!("Connecting to {} on channel {}...", address, channel);

        let connect = self.radio.connect(address, channel);
        let result = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, connect)
                .await
                .unwrap_or_else(|_| Err(RadioError::timeout("RFCOMM connect", limit))),
            None => connect.await,
        };

        let stream = result.map_err(|source| {
            warn!("Connection to {} failed: {}", address, source);
            ConnectError {
                address: address.clone(),
                channel,
                source,
            }
        })?;

        info!("Connected to {} on channel {}", address, channel);
        Ok(Connection::from_stream(stream, address.clone(), channel))
    }
}
