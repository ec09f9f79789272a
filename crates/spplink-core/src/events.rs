//! Session progress events.
//!
//! The orchestrator and its stages publish [`SessionEvent`]s on an
//! [`EventDispatcher`] so front-ends can show progress without parsing logs.
//! Publishing never blocks and never fails: with no subscribers the events
//! are simply dropped.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::trace;

use spplink_types::{Address, Channel, DiscoveredDevice};

use crate::error::SessionStage;

/// What a running session is doing, in the order it happens.
///
/// Serialized with an internal `"type"` tag so a front-end can forward them
/// as JSON lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum SessionEvent {
    /// An inquiry started.
    ScanStarted { target: String, timeout: Duration },
    /// A device answered the inquiry.
    DeviceObserved { device: DiscoveredDevice },
    /// The target device was found.
    TargetFound { device: DiscoveredDevice },
    /// The SPP channel was resolved.
    ChannelResolved { address: Address, channel: Channel },
    /// The byte stream is open.
    Connected { address: Address, channel: Channel },
    /// A stage failed; the session is over.
    StageFailed { stage: SessionStage, error: String },
    /// A retry of the whole session is starting.
    RetryStarted { attempt: u32, delay: Duration },
}

pub type EventReceiver = broadcast::Receiver<SessionEvent>;

/// Events buffered per subscriber before it starts lagging.
pub const DEFAULT_EVENT_CAPACITY: usize = 100;

/// Fan-out point for [`SessionEvent`]s. Clones share one channel.
#[derive(Debug, Clone)]
pub struct EventDispatcher {
    tx: broadcast::Sender<SessionEvent>,
}

impl EventDispatcher {
    pub fn new(capacity: usize) -> Self {
        Self {
            tx: broadcast::Sender::new(capacity),
        }
    }

    /// A receiver that sees every event published from now on.
    pub fn subscribe(&self) -> EventReceiver {
        self.tx.subscribe()
    }

    /// Publish `event`. Dropped when nobody is subscribed.
    pub fn send(&self, event: SessionEvent) {
        if self.tx.send(event).is_err() {
            trace!("No event subscribers");
        }
    }

    pub fn subscribers(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}
