//! SPP channel resolution.
//!
//! Serial Port Profile devices publish the RFCOMM channel their serial
//! service listens on through a service-discovery record. The resolver asks
//! the radio for that number and turns the stack's raw answer into a
//! validated [`Channel`].

use std::time::Duration;

use tracing::{info, warn};

use spplink_types::{Address, Channel};

use crate::error::{NoChannelError, RadioError};
use crate::radio::RadioStack;

/// Resolves the SPP channel of a discovered device.
#[derive(Debug)]
pub struct ChannelResolver<'r, R: ?Sized> {
    radio: &'r R,
    timeout: Option<Duration>,
}

impl<'r, R> ChannelResolver<'r, R>
where
    R: RadioStack + ?Sized,
{
    /// Create a resolver with no query timeout.
    pub fn new(radio: &'r R) -> Self {
        Self {
            radio,
            timeout: None,
        }
    }

    /// Bound the service query. `None` waits for the stack's own timeout.
    #[must_use]
    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Query the SPP channel of `address`.
    ///
    /// A stack answer of `0` means the device advertises no serial service
    /// and maps to [`NoChannelError::NotAdvertised`]. A failed or timed-out
    /// query maps to [`NoChannelError::QueryFailed`].
    #[tracing::instrument(level = "info", skip_all, fields(address = %address))]
    pub async fn resolve_channel(&self, address: &Address) -> Result<Channel, NoChannelError> {
        let query = self.radio.find_serial_port_channel(address);
        let result = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, query)
                .await
                .unwrap_or_else(|_| Err(RadioError::timeout("SPP channel query", limit))),
            None => query.await,
        };

        let raw = result.map_err(|source| {
            warn!("SPP channel query for {} failed: {}", address, source);
            NoChannelError::QueryFailed {
                address: address.clone(),
                source,
            }
        })?;

        match Channel::new(raw) {
            Some(channel) => {
                info!("SPP channel for {} is {}", address, channel);
                Ok(channel)
            }
            None => {
                warn!("{} does not advertise an SPP channel", address);
                Err(NoChannelError::NotAdvertised {
                    address: address.clone(),
                })
            }
        }
    }
}
