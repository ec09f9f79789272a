//! BlueZ radio stack (Linux).
//!
//! Talks to `bluetoothd` over D-Bus through `bluer`. Every operation opens
//! its own session and adapter handle and drops them when it returns, so no
//! handle outlives the call that needed it. An inquiry keeps its handles for
//! as long as its stream is alive.
//!
//! BlueZ has no direct SDP query API. The SPP channel is found by checking
//! that the device lists the Serial Port service and then letting BlueZ
//! connect a client profile, whose socket reports the channel it used.

use std::collections::HashSet;

use async_trait::async_trait;
use bluer::rfcomm::{Profile, Role, SocketAddr};
use bluer::{AdapterEvent, AdapterProperty, DiscoveryFilter, DiscoveryTransport};
use futures::{StreamExt, stream};
use tracing::{debug, info, warn};

use spplink_types::{Address, Channel, DiscoveredDevice, uuids};

use crate::error::RadioError;
use crate::radio::{
    BoxedSerialStream, InquiryEvent, InquiryStream, RadioStack, await_profile_request,
};

fn to_bluer(address: &Address) -> Result<bluer::Address, RadioError> {
    Ok(bluer::Address::new(address.parse_mac()?))
}

/// Radio stack backed by the system BlueZ daemon.
#[derive(Debug, Clone, Default)]
pub struct BluezRadio {
    adapter_name: Option<String>,
}

impl BluezRadio {
    /// Use the default adapter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use the adapter called `name` (for example `hci1`).
    pub fn with_adapter(name: impl Into<String>) -> Self {
        Self {
            adapter_name: Some(name.into()),
        }
    }

    async fn open(&self) -> Result<(bluer::Session, bluer::Adapter), RadioError> {
        let session = bluer::Session::new().await?;
        let adapter = match &self.adapter_name {
            Some(name) => session.adapter(name),
            None => session.default_adapter().await,
        }
        .map_err(|e| {
            debug!("No usable adapter: {}", e);
            RadioError::NoAdapter
        })?;

        if !adapter.is_powered().await? {
            return Err(RadioError::AdapterOff);
        }
        debug!("Using adapter {}", adapter.name());
        Ok((session, adapter))
    }
}

struct Inquiry {
    _session: bluer::Session,
    adapter: bluer::Adapter,
    events: std::pin::Pin<Box<dyn futures::Stream<Item = AdapterEvent> + Send>>,
}

#[async_trait]
impl RadioStack for BluezRadio {
    async fn inquire(&self) -> Result<InquiryStream, RadioError> {
        let (session, adapter) = self.open().await?;
        adapter
            .set_discovery_filter(DiscoveryFilter {
                transport: DiscoveryTransport::BrEdr,
                ..Default::default()
            })
            .await?;
        let events = adapter.discover_devices().await?;
        info!("Inquiry started on {}", adapter.name());

        let inquiry = Inquiry {
            _session: session,
            adapter,
            events: Box::pin(events),
        };

        Ok(Box::pin(stream::unfold(Some(inquiry), |state| async move {
            let mut inquiry = state?;
            loop {
                match inquiry.events.next().await? {
                    AdapterEvent::DeviceAdded(addr) => {
                        let name = match inquiry.adapter.device(addr) {
                            Ok(device) => device.name().await.unwrap_or_else(|e| {
                                debug!("Name of {} unavailable: {}", addr, e);
                                None
                            }),
                            Err(e) => {
                                debug!("Device {} vanished: {}", addr, e);
                                None
                            }
                        };
                        let device = DiscoveredDevice::new(addr.to_string(), name);
                        return Some((InquiryEvent::DeviceFound(device), Some(inquiry)));
                    }
                    AdapterEvent::PropertyChanged(AdapterProperty::Discovering(false)) => {
                        debug!("Adapter stopped discovering");
                        return Some((InquiryEvent::Finished, None));
                    }
                    _ => {}
                }
            }
        })))
    }

    async fn find_serial_port_channel(&self, address: &Address) -> Result<u8, RadioError> {
        let addr = to_bluer(address)?;
        let (session, adapter) = self.open().await?;
        let device = adapter.device(addr)?;

        let services: HashSet<bluer::Uuid> = device.uuids().await?.unwrap_or_default();
        if !services.contains(&uuids::SERIAL_PORT) {
            info!("{} lists {} service(s), none of them SPP", address, services.len());
            return Ok(0);
        }

        let mut profile = session
            .register_profile(Profile {
                uuid: uuids::SERIAL_PORT,
                role: Some(Role::Client),
                require_authentication: Some(false),
                require_authorization: Some(false),
                ..Default::default()
            })
            .await?;

        let request =
            await_profile_request(device.connect_profile(&uuids::SERIAL_PORT), &mut profile)
                .await?;
        let stream = request.accept()?;
        let channel = stream.peer_addr()?.channel;
        drop(stream);

        if let Err(e) = device.disconnect_profile(&uuids::SERIAL_PORT).await {
            warn!("Could not release SPP profile on {}: {}", address, e);
        }
        Ok(channel)
    }

    async fn connect(
        &self,
        address: &Address,
        channel: Channel,
    ) -> Result<BoxedSerialStream, RadioError> {
        let addr = to_bluer(address)?;
        let stream = bluer::rfcomm::Stream::connect(SocketAddr::new(addr, channel.get())).await?;
        Ok(Box::new(stream))
    }
}
