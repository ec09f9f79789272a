//! Bluetooth Classic service UUIDs used by SPP sessions.

use uuid::{Uuid, uuid};

/// Serial Port Profile service class (assigned number `0x1101`).
pub const SERIAL_PORT: Uuid = uuid!("00001101-0000-1000-8000-00805f9b34fb");
