//! Transport adapter seam.
//!
//! The wireless transport (scan/connect/discover/write/notify primitives)
//! is consumed through the [`Transport`] trait. The crate ships a btleplug
//! implementation in [`crate::ble::btleplug_transport`]; tests drive the
//! higher layers with a mock.

use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::error::Result;

/// Scan configuration forwarded to the transport.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScanConfig {
    /// Whether the platform should also report devices it already holds a
    /// connection to.
    pub include_connected: bool,
}

/// A raw advertisement event from the transport.
#[derive(Debug, Clone)]
pub struct Advertisement {
    /// Opaque stable peripheral identifier.
    pub id: String,
    /// Advertised local name, if any.
    pub local_name: Option<String>,
    /// Signal strength in dBm, if reported.
    pub rssi: Option<i16>,
    /// Hardware address, where the platform exposes one.
    pub address: Option<String>,
}

/// Capability flags of a discovered characteristic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CharacteristicProperties {
    /// Supports write-with-response.
    pub write: bool,
    /// Supports write-without-response.
    pub write_without_response: bool,
    /// Supports notifications.
    pub notify: bool,
}

impl CharacteristicProperties {
    /// Whether the characteristic accepts writes of either kind.
    pub fn is_writable(&self) -> bool {
        self.write || self.write_without_response
    }
}

/// A characteristic discovered on a connected device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharacteristicInfo {
    /// Characteristic UUID.
    pub uuid: Uuid,
    /// Owning service UUID.
    pub service_uuid: Uuid,
    /// Capability flags.
    pub properties: CharacteristicProperties,
}

/// A notification delivered by a subscribed characteristic.
#[derive(Debug, Clone)]
pub struct Notification {
    /// The device the notification came from.
    pub device_id: String,
    /// The characteristic that fired.
    pub characteristic_uuid: Uuid,
    /// Raw notification bytes.
    pub data: Vec<u8>,
}

/// Low-level wireless transport primitives.
///
/// The core performs no retries through this trait; transport failures are
/// surfaced verbatim. Events fan out over broadcast channels so that a
/// stale consumer can simply be dropped.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    /// Begin continuous discovery. Advertisements arrive on the channel
    /// returned by [`Transport::advertisements`].
    async fn start_scan(&self, config: ScanConfig) -> Result<()>;

    /// Stop discovery. Stopping an inactive scan is a no-op.
    async fn stop_scan(&self) -> Result<()>;

    /// Subscribe to advertisement events.
    fn advertisements(&self) -> broadcast::Receiver<Advertisement>;

    /// Connect to a device within the given deadline.
    async fn connect(&self, device_id: &str, timeout: Duration) -> Result<()>;

    /// Discover characteristics on a connected device, restricted to the
    /// given service/characteristic UUID sets. Empty sets mean no
    /// restriction.
    async fn discover_characteristics(
        &self,
        device_id: &str,
        services: &[Uuid],
        characteristics: &[Uuid],
    ) -> Result<Vec<CharacteristicInfo>>;

    /// Issue a notification subscription for a characteristic.
    async fn subscribe(&self, device_id: &str, characteristic: Uuid) -> Result<()>;

    /// Subscribe to notification events from all subscribed characteristics.
    fn notifications(&self) -> broadcast::Receiver<Notification>;

    /// Write bytes to a characteristic.
    async fn write(&self, device_id: &str, characteristic: Uuid, data: &[u8]) -> Result<()>;

    /// Disconnect from a device. Disconnecting an unconnected device is a
    /// no-op.
    async fn disconnect(&self, device_id: &str) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writable_properties() {
        let mut props = CharacteristicProperties::default();
        assert!(!props.is_writable());

        props.write = true;
        assert!(props.is_writable());

        let props = CharacteristicProperties {
            write: false,
            write_without_response: true,
            notify: false,
        };
        assert!(props.is_writable());
    }

    #[test]
    fn test_advertisement_clone() {
        fn assert_clone<T: Clone>() {}
        assert_clone::<Advertisement>();
        assert_clone::<Notification>();
        assert_clone::<CharacteristicInfo>();
    }
}
