//! btleplug-backed implementation of the [`Transport`] trait.
//!
//! Maps the crate's transport primitives onto a btleplug `Adapter`:
//! central events become advertisement broadcasts, peripherals are cached
//! by id, and per-peripheral notification streams are pumped into a single
//! notification channel.

use async_trait::async_trait;
use btleplug::api::{
    Central, CentralEvent, CharPropFlags, Characteristic, Manager as _, Peripheral as _,
    ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use futures::stream::StreamExt;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, error, info, trace};
use uuid::Uuid;

use crate::ble::transport::{
    Advertisement, CharacteristicInfo, CharacteristicProperties, Notification, ScanConfig,
    Transport,
};
use crate::device::DeviceRecord;
use crate::error::{Error, Result};

/// Map btleplug characteristic flags onto the crate's property set.
fn map_properties(flags: CharPropFlags) -> CharacteristicProperties {
    CharacteristicProperties {
        write: flags.contains(CharPropFlags::WRITE),
        write_without_response: flags.contains(CharPropFlags::WRITE_WITHOUT_RESPONSE),
        notify: flags.contains(CharPropFlags::NOTIFY),
    }
}

/// [`Transport`] implementation over a btleplug adapter.
pub struct BtleplugTransport {
    adapter: Adapter,
    /// Peripherals seen so far, by stringified id.
    peripherals: Arc<RwLock<HashMap<String, Peripheral>>>,
    is_scanning: Arc<RwLock<bool>>,
    adv_tx: broadcast::Sender<Advertisement>,
    notification_tx: broadcast::Sender<Notification>,
    scan_handle: Arc<RwLock<Option<tokio::task::JoinHandle<()>>>>,
    /// Notification pumps by device id.
    notification_handles: Arc<RwLock<HashMap<String, tokio::task::JoinHandle<()>>>>,
}

impl BtleplugTransport {
    /// Create a transport on the first available Bluetooth adapter.
    pub async fn new() -> Result<Self> {
        let manager = Manager::new().await.map_err(|_| Error::Unsupported)?;
        let adapters = manager.adapters().await.map_err(Error::from)?;
        let adapter = adapters.into_iter().next().ok_or(Error::Unsupported)?;

        info!(
            "Using Bluetooth adapter: {:?}",
            adapter.adapter_info().await.ok()
        );

        Ok(Self::with_adapter(adapter))
    }

    /// Create a transport on a specific adapter.
    pub fn with_adapter(adapter: Adapter) -> Self {
        let (adv_tx, _) = broadcast::channel(100);
        let (notification_tx, _) = broadcast::channel(256);

        Self {
            adapter,
            peripherals: Arc::new(RwLock::new(HashMap::new())),
            is_scanning: Arc::new(RwLock::new(false)),
            adv_tx,
            notification_tx,
            scan_handle: Arc::new(RwLock::new(None)),
            notification_handles: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    fn peripheral(&self, device_id: &str) -> Result<Peripheral> {
        self.peripherals
            .read()
            .get(device_id)
            .cloned()
            .ok_or_else(|| Error::DeviceNotFound {
                identifier: device_id.to_string(),
            })
    }

    fn find_characteristic(peripheral: &Peripheral, uuid: Uuid) -> Result<Characteristic> {
        peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == uuid)
            .ok_or_else(|| Error::CharacteristicNotFound {
                context: uuid.to_string(),
            })
    }

    /// Resolve a peripheral, cache it, and emit an advertisement event.
    async fn process_peripheral(
        adapter: &Adapter,
        id: PeripheralId,
        peripherals: &Arc<RwLock<HashMap<String, Peripheral>>>,
        adv_tx: &broadcast::Sender<Advertisement>,
        connected_sentinel: bool,
    ) {
        let peripheral = match adapter.peripheral(&id).await {
            Ok(p) => p,
            Err(e) => {
                trace!("Failed to resolve peripheral {:?}: {}", id, e);
                return;
            }
        };

        let properties = match peripheral.properties().await {
            Ok(Some(p)) => p,
            _ => return,
        };

        let identifier = id.to_string();
        peripherals.write().insert(identifier.clone(), peripheral);

        let rssi = if connected_sentinel {
            // Platform-reported already-connected devices carry the
            // sentinel signal value.
            Some(DeviceRecord::CONNECTED_RSSI_SENTINEL)
        } else {
            properties.rssi
        };

        let _ = adv_tx.send(Advertisement {
            id: identifier,
            local_name: properties.local_name,
            rssi,
            address: Some(properties.address.to_string()),
        });
    }

    /// Report peripherals the platform already holds a connection to.
    async fn emit_connected_peripherals(&self) {
        let peripherals = match self.adapter.peripherals().await {
            Ok(p) => p,
            Err(e) => {
                debug!("Failed to enumerate known peripherals: {}", e);
                return;
            }
        };

        for peripheral in peripherals {
            if peripheral.is_connected().await.unwrap_or(false) {
                Self::process_peripheral(
                    &self.adapter,
                    peripheral.id(),
                    &self.peripherals,
                    &self.adv_tx,
                    true,
                )
                .await;
            }
        }
    }

    /// Start the notification pump for a device, if not already running.
    async fn ensure_notification_pump(&self, device_id: &str, peripheral: &Peripheral) {
        if self.notification_handles.read().contains_key(device_id) {
            return;
        }

        let mut notifications = match peripheral.notifications().await {
            Ok(n) => n,
            Err(e) => {
                error!("Failed to get notification stream for {}: {}", device_id, e);
                return;
            }
        };

        let id = device_id.to_string();
        let notification_tx = self.notification_tx.clone();

        let handle = tokio::spawn(async move {
            while let Some(notification) = notifications.next().await {
                trace!(
                    "Notification from {} ({} bytes)",
                    notification.uuid,
                    notification.value.len()
                );

                let _ = notification_tx.send(Notification {
                    device_id: id.clone(),
                    characteristic_uuid: notification.uuid,
                    data: notification.value,
                });
            }

            debug!("Notification pump ended for {}", id);
        });

        self.notification_handles
            .write()
            .insert(device_id.to_string(), handle);
    }
}

#[async_trait]
impl Transport for BtleplugTransport {
    async fn start_scan(&self, config: ScanConfig) -> Result<()> {
        if *self.is_scanning.read() {
            debug!("Already scanning, ignoring start request");
            return Ok(());
        }

        info!("Starting BLE scan");

        if config.include_connected {
            self.emit_connected_peripherals().await;
        }

        self.adapter
            .start_scan(ScanFilter::default())
            .await
            .map_err(Error::from)?;

        *self.is_scanning.write() = true;

        let adapter = self.adapter.clone();
        let is_scanning = self.is_scanning.clone();
        let peripherals = self.peripherals.clone();
        let adv_tx = self.adv_tx.clone();

        let handle = tokio::spawn(async move {
            let mut events = match adapter.events().await {
                Ok(events) => events,
                Err(e) => {
                    error!("Failed to get adapter events: {}", e);
                    return;
                }
            };

            while *is_scanning.read() {
                tokio::select! {
                    Some(event) = events.next() => {
                        match event {
                            CentralEvent::DeviceDiscovered(id)
                            | CentralEvent::DeviceUpdated(id) => {
                                Self::process_peripheral(
                                    &adapter,
                                    id,
                                    &peripherals,
                                    &adv_tx,
                                    false,
                                )
                                .await;
                            }
                            other => trace!("Ignoring central event: {:?}", other),
                        }
                    }
                    _ = tokio::time::sleep(Duration::from_millis(100)) => {
                        if !*is_scanning.read() {
                            break;
                        }
                    }
                }
            }

            debug!("Scan event loop ended");
        });

        *self.scan_handle.write() = Some(handle);

        Ok(())
    }

    async fn stop_scan(&self) -> Result<()> {
        if !*self.is_scanning.read() {
            debug!("Not scanning, ignoring stop request");
            return Ok(());
        }

        info!("Stopping BLE scan");

        *self.is_scanning.write() = false;
        self.adapter.stop_scan().await.map_err(Error::from)?;

        let handle = self.scan_handle.write().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }

        Ok(())
    }

    fn advertisements(&self) -> broadcast::Receiver<Advertisement> {
        self.adv_tx.subscribe()
    }

    async fn connect(&self, device_id: &str, timeout: Duration) -> Result<()> {
        let peripheral = self.peripheral(device_id)?;

        if peripheral.is_connected().await.unwrap_or(false) {
            debug!("Peripheral {} already connected at BLE level", device_id);
            return Ok(());
        }

        match tokio::time::timeout(timeout, peripheral.connect()).await {
            Ok(result) => result.map_err(Error::from),
            Err(_) => Err(Error::Timeout),
        }
    }

    async fn discover_characteristics(
        &self,
        device_id: &str,
        services: &[Uuid],
        characteristics: &[Uuid],
    ) -> Result<Vec<CharacteristicInfo>> {
        let peripheral = self.peripheral(device_id)?;

        peripheral.discover_services().await.map_err(Error::from)?;

        let mut discovered = Vec::new();
        for service in peripheral.services() {
            if !services.is_empty() && !services.contains(&service.uuid) {
                continue;
            }

            for characteristic in service.characteristics {
                if !characteristics.is_empty() && !characteristics.contains(&characteristic.uuid) {
                    continue;
                }

                debug!(
                    "Found characteristic {} in service {}",
                    characteristic.uuid, service.uuid
                );

                discovered.push(CharacteristicInfo {
                    uuid: characteristic.uuid,
                    service_uuid: service.uuid,
                    properties: map_properties(characteristic.properties),
                });
            }
        }

        Ok(discovered)
    }

    async fn subscribe(&self, device_id: &str, characteristic: Uuid) -> Result<()> {
        let peripheral = self.peripheral(device_id)?;
        let target = Self::find_characteristic(&peripheral, characteristic)?;

        peripheral.subscribe(&target).await.map_err(Error::from)?;
        debug!("Subscribed to {}", characteristic);

        self.ensure_notification_pump(device_id, &peripheral).await;

        Ok(())
    }

    fn notifications(&self) -> broadcast::Receiver<Notification> {
        self.notification_tx.subscribe()
    }

    async fn write(&self, device_id: &str, characteristic: Uuid, data: &[u8]) -> Result<()> {
        let peripheral = self.peripheral(device_id)?;
        let target = Self::find_characteristic(&peripheral, characteristic)?;

        let write_type = if target.properties.contains(CharPropFlags::WRITE) {
            WriteType::WithResponse
        } else {
            WriteType::WithoutResponse
        };

        peripheral
            .write(&target, data, write_type)
            .await
            .map_err(Error::from)?;

        trace!("Wrote {} bytes to {}", data.len(), characteristic);

        Ok(())
    }

    async fn disconnect(&self, device_id: &str) -> Result<()> {
        if let Some(handle) = self.notification_handles.write().remove(device_id) {
            handle.abort();
        }

        let Ok(peripheral) = self.peripheral(device_id) else {
            return Ok(());
        };

        if !peripheral.is_connected().await.unwrap_or(false) {
            return Ok(());
        }

        peripheral.disconnect().await.map_err(Error::from)
    }
}

impl Drop for BtleplugTransport {
    fn drop(&mut self) {
        *self.is_scanning.write() = false;
        for (_, handle) in self.notification_handles.write().drain() {
            handle.abort();
        }
    }
}
