//! Scan session.
//!
//! Owns the in-memory table of devices discovered during the current scan
//! lifetime. Every advertisement is classified and stored (last write wins
//! per id); the active filter only gates which records are forwarded on the
//! discovery channel. Restarting the session discards the previous table.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, trace};

use crate::ble::transport::{Advertisement, ScanConfig, Transport};
use crate::device::DeviceRecord;
use crate::error::Result;
use crate::filter::{AdvertisedMetadata, DeviceFilter};
use crate::registry::DeviceRegistry;

/// Token identifying one scan lifetime. Stopping with a stale token is a
/// no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanToken(u64);

/// Owns device discovery for the current scan lifetime.
pub struct ScanSession {
    transport: Arc<dyn Transport>,
    registry: Arc<dyn DeviceRegistry>,
    /// Discovered devices by id, cleared on every start.
    devices: Arc<RwLock<HashMap<String, DeviceRecord>>>,
    /// Scan lifetime counter; bumping it invalidates the running pump.
    generation: Arc<AtomicU64>,
    /// Channel of filter-accepted discoveries.
    found_tx: broadcast::Sender<DeviceRecord>,
    pump_handle: RwLock<Option<tokio::task::JoinHandle<()>>>,
}

impl ScanSession {
    /// Create a session over the given collaborators.
    pub fn new(transport: Arc<dyn Transport>, registry: Arc<dyn DeviceRegistry>) -> Self {
        let (found_tx, _) = broadcast::channel(64);

        Self {
            transport,
            registry,
            devices: Arc::new(RwLock::new(HashMap::new())),
            generation: Arc::new(AtomicU64::new(0)),
            found_tx,
            pump_handle: RwLock::new(None),
        }
    }

    /// Start a new scan lifetime, discarding the previous device table.
    pub async fn start(
        &self,
        config: ScanConfig,
        filter: Option<Arc<dyn DeviceFilter>>,
    ) -> Result<ScanToken> {
        self.stop_current().await?;

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.devices.write().clear();

        if let Some(filter) = &filter {
            info!("Starting scan with filter {}", filter.describe());
        } else {
            info!("Starting scan without filter");
        }

        let mut rx = self.transport.advertisements();
        self.transport.start_scan(config).await?;

        let devices = self.devices.clone();
        let registry = self.registry.clone();
        let current_generation = self.generation.clone();
        let found_tx = self.found_tx.clone();

        let handle = tokio::spawn(async move {
            while current_generation.load(Ordering::SeqCst) == generation {
                match rx.recv().await {
                    Ok(advertisement) => {
                        // An event already in flight when the scan stopped
                        // must not land in the next session's table.
                        if current_generation.load(Ordering::SeqCst) != generation {
                            break;
                        }
                        Self::handle_advertisement(
                            advertisement,
                            &devices,
                            registry.as_ref(),
                            filter.as_deref(),
                            &found_tx,
                        );
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!("Scan pump lagged, skipped {} advertisements", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }

            debug!("Scan pump ended for generation {}", generation);
        });

        *self.pump_handle.write() = Some(handle);

        Ok(ScanToken(generation))
    }

    /// Stop the scan this token belongs to. Stale tokens are ignored.
    pub async fn stop(&self, token: ScanToken) -> Result<()> {
        if self.generation.load(Ordering::SeqCst) != token.0 {
            debug!("Ignoring stop for stale scan token {:?}", token);
            return Ok(());
        }

        self.stop_current().await
    }

    /// Stop whatever scan is running, if any.
    pub async fn stop_current(&self) -> Result<()> {
        let handle = self.pump_handle.write().take();
        let Some(handle) = handle else {
            return Ok(());
        };

        info!("Stopping scan");

        // Invalidate the pump before stopping the transport so late events
        // are dropped rather than recorded.
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.transport.stop_scan().await?;

        handle.abort();
        let _ = handle.await;

        Ok(())
    }

    /// Whether a scan pump is currently running.
    pub fn is_scanning(&self) -> bool {
        self.pump_handle.read().is_some()
    }

    /// Current table contents at call time (not a live view).
    pub fn snapshot(&self) -> Vec<DeviceRecord> {
        self.devices.read().values().cloned().collect()
    }

    /// Look up a device in the current table.
    pub fn get(&self, id: &str) -> Option<DeviceRecord> {
        self.devices.read().get(id).cloned()
    }

    /// Subscribe to filter-accepted discoveries.
    pub fn subscribe(&self) -> broadcast::Receiver<DeviceRecord> {
        self.found_tx.subscribe()
    }

    fn handle_advertisement(
        advertisement: Advertisement,
        devices: &RwLock<HashMap<String, DeviceRecord>>,
        registry: &dyn DeviceRegistry,
        filter: Option<&dyn DeviceFilter>,
        found_tx: &broadcast::Sender<DeviceRecord>,
    ) {
        let metadata = AdvertisedMetadata {
            name: advertisement.local_name.clone(),
        };

        let record = DeviceRecord::from_advertisement(
            advertisement.id,
            advertisement.local_name,
            advertisement.rssi.unwrap_or(DeviceRecord::UNKNOWN_RSSI),
            advertisement.address,
            registry,
        );

        trace!(
            "Discovered {} ({}) class={} rssi={}",
            record.name,
            record.id,
            record.class,
            record.rssi
        );

        devices.write().insert(record.id.clone(), record.clone());

        if let Some(filter) = filter {
            if !filter.matches(&metadata) {
                trace!("Device {} rejected by {}", record.name, filter.describe());
                return;
            }
        }

        let _ = found_tx.send(record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ble::transport::MockTransport;
    use crate::registry::MemoryRegistry;
    use crate::DeviceClass;
    use std::time::Duration;

    fn advertisement(id: &str, name: &str, rssi: i16) -> Advertisement {
        Advertisement {
            id: id.to_string(),
            local_name: Some(name.to_string()),
            rssi: Some(rssi),
            address: None,
        }
    }

    /// A transport stub whose advertisement channel is driven by the test.
    fn scanning_transport() -> (Arc<MockTransport>, broadcast::Sender<Advertisement>) {
        let (tx, _) = broadcast::channel(16);
        let mut transport = MockTransport::new();

        let adv_tx = tx.clone();
        transport
            .expect_advertisements()
            .returning(move || adv_tx.subscribe());
        transport.expect_start_scan().returning(|_| Ok(()));
        transport.expect_stop_scan().returning(|| Ok(()));

        (Arc::new(transport), tx)
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    #[tokio::test]
    async fn test_discovery_classifies_and_stores() {
        let (transport, adv_tx) = scanning_transport();
        let session = ScanSession::new(transport, Arc::new(MemoryRegistry::new()));

        let mut found = session.subscribe();
        session.start(ScanConfig::default(), None).await.unwrap();

        adv_tx.send(advertisement("dev-1", "FVC-200", -60)).unwrap();
        settle().await;

        let record = found.try_recv().unwrap();
        assert_eq!(record.class, DeviceClass::Spirometer);
        assert!(record.is_new_device);

        let snapshot = session.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].id, "dev-1");
    }

    #[tokio::test]
    async fn test_missing_rssi_is_not_already_connected() {
        let (transport, adv_tx) = scanning_transport();
        let session = ScanSession::new(transport, Arc::new(MemoryRegistry::new()));

        session.start(ScanConfig::default(), None).await.unwrap();

        adv_tx
            .send(Advertisement {
                id: "dev-1".to_string(),
                local_name: Some("FVC-200".to_string()),
                rssi: None,
                address: None,
            })
            .unwrap();
        settle().await;

        let snapshot = session.snapshot();
        assert_eq!(snapshot[0].rssi, DeviceRecord::UNKNOWN_RSSI);
        assert!(!snapshot[0].is_already_connected);
    }

    #[tokio::test]
    async fn test_last_write_wins_on_rereport() {
        let (transport, adv_tx) = scanning_transport();
        let session = ScanSession::new(transport, Arc::new(MemoryRegistry::new()));

        session.start(ScanConfig::default(), None).await.unwrap();

        adv_tx.send(advertisement("dev-1", "FVC-200", -60)).unwrap();
        adv_tx.send(advertisement("dev-1", "FVC-200", -45)).unwrap();
        settle().await;

        let snapshot = session.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].rssi, -45);
    }

    #[tokio::test]
    async fn test_filter_gates_forwarding_not_storage() {
        let (transport, adv_tx) = scanning_transport();
        let session = ScanSession::new(transport, Arc::new(MemoryRegistry::new()));

        let filter = Arc::new(crate::filter::NameFilter::with_targets(["FVC"]));
        let mut found = session.subscribe();
        session
            .start(ScanConfig::default(), Some(filter))
            .await
            .unwrap();

        adv_tx.send(advertisement("dev-1", "FVC-200", -60)).unwrap();
        adv_tx.send(advertisement("dev-2", "TempSense", -50)).unwrap();
        settle().await;

        // Only the matching device is forwarded...
        let record = found.try_recv().unwrap();
        assert_eq!(record.id, "dev-1");
        assert!(found.try_recv().is_err());

        // ...but both are in the table.
        assert_eq!(session.snapshot().len(), 2);
    }

    #[tokio::test]
    async fn test_restart_discards_previous_table() {
        let (transport, adv_tx) = scanning_transport();
        let session = ScanSession::new(transport, Arc::new(MemoryRegistry::new()));

        session.start(ScanConfig::default(), None).await.unwrap();
        adv_tx.send(advertisement("dev-1", "FVC-200", -60)).unwrap();
        settle().await;
        assert_eq!(session.snapshot().len(), 1);

        session.start(ScanConfig::default(), None).await.unwrap();
        assert!(session.snapshot().is_empty());

        adv_tx.send(advertisement("dev-2", "PulseOx", -70)).unwrap();
        settle().await;

        let snapshot = session.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].id, "dev-2");
    }

    #[tokio::test]
    async fn test_stop_is_idempotent_via_stale_token() {
        let (transport, _adv_tx) = scanning_transport();
        let session = ScanSession::new(transport, Arc::new(MemoryRegistry::new()));

        let token = session.start(ScanConfig::default(), None).await.unwrap();
        session.stop(token).await.unwrap();
        assert!(!session.is_scanning());

        // Second stop with the now-stale token is a no-op.
        session.stop(token).await.unwrap();
    }

    #[tokio::test]
    async fn test_events_after_stop_are_dropped() {
        let (transport, adv_tx) = scanning_transport();
        let session = ScanSession::new(transport, Arc::new(MemoryRegistry::new()));

        let token = session.start(ScanConfig::default(), None).await.unwrap();
        session.stop(token).await.unwrap();

        adv_tx.send(advertisement("dev-late", "FVC-200", -60)).ok();
        settle().await;

        assert!(session.snapshot().is_empty());
    }
}
