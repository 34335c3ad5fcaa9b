//! Device manager facade.
//!
//! The single public entry point: owns one scan session and one connection
//! session, routes command building through the protocol layer, and exposes
//! the event surface. Enforces the one-active-connection invariant.

use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::ble::scanner::{ScanSession, ScanToken};
use crate::ble::session::{ConnectionSession, SessionState};
use crate::ble::transport::{ScanConfig, Transport};
use crate::crypto::CommandCrypto;
use crate::device::DeviceRecord;
use crate::error::{Error, Result};
use crate::event::EventHandlers;
use crate::filter::DeviceFilter;
use crate::protocol::{CommandBuilder, DeviceCommand, SpirometerCommand};
use crate::registry::DeviceRegistry;
use crate::utils::{decode_hex, encode_hex};

/// Facade configuration.
#[derive(Debug, Clone, Copy)]
pub struct ManagerConfig {
    /// Connect timeout. The only self-timed operation; scans run until
    /// stopped.
    pub connect_timeout: Duration,
    /// Pool key index used when building commands for new devices.
    pub key_index: usize,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            connect_timeout: ConnectionSession::DEFAULT_CONNECT_TIMEOUT,
            key_index: 0,
        }
    }
}

/// Central facade for scanning, connecting, and sending commands.
///
/// All collaborators are injected; the manager holds no process-wide
/// state. Create one instance per adapter and keep it alive for as long as
/// the integration is needed.
pub struct DeviceManager {
    transport: Arc<dyn Transport>,
    registry: Arc<dyn DeviceRegistry>,
    crypto: Arc<dyn CommandCrypto>,
    scan: Arc<ScanSession>,
    session: Arc<ConnectionSession>,
    handlers: Arc<EventHandlers>,
    config: ManagerConfig,
    scan_token: RwLock<Option<ScanToken>>,
    found_pump: RwLock<Option<tokio::task::JoinHandle<()>>>,
    notification_pump: RwLock<Option<tokio::task::JoinHandle<()>>>,
}

impl DeviceManager {
    /// Create a manager with default configuration.
    pub fn new(
        transport: Arc<dyn Transport>,
        registry: Arc<dyn DeviceRegistry>,
        crypto: Arc<dyn CommandCrypto>,
    ) -> Self {
        Self::with_config(transport, registry, crypto, ManagerConfig::default())
    }

    /// Create a manager with explicit configuration.
    pub fn with_config(
        transport: Arc<dyn Transport>,
        registry: Arc<dyn DeviceRegistry>,
        crypto: Arc<dyn CommandCrypto>,
        config: ManagerConfig,
    ) -> Self {
        let scan = Arc::new(ScanSession::new(transport.clone(), registry.clone()));
        let session = Arc::new(ConnectionSession::new(transport.clone()));

        Self {
            transport,
            registry,
            crypto,
            scan,
            session,
            handlers: Arc::new(EventHandlers::new()),
            config,
            scan_token: RwLock::new(None),
            found_pump: RwLock::new(None),
            notification_pump: RwLock::new(None),
        }
    }

    // Event registration. One handler per kind; registering again displaces
    // the previous handler.

    /// Register the device-found handler.
    pub fn on_device_found<F>(&self, handler: F)
    where
        F: Fn(DeviceRecord) + Send + Sync + 'static,
    {
        self.handlers.device_found.set(handler);
    }

    /// Register the connected handler.
    pub fn on_connected<F>(&self, handler: F)
    where
        F: Fn(()) + Send + Sync + 'static,
    {
        self.handlers.connected.set(handler);
    }

    /// Register the data-received handler (hex string payloads).
    pub fn on_data_received<F>(&self, handler: F)
    where
        F: Fn(String) + Send + Sync + 'static,
    {
        self.handlers.data_received.set(handler);
    }

    /// Register the error handler.
    pub fn on_error<F>(&self, handler: F)
    where
        F: Fn(String) + Send + Sync + 'static,
    {
        self.handlers.error.set(handler);
    }

    /// Register the disconnected handler.
    pub fn on_disconnected<F>(&self, handler: F)
    where
        F: Fn(()) + Send + Sync + 'static,
    {
        self.handlers.disconnected.set(handler);
    }

    /// Register the diagnostic log handler.
    pub fn on_log<F>(&self, handler: F)
    where
        F: Fn(String) + Send + Sync + 'static,
    {
        self.handlers.log.set(handler);
    }

    /// Start scanning, discarding any previous scan state.
    ///
    /// `include_already_connected` is forwarded to the transport so the
    /// platform reports devices it already holds a connection to.
    pub async fn scan(
        &self,
        include_already_connected: bool,
        filter: Option<Arc<dyn DeviceFilter>>,
    ) -> Result<()> {
        self.stop_found_pump();

        let config = ScanConfig {
            include_connected: include_already_connected,
        };

        // Subscribe before the session starts pumping so a device found
        // immediately is not lost in the gap.
        let mut rx = self.scan.subscribe();

        let token = self.report(self.scan.start(config, filter).await)?;
        *self.scan_token.write() = Some(token);
        self.session.mark_scanning();

        let handlers = self.handlers.clone();

        let handle = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(record) => {
                        handlers.log.emit(format!(
                            "Found device: {} | class: {} | rssi: {} | {}",
                            record.name,
                            record.class,
                            record.rssi,
                            if record.is_new_device { "new" } else { "known" },
                        ));
                        handlers.device_found.emit(record);
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        *self.found_pump.write() = Some(handle);

        Ok(())
    }

    /// Stop the current scan, if any.
    pub async fn stop_scan(&self) -> Result<()> {
        self.stop_found_pump();

        let token = self.scan_token.write().take();
        match token {
            Some(token) => self.report(self.scan.stop(token).await),
            None => Ok(()),
        }
    }

    /// Devices in the current scan snapshot.
    pub fn scanned_devices(&self) -> Vec<DeviceRecord> {
        self.scan.snapshot()
    }

    /// The device the session is connected to, if any.
    pub fn current_device(&self) -> Option<DeviceRecord> {
        self.session.current_device()
    }

    /// Current connection session state.
    pub fn session_state(&self) -> SessionState {
        self.session.state()
    }

    /// Connect to a device from the current scan snapshot.
    ///
    /// Fails fast with [`Error::DeviceNotFound`] if the id has not been
    /// discovered; the transport is not touched in that case.
    pub async fn connect(&self, device_id: &str) -> Result<()> {
        let record = match self.scan.get(device_id) {
            Some(record) => record,
            None => {
                return self.report(Err(Error::DeviceNotFound {
                    identifier: device_id.to_string(),
                }))
            }
        };

        self.stop_scan().await?;

        info!("Connecting to {} ({})", record.name, record.id);
        self.handlers
            .log
            .emit(format!("Connecting to {} | class: {}", record.name, record.class));

        self.report(
            self.session
                .connect(record, self.config.connect_timeout)
                .await,
        )?;

        self.start_notification_pump(device_id);

        self.handlers.log.emit("Connected, session ready".to_string());
        self.handlers.connected.emit(());

        Ok(())
    }

    /// Send a hexadecimal payload to the connected device.
    ///
    /// Writes through the first discovered write-capable characteristic,
    /// with no further prioritization.
    pub async fn send(&self, hex: &str) -> Result<()> {
        if !self.session.state().is_ready() {
            return self.report(Err(Error::Disconnected));
        }

        let data = match decode_hex(hex) {
            Ok(data) => data,
            Err(e) => return self.report(Err(e)),
        };

        let device = self
            .session
            .current_device()
            .ok_or(Error::Disconnected)?;

        let characteristic = match self.session.first_writable() {
            Some(characteristic) => characteristic,
            None => {
                return self.report(Err(Error::CharacteristicNotFound {
                    context: "no writable characteristic discovered".to_string(),
                }))
            }
        };

        self.handlers.log.emit(format!("Sending: {}", hex));

        self.report(
            self.transport
                .write(&device.id, characteristic.uuid, &data)
                .await,
        )
    }

    /// Tear down the connection.
    ///
    /// Cached state is always cleared and the disconnected event fires
    /// exactly once per call, regardless of the prior state.
    pub async fn disconnect(&self) -> Result<()> {
        self.stop_notification_pump();

        let result = self.session.disconnect().await;
        if let Err(e) = &result {
            self.handlers.error.emit(e.to_string());
        }

        self.handlers.log.emit("Disconnected".to_string());
        self.handlers.disconnected.emit(());

        result
    }

    /// Record a device id as known in the registry.
    ///
    /// This is never called automatically; whether a completed bind
    /// exchange makes a device "known" is the caller's decision.
    pub fn mark_device_known(&self, device_id: &str) {
        self.registry.mark_known(device_id);
    }

    // Spirometer convenience triggers. Each builds its payload through the
    // command protocol, then sends.

    /// Send the bind handshake.
    pub async fn bind(&self) -> Result<()> {
        self.build_and_send(DeviceCommand::Spirometer(SpirometerCommand::Bind))
            .await
    }

    /// Start an FVC test.
    pub async fn start_fvc(&self) -> Result<()> {
        self.build_and_send(DeviceCommand::Spirometer(SpirometerCommand::StartFvc))
            .await
    }

    /// Start a VC test.
    pub async fn start_vc(&self) -> Result<()> {
        self.build_and_send(DeviceCommand::Spirometer(SpirometerCommand::StartVc))
            .await
    }

    /// Start an MVV test.
    pub async fn start_mvv(&self) -> Result<()> {
        self.build_and_send(DeviceCommand::Spirometer(SpirometerCommand::StartMvv))
            .await
    }

    /// Stop a running FVC test.
    pub async fn stop_fvc(&self) -> Result<()> {
        self.build_and_send(DeviceCommand::Spirometer(SpirometerCommand::StopFvc))
            .await
    }

    /// Stop a running VC test.
    pub async fn stop_vc(&self) -> Result<()> {
        self.build_and_send(DeviceCommand::Spirometer(SpirometerCommand::StopVc))
            .await
    }

    /// Stop a running MVV test.
    pub async fn stop_mvv(&self) -> Result<()> {
        self.build_and_send(DeviceCommand::Spirometer(SpirometerCommand::StopMvv))
            .await
    }

    async fn build_and_send(&self, command: DeviceCommand) -> Result<()> {
        let device = match self.session.current_device() {
            Some(device) => device,
            None => return self.report(Err(Error::Disconnected)),
        };

        let builder = CommandBuilder::new(self.crypto.as_ref());
        let payload =
            self.report(builder.build(&command, device.is_new_device, self.config.key_index))?;

        self.handlers.log.emit(format!(
            "Built {} command for {} device",
            command.descriptor().name,
            if device.is_new_device { "new" } else { "known" },
        ));

        self.send(&payload).await
    }

    /// Pump notifications for the active connection into the data-received
    /// handler. Epoch-guarded so notifications for a torn-down session are
    /// dropped.
    fn start_notification_pump(&self, device_id: &str) {
        self.stop_notification_pump();

        let epoch = self.session.epoch();
        let device_id = device_id.to_string();
        let mut rx = self.transport.notifications();
        let session = self.session.clone();
        let handlers = self.handlers.clone();

        let handle = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(notification) => {
                        if notification.device_id != device_id {
                            continue;
                        }
                        if session.epoch() != epoch {
                            debug!("Dropping notification for stale session");
                            break;
                        }

                        let hex = encode_hex(&notification.data);
                        handlers.log.emit(format!("Received: {}", hex));
                        handlers.data_received.emit(hex);
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        *self.notification_pump.write() = Some(handle);
    }

    fn stop_notification_pump(&self) {
        if let Some(handle) = self.notification_pump.write().take() {
            handle.abort();
        }
    }

    fn stop_found_pump(&self) {
        if let Some(handle) = self.found_pump.write().take() {
            handle.abort();
        }
    }

    /// Surface an error through the error event before returning it.
    fn report<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            self.handlers.error.emit(e.to_string());
        }
        result
    }
}

impl Drop for DeviceManager {
    fn drop(&mut self) {
        self.stop_found_pump();
        self.stop_notification_pump();
    }
}
