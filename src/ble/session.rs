//! Connection session state machine.
//!
//! Owns the single active connection: drives connect, characteristic
//! discovery, and notification subscription. Exactly one session instance
//! exists per facade, and at most one connection may be live at a time.
//!
//! Every `connect`/`disconnect` bumps an epoch counter; async continuations
//! re-check the epoch after each await so that stale callbacks arriving
//! after a reset are dropped instead of mutating the wrong session.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::ble::transport::{CharacteristicInfo, Transport};
use crate::ble::uuids;
use crate::device::DeviceRecord;
use crate::error::{Error, Result};

/// State of the connection session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SessionState {
    /// No connection and no scan in progress.
    #[default]
    Idle,
    /// A scan is running; no connection yet.
    Scanning,
    /// Waiting for the transport's connected signal.
    Connecting,
    /// Connected; discovering services and characteristics.
    DiscoveringServices,
    /// Issuing notification subscriptions.
    SubscribingNotifications,
    /// Fully connected; characteristics discovered and subscriptions issued.
    Ready,
    /// A connection attempt or live connection failed.
    Failed,
}

impl SessionState {
    /// Whether `connect` is accepted in this state.
    pub fn can_connect(&self) -> bool {
        matches!(self, Self::Idle | Self::Failed | Self::Scanning)
    }

    /// Whether data can be sent.
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Scanning => write!(f, "Scanning"),
            Self::Connecting => write!(f, "Connecting"),
            Self::DiscoveringServices => write!(f, "DiscoveringServices"),
            Self::SubscribingNotifications => write!(f, "SubscribingNotifications"),
            Self::Ready => write!(f, "Ready"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

/// The single owned record of the active connection.
pub struct ConnectionSession {
    transport: Arc<dyn Transport>,
    state: RwLock<SessionState>,
    /// Device the session is connecting to or connected to.
    device: RwLock<Option<DeviceRecord>>,
    /// Characteristics discovered on the active connection.
    characteristics: RwLock<Vec<CharacteristicInfo>>,
    /// Bumped on every connect/disconnect; stale continuations drop out.
    epoch: AtomicU64,
}

impl ConnectionSession {
    /// Default connect timeout.
    pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

    /// Create a session over the given transport.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            state: RwLock::new(SessionState::Idle),
            device: RwLock::new(None),
            characteristics: RwLock::new(Vec::new()),
            epoch: AtomicU64::new(0),
        }
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        *self.state.read()
    }

    /// The active device, if any.
    pub fn current_device(&self) -> Option<DeviceRecord> {
        self.device.read().clone()
    }

    /// Characteristics discovered on the active connection.
    pub fn characteristics(&self) -> Vec<CharacteristicInfo> {
        self.characteristics.read().clone()
    }

    /// The first discovered write-capable characteristic, in discovery
    /// order. No further prioritization is applied.
    pub fn first_writable(&self) -> Option<CharacteristicInfo> {
        self.characteristics
            .read()
            .iter()
            .find(|c| c.properties.is_writable())
            .cloned()
    }

    /// Current epoch, for stale-callback detection by the owner.
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// Note that a scan started. Only moves out of Idle/Failed; an active
    /// connection is left alone.
    pub fn mark_scanning(&self) {
        let mut state = self.state.write();
        if matches!(*state, SessionState::Idle | SessionState::Failed) {
            debug!("Session state changed: {} -> Scanning", *state);
            *state = SessionState::Scanning;
        }
    }

    /// Connect to a device and drive the session to Ready.
    ///
    /// Rejected while a connection is being established or live; the
    /// transport layer does not guarantee this guard itself.
    pub async fn connect(&self, device: DeviceRecord, timeout: Duration) -> Result<()> {
        // Guard and transition under one write lock so two racing connects
        // cannot both pass the guard.
        {
            let mut state = self.state.write();
            if !state.can_connect() {
                return Err(Error::Unknown(format!(
                    "connect rejected: session is {}",
                    *state
                )));
            }
            debug!("Session state changed: {} -> Connecting", *state);
            *state = SessionState::Connecting;
        }

        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        let device_id = device.id.clone();
        let class = device.class;

        *self.device.write() = Some(device);
        self.characteristics.write().clear();

        info!("Connecting to {} (class {})", device_id, class);

        if let Err(e) = self.transport.connect(&device_id, timeout).await {
            return self.fail(epoch, e);
        }
        self.ensure_current(epoch)?;

        self.set_state(SessionState::DiscoveringServices);

        let services = uuids::service_uuids(class);
        let characteristics = uuids::characteristic_uuids(class);

        let discovered = match self
            .transport
            .discover_characteristics(&device_id, &services, &characteristics)
            .await
        {
            Ok(discovered) => discovered,
            Err(e) => return self.fail(epoch, e),
        };
        self.ensure_current(epoch)?;

        if discovered.is_empty() {
            return self.fail(
                epoch,
                Error::CharacteristicNotFound {
                    context: format!("no characteristics discovered for class {}", class),
                },
            );
        }

        info!("Discovered {} characteristics", discovered.len());
        *self.characteristics.write() = discovered.clone();

        self.set_state(SessionState::SubscribingNotifications);

        // Issuing the subscribe requests is sufficient to reach Ready;
        // acknowledgements are not awaited and failures are not fatal.
        for characteristic in discovered.iter().filter(|c| c.properties.notify) {
            if let Err(e) = self
                .transport
                .subscribe(&device_id, characteristic.uuid)
                .await
            {
                warn!("Subscribe failed for {}: {}", characteristic.uuid, e);
            }
            self.ensure_current(epoch)?;
        }

        self.set_state(SessionState::Ready);
        info!("Session ready for {}", device_id);

        Ok(())
    }

    /// Tear down the connection and return to Idle from any state.
    ///
    /// Connection-scoped fields are cleared unconditionally, even if the
    /// transport disconnect fails.
    pub async fn disconnect(&self) -> Result<()> {
        self.epoch.fetch_add(1, Ordering::SeqCst);

        let device = self.device.write().take();
        self.characteristics.write().clear();

        let result = match &device {
            Some(device) => {
                info!("Disconnecting from {}", device.id);
                self.transport.disconnect(&device.id).await
            }
            None => Ok(()),
        };

        self.set_state(SessionState::Idle);
        result
    }

    /// Fail the session for this epoch: clear connection-scoped fields and
    /// report the error. A stale epoch leaves state untouched.
    fn fail(&self, epoch: u64, error: Error) -> Result<()> {
        if self.epoch.load(Ordering::SeqCst) != epoch {
            debug!("Dropping failure from stale session epoch: {}", error);
            return Err(Error::Disconnected);
        }

        warn!("Session failed: {}", error);
        *self.device.write() = None;
        self.characteristics.write().clear();
        self.set_state(SessionState::Failed);
        Err(error)
    }

    /// Drop out if the session was reset while this continuation was
    /// suspended.
    fn ensure_current(&self, epoch: u64) -> Result<()> {
        if self.epoch.load(Ordering::SeqCst) != epoch {
            debug!("Dropping stale session continuation");
            return Err(Error::Disconnected);
        }
        Ok(())
    }

    fn set_state(&self, new_state: SessionState) {
        let mut state = self.state.write();
        if *state != new_state {
            debug!("Session state changed: {} -> {}", *state, new_state);
            *state = new_state;
        }
    }
}
