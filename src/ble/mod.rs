//! BLE communication module.
//!
//! Transport seam, concrete btleplug adapter, scan session, connection
//! session, and the per-class GATT profiles.

pub mod btleplug_transport;
pub mod scanner;
pub mod session;
pub mod transport;
pub mod uuids;

pub use btleplug_transport::BtleplugTransport;
pub use scanner::{ScanSession, ScanToken};
pub use session::{ConnectionSession, SessionState};
pub use transport::{
    Advertisement, CharacteristicInfo, CharacteristicProperties, Notification, ScanConfig,
    Transport,
};
pub use uuids::*;
