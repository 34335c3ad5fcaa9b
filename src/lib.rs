// Allow holding locks across await points - we use parking_lot which is designed for this
#![allow(clippy::await_holding_lock)]
// Allow unusual byte groupings for UUIDs which have standard format
#![allow(clippy::unusual_byte_groupings)]

//! # vitals-ble
//!
//! A cross-platform Rust library for integrating Bluetooth Low Energy
//! vitals devices (spirometers, oximeters, thermometers) into host
//! applications.
//!
//! The library scans and classifies nearby devices by advertised name,
//! manages a single active connection through an explicit session state
//! machine, and builds the per-device-class binary command payloads
//! (checksum/CRC framing plus keyed encryption for new devices). The
//! spirometer protocol is fully implemented; other classes are classified
//! during scanning and connect generically.
//!
//! ## Features
//!
//! - **Device Discovery**: Scan and classify devices by advertised name
//! - **Pluggable Filters**: Name, device-class, and composite scan filters
//! - **Session Management**: One active connection with explicit states
//! - **Command Protocol**: Bind handshake plus start/stop test commands
//! - **Event Surface**: Callbacks for discovery, data, errors, and logs
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use vitals_ble::{
//!     BtleplugTransport, CommandCrypto, DeviceManager, MemoryRegistry, Result,
//! };
//!
//! async fn run(crypto: Arc<dyn CommandCrypto>) -> Result<()> {
//!     let transport = Arc::new(BtleplugTransport::new().await?);
//!     let registry = Arc::new(MemoryRegistry::new());
//!     let manager = DeviceManager::new(transport, registry, crypto);
//!
//!     manager.on_device_found(|device| {
//!         println!("Found {} ({})", device.name, device.class);
//!     });
//!     manager.on_data_received(|hex| println!("Data: {}", hex));
//!
//!     manager.scan(true, None).await?;
//!     tokio::time::sleep(std::time::Duration::from_secs(5)).await;
//!
//!     if let Some(device) = manager.scanned_devices().first() {
//!         manager.connect(&device.id).await?;
//!         manager.bind().await?;
//!         manager.start_fvc().await?;
//!     }
//!
//!     manager.disconnect().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Platform Notes
//!
//! ### macOS
//! Requires Bluetooth permission. Add `NSBluetoothAlwaysUsageDescription`
//! to your Info.plist for bundled apps.
//!
//! ### Linux
//! Requires BlueZ. User may need to be in the `bluetooth` group.
//!
//! ### Windows
//! Requires Windows 10 or later with Bluetooth LE support.
//!
//! ## Feature Flags
//!
//! - `serde`: Enable serialization/deserialization for data types

// Public modules
pub mod ble;
pub mod crypto;
pub mod device;
pub mod device_manager;
pub mod error;
pub mod filter;
pub mod protocol;
pub mod registry;
pub mod utils;

mod event;

// Re-exports for convenience
pub use crypto::CommandCrypto;
pub use device::{DeviceClass, DeviceRecord};
pub use device_manager::{DeviceManager, ManagerConfig};
pub use error::{Error, Result};
pub use registry::{DeviceRegistry, MemoryRegistry};
pub use utils::{decode_hex, encode_hex};

// Re-export commonly used types from submodules
pub use ble::btleplug_transport::BtleplugTransport;
pub use ble::session::SessionState;
pub use ble::transport::{
    Advertisement, CharacteristicInfo, CharacteristicProperties, Notification, ScanConfig,
    Transport,
};
pub use filter::{
    AdvertisedMetadata, CompositeFilter, DeviceClassFilter, DeviceFilter, FilterLogic, NameFilter,
    SignalStrengthFilter,
};
pub use protocol::{CommandBuilder, CommandDescriptor, DeviceCommand, SpirometerCommand};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_exports() {
        // Verify that key types are exported
        let _ = std::any::TypeId::of::<DeviceManager>();
        let _ = std::any::TypeId::of::<DeviceRecord>();
        let _ = std::any::TypeId::of::<DeviceClass>();
        let _ = std::any::TypeId::of::<Error>();
        let _ = std::any::TypeId::of::<SessionState>();
        let _ = std::any::TypeId::of::<SpirometerCommand>();
        let _ = std::any::TypeId::of::<NameFilter>();
    }

    #[test]
    fn test_hex_helpers() {
        assert_eq!(encode_hex(&[0xe2, 0x01]), "e201");
        assert_eq!(decode_hex("e201").unwrap(), vec![0xe2, 0x01]);
    }
}
