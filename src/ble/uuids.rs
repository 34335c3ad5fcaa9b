//! BLE service and characteristic UUIDs per device class.
//!
//! Each device class maps to the service/characteristic set used during
//! discovery. Classes without a fixed profile get empty sets, which the
//! transport treats as "discover everything".

use uuid::Uuid;

use crate::device::DeviceClass;

// Spirometer GATT profile (16-bit UUIDs on the standard base)
/// Spirometer primary service UUID.
pub const SPIROMETER_SERVICE_UUID: Uuid = Uuid::from_u128(0x0000_1000_0000_1000_8000_00805f9b34fb);
/// Spirometer command characteristic UUID (write).
pub const SPIROMETER_WRITE_UUID: Uuid = Uuid::from_u128(0x0000_1001_0000_1000_8000_00805f9b34fb);
/// Spirometer data characteristic UUID (notify).
pub const SPIROMETER_NOTIFY_UUID: Uuid = Uuid::from_u128(0x0000_1002_0000_1000_8000_00805f9b34fb);

/// Service UUIDs to discover for a device class.
pub fn service_uuids(class: DeviceClass) -> Vec<Uuid> {
    match class {
        DeviceClass::Spirometer => vec![SPIROMETER_SERVICE_UUID],
        DeviceClass::Oximeter | DeviceClass::Thermometer | DeviceClass::Unknown => Vec::new(),
    }
}

/// Characteristic UUIDs to discover for a device class.
pub fn characteristic_uuids(class: DeviceClass) -> Vec<Uuid> {
    match class {
        DeviceClass::Spirometer => vec![SPIROMETER_WRITE_UUID, SPIROMETER_NOTIFY_UUID],
        DeviceClass::Oximeter | DeviceClass::Thermometer | DeviceClass::Unknown => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spirometer_uuids_short_form() {
        assert!(SPIROMETER_SERVICE_UUID.to_string().contains("1000"));
        assert!(SPIROMETER_WRITE_UUID.to_string().contains("1001"));
        assert!(SPIROMETER_NOTIFY_UUID.to_string().contains("1002"));
    }

    #[test]
    fn test_spirometer_profile() {
        assert_eq!(
            service_uuids(DeviceClass::Spirometer),
            vec![SPIROMETER_SERVICE_UUID]
        );
        assert_eq!(
            characteristic_uuids(DeviceClass::Spirometer),
            vec![SPIROMETER_WRITE_UUID, SPIROMETER_NOTIFY_UUID]
        );
    }

    #[test]
    fn test_unprofiled_classes_are_unrestricted() {
        for class in [
            DeviceClass::Oximeter,
            DeviceClass::Thermometer,
            DeviceClass::Unknown,
        ] {
            assert!(service_uuids(class).is_empty());
            assert!(characteristic_uuids(class).is_empty());
        }
    }
}
