//! Device classification and the discovered-device record.
//!
//! A device's capability class is inferred from its advertised name; whether
//! it is a new or known device comes from the external [`DeviceRegistry`].

use crate::registry::DeviceRegistry;

/// Coarse capability class of a vitals device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DeviceClass {
    /// Lung-function (spirometry) device.
    Spirometer,
    /// Pulse oximeter.
    Oximeter,
    /// Thermometer.
    Thermometer,
    /// Anything we cannot classify.
    #[default]
    Unknown,
}

impl DeviceClass {
    /// Infer a device class from an advertised name.
    ///
    /// Rules are checked in order, case-insensitively; the first match wins:
    /// "spir"/"fvc" → Spirometer, "ox"/"spo2" → Oximeter, "temp"/"therm" →
    /// Thermometer, otherwise Unknown.
    pub fn infer(name: &str) -> Self {
        let name = name.to_lowercase();

        if name.contains("spir") || name.contains("fvc") {
            Self::Spirometer
        } else if name.contains("ox") || name.contains("spo2") {
            Self::Oximeter
        } else if name.contains("temp") || name.contains("therm") {
            Self::Thermometer
        } else {
            Self::Unknown
        }
    }
}

impl std::fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Spirometer => write!(f, "Spirometer"),
            Self::Oximeter => write!(f, "Oximeter"),
            Self::Thermometer => write!(f, "Thermometer"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

/// A device discovered during a scan session.
///
/// Records are immutable once constructed; a re-report of the same id during
/// a scan replaces the whole record. Identity is `id`.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DeviceRecord {
    /// Opaque stable identifier from the transport.
    pub id: String,
    /// Advertised display name.
    pub name: String,
    /// Signal strength in dBm; [`Self::UNKNOWN_RSSI`] when no reading was
    /// reported.
    pub rssi: i16,
    /// Hardware (MAC) address, where the platform exposes one.
    pub address: Option<String>,
    /// Inferred capability class.
    pub class: DeviceClass,
    /// Whether the registry has never seen this id before.
    pub is_new_device: bool,
    /// Whether the platform reported this device as already connected.
    pub is_already_connected: bool,
}

impl DeviceRecord {
    /// Sentinel RSSI value the platform uses for already-connected devices.
    pub const CONNECTED_RSSI_SENTINEL: i16 = 0;

    /// RSSI value recorded when the platform reported no signal reading.
    /// Distinct from the connected sentinel, which is set deliberately.
    pub const UNKNOWN_RSSI: i16 = i16::MIN;

    /// Build a record from advertised data, classifying the name and
    /// consulting the registry for novelty.
    pub fn from_advertisement(
        id: String,
        name: Option<String>,
        rssi: i16,
        address: Option<String>,
        registry: &dyn DeviceRegistry,
    ) -> Self {
        let name = name.unwrap_or_else(|| "Unknown".to_string());
        let class = DeviceClass::infer(&name);
        let is_new_device = !registry.is_known_device(&id);

        Self {
            id,
            name,
            rssi,
            address,
            class,
            is_new_device,
            is_already_connected: rssi == Self::CONNECTED_RSSI_SENTINEL,
        }
    }
}

impl PartialEq for DeviceRecord {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for DeviceRecord {}

impl std::hash::Hash for DeviceRecord {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::MemoryRegistry;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[test]
    fn test_infer_spirometer() {
        assert_eq!(DeviceClass::infer("MySpiroDevice123"), DeviceClass::Spirometer);
        assert_eq!(DeviceClass::infer("FVC-200"), DeviceClass::Spirometer);
        assert_eq!(DeviceClass::infer("SPIRO"), DeviceClass::Spirometer);
    }

    #[test]
    fn test_infer_oximeter() {
        assert_eq!(DeviceClass::infer("PulseOx 5"), DeviceClass::Oximeter);
        assert_eq!(DeviceClass::infer("SpO2-Monitor"), DeviceClass::Oximeter);
    }

    #[test]
    fn test_infer_thermometer() {
        assert_eq!(DeviceClass::infer("TempSense"), DeviceClass::Thermometer);
        assert_eq!(DeviceClass::infer("MyTHERMO"), DeviceClass::Thermometer);
    }

    #[test]
    fn test_infer_unknown() {
        assert_eq!(DeviceClass::infer(""), DeviceClass::Unknown);
        assert_eq!(DeviceClass::infer("Air Smart Extra"), DeviceClass::Unknown);
    }

    #[test]
    fn test_infer_order_first_rule_wins() {
        // Matches both "spir" and "ox"; the spirometer rule is checked first.
        assert_eq!(DeviceClass::infer("spirox"), DeviceClass::Spirometer);
        // Matches both "ox" and "therm"; the oximeter rule is checked first.
        assert_eq!(DeviceClass::infer("oxytherm"), DeviceClass::Oximeter);
    }

    proptest! {
        #[test]
        fn prop_name_containing_fvc_is_spirometer(prefix in "[a-zA-Z0-9]{0,8}", suffix in "[a-zA-Z0-9]{0,8}") {
            let name = format!("{}fvc{}", prefix, suffix);
            prop_assert_eq!(DeviceClass::infer(&name), DeviceClass::Spirometer);
        }

        #[test]
        fn prop_classification_is_total(name in ".{0,32}") {
            // Never panics, always lands in one of the four classes.
            let _ = DeviceClass::infer(&name);
        }
    }

    #[test]
    fn test_record_from_advertisement() {
        let registry = MemoryRegistry::new();
        registry.mark_known("known-id");

        let record = DeviceRecord::from_advertisement(
            "known-id".to_string(),
            Some("FVC-200".to_string()),
            -60,
            None,
            &registry,
        );
        assert_eq!(record.class, DeviceClass::Spirometer);
        assert!(!record.is_new_device);
        assert!(!record.is_already_connected);

        let record = DeviceRecord::from_advertisement(
            "fresh-id".to_string(),
            None,
            DeviceRecord::CONNECTED_RSSI_SENTINEL,
            None,
            &registry,
        );
        assert_eq!(record.name, "Unknown");
        assert!(record.is_new_device);
        assert!(record.is_already_connected);
    }

    #[test]
    fn test_record_identity_is_id() {
        let registry = MemoryRegistry::new();
        let a = DeviceRecord::from_advertisement(
            "same".to_string(),
            Some("FVC-200".to_string()),
            -60,
            None,
            &registry,
        );
        let b = DeviceRecord::from_advertisement(
            "same".to_string(),
            Some("other name".to_string()),
            -90,
            None,
            &registry,
        );
        assert_eq!(a, b);
    }
}
