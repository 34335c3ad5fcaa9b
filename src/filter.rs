//! Scan filters.
//!
//! Filters are pure predicates over a device's advertised metadata,
//! evaluated once per discovered device. They never consult the registry
//! and never mutate device state. The composite filter combines
//! sub-filters with AND/OR logic.

use parking_lot::RwLock;
use std::sync::Arc;

use crate::device::DeviceClass;

/// Default target name for the name filter.
const DEFAULT_TARGET_NAME: &str = "Air Smart Extra";

/// The static metadata a filter can see for a discovered device.
///
/// Deliberately excludes the transient RSSI value, which is only available
/// in the scan callback itself.
#[derive(Debug, Clone, Default)]
pub struct AdvertisedMetadata {
    /// Advertised local name, if any.
    pub name: Option<String>,
}

impl AdvertisedMetadata {
    /// Metadata carrying just a name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
        }
    }
}

/// A device filter predicate.
pub trait DeviceFilter: Send + Sync {
    /// Whether a device with this metadata should be included.
    fn matches(&self, meta: &AdvertisedMetadata) -> bool;

    /// Human-readable description, for diagnostics.
    fn describe(&self) -> String;
}

/// Accepts devices whose advertised name contains any configured target
/// substring. Devices without a name never match.
#[derive(Debug)]
pub struct NameFilter {
    targets: RwLock<Vec<String>>,
}

impl NameFilter {
    /// Create a filter with the default target name.
    pub fn new() -> Self {
        Self {
            targets: RwLock::new(vec![DEFAULT_TARGET_NAME.to_string()]),
        }
    }

    /// Create a filter with explicit target names.
    pub fn with_targets<I, S>(targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            targets: RwLock::new(targets.into_iter().map(Into::into).collect()),
        }
    }

    /// Add a target name if not already present.
    pub fn add_target(&self, name: impl Into<String>) {
        let name = name.into();
        let mut targets = self.targets.write();
        if !targets.contains(&name) {
            targets.push(name);
        }
    }

    /// Remove a target name.
    pub fn remove_target(&self, name: &str) {
        self.targets.write().retain(|t| t != name);
    }

    /// Replace the target name list.
    pub fn set_targets<I, S>(&self, targets: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        *self.targets.write() = targets.into_iter().map(Into::into).collect();
    }

    /// Current target names.
    pub fn targets(&self) -> Vec<String> {
        self.targets.read().clone()
    }
}

impl Default for NameFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceFilter for NameFilter {
    fn matches(&self, meta: &AdvertisedMetadata) -> bool {
        let name = match &meta.name {
            Some(name) => name,
            None => return false,
        };

        self.targets.read().iter().any(|t| name.contains(t.as_str()))
    }

    fn describe(&self) -> String {
        format!("NameFilter({})", self.targets.read().join(", "))
    }
}

/// Accepts devices whose inferred class is in the configured set.
#[derive(Debug)]
pub struct DeviceClassFilter {
    classes: Vec<DeviceClass>,
}

impl DeviceClassFilter {
    /// Create a filter for the given classes.
    pub fn new(classes: Vec<DeviceClass>) -> Self {
        Self { classes }
    }
}

impl DeviceFilter for DeviceClassFilter {
    fn matches(&self, meta: &AdvertisedMetadata) -> bool {
        let name = match &meta.name {
            Some(name) => name,
            None => return false,
        };

        self.classes.contains(&DeviceClass::infer(name))
    }

    fn describe(&self) -> String {
        let classes: Vec<String> = self.classes.iter().map(|c| c.to_string()).collect();
        format!("DeviceClassFilter({})", classes.join(", "))
    }
}

/// Carries a minimum-RSSI threshold but cannot enforce it.
///
/// The transient signal value is not part of [`AdvertisedMetadata`], so
/// `matches` always returns true; real signal filtering has to happen in
/// the scan callback, where the RSSI is in hand. The threshold is exposed
/// so callers can apply it there.
#[derive(Debug)]
pub struct SignalStrengthFilter {
    minimum_rssi: i16,
}

impl SignalStrengthFilter {
    /// Default minimum signal strength in dBm.
    pub const DEFAULT_MINIMUM_RSSI: i16 = -80;

    /// Create a filter with the given minimum RSSI.
    pub fn new(minimum_rssi: i16) -> Self {
        Self { minimum_rssi }
    }

    /// The configured threshold, for use in scan callbacks.
    pub fn minimum_rssi(&self) -> i16 {
        self.minimum_rssi
    }
}

impl Default for SignalStrengthFilter {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MINIMUM_RSSI)
    }
}

impl DeviceFilter for SignalStrengthFilter {
    fn matches(&self, _meta: &AdvertisedMetadata) -> bool {
        // RSSI is not visible here; see the type-level docs.
        true
    }

    fn describe(&self) -> String {
        format!("SignalStrengthFilter(min: {})", self.minimum_rssi)
    }
}

/// Combination mode for [`CompositeFilter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterLogic {
    /// All sub-filters must pass. Vacuously true for an empty list.
    And,
    /// Any sub-filter must pass. Vacuously false for an empty list.
    Or,
}

/// Combines sub-filters with AND/OR logic.
pub struct CompositeFilter {
    filters: Vec<Arc<dyn DeviceFilter>>,
    logic: FilterLogic,
}

impl CompositeFilter {
    /// Create a composite over the given sub-filters.
    pub fn new(filters: Vec<Arc<dyn DeviceFilter>>, logic: FilterLogic) -> Self {
        Self { filters, logic }
    }
}

impl DeviceFilter for CompositeFilter {
    fn matches(&self, meta: &AdvertisedMetadata) -> bool {
        match self.logic {
            FilterLogic::And => self.filters.iter().all(|f| f.matches(meta)),
            FilterLogic::Or => self.filters.iter().any(|f| f.matches(meta)),
        }
    }

    fn describe(&self) -> String {
        let logic = match self.logic {
            FilterLogic::And => "AND",
            FilterLogic::Or => "OR",
        };
        let names: Vec<String> = self.filters.iter().map(|f| f.describe()).collect();
        format!("CompositeFilter({}: [{}])", logic, names.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    /// A filter with a fixed verdict.
    struct FixedFilter(bool);

    impl DeviceFilter for FixedFilter {
        fn matches(&self, _meta: &AdvertisedMetadata) -> bool {
            self.0
        }

        fn describe(&self) -> String {
            format!("FixedFilter({})", self.0)
        }
    }

    #[test]
    fn test_name_filter_default_target() {
        let filter = NameFilter::new();
        assert!(filter.matches(&AdvertisedMetadata::named("Air Smart Extra Pro")));
        assert!(!filter.matches(&AdvertisedMetadata::named("FVC-200")));
        assert!(!filter.matches(&AdvertisedMetadata::default()));
    }

    #[test]
    fn test_name_filter_mutable_targets() {
        let filter = NameFilter::new();
        filter.add_target("FVC");
        assert!(filter.matches(&AdvertisedMetadata::named("FVC-200")));

        filter.remove_target("FVC");
        assert!(!filter.matches(&AdvertisedMetadata::named("FVC-200")));

        filter.set_targets(["Spiro"]);
        assert_eq!(filter.targets(), vec!["Spiro".to_string()]);
        assert!(filter.matches(&AdvertisedMetadata::named("MySpiro")));
        assert!(!filter.matches(&AdvertisedMetadata::named("Air Smart Extra")));
    }

    #[test]
    fn test_name_filter_add_target_deduplicates() {
        let filter = NameFilter::with_targets(["A"]);
        filter.add_target("A");
        assert_eq!(filter.targets(), vec!["A".to_string()]);
    }

    #[test]
    fn test_device_class_filter() {
        let filter = DeviceClassFilter::new(vec![DeviceClass::Spirometer, DeviceClass::Oximeter]);
        assert!(filter.matches(&AdvertisedMetadata::named("FVC-200")));
        assert!(filter.matches(&AdvertisedMetadata::named("PulseOx")));
        assert!(!filter.matches(&AdvertisedMetadata::named("TempSense")));
        assert!(!filter.matches(&AdvertisedMetadata::default()));
    }

    #[test]
    fn test_signal_filter_is_structural_placeholder() {
        let filter = SignalStrengthFilter::new(-60);
        // Passes everything; the threshold is only advisory.
        assert!(filter.matches(&AdvertisedMetadata::default()));
        assert!(filter.matches(&AdvertisedMetadata::named("anything")));
        assert_eq!(filter.minimum_rssi(), -60);
    }

    #[test]
    fn test_composite_and_or() {
        let mixed: Vec<Arc<dyn DeviceFilter>> =
            vec![Arc::new(FixedFilter(true)), Arc::new(FixedFilter(false))];
        let meta = AdvertisedMetadata::default();

        let and = CompositeFilter::new(mixed.clone(), FilterLogic::And);
        assert!(!and.matches(&meta));

        let or = CompositeFilter::new(mixed, FilterLogic::Or);
        assert!(or.matches(&meta));
    }

    #[test]
    fn test_composite_vacuous_cases() {
        let meta = AdvertisedMetadata::default();

        let and = CompositeFilter::new(vec![], FilterLogic::And);
        assert!(and.matches(&meta));

        let or = CompositeFilter::new(vec![], FilterLogic::Or);
        assert!(!or.matches(&meta));
    }

    #[test]
    fn test_describe() {
        let filter = CompositeFilter::new(
            vec![Arc::new(NameFilter::new()), Arc::new(SignalStrengthFilter::default())],
            FilterLogic::And,
        );
        let description = filter.describe();
        assert!(description.starts_with("CompositeFilter(AND:"));
        assert!(description.contains("NameFilter(Air Smart Extra)"));
        assert!(description.contains("SignalStrengthFilter(min: -80)"));
    }
}
