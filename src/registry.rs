//! Persistent device registry seam.
//!
//! The registry decides whether a device id has previously completed a bind
//! exchange. The real store lives outside this crate; a device id that the
//! registry has never seen is treated as a new device.

use parking_lot::RwLock;
use std::collections::HashSet;

/// Knows which device ids have previously been bound.
pub trait DeviceRegistry: Send + Sync {
    /// Whether this id has been seen before. Absence means new device.
    fn is_known_device(&self, id: &str) -> bool;

    /// Record an id as known.
    ///
    /// The core never calls this on its own; whether a successful bind
    /// exchange should mark the device known is the caller's decision.
    fn mark_known(&self, id: &str);
}

/// In-memory registry backed by a [`HashSet`].
///
/// Suitable for processes that persist known ids elsewhere, and as the
/// registry double in tests.
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    known: RwLock<HashSet<String>>,
}

impl MemoryRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry pre-seeded with known ids.
    pub fn with_known<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            known: RwLock::new(ids.into_iter().map(Into::into).collect()),
        }
    }
}

impl DeviceRegistry for MemoryRegistry {
    fn is_known_device(&self, id: &str) -> bool {
        self.known.read().contains(id)
    }

    fn mark_known(&self, id: &str) {
        self.known.write().insert(id.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unseen_id_is_new() {
        let registry = MemoryRegistry::new();
        assert!(!registry.is_known_device("anything"));
    }

    #[test]
    fn test_mark_known() {
        let registry = MemoryRegistry::new();
        registry.mark_known("dev-1");
        assert!(registry.is_known_device("dev-1"));
        assert!(!registry.is_known_device("dev-2"));
    }

    #[test]
    fn test_with_known() {
        let registry = MemoryRegistry::with_known(["a", "b"]);
        assert!(registry.is_known_device("a"));
        assert!(registry.is_known_device("b"));
        assert!(!registry.is_known_device("c"));
    }
}
