//! Event callback slots.
//!
//! The facade exposes one handler slot per event kind. Registering a new
//! handler displaces the previous one; this latest-registration-wins
//! behavior is an explicit part of the contract, not a side effect.

use parking_lot::Mutex;
use std::sync::Arc;

use crate::device::DeviceRecord;

/// A single-occupancy callback slot.
pub(crate) struct HandlerSlot<T> {
    handler: Mutex<Option<Arc<dyn Fn(T) + Send + Sync>>>,
}

impl<T> HandlerSlot<T> {
    fn new() -> Self {
        Self {
            handler: Mutex::new(None),
        }
    }

    /// Install a handler, displacing any previous one.
    pub(crate) fn set<F>(&self, handler: F)
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        *self.handler.lock() = Some(Arc::new(handler));
    }

    /// Invoke the current handler, if any.
    ///
    /// The slot lock is released before the handler runs, so a handler may
    /// re-register on its own slot or call back into the facade.
    pub(crate) fn emit(&self, value: T) {
        let handler = self.handler.lock().clone();
        if let Some(handler) = handler {
            handler(value);
        }
    }
}

/// The facade's event surface: one slot per event kind.
pub(crate) struct EventHandlers {
    /// A device passed the active filter during a scan.
    pub(crate) device_found: HandlerSlot<DeviceRecord>,
    /// The connection session reached Ready.
    pub(crate) connected: HandlerSlot<()>,
    /// A notification arrived from the connected device (hex string).
    pub(crate) data_received: HandlerSlot<String>,
    /// An error surfaced from the transport or a collaborator.
    pub(crate) error: HandlerSlot<String>,
    /// The connection was torn down.
    pub(crate) disconnected: HandlerSlot<()>,
    /// Diagnostic message.
    pub(crate) log: HandlerSlot<String>,
}

impl EventHandlers {
    pub(crate) fn new() -> Self {
        Self {
            device_found: HandlerSlot::new(),
            connected: HandlerSlot::new(),
            data_received: HandlerSlot::new(),
            error: HandlerSlot::new(),
            disconnected: HandlerSlot::new(),
            log: HandlerSlot::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_emit_without_handler_is_noop() {
        let slot: HandlerSlot<String> = HandlerSlot::new();
        slot.emit("ignored".to_string());
    }

    #[test]
    fn test_latest_registration_wins() {
        let slot: HandlerSlot<u32> = HandlerSlot::new();
        let first = Arc::new(AtomicU32::new(0));
        let second = Arc::new(AtomicU32::new(0));

        let sink = first.clone();
        slot.set(move |v| sink.store(v, Ordering::SeqCst));

        let sink = second.clone();
        slot.set(move |v| sink.store(v, Ordering::SeqCst));

        slot.emit(7);

        // Only the most recently registered handler fires.
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 7);
    }

    #[test]
    fn test_handler_may_reregister_during_emit() {
        let slot: Arc<HandlerSlot<u32>> = Arc::new(HandlerSlot::new());
        let original = Arc::new(AtomicU32::new(0));
        let replacement = Arc::new(AtomicU32::new(0));

        let reentrant_slot = slot.clone();
        let original_sink = original.clone();
        let replacement_sink = replacement.clone();
        slot.set(move |v| {
            original_sink.store(v, Ordering::SeqCst);
            // Re-registering from inside the handler must not deadlock.
            let sink = replacement_sink.clone();
            reentrant_slot.set(move |v| sink.store(v, Ordering::SeqCst));
        });

        slot.emit(1);
        assert_eq!(original.load(Ordering::SeqCst), 1);

        slot.emit(2);
        assert_eq!(original.load(Ordering::SeqCst), 1);
        assert_eq!(replacement.load(Ordering::SeqCst), 2);
    }
}
