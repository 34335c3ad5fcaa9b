//! Error types for the vitals-ble crate.

use thiserror::Error;

/// The main error type for this crate.
#[derive(Error, Debug)]
pub enum Error {
    /// Bluetooth LE is not supported on this system.
    #[error("Bluetooth LE not supported on this system")]
    Unsupported,

    /// Bluetooth permission has not been granted.
    #[error("Bluetooth access not authorized")]
    Unauthorized,

    /// The Bluetooth radio is powered off.
    #[error("Bluetooth is powered off")]
    PoweredOff,

    /// An operation exceeded its deadline.
    #[error("Operation timed out")]
    Timeout,

    /// Operation requires an active connection but none exists.
    #[error("Device not connected")]
    Disconnected,

    /// An unclassified Bluetooth or collaborator failure.
    #[error("Unknown error: {0}")]
    Unknown(String),

    /// No matching characteristic was discovered on the device.
    #[error("Characteristic not found: {context}")]
    CharacteristicNotFound {
        /// What was being looked for.
        context: String,
    },

    /// A payload was malformed.
    #[error("Invalid data: {context}")]
    InvalidData {
        /// Description of what was invalid.
        context: String,
    },

    /// The crypto collaborator failed to encrypt a payload.
    #[error("Encryption failed: {reason}")]
    EncryptionFailed {
        /// Description from the crypto collaborator.
        reason: String,
    },

    /// The requested device id is not in the current scan snapshot.
    #[error("Device not found: {identifier}")]
    DeviceNotFound {
        /// The identifier that was searched for.
        identifier: String,
    },
}

impl From<btleplug::Error> for Error {
    fn from(e: btleplug::Error) -> Self {
        match e {
            btleplug::Error::PermissionDenied => Error::Unauthorized,
            btleplug::Error::NotConnected => Error::Disconnected,
            btleplug::Error::TimedOut(_) => Error::Timeout,
            btleplug::Error::NotSupported(_) => Error::Unsupported,
            other => Error::Unknown(other.to_string()),
        }
    }
}

/// A specialized Result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        assert_eq!(Error::Timeout.to_string(), "Operation timed out");
        assert_eq!(Error::Disconnected.to_string(), "Device not connected");
        let e = Error::DeviceNotFound {
            identifier: "abc".to_string(),
        };
        assert_eq!(e.to_string(), "Device not found: abc");
    }

    #[test]
    fn test_btleplug_error_mapping() {
        let e: Error = btleplug::Error::NotConnected.into();
        assert!(matches!(e, Error::Disconnected));

        let e: Error = btleplug::Error::PermissionDenied.into();
        assert!(matches!(e, Error::Unauthorized));
    }
}
