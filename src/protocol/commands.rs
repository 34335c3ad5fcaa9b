//! Device command catalogues.
//!
//! Each device class with a wire protocol gets a closed command enum; the
//! [`DeviceCommand`] sum type keys dispatch by device class so command
//! building is an exhaustive match rather than runtime type inspection.

use crate::device::DeviceClass;

/// Static description of a command: its name, raw payload template, and
/// encryption requirements. One fixed catalogue exists per device class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandDescriptor {
    /// Human-readable command name.
    pub name: &'static str,
    /// Raw hex payload template; empty when computed at build time.
    pub raw_payload: &'static str,
    /// Whether the encryption stage applies to this command.
    pub requires_encryption: bool,
    /// Whether new-device encryption selects a key from the pool
    /// (otherwise the single fixed key is used).
    pub uses_key_pool: bool,
}

/// Commands understood by spirometer devices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpirometerCommand {
    /// Bind handshake; payload is computed at build time.
    Bind,
    /// Start an FVC test.
    StartFvc,
    /// Start a VC test.
    StartVc,
    /// Start an MVV test.
    StartMvv,
    /// Stop a running FVC test.
    StopFvc,
    /// Stop a running VC test.
    StopVc,
    /// Stop a running MVV test.
    StopMvv,
}

impl SpirometerCommand {
    /// The fixed descriptor for this command.
    ///
    /// Every spirometer command declares `requires_encryption`; only Bind
    /// uses the fixed key instead of the key pool. Stop payloads already
    /// carry their trailing checksum byte.
    pub fn descriptor(&self) -> CommandDescriptor {
        match self {
            Self::Bind => CommandDescriptor {
                name: "Bind",
                raw_payload: "",
                requires_encryption: true,
                uses_key_pool: false,
            },
            Self::StartFvc => CommandDescriptor {
                name: "StartFVC",
                raw_payload: "e2010101",
                requires_encryption: true,
                uses_key_pool: true,
            },
            Self::StartVc => CommandDescriptor {
                name: "StartVC",
                raw_payload: "e2010201",
                requires_encryption: true,
                uses_key_pool: true,
            },
            Self::StartMvv => CommandDescriptor {
                name: "StartMVV",
                raw_payload: "e2010301",
                requires_encryption: true,
                uses_key_pool: true,
            },
            Self::StopFvc => CommandDescriptor {
                name: "StopFVC",
                raw_payload: "e2010100e4",
                requires_encryption: true,
                uses_key_pool: true,
            },
            Self::StopVc => CommandDescriptor {
                name: "StopVC",
                raw_payload: "e2010200e5",
                requires_encryption: true,
                uses_key_pool: true,
            },
            Self::StopMvv => CommandDescriptor {
                name: "StopMVV",
                raw_payload: "e2010300e6",
                requires_encryption: true,
                uses_key_pool: true,
            },
        }
    }

    /// Whether this is a start-test command.
    pub fn is_start(&self) -> bool {
        matches!(self, Self::StartFvc | Self::StartVc | Self::StartMvv)
    }

    /// Whether this is a stop-test command.
    pub fn is_stop(&self) -> bool {
        matches!(self, Self::StopFvc | Self::StopVc | Self::StopMvv)
    }
}

/// A logical command, keyed by device class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceCommand {
    /// A spirometer command.
    Spirometer(SpirometerCommand),
}

impl DeviceCommand {
    /// The device class this command targets.
    pub fn device_class(&self) -> DeviceClass {
        match self {
            Self::Spirometer(_) => DeviceClass::Spirometer,
        }
    }

    /// The command's descriptor.
    pub fn descriptor(&self) -> CommandDescriptor {
        match self {
            Self::Spirometer(command) => command.descriptor(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_raw_payloads() {
        assert_eq!(SpirometerCommand::Bind.descriptor().raw_payload, "");
        assert_eq!(
            SpirometerCommand::StartFvc.descriptor().raw_payload,
            "e2010101"
        );
        assert_eq!(
            SpirometerCommand::StopMvv.descriptor().raw_payload,
            "e2010300e6"
        );
    }

    #[test]
    fn test_all_commands_declare_encryption() {
        for command in [
            SpirometerCommand::Bind,
            SpirometerCommand::StartFvc,
            SpirometerCommand::StartVc,
            SpirometerCommand::StartMvv,
            SpirometerCommand::StopFvc,
            SpirometerCommand::StopVc,
            SpirometerCommand::StopMvv,
        ] {
            assert!(command.descriptor().requires_encryption);
        }
    }

    #[test]
    fn test_only_bind_uses_fixed_key() {
        assert!(!SpirometerCommand::Bind.descriptor().uses_key_pool);
        assert!(SpirometerCommand::StartFvc.descriptor().uses_key_pool);
        assert!(SpirometerCommand::StopVc.descriptor().uses_key_pool);
    }

    #[test]
    fn test_start_stop_predicates() {
        assert!(SpirometerCommand::StartVc.is_start());
        assert!(!SpirometerCommand::StartVc.is_stop());
        assert!(SpirometerCommand::StopFvc.is_stop());
        assert!(!SpirometerCommand::Bind.is_start());
        assert!(!SpirometerCommand::Bind.is_stop());
    }

    #[test]
    fn test_device_command_class() {
        let command = DeviceCommand::Spirometer(SpirometerCommand::StartFvc);
        assert_eq!(command.device_class(), DeviceClass::Spirometer);
        assert_eq!(command.descriptor().name, "StartFVC");
    }
}
