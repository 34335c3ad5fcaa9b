//! Command payload assembly.
//!
//! Turns a logical [`DeviceCommand`] into the final hexadecimal wire
//! payload: descriptor-specific assembly first (checksum/CRC framing), then
//! the encryption stage. Framing is always computed before encryption,
//! never after.

use tracing::debug;

use crate::crypto::CommandCrypto;
use crate::error::Result;
use crate::protocol::commands::{CommandDescriptor, DeviceCommand, SpirometerCommand};
use crate::utils::current_hex_time;

/// Fixed header for the new-device bind command.
pub const BIND_NEW_DEVICE_HEADER: &str = "88dd1e00000000000000000000000000000000";

/// Prefix for the known-device bind command, followed by the encoded
/// current time.
pub const BIND_KNOWN_DEVICE_PREFIX: &str = "e200";

/// Builds wire payloads for device commands.
pub struct CommandBuilder<'a> {
    crypto: &'a dyn CommandCrypto,
}

impl<'a> CommandBuilder<'a> {
    /// Create a builder over the given crypto collaborator.
    pub fn new(crypto: &'a dyn CommandCrypto) -> Self {
        Self { crypto }
    }

    /// Build the final wire payload for a command.
    pub fn build(
        &self,
        command: &DeviceCommand,
        is_new_device: bool,
        key_index: usize,
    ) -> Result<String> {
        let payload = match command {
            DeviceCommand::Spirometer(command) => {
                self.build_spirometer(*command, is_new_device, key_index)?
            }
        };

        debug!(
            "Built {} payload ({} hex chars)",
            command.descriptor().name,
            payload.len()
        );

        Ok(payload)
    }

    /// Build the bind command using the current local time for known
    /// devices.
    pub fn build_bind(&self, is_new_device: bool, key_index: usize) -> Result<String> {
        self.build_bind_at(is_new_device, key_index, &current_hex_time())
    }

    /// Build the bind command with an explicit time encoding.
    ///
    /// New devices get the fixed header plus its CRC; known devices get the
    /// prefix, the encoded time, and a terminator over the combined string.
    /// The assembled payload then passes through the encryption stage.
    pub fn build_bind_at(
        &self,
        is_new_device: bool,
        key_index: usize,
        hex_time: &str,
    ) -> Result<String> {
        let assembled = if is_new_device {
            format!(
                "{}{}",
                BIND_NEW_DEVICE_HEADER,
                self.crypto.crc(BIND_NEW_DEVICE_HEADER)
            )
        } else {
            let info = format!("{}{}", BIND_KNOWN_DEVICE_PREFIX, hex_time);
            let terminator = self.crypto.checksum_terminator(&info);
            format!("{}{}", info, terminator)
        };

        self.encrypt_stage(
            &assembled,
            &SpirometerCommand::Bind.descriptor(),
            is_new_device,
            key_index,
        )
    }

    fn build_spirometer(
        &self,
        command: SpirometerCommand,
        is_new_device: bool,
        key_index: usize,
    ) -> Result<String> {
        let descriptor = command.descriptor();

        if command == SpirometerCommand::Bind {
            return self.build_bind(is_new_device, key_index);
        }

        // Start/stop commands skip the encryption stage even though their
        // descriptors declare requires_encryption; see DESIGN.md.
        if command.is_start() {
            let raw = descriptor.raw_payload;
            let terminator = self.crypto.checksum_terminator(raw);
            Ok(format!("{}{}", raw, terminator))
        } else {
            // Stop payloads already end with their checksum byte.
            Ok(descriptor.raw_payload.to_string())
        }
    }

    /// Apply the encryption stage to an assembled payload.
    ///
    /// Known devices are never encrypted. New devices either select a pool
    /// key by index (payload zero-padded by the collaborator) or, for
    /// fixed-key commands, get a CRC over the assembled payload appended
    /// before encryption.
    fn encrypt_stage(
        &self,
        assembled: &str,
        descriptor: &CommandDescriptor,
        is_new_device: bool,
        key_index: usize,
    ) -> Result<String> {
        if !descriptor.requires_encryption || !is_new_device {
            return Ok(assembled.to_string());
        }

        if descriptor.uses_key_pool {
            self.crypto.encrypt_with_pool_key(assembled, key_index)
        } else {
            let framed = format!("{}{}", assembled, self.crypto.crc(assembled));
            self.crypto.encrypt_with_fixed_key(&framed)
        }
    }
}
