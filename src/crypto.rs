//! Crypto and framing collaborator seam.
//!
//! Checksum/CRC framing and keyed encryption are supplied from outside this
//! crate. All functions operate on hexadecimal strings, matching the wire
//! representation used by the command protocol. Framing is always computed
//! before encryption, never after.

use crate::error::Result;

/// Checksum, CRC, and keyed-encryption primitives used by the command
/// protocol.
pub trait CommandCrypto: Send + Sync {
    /// Compute the terminator/checksum trailer for a hex payload.
    fn checksum_terminator(&self, hex: &str) -> String;

    /// Compute the CRC trailer for a hex payload.
    fn crc(&self, hex: &str) -> String;

    /// Encrypt a hex payload with the pool key at `key_index`.
    ///
    /// Implementations zero-pad the payload to the cipher block size.
    /// Failures surface as [`crate::Error::EncryptionFailed`].
    fn encrypt_with_pool_key(&self, hex: &str, key_index: usize) -> Result<String>;

    /// Encrypt a hex payload with the single fixed key.
    fn encrypt_with_fixed_key(&self, hex: &str) -> Result<String>;
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::utils::decode_hex;

    /// Deterministic crypto double. Terminator and CRC are additive
    /// checksums; "encryption" prepends a recognizable hex marker so tests
    /// can assert which path a payload took while keeping output valid hex.
    pub(crate) struct TestCrypto;

    impl CommandCrypto for TestCrypto {
        fn checksum_terminator(&self, hex: &str) -> String {
            let sum: u32 = decode_hex(hex)
                .unwrap_or_default()
                .iter()
                .map(|&b| b as u32)
                .sum();
            format!("{:02x}", sum % 256)
        }

        fn crc(&self, hex: &str) -> String {
            let sum: u32 = decode_hex(hex)
                .unwrap_or_default()
                .iter()
                .map(|&b| b as u32)
                .sum();
            format!("{:04x}", (sum * 31) % 0x1_0000)
        }

        fn encrypt_with_pool_key(&self, hex: &str, key_index: usize) -> Result<String> {
            Ok(format!("bb{:02x}{}", key_index % 256, hex))
        }

        fn encrypt_with_fixed_key(&self, hex: &str) -> Result<String> {
            Ok(format!("aa{}", hex))
        }
    }
}
