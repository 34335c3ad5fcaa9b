//! Utility functions for the vitals-ble crate.

use chrono::{Datelike, Local, Timelike};

use crate::error::{Error, Result};

/// Encode bytes as a lowercase hexadecimal string.
///
/// # Example
///
/// ```
/// use vitals_ble::utils::encode_hex;
///
/// assert_eq!(encode_hex(&[0xe2, 0x01, 0x01, 0x01]), "e2010101");
/// ```
pub fn encode_hex(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len() * 2);
    for byte in data {
        out.push_str(&format!("{:02x}", byte));
    }
    out
}

/// Decode a hexadecimal string into bytes.
///
/// Accepts upper- and lowercase digits. Returns `Error::InvalidData` for
/// odd-length input or non-hex characters.
///
/// # Example
///
/// ```
/// use vitals_ble::utils::decode_hex;
///
/// assert_eq!(decode_hex("E2010101").unwrap(), vec![0xe2, 0x01, 0x01, 0x01]);
/// assert!(decode_hex("12G4").is_err());
/// ```
pub fn decode_hex(hex: &str) -> Result<Vec<u8>> {
    if hex.len() % 2 != 0 {
        return Err(Error::InvalidData {
            context: format!("odd-length hex string ({} chars)", hex.len()),
        });
    }

    // Work on raw bytes; indexing the str would panic on multi-byte input.
    hex.as_bytes()
        .chunks_exact(2)
        .map(|pair| {
            let hi = hex_nibble(pair[0]);
            let lo = hex_nibble(pair[1]);
            match (hi, lo) {
                (Some(hi), Some(lo)) => Ok(hi << 4 | lo),
                _ => Err(Error::InvalidData {
                    context: format!(
                        "non-hex characters in {:?}",
                        String::from_utf8_lossy(pair)
                    ),
                }),
            }
        })
        .collect()
}

fn hex_nibble(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}

/// Encode the current local time as a hex string.
///
/// Produces six hex-encoded bytes: two-digit year, month, day, hour,
/// minute, second. Used by the known-device bind command.
pub fn current_hex_time() -> String {
    let now = Local::now();
    let bytes = [
        (now.year() % 100) as u8,
        now.month() as u8,
        now.day() as u8,
        now.hour() as u8,
        now.minute() as u8,
        now.second() as u8,
    ];
    encode_hex(&bytes)
}
