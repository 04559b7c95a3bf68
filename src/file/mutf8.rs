//! Modified UTF-8 as used by `CONSTANT_Utf8` entries (JVMS §4.4.7).
//!
//! Modified UTF-8 differs from standard UTF-8 in two places: the NUL character is written as
//! the two-byte sequence `C0 80`, and supplementary characters are written as a surrogate
//! pair, each surrogate encoded separately in three bytes.

use crate::Result;

/// Decode modified UTF-8 bytes into a Rust string.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] for truncated sequences, invalid lead bytes, or
/// unpaired surrogates.
pub fn decode(bytes: &[u8]) -> Result<String> {
    // Fast path: plain ASCII without NUL is identical in both encodings
    if bytes.iter().all(|b| *b != 0 && *b < 0x80) {
        return String::from_utf8(bytes.to_vec())
            .map_err(|e| malformed_error!("Invalid UTF-8: {}", e));
    }

    let mut units: Vec<u16> = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let b0 = bytes[i];
        if b0 & 0x80 == 0 {
            if b0 == 0 {
                return Err(malformed_error!("Raw NUL byte at offset {}", i));
            }
            units.push(u16::from(b0));
            i += 1;
        } else if b0 & 0xE0 == 0xC0 {
            let b1 = continuation(bytes, i + 1)?;
            units.push((u16::from(b0 & 0x1F) << 6) | u16::from(b1));
            i += 2;
        } else if b0 & 0xF0 == 0xE0 {
            let b1 = continuation(bytes, i + 1)?;
            let b2 = continuation(bytes, i + 2)?;
            units.push((u16::from(b0 & 0x0F) << 12) | (u16::from(b1) << 6) | u16::from(b2));
            i += 3;
        } else {
            return Err(malformed_error!(
                "Invalid modified UTF-8 lead byte 0x{:02X} at offset {}",
                b0,
                i
            ));
        }
    }

    String::from_utf16(&units).map_err(|_| malformed_error!("Unpaired surrogate in string"))
}

fn continuation(bytes: &[u8], index: usize) -> Result<u8> {
    match bytes.get(index) {
        Some(b) if b & 0xC0 == 0x80 => Ok(b & 0x3F),
        Some(b) => Err(malformed_error!(
            "Invalid continuation byte 0x{:02X} at offset {}",
            b,
            index
        )),
        None => Err(malformed_error!("Truncated modified UTF-8 sequence")),
    }
}

/// Encode a Rust string as modified UTF-8.
#[must_use]
pub fn encode(value: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(value.len());
    for unit in value.encode_utf16() {
        match unit {
            0x0001..=0x007F => out.push(unit as u8),
            0x0000 | 0x0080..=0x07FF => {
                out.push(0xC0 | ((unit >> 6) & 0x1F) as u8);
                out.push(0x80 | (unit & 0x3F) as u8);
            }
            _ => {
                out.push(0xE0 | ((unit >> 12) & 0x0F) as u8);
                out.push(0x80 | ((unit >> 6) & 0x3F) as u8);
                out.push(0x80 | (unit & 0x3F) as u8);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nul_uses_two_bytes() {
        assert_eq!(encode("a\0b"), vec![b'a', 0xC0, 0x80, b'b']);
        assert_eq!(decode(&[b'a', 0xC0, 0x80, b'b']).unwrap(), "a\0b");
    }

    #[test]
    fn supplementary_characters_use_surrogates() {
        let text = "x\u{1F600}";
        let encoded = encode(text);
        assert_eq!(encoded.len(), 1 + 6);
        assert_eq!(encoded[1], 0xED);
        assert_eq!(decode(&encoded).unwrap(), text);
    }

    #[test]
    fn rejects_bad_sequences() {
        assert!(decode(&[0x00]).is_err());
        assert!(decode(&[0xE2, 0x82]).is_err());
        assert!(decode(&[0xF0, 0x9F, 0x98, 0x80]).is_err());
    }
}
