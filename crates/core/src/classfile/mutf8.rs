//! Modified UTF-8 as stored in `CONSTANT_Utf8` entries.
//!
//! Differences from standard UTF-8: NUL is encoded as `C0 80`, and characters
//! outside the BMP are encoded as a surrogate pair of two 3-byte sequences.

/// Decodes modified UTF-8. Unpaired surrogates and invalid sequences become
/// U+FFFD.
pub fn decode(bytes: &[u8]) -> String {
    if bytes.iter().all(|b| *b != 0 && *b < 0x80) {
        return String::from_utf8_lossy(bytes).into_owned();
    }
    let mut units: Vec<u16> = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if b & 0x80 == 0 {
            units.push(u16::from(b));
            i += 1;
        } else if b & 0xe0 == 0xc0 && i + 1 < bytes.len() {
            let unit = (u16::from(b & 0x1f) << 6) | u16::from(bytes[i + 1] & 0x3f);
            units.push(unit);
            i += 2;
        } else if b & 0xf0 == 0xe0 && i + 2 < bytes.len() {
            let unit = (u16::from(b & 0x0f) << 12)
                | (u16::from(bytes[i + 1] & 0x3f) << 6)
                | u16::from(bytes[i + 2] & 0x3f);
            units.push(unit);
            i += 3;
        } else {
            units.push(0xfffd);
            i += 1;
        }
    }
    char::decode_utf16(units)
        .map(|r| r.unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect()
}

/// Encodes a string as modified UTF-8.
pub fn encode(text: &str) -> Vec<u8> {
    if text.bytes().all(|b| b != 0 && b < 0x80) {
        return text.as_bytes().to_vec();
    }
    let mut out = Vec::with_capacity(text.len() + 8);
    for unit in text.encode_utf16() {
        match unit {
            0x0001..=0x007f => out.push(unit as u8),
            0x0000 | 0x0080..=0x07ff => {
                out.push(0xc0 | ((unit >> 6) & 0x1f) as u8);
                out.push(0x80 | (unit & 0x3f) as u8);
            }
            _ => {
                out.push(0xe0 | ((unit >> 12) & 0x0f) as u8);
                out.push(0x80 | ((unit >> 6) & 0x3f) as u8);
                out.push(0x80 | (unit & 0x3f) as u8);
            }
        }
    }
    out
}
