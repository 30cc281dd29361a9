//! Fixed-size records: the unit of comparison, hashing and output.

use std::fmt;

/// Capacity of the text field in bytes, trailing NUL included.
pub const TEXT_LEN: usize = 120;

/// Serialized record size: `id(4) | num(4) | text(120) | valid(1)`.
pub const RECORD_BYTES: usize = 4 + 4 + TEXT_LEN + 1;

/// A single relation tuple. Invalid records are tombstones: they occupy a
/// slot but never participate in comparisons, hashing or output.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Record {
    pub id: u32,
    pub num: u32,
    pub text: [u8; TEXT_LEN],
    pub valid: bool,
}

impl Default for Record {
    fn default() -> Self {
        Self {
            id: 0,
            num: 0,
            text: [0; TEXT_LEN],
            valid: false,
        }
    }
}

impl Record {
    /// Build a valid record, truncating `text` to the field capacity
    /// (one byte is kept for the NUL terminator).
    pub fn new(id: u32, num: u32, text: &str) -> Self {
        let mut buf = [0u8; TEXT_LEN];
        let len = text.len().min(TEXT_LEN - 1);
        buf[..len].copy_from_slice(&text.as_bytes()[..len]);
        Self {
            id,
            num,
            text: buf,
            valid: true,
        }
    }

    /// Text bytes up to the first NUL (C-string semantics of the layout).
    pub fn text_bytes(&self) -> &[u8] {
        let end = self.text.iter().position(|&b| b == 0).unwrap_or(TEXT_LEN);
        &self.text[..end]
    }

    /// Lossy UTF-8 view of the text field, for display only.
    pub fn text_lossy(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(self.text_bytes())
    }

    /// Serialize into exactly [`RECORD_BYTES`] bytes, little-endian.
    pub fn encode(&self, out: &mut [u8]) {
        debug_assert_eq!(out.len(), RECORD_BYTES);
        out[0..4].copy_from_slice(&self.id.to_le_bytes());
        out[4..8].copy_from_slice(&self.num.to_le_bytes());
        out[8..8 + TEXT_LEN].copy_from_slice(&self.text);
        out[8 + TEXT_LEN] = self.valid as u8;
    }

    /// Deserialize from exactly [`RECORD_BYTES`] bytes.
    pub fn decode(bytes: &[u8]) -> Self {
        debug_assert_eq!(bytes.len(), RECORD_BYTES);
        let mut text = [0u8; TEXT_LEN];
        text.copy_from_slice(&bytes[8..8 + TEXT_LEN]);
        Self {
            id: u32::from_le_bytes(bytes[0..4].try_into().unwrap()),
            num: u32::from_le_bytes(bytes[4..8].try_into().unwrap()),
            text,
            valid: bytes[8 + TEXT_LEN] != 0,
        }
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("id", &self.id)
            .field("num", &self.num)
            .field("text", &self.text_lossy())
            .field("valid", &self.valid)
            .finish()
    }
}
