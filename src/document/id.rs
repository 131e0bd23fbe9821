//! Object identifier factory
//!
//! Identifiers are 12 bytes: 4 bytes of epoch seconds, a 5-byte per-process
//! random token, and a 3-byte counter. Canonical external form is the
//! 24-character lowercase hex string. Byte order makes freshly generated
//! identifiers sort by creation time.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::OnceLock;

use rand::RngCore;

static PROCESS_TOKEN: OnceLock<[u8; 5]> = OnceLock::new();
static COUNTER: OnceLock<AtomicU32> = OnceLock::new();

fn process_token() -> &'static [u8; 5] {
    PROCESS_TOKEN.get_or_init(|| {
        let mut token = [0u8; 5];
        rand::thread_rng().fill_bytes(&mut token);
        token
    })
}

fn next_count() -> u32 {
    let counter = COUNTER.get_or_init(|| AtomicU32::new(rand::thread_rng().next_u32()));
    counter.fetch_add(1, Ordering::Relaxed) & 0x00ff_ffff
}

/// A unique document identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId([u8; 12]);

impl ObjectId {
    /// Generates a fresh identifier.
    pub fn new() -> Self {
        let secs = chrono::Utc::now().timestamp().max(0) as u32;
        let token = process_token();
        let count = next_count();

        let mut bytes = [0u8; 12];
        bytes[0..4].copy_from_slice(&secs.to_be_bytes());
        bytes[4..9].copy_from_slice(token);
        bytes[9] = (count >> 16) as u8;
        bytes[10] = (count >> 8) as u8;
        bytes[11] = count as u8;
        ObjectId(bytes)
    }

    /// Parses the canonical 24-character hex form.
    pub fn parse_str(s: &str) -> Option<Self> {
        if s.len() != 24 || !s.is_ascii() {
            return None;
        }
        let mut bytes = [0u8; 12];
        for (i, chunk) in s.as_bytes().chunks(2).enumerate() {
            let hi = (chunk[0] as char).to_digit(16)?;
            let lo = (chunk[1] as char).to_digit(16)?;
            bytes[i] = ((hi << 4) | lo) as u8;
        }
        Some(ObjectId(bytes))
    }

    /// Returns the canonical hex form.
    pub fn to_hex(&self) -> String {
        let mut out = String::with_capacity(24);
        for b in &self.0 {
            out.push(char::from_digit((b >> 4) as u32, 16).unwrap_or('0'));
            out.push(char::from_digit((b & 0x0f) as u32, 16).unwrap_or('0'));
        }
        out
    }

    /// Epoch seconds embedded in the identifier.
    pub fn timestamp(&self) -> u32 {
        u32::from_be_bytes([self.0[0], self.0[1], self.0[2], self.0[3]])
    }

    pub fn as_bytes(&self) -> &[u8; 12] {
        &self.0
    }
}

impl Default for ObjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_roundtrip() {
        let id = ObjectId::new();
        let hex = id.to_hex();
        assert_eq!(hex.len(), 24);
        assert_eq!(ObjectId::parse_str(&hex), Some(id));
    }

    #[test]
    fn test_uniqueness() {
        let a = ObjectId::new();
        let b = ObjectId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn test_sorts_by_creation_time() {
        let a = ObjectId::new();
        let b = ObjectId::new();
        assert!(a < b);
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert_eq!(ObjectId::parse_str("short"), None);
        assert_eq!(ObjectId::parse_str("zz00000000000000000000zz"), None);
    }

    #[test]
    fn test_timestamp_embedded() {
        let before = chrono::Utc::now().timestamp() as u32;
        let id = ObjectId::new();
        let after = chrono::Utc::now().timestamp() as u32;
        assert!(id.timestamp() >= before && id.timestamp() <= after);
    }
}
