//! Log entry framing
//!
//! Each entry is three newline-terminated sections:
//!
//! ```text
//! {"k":"0000000066","o":"0000000123","v":"001"}\n   <- fixed-width header
//! <serialized key>\n
//! <serialized payload>\n
//! ```
//!
//! `k` and `o` are the zero-padded byte lengths of the key and payload
//! sections; `v` is the frame format version. The fixed header width lets a
//! forward scan enumerate every entry without an external index.
//!
//! The key object carries the simplified identifier, a monotonically
//! increasing sequence number, a timestamp, and either a content fingerprint
//! (`_s`) or a delete marker (`_a":"del"`). Payloads are empty for deletes.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::errors::{StorageError, StorageResult};

/// Frame format version written into every header.
pub const FORMAT_VERSION: &str = "001";

/// Serialized byte length of a frame header, excluding the trailing newline.
/// Fixed because both length fields are zero-padded to ten digits.
pub const HEADER_LEN: usize = 45;

/// Marker stored in `_a` for delete entries.
pub const DELETE_ACTION: &str = "del";

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct FrameHeader {
    /// Key section length, zero-padded decimal.
    pub k: String,
    /// Payload section length, zero-padded decimal.
    pub o: String,
    /// Format version.
    pub v: String,
}

impl FrameHeader {
    pub(crate) fn new(key_len: usize, payload_len: usize) -> Self {
        FrameHeader {
            k: format!("{:010}", key_len),
            o: format!("{:010}", payload_len),
            v: FORMAT_VERSION.to_string(),
        }
    }

    pub(crate) fn lengths(&self, offset: u64) -> StorageResult<(u64, u64)> {
        if self.v != FORMAT_VERSION {
            return Err(StorageError::corrupt(
                offset,
                format!("unsupported frame version {:?}", self.v),
            ));
        }
        let key_len = self
            .k
            .parse::<u64>()
            .map_err(|_| StorageError::corrupt(offset, "non-numeric key length"))?;
        let payload_len = self
            .o
            .parse::<u64>()
            .map_err(|_| StorageError::corrupt(offset, "non-numeric payload length"))?;
        Ok((key_len, payload_len))
    }
}

/// The durable key of a log entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryKey {
    /// Simplified document identifier.
    #[serde(rename = "_id")]
    pub id: String,
    /// Monotonically increasing sequence number.
    #[serde(rename = "_uid")]
    pub seq: u64,
    /// Epoch milliseconds at write time.
    #[serde(rename = "_dt")]
    pub ts: i64,
    /// Content fingerprint of the payload; absent for deletes.
    #[serde(rename = "_s", skip_serializing_if = "Option::is_none", default)]
    pub fingerprint: Option<String>,
    /// Delete marker; absent for inserts and updates.
    #[serde(rename = "_a", skip_serializing_if = "Option::is_none", default)]
    pub action: Option<String>,
}

impl EntryKey {
    /// Key for an insert/update snapshot, fingerprinting the payload.
    pub fn snapshot(id: impl Into<String>, seq: u64, ts: i64, payload: &[u8]) -> Self {
        EntryKey {
            id: id.into(),
            seq,
            ts,
            fingerprint: Some(fingerprint(payload)),
            action: None,
        }
    }

    /// Key for a delete marker.
    pub fn delete(id: impl Into<String>, seq: u64, ts: i64) -> Self {
        EntryKey {
            id: id.into(),
            seq,
            ts,
            fingerprint: None,
            action: Some(DELETE_ACTION.to_string()),
        }
    }

    pub fn is_delete(&self) -> bool {
        self.action.as_deref() == Some(DELETE_ACTION)
    }
}

/// One immutable frame: key plus serialized document payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub key: EntryKey,
    pub payload: Vec<u8>,
}

impl Entry {
    /// Encodes the full frame: header, key, payload, newline-terminated.
    pub fn encode(&self) -> StorageResult<Vec<u8>> {
        let key_bytes = serde_json::to_vec(&self.key)
            .map_err(|e| StorageError::corrupt(0, format!("unencodable entry key: {}", e)))?;
        let header = FrameHeader::new(key_bytes.len(), self.payload.len());
        let header_bytes = serde_json::to_vec(&header)
            .map_err(|e| StorageError::corrupt(0, format!("unencodable frame header: {}", e)))?;
        debug_assert_eq!(header_bytes.len(), HEADER_LEN);

        let mut buf =
            Vec::with_capacity(header_bytes.len() + key_bytes.len() + self.payload.len() + 3);
        buf.extend_from_slice(&header_bytes);
        buf.push(b'\n');
        buf.extend_from_slice(&key_bytes);
        buf.push(b'\n');
        buf.extend_from_slice(&self.payload);
        buf.push(b'\n');
        Ok(buf)
    }

    /// Total encoded frame size for the given section lengths.
    pub fn frame_size(key_len: u64, payload_len: u64) -> u64 {
        HEADER_LEN as u64 + 1 + key_len + 1 + payload_len + 1
    }
}

/// Hex digest over the payload bytes, stored in `_s` as the content
/// fingerprint of a snapshot entry.
pub fn fingerprint(payload: &[u8]) -> String {
    let digest = Sha256::digest(payload);
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        out.push(char::from_digit((byte >> 4) as u32, 16).unwrap_or('0'));
        out.push(char::from_digit((byte & 0x0f) as u32, 16).unwrap_or('0'));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_is_fixed_width() {
        let header = FrameHeader::new(66, 123);
        let bytes = serde_json::to_vec(&header).unwrap();
        assert_eq!(bytes.len(), HEADER_LEN);
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            r#"{"k":"0000000066","o":"0000000123","v":"001"}"#
        );
    }

    #[test]
    fn test_snapshot_key_carries_fingerprint() {
        let key = EntryKey::snapshot("abc", 1, 1000, b"{\"x\":1}");
        assert!(!key.is_delete());
        assert_eq!(key.fingerprint.as_deref(), Some(&fingerprint(b"{\"x\":1}")[..]));

        let json = serde_json::to_string(&key).unwrap();
        assert!(json.contains("\"_s\""));
        assert!(!json.contains("\"_a\""));
    }

    #[test]
    fn test_delete_key_carries_marker() {
        let key = EntryKey::delete("abc", 2, 1000);
        assert!(key.is_delete());
        let json = serde_json::to_string(&key).unwrap();
        assert!(json.contains("\"_a\":\"del\""));
        assert!(!json.contains("\"_s\""));
    }

    #[test]
    fn test_encode_layout() {
        let key = EntryKey::snapshot("abc", 1, 0, b"{}");
        let entry = Entry {
            key,
            payload: b"{}".to_vec(),
        };
        let buf = entry.encode().unwrap();
        assert_eq!(buf[HEADER_LEN], b'\n');
        assert_eq!(*buf.last().unwrap(), b'\n');

        let key_len: usize = std::str::from_utf8(&buf[6..16]).unwrap().parse().unwrap();
        assert_eq!(
            buf.len() as u64,
            Entry::frame_size(key_len as u64, 2)
        );
    }
}
