//! Append-only record log
//!
//! The log is the durable source of truth for a collection. Entries are
//! immutable once written; a logical update is a new entry, never an
//! in-place edit. Every write is fsynced before the operation is
//! acknowledged.
//!
//! Replay tolerates a truncated trailing frame (a crash artifact) by
//! stopping early; random-access reads treat any frame that runs past the
//! end of the file as corruption.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use super::entry::{Entry, EntryKey, FrameHeader, HEADER_LEN};
use super::errors::{StorageError, StorageResult};
use crate::observability::Logger;

/// A durable append-only file of framed entries.
pub struct RecordLog {
    path: PathBuf,
    file: File,
    len: u64,
}

enum Frame {
    Entry { entry: Entry, next: u64 },
    /// Partial frame at end of file.
    Truncated,
    Eof,
}

impl RecordLog {
    /// Opens (or creates) the log file.
    pub fn open(path: &Path) -> StorageResult<Self> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)
            .map_err(|e| StorageError::io(format!("failed to open log {}", path.display()), e))?;
        let len = file
            .metadata()
            .map_err(|e| StorageError::io("failed to read log metadata", e))?
            .len();
        Ok(RecordLog {
            path: path.to_path_buf(),
            file,
            len,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current end-of-log offset (where the next entry will land).
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Appends an entry, fsyncs, and returns its offset.
    pub fn append(&mut self, entry: &Entry) -> StorageResult<u64> {
        let buf = entry.encode()?;
        let offset = self.len;
        self.file
            .write_all(&buf)
            .map_err(|e| StorageError::io(format!("failed to append entry for {}", entry.key.id), e))?;
        self.file
            .sync_all()
            .map_err(|e| StorageError::io("fsync failed after append", e))?;
        self.len += buf.len() as u64;
        Ok(offset)
    }

    /// Reads the entry at the given offset. The frame must be complete.
    pub fn read_at(&mut self, offset: u64) -> StorageResult<Entry> {
        match self.read_frame(offset)? {
            Frame::Entry { entry, .. } => Ok(entry),
            Frame::Truncated => Err(StorageError::corrupt(
                offset,
                "frame runs past end of file",
            )),
            Frame::Eof => Err(StorageError::corrupt(offset, "no entry at offset")),
        }
    }

    /// Scans the log from offset 0 and returns every entry key with its
    /// offset, in write order. A truncated trailing frame is a crash
    /// artifact: it is logged, cut off so later appends start on a frame
    /// boundary, and the scan ends without error.
    pub fn replay_keys(&mut self) -> StorageResult<Vec<(u64, EntryKey)>> {
        let mut keys = Vec::new();
        let mut offset = 0u64;
        loop {
            match self.read_frame(offset)? {
                Frame::Entry { entry, next } => {
                    keys.push((offset, entry.key));
                    offset = next;
                }
                Frame::Truncated => {
                    Logger::warn(
                        "LOG_TRUNCATED_TAIL",
                        &[
                            ("path", &self.path.display().to_string()),
                            ("offset", &offset.to_string()),
                        ],
                    );
                    self.file
                        .set_len(offset)
                        .map_err(|e| StorageError::io("failed to cut truncated tail", e))?;
                    self.len = offset;
                    break;
                }
                Frame::Eof => break,
            }
        }
        Ok(keys)
    }

    fn read_frame(&mut self, offset: u64) -> StorageResult<Frame> {
        if offset >= self.len {
            return Ok(Frame::Eof);
        }
        let remaining = self.len - offset;
        let header_span = (HEADER_LEN + 1) as u64;
        if remaining < header_span {
            return Ok(Frame::Truncated);
        }

        self.file
            .seek(SeekFrom::Start(offset))
            .map_err(|e| StorageError::io(format!("failed to seek to offset {}", offset), e))?;

        let mut header_buf = vec![0u8; HEADER_LEN + 1];
        self.file
            .read_exact(&mut header_buf)
            .map_err(|e| StorageError::io("failed to read frame header", e))?;
        if header_buf[HEADER_LEN] != b'\n' {
            return Err(StorageError::corrupt(offset, "missing header terminator"));
        }

        let header: FrameHeader = serde_json::from_slice(&header_buf[..HEADER_LEN])
            .map_err(|e| StorageError::corrupt(offset, format!("unreadable frame header: {}", e)))?;
        let (key_len, payload_len) = header.lengths(offset)?;

        let frame_size = Entry::frame_size(key_len, payload_len);
        if frame_size > remaining {
            return Ok(Frame::Truncated);
        }

        let mut body = vec![0u8; (key_len + 1 + payload_len + 1) as usize];
        self.file
            .read_exact(&mut body)
            .map_err(|e| StorageError::io("failed to read frame body", e))?;

        let key_end = key_len as usize;
        if body[key_end] != b'\n' || body[body.len() - 1] != b'\n' {
            return Err(StorageError::corrupt(offset, "missing section terminator"));
        }

        let key: EntryKey = serde_json::from_slice(&body[..key_end])
            .map_err(|e| StorageError::corrupt(offset, format!("unreadable entry key: {}", e)))?;
        let payload = body[key_end + 1..body.len() - 1].to_vec();

        Ok(Frame::Entry {
            entry: Entry { key, payload },
            next: offset + frame_size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn snapshot(id: &str, seq: u64, body: &[u8]) -> Entry {
        Entry {
            key: EntryKey::snapshot(id, seq, 1_000, body),
            payload: body.to_vec(),
        }
    }

    #[test]
    fn test_append_read_roundtrip() {
        let dir = TempDir::new().unwrap();
        let mut log = RecordLog::open(&dir.path().join("c1")).unwrap();

        let e1 = snapshot("a", 1, br#"{"x":1}"#);
        let e2 = snapshot("b", 2, br#"{"x":2}"#);
        let off1 = log.append(&e1).unwrap();
        let off2 = log.append(&e2).unwrap();
        assert_eq!(off1, 0);
        assert!(off2 > off1);

        assert_eq!(log.read_at(off2).unwrap(), e2);
        assert_eq!(log.read_at(off1).unwrap(), e1);
    }

    #[test]
    fn test_replay_enumerates_in_write_order() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("c1");
        {
            let mut log = RecordLog::open(&path).unwrap();
            log.append(&snapshot("a", 1, b"{}")).unwrap();
            log.append(&Entry {
                key: EntryKey::delete("a", 2, 1_000),
                payload: Vec::new(),
            })
            .unwrap();
            log.append(&snapshot("b", 3, b"{}")).unwrap();
        }

        let mut log = RecordLog::open(&path).unwrap();
        let keys = log.replay_keys().unwrap();
        assert_eq!(keys.len(), 3);
        assert_eq!(keys[0].1.id, "a");
        assert!(keys[1].1.is_delete());
        assert_eq!(keys[2].1.seq, 3);
    }

    #[test]
    fn test_truncated_tail_ignored_by_replay() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("c1");
        {
            let mut log = RecordLog::open(&path).unwrap();
            log.append(&snapshot("a", 1, b"{}")).unwrap();
            log.append(&snapshot("b", 2, br#"{"big":"payload"}"#)).unwrap();
        }

        // Chop the last frame in half, simulating a crash mid-append.
        let len = std::fs::metadata(&path).unwrap().len();
        let file = OpenOptions::new().write(true).open(&path).unwrap();
        file.set_len(len - 10).unwrap();

        let mut log = RecordLog::open(&path).unwrap();
        let keys = log.replay_keys().unwrap();
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].1.id, "a");
    }

    #[test]
    fn test_read_at_rejects_truncated_frame() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("c1");
        let off;
        {
            let mut log = RecordLog::open(&path).unwrap();
            off = log.append(&snapshot("a", 1, br#"{"x":1}"#)).unwrap();
        }
        let len = std::fs::metadata(&path).unwrap().len();
        let file = OpenOptions::new().write(true).open(&path).unwrap();
        file.set_len(len - 3).unwrap();

        let mut log = RecordLog::open(&path).unwrap();
        assert!(matches!(
            log.read_at(off),
            Err(StorageError::CorruptFrame { .. })
        ));
    }

    #[test]
    fn test_garbage_header_is_fatal() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("c1");
        std::fs::write(&path, vec![b'x'; 200]).unwrap();

        let mut log = RecordLog::open(&path).unwrap();
        assert!(log.replay_keys().is_err());
    }
}
