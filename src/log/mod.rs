//! Append-only record log: durable framed entries plus startup replay.

mod entry;
mod errors;
mod file;

pub use entry::{fingerprint, Entry, EntryKey, DELETE_ACTION, FORMAT_VERSION, HEADER_LEN};
pub use errors::{StorageError, StorageResult};
pub use file::RecordLog;
