//! Record log errors

use std::io;

use thiserror::Error;

/// Failure while reading or writing the append-only record log.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage I/O failure: {context}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    /// A frame whose header or lengths are inconsistent with the file.
    /// Fatal for the read that encountered it.
    #[error("corrupt entry frame at offset {offset}: {reason}")]
    CorruptFrame { offset: u64, reason: String },
}

impl StorageError {
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        StorageError::Io {
            context: context.into(),
            source,
        }
    }

    pub fn corrupt(offset: u64, reason: impl Into<String>) -> Self {
        StorageError::CorruptFrame {
            offset,
            reason: reason.into(),
        }
    }
}

pub type StorageResult<T> = Result<T, StorageError>;
