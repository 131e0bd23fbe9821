//! Index maintenance errors

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IndexError {
    /// A unique index already holds this value for another document.
    #[error("duplicate key in unique index {index}: {key:?}")]
    DuplicateKey { index: String, key: String },
}
