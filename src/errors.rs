//! Top-level error type aggregating the per-module taxonomies.

use thiserror::Error;

use crate::document::ShapeError;
use crate::index::IndexError;
use crate::log::StorageError;
use crate::query::QueryError;

#[derive(Debug, Error)]
pub enum DbError {
    #[error(transparent)]
    Shape(#[from] ShapeError),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error("serialization failed: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("invalid collection name {0:?}")]
    InvalidCollectionName(String),

    #[error("duplicate _id {0:?}")]
    DuplicateId(String),
}

pub type DbResult<T> = Result<T, DbError>;
