//! plumedb - An embedded, file-backed document store
//!
//! Append-only record log, replayed position index, ordered field
//! indexes, and a MongoDB-like collection API.

pub mod cache;
pub mod collection;
pub mod db;
pub mod document;
pub mod errors;
pub mod index;
pub mod log;
pub mod observability;
pub mod query;
pub mod queue;
pub mod update;
