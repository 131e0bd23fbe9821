//! Document shape errors
//!
//! Shape violations are detected before any log write and surface to the
//! caller as typed errors, never as panics.

use thiserror::Error;

/// Violation of the document shape invariants.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ShapeError {
    /// Field names must not start with `$` (reserved for operators).
    #[error("key {0:?} must not start with '$'")]
    DollarKey(String),

    /// Field names must not contain `.` (reserved for path addressing).
    #[error("key {0:?} must not contain '.'")]
    DottedKey(String),

    /// A document reached the write path without an identifier.
    #[error("invalid object key (_id)")]
    MissingId,

    /// The identifier field is immutable under any update path.
    #[error("the _id field cannot be changed by an update")]
    IdImmutable,

    /// An update document used an operator this engine does not recognize.
    #[error("unknown update operator {0:?}")]
    UnknownOperator(String),

    /// Update documents are either all-operator or a plain replacement.
    #[error("update document cannot mix operators with plain fields")]
    MixedUpdate,

    /// `$inc` applied to a value that is not a number.
    #[error("cannot apply $inc to non-numeric field {0:?}")]
    NonNumericInc(String),

    /// An operator was applied to a value of the wrong type.
    #[error("cannot apply {op} to field {path:?}")]
    BadTarget { op: &'static str, path: String },

    /// A wire payload did not decode to a document object.
    #[error("document payload is not an object")]
    NotAnObject,
}
