//! Query compilation and planning errors

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QueryError {
    /// An index or sort specification named no fields.
    #[error("no fields are specified")]
    NoFields,

    /// An index or sort specification could not be normalized.
    #[error("bad sort specification: {0}")]
    BadSortSpec(String),

    /// A projection mixed inclusion and exclusion.
    #[error("projection cannot mix inclusion and exclusion")]
    MixedProjection,

    /// An unrecognized operator appeared in a query expression.
    #[error("unrecognized query operator {0:?}")]
    BadOperator(String),
}
