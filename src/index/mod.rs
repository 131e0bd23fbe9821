//! Ordered secondary indexes over document fields.

mod errors;
mod field;
mod key;
mod spec;

pub use errors::IndexError;
pub use field::{FieldIndex, IndexOptions};
pub use key::IndexKey;
pub use spec::IndexSpec;
