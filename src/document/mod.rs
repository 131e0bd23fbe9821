//! Document model: values, identifiers, shape rules, and the wire codec.

pub mod codec;
mod errors;
mod id;
mod value;

pub use errors::ShapeError;
pub use id::ObjectId;
pub use value::{compare, simplify_key, DocValue, Document};
