//! Atomic update operators and whole-document replacement.

mod engine;

pub use engine::{Op, UpdateSpec};
