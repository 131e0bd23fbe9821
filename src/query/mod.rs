//! Query compilation, matching, and planning.

mod errors;
mod expr;
pub mod matcher;
mod planner;

pub use errors::QueryError;
pub use expr::{Condition, MatchOp, Query};
pub use planner::{find_positions, FindPlan};
