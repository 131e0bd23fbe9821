//! Residual predicate evaluation
//!
//! The matcher evaluates compiled conditions against fully materialized
//! documents, for whatever the planner could not serve from an index.
//! Comparison is strict: a range comparison only applies between values
//! of the same type rank, with two canonical-form exceptions shared with
//! the index key reduction: dates compare with numbers by epoch
//! millisecond, identifiers with strings by hex form. A missing field
//! matches nothing except `$exists: false`, `$ne`, and `$nin`.
//!
//! In array-aware mode a condition on an array-valued field matches when
//! any element matches, mirroring how array-mode indexes fan out elements.

use std::cmp::Ordering;

use crate::document::{compare, DocValue, Document};

use super::expr::{Condition, MatchOp, Query};

/// Evaluates the whole query (implicit AND) against one document.
pub fn matches(doc: &Document, query: &Query, array_aware: bool) -> bool {
    query
        .iter()
        .all(|(field, cond)| eval(doc.get_path(field), cond, array_aware))
}

fn eval(value: Option<&DocValue>, cond: &Condition, array_aware: bool) -> bool {
    match cond {
        Condition::Eq(target) => any_value(value, array_aware, |v| value_eq(v, target)),
        Condition::Range { min, max } => any_value(value, array_aware, |v| {
            in_range(v, min.as_ref(), max.as_ref())
        }),
        Condition::Other(ops) => ops
            .iter()
            .all(|(op, operand)| eval_op(value, *op, operand, array_aware)),
    }
}

/// Applies a scalar predicate to the value, fanning out over array
/// elements when array-aware mode is on. Missing values never match.
fn any_value(
    value: Option<&DocValue>,
    array_aware: bool,
    pred: impl Fn(&DocValue) -> bool,
) -> bool {
    match value {
        None => false,
        Some(v) => match v {
            DocValue::Array(items) if array_aware => pred(v) || items.iter().any(pred),
            _ => pred(v),
        },
    }
}

fn eval_op(value: Option<&DocValue>, op: MatchOp, operand: &DocValue, array_aware: bool) -> bool {
    match op {
        MatchOp::Eq => any_value(value, array_aware, |v| value_eq(v, operand)),
        MatchOp::Ne => !any_value(value, array_aware, |v| value_eq(v, operand)),
        MatchOp::Gt => any_value(value, array_aware, |v| ordered(v, operand, Ordering::Greater, false)),
        MatchOp::Gte => any_value(value, array_aware, |v| ordered(v, operand, Ordering::Greater, true)),
        MatchOp::Lt => any_value(value, array_aware, |v| ordered(v, operand, Ordering::Less, false)),
        MatchOp::Lte => any_value(value, array_aware, |v| ordered(v, operand, Ordering::Less, true)),
        MatchOp::In => any_value(value, array_aware, |v| set_contains(operand, v)),
        MatchOp::Nin => !any_value(value, array_aware, |v| set_contains(operand, v)),
        MatchOp::Exists => {
            let wanted = !matches!(operand, DocValue::Bool(false) | DocValue::Null);
            value.is_some() == wanted
        }
    }
}

/// Strict equality: same type rank, equal value. Null compares equal to
/// nothing; presence is queried with `$exists`.
fn value_eq(a: &DocValue, b: &DocValue) -> bool {
    if a.is_null() || b.is_null() {
        return false;
    }
    match (a, b) {
        (DocValue::Array(x), DocValue::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(va, vb)| value_eq(va, vb))
        }
        (DocValue::Object(x), DocValue::Object(y)) => {
            x.len() == y.len()
                && x.iter()
                    .zip(y.iter())
                    .all(|((ka, va), (kb, vb))| ka == kb && value_eq(va, vb))
        }
        _ => scalar_cmp(a, b) == Some(Ordering::Equal),
    }
}

fn ordered(value: &DocValue, bound: &DocValue, wanted: Ordering, or_equal: bool) -> bool {
    match scalar_cmp(value, bound) {
        Some(ord) => ord == wanted || (or_equal && ord == Ordering::Equal),
        None => false,
    }
}

/// Comparison under the same reduction indexed values go through: dates
/// against numbers by epoch millisecond, identifiers against strings by
/// canonical hex. `None` means the pair is incomparable.
fn scalar_cmp(a: &DocValue, b: &DocValue) -> Option<Ordering> {
    match (a, b) {
        (DocValue::Date(x), DocValue::Number(y)) => (*x as f64).partial_cmp(y),
        (DocValue::Number(x), DocValue::Date(y)) => x.partial_cmp(&(*y as f64)),
        (DocValue::Id(x), DocValue::String(y)) => Some(x.to_hex().as_str().cmp(y.as_str())),
        (DocValue::String(x), DocValue::Id(y)) => Some(x.as_str().cmp(y.to_hex().as_str())),
        _ if !a.is_null() && same_rank(a, b) => Some(compare(a, b)),
        _ => None,
    }
}

fn in_range(
    value: &DocValue,
    min: Option<&(DocValue, bool)>,
    max: Option<&(DocValue, bool)>,
) -> bool {
    let above = match min {
        Some((bound, inclusive)) => ordered(value, bound, Ordering::Greater, *inclusive),
        None => true,
    };
    let below = match max {
        Some((bound, inclusive)) => ordered(value, bound, Ordering::Less, *inclusive),
        None => true,
    };
    above && below
}

/// `$in`/`$nin` membership: the operand must be an array of candidates.
fn set_contains(operand: &DocValue, value: &DocValue) -> bool {
    match operand {
        DocValue::Array(candidates) => candidates.iter().any(|c| value_eq(value, c)),
        _ => false,
    }
}

fn same_rank(a: &DocValue, b: &DocValue) -> bool {
    std::mem::discriminant(a) == std::mem::discriminant(b)
}
