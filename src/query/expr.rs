//! Query expression compilation
//!
//! A query is a mapping of field path to condition, with implicit AND
//! across fields. Compilation classifies each field's condition up front:
//! plain equality and pure range comparisons are index-servable, anything
//! else falls back to the full matcher. Unrecognized operators are a
//! compile error, never a silent no-match.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::document::{codec, DocValue};

use super::errors::QueryError;

/// Operators evaluated by the matcher when a condition cannot be served
/// by an index alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    Nin,
    Exists,
}

/// The compiled condition for one field path.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Plain equality; index-servable as a point lookup for scalar
    /// values.
    Eq(DocValue),
    /// Pure range comparison; index-servable as a bounded scan. Each bound
    /// carries its inclusivity flag.
    Range {
        min: Option<(DocValue, bool)>,
        max: Option<(DocValue, bool)>,
    },
    /// Any other operator combination; requires document materialization.
    Other(Vec<(MatchOp, DocValue)>),
}

impl Condition {
    /// Whether an index over this field can serve the condition directly.
    /// Only scalar operands qualify: null and non-scalar values reduce to
    /// the same index key as a missing field, so they stay with the
    /// matcher.
    pub fn indexable(&self) -> bool {
        match self {
            Condition::Eq(value) => index_scalar(value),
            Condition::Range { min, max } => {
                (min.is_some() || max.is_some())
                    && min.as_ref().map_or(true, |(v, _)| index_scalar(v))
                    && max.as_ref().map_or(true, |(v, _)| index_scalar(v))
            }
            Condition::Other(_) => false,
        }
    }
}

/// Values with a dedicated index key rank of their own.
fn index_scalar(value: &DocValue) -> bool {
    matches!(
        value,
        DocValue::Bool(_)
            | DocValue::Number(_)
            | DocValue::String(_)
            | DocValue::Date(_)
            | DocValue::Id(_)
    )
}

/// A compiled query expression.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    conds: BTreeMap<String, Condition>,
}

impl Query {
    /// Compiles a wire query object. `{}` compiles to the match-all query.
    pub fn compile(raw: &Value) -> Result<Self, QueryError> {
        let map = match raw {
            Value::Null => return Ok(Query::default()),
            Value::Object(map) => map,
            other => {
                return Err(QueryError::BadOperator(format!(
                    "query must be an object, got {}",
                    other
                )))
            }
        };

        let mut conds = BTreeMap::new();
        for (field, spec) in map {
            if field.starts_with('$') {
                return Err(QueryError::BadOperator(field.clone()));
            }
            conds.insert(field.clone(), compile_condition(spec)?);
        }
        Ok(Query { conds })
    }

    pub fn is_empty(&self) -> bool {
        self.conds.is_empty()
    }

    /// Field paths whose conditions an index could serve directly.
    pub fn indexable_fields(&self) -> Vec<String> {
        self.conds
            .iter()
            .filter(|(_, cond)| cond.indexable())
            .map(|(field, _)| field.clone())
            .collect()
    }

    pub fn get(&self, field: &str) -> Option<&Condition> {
        self.conds.get(field)
    }

    /// Extracts and removes the condition for one field so it can be
    /// resolved against that field's index independently of the rest of
    /// the query. An emptied query means no residual predicate remains.
    pub fn split(&mut self, field: &str) -> Option<Condition> {
        self.conds.remove(field)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Condition)> {
        self.conds.iter()
    }

    /// Plain equality literals, used to seed an upserted document from the
    /// query when the update spec provides no base.
    pub fn equality_literals(&self) -> Vec<(String, DocValue)> {
        self.conds
            .iter()
            .filter_map(|(field, cond)| match cond {
                Condition::Eq(value) => Some((field.clone(), value.clone())),
                _ => None,
            })
            .collect()
    }
}

fn compile_condition(spec: &Value) -> Result<Condition, QueryError> {
    let map = match spec {
        Value::Object(map) if map.keys().any(|k| k.starts_with('$')) => {
            // An operator object must be all operators; a `$wrap` tag is a
            // literal value, not an operator.
            if map.contains_key("$wrap") {
                return Ok(Condition::Eq(codec::from_wire(spec)));
            }
            map
        }
        other => return Ok(Condition::Eq(codec::from_wire(other))),
    };

    let mut ops = Vec::with_capacity(map.len());
    for (name, operand) in map {
        let op = match name.as_str() {
            "$eq" => MatchOp::Eq,
            "$ne" => MatchOp::Ne,
            "$gt" => MatchOp::Gt,
            "$gte" => MatchOp::Gte,
            "$lt" => MatchOp::Lt,
            "$lte" => MatchOp::Lte,
            "$in" => MatchOp::In,
            "$nin" => MatchOp::Nin,
            "$exists" => MatchOp::Exists,
            _ => return Err(QueryError::BadOperator(name.clone())),
        };
        ops.push((op, codec::from_wire(operand)));
    }

    // A single $eq collapses to plain equality; all-range operators
    // collapse to a bounded scan. Anything else is matcher-only.
    if ops.len() == 1 && ops[0].0 == MatchOp::Eq {
        let (_, value) = ops.into_iter().next().ok_or(QueryError::NoFields)?;
        return Ok(Condition::Eq(value));
    }

    let all_range = ops
        .iter()
        .all(|(op, _)| matches!(op, MatchOp::Gt | MatchOp::Gte | MatchOp::Lt | MatchOp::Lte));
    if all_range {
        let mut min = None;
        let mut max = None;
        for (op, value) in ops {
            match op {
                MatchOp::Gt => min = Some((value, false)),
                MatchOp::Gte => min = Some((value, true)),
                MatchOp::Lt => max = Some((value, false)),
                MatchOp::Lte => max = Some((value, true)),
                _ => {}
            }
        }
        return Ok(Condition::Range { min, max });
    }

    Ok(Condition::Other(ops))
}
