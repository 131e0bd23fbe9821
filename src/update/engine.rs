//! Update application
//!
//! An update document is either **atomic** (every top-level key is a
//! recognized `$` operator, applied to dotted paths) or a **replacement**
//! (a plain document that replaces the match wholesale, keeping the
//! identifier). Mixing the two forms is a shape error, as is any attempt
//! to touch `_id`. Classification happens at parse time so a malformed
//! update is rejected before anything is queued.

use serde_json::Value;

use crate::document::{codec, DocValue, Document, ShapeError};
use crate::query::Query;

/// One parsed atomic operator application.
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    /// `$set`: write a value at a path, creating intermediates.
    Set(String, DocValue),
    /// `$unset`: remove a path.
    Unset(String),
    /// `$inc`: add to a numeric value, seeding from zero when absent.
    Inc(String, f64),
    /// `$push`: append to an array, creating a one-element array when
    /// absent.
    Push(String, DocValue),
    /// `$pop`: drop the last (1) or first (-1) array element.
    Pop(String, i32),
    /// `$rename`: move a value from one path to another.
    Rename(String, String),
}

impl Op {
    fn path(&self) -> &str {
        match self {
            Op::Set(path, _)
            | Op::Unset(path)
            | Op::Inc(path, _)
            | Op::Push(path, _)
            | Op::Pop(path, _)
            | Op::Rename(path, _) => path,
        }
    }
}

/// A classified update document.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateSpec {
    Replace(Document),
    Atomic(Vec<Op>),
}

impl UpdateSpec {
    /// Parses and classifies a wire update document.
    pub fn parse(raw: &Value) -> Result<Self, ShapeError> {
        let map = match raw {
            Value::Object(map) => map,
            _ => return Err(ShapeError::NotAnObject),
        };

        let operator_count = map.keys().filter(|k| k.starts_with('$')).count();
        if operator_count == 0 {
            let doc = codec::document_from_wire(raw)?;
            doc.validate_shape()?;
            return Ok(UpdateSpec::Replace(doc));
        }
        if operator_count != map.len() {
            return Err(ShapeError::MixedUpdate);
        }

        let mut ops = Vec::new();
        for (name, args) in map {
            let args = match args {
                Value::Object(args) => args,
                _ => return Err(ShapeError::UnknownOperator(name.clone())),
            };
            for (path, operand) in args {
                let op = match name.as_str() {
                    "$set" => Op::Set(path.clone(), codec::from_wire(operand)),
                    "$unset" => Op::Unset(path.clone()),
                    "$inc" => {
                        let delta = operand
                            .as_f64()
                            .ok_or_else(|| ShapeError::NonNumericInc(path.clone()))?;
                        Op::Inc(path.clone(), delta)
                    }
                    "$push" => Op::Push(path.clone(), codec::from_wire(operand)),
                    "$pop" => {
                        let dir = operand.as_i64().unwrap_or(1);
                        Op::Pop(path.clone(), if dir < 0 { -1 } else { 1 })
                    }
                    "$rename" => {
                        let target = operand
                            .as_str()
                            .ok_or_else(|| ShapeError::BadTarget {
                                op: "$rename",
                                path: path.clone(),
                            })?
                            .to_string();
                        if target == "_id" {
                            return Err(ShapeError::IdImmutable);
                        }
                        Op::Rename(path.clone(), target)
                    }
                    other => return Err(ShapeError::UnknownOperator(other.to_string())),
                };
                if op.path() == "_id" {
                    return Err(ShapeError::IdImmutable);
                }
                ops.push(op);
            }
        }
        Ok(UpdateSpec::Atomic(ops))
    }

    pub fn has_atomic(&self) -> bool {
        matches!(self, UpdateSpec::Atomic(_))
    }

    /// Applies this spec to a matched document. `insert_path` is true on
    /// the upsert path, where operators initialize from absent values.
    pub fn apply(&self, target: &mut Document, insert_path: bool) -> Result<(), ShapeError> {
        match self {
            UpdateSpec::Replace(replacement) => {
                if let Some(new_id) = replacement.id() {
                    match target.id() {
                        Some(old_id) if old_id != new_id => return Err(ShapeError::IdImmutable),
                        _ => {}
                    }
                }
                let id = target.id().cloned();
                *target = replacement.clone();
                if let Some(id) = id {
                    target.set_id(id);
                }
                Ok(())
            }
            UpdateSpec::Atomic(ops) => {
                for op in ops {
                    apply_op(target, op, insert_path)?;
                }
                Ok(())
            }
        }
    }

    /// Seeds the base document for an upsert: a replacement spec is the
    /// base itself; an atomic spec starts from the query's equality
    /// literals and applies its operators on the insert path.
    pub fn upsert_base(&self, query: &Query) -> Result<Document, ShapeError> {
        match self {
            UpdateSpec::Replace(replacement) => Ok(replacement.clone()),
            UpdateSpec::Atomic(_) => {
                let mut base = Document::new();
                for (field, value) in query.equality_literals() {
                    if field.contains('.') {
                        base.set_path(&field, value);
                    } else {
                        base.insert(field, value);
                    }
                }
                self.apply(&mut base, true)?;
                Ok(base)
            }
        }
    }
}

fn apply_op(target: &mut Document, op: &Op, insert_path: bool) -> Result<(), ShapeError> {
    match op {
        Op::Set(path, value) => {
            target.set_path(path, value.clone());
            Ok(())
        }
        Op::Unset(path) => {
            target.remove_path(path);
            Ok(())
        }
        Op::Inc(path, delta) => {
            let current = match target.get_path(path) {
                Some(DocValue::Number(n)) => *n,
                Some(_) => return Err(ShapeError::NonNumericInc(path.clone())),
                // Absent values increment from zero; on the update path
                // this matches the insert-path behavior.
                None if insert_path => 0.0,
                None => 0.0,
            };
            target.set_path(path, DocValue::Number(current + delta));
            Ok(())
        }
        Op::Push(path, value) => {
            match target.remove_path(path) {
                Some(DocValue::Array(mut items)) => {
                    items.push(value.clone());
                    target.set_path(path, DocValue::Array(items));
                }
                Some(_) => {
                    return Err(ShapeError::BadTarget {
                        op: "$push",
                        path: path.clone(),
                    })
                }
                None => target.set_path(path, DocValue::Array(vec![value.clone()])),
            }
            Ok(())
        }
        Op::Pop(path, dir) => {
            match target.remove_path(path) {
                Some(DocValue::Array(mut items)) => {
                    if !items.is_empty() {
                        if *dir < 0 {
                            items.remove(0);
                        } else {
                            items.pop();
                        }
                    }
                    target.set_path(path, DocValue::Array(items));
                }
                Some(other) => {
                    target.set_path(path, other);
                    return Err(ShapeError::BadTarget {
                        op: "$pop",
                        path: path.clone(),
                    });
                }
                None => {}
            }
            Ok(())
        }
        Op::Rename(from, to) => {
            if let Some(value) = target.remove_path(from) {
                target.set_path(to, value);
            }
            Ok(())
        }
    }
}
