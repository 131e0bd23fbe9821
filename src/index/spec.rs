//! Index and sort specification normalization
//!
//! Index declarations and cursor sorts share one normal form: a field list
//! plus a direction. The normalized key (sorted field list joined by `,`)
//! identifies an index; declaring the same key twice returns the existing
//! index. Distinct field specs are always distinct indexes, with no
//! de-duplication by semantic overlap.

use serde_json::Value;

use crate::query::QueryError;

/// A normalized index or sort specification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    /// Field paths, sorted lexicographically.
    pub fields: Vec<String>,
    /// 1 ascending, -1 descending.
    pub order: i32,
}

impl IndexSpec {
    /// Single ascending field.
    pub fn single(field: impl Into<String>) -> Self {
        IndexSpec {
            fields: vec![field.into()],
            order: 1,
        }
    }

    /// Parses `"num"`, `{"num": 1}`, `{"num": -1}`, or a multi-field
    /// object. Returns `None` for an empty specification.
    pub fn parse(spec: &Value) -> Result<Option<Self>, QueryError> {
        match spec {
            Value::Null => Ok(None),
            Value::String(field) => {
                if field.is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(IndexSpec::single(field.clone())))
                }
            }
            Value::Object(map) => {
                if map.is_empty() {
                    return Ok(None);
                }
                let mut fields = Vec::with_capacity(map.len());
                let mut order = 0;
                for (field, direction) in map {
                    let dir = direction.as_i64().ok_or_else(|| {
                        QueryError::BadSortSpec(format!(
                            "direction for {:?} must be 1 or -1",
                            field
                        ))
                    })?;
                    if dir != 1 && dir != -1 {
                        return Err(QueryError::BadSortSpec(format!(
                            "direction for {:?} must be 1 or -1",
                            field
                        )));
                    }
                    if order == 0 {
                        order = dir as i32;
                    }
                    fields.push(field.clone());
                }
                fields.sort();
                Ok(Some(IndexSpec { fields, order }))
            }
            other => Err(QueryError::BadSortSpec(format!(
                "unsupported specification {}",
                other
            ))),
        }
    }

    /// The normalized key identifying this spec.
    pub fn key(&self) -> String {
        self.fields.join(",")
    }

    pub fn is_composite(&self) -> bool {
        self.fields.len() > 1
    }

    /// Canonical index name; the identifier index is always `_id_`.
    pub fn name(&self) -> String {
        let key = self.key();
        if key == "_id" {
            "_id_".to_string()
        } else {
            format!("{}_{}", key, self.order)
        }
    }
}
