//! Query result cursors
//!
//! A cursor is a lazy handle over one planner invocation: skip, limit,
//! sort, hint, and projection accumulate on the builder, and every
//! materialization re-runs planning against current state. There is no
//! snapshot isolation between separate executions of the same cursor.

use serde_json::Value;

use crate::document::Document;
use crate::errors::DbResult;
use crate::index::IndexSpec;
use crate::query::{FindPlan, Query, QueryError};

use super::Collection;

pub struct Cursor {
    collection: Collection,
    query: Query,
    projection: Option<Projection>,
    skip: usize,
    limit: usize,
    sort: Option<IndexSpec>,
    hint: Option<Vec<String>>,
}

impl Cursor {
    pub(super) fn new(collection: Collection, query: Query) -> Self {
        Cursor {
            collection,
            query,
            projection: None,
            skip: 0,
            limit: 0,
            sort: None,
            hint: None,
        }
    }

    pub fn skip(mut self, n: usize) -> Self {
        self.skip = n;
        self
    }

    /// `0` means unbounded.
    pub fn limit(mut self, n: usize) -> Self {
        self.limit = n;
        self
    }

    /// Sort specification: `"num"`, `{"num": 1}`, or `{"num": -1}`.
    pub fn sort(mut self, spec: &Value) -> DbResult<Self> {
        self.sort = IndexSpec::parse(spec)?;
        Ok(self)
    }

    /// Projection over returned documents.
    pub fn fields(mut self, spec: &Value) -> DbResult<Self> {
        self.projection = Projection::parse(spec)?;
        Ok(self)
    }

    /// Restricts index selection to the named fields.
    pub fn hint(mut self, spec: &Value) -> DbResult<Self> {
        self.hint = match IndexSpec::parse(spec)? {
            Some(parsed) => Some(parsed.fields),
            None => None,
        };
        Ok(self)
    }

    fn plan(&self) -> FindPlan {
        FindPlan {
            query: self.query.clone(),
            sort: self.sort.clone(),
            skip: self.skip,
            limit: self.limit,
            hint: self.hint.clone(),
        }
    }

    /// Materializes the full result set in plan order.
    pub async fn to_vec(&self) -> DbResult<Vec<Document>> {
        let plan = self.plan();
        let docs = self
            .collection
            .queue()
            .shared(move |state| -> DbResult<Vec<Document>> {
                let positions = state.run_find(plan)?;
                positions.iter().map(|pos| state.get_doc(*pos)).collect()
            })
            .await?;
        Ok(match &self.projection {
            Some(projection) => docs.iter().map(|doc| projection.apply(doc)).collect(),
            None => docs,
        })
    }

    /// First result, if any.
    pub async fn next_object(&self) -> DbResult<Option<Document>> {
        let mut plan = self.plan();
        plan.limit = 1;
        let doc = self
            .collection
            .queue()
            .shared(move |state| -> DbResult<Option<Document>> {
                match state.run_find(plan)?.first() {
                    Some(pos) => Ok(Some(state.get_doc(*pos)?)),
                    None => Ok(None),
                }
            })
            .await?;
        Ok(match (&self.projection, doc) {
            (Some(projection), Some(doc)) => Some(projection.apply(&doc)),
            (None, doc) => doc,
            _ => None,
        })
    }

    /// Number of matching documents. Skip and limit do not apply.
    pub async fn count(&self) -> DbResult<usize> {
        let mut plan = self.plan();
        plan.skip = 0;
        plan.limit = 0;
        plan.sort = None;
        self.collection
            .queue()
            .shared(move |state| Ok(state.run_find(plan)?.len()))
            .await
    }
}

/// Inclusion or exclusion field filter applied to results.
#[derive(Debug, Clone, PartialEq)]
pub(super) enum Projection {
    /// Listed paths plus the identifier unless explicitly excluded.
    Include { paths: Vec<String>, id: bool },
    Exclude { paths: Vec<String> },
}

impl Projection {
    /// Parses `{"a": 1, "b": 1}` or `{"secret": 0}`. The identifier may be
    /// excluded alongside inclusions; any other mix is rejected.
    pub(super) fn parse(raw: &Value) -> Result<Option<Self>, QueryError> {
        let map = match raw {
            Value::Null => return Ok(None),
            Value::Object(map) if map.is_empty() => return Ok(None),
            Value::Object(map) => map,
            _ => return Err(QueryError::MixedProjection),
        };

        let mut include = Vec::new();
        let mut exclude = Vec::new();
        let mut id = true;
        for (path, flag) in map {
            let truthy = match flag {
                Value::Bool(b) => *b,
                Value::Number(n) => n.as_f64().unwrap_or(0.0) != 0.0,
                _ => return Err(QueryError::MixedProjection),
            };
            if path == "_id" {
                id = truthy;
            } else if truthy {
                include.push(path.clone());
            } else {
                exclude.push(path.clone());
            }
        }

        if !include.is_empty() && !exclude.is_empty() {
            return Err(QueryError::MixedProjection);
        }
        if !include.is_empty() {
            return Ok(Some(Projection::Include { paths: include, id }));
        }
        if !exclude.is_empty() {
            if !id {
                exclude.push("_id".to_string());
            }
            return Ok(Some(Projection::Exclude { paths: exclude }));
        }
        // Only an _id flag was given.
        if id {
            Ok(Some(Projection::Include {
                paths: Vec::new(),
                id: true,
            }))
        } else {
            Ok(Some(Projection::Exclude {
                paths: vec!["_id".to_string()],
            }))
        }
    }

    pub(super) fn apply(&self, doc: &Document) -> Document {
        match self {
            Projection::Include { paths, id } => {
                let mut out = Document::new();
                if *id {
                    if let Some(value) = doc.id() {
                        out.set_id(value.clone());
                    }
                }
                for path in paths {
                    if let Some(value) = doc.get_path(path) {
                        if path.contains('.') {
                            out.set_path(path, value.clone());
                        } else {
                            out.insert(path.clone(), value.clone());
                        }
                    }
                }
                out
            }
            Projection::Exclude { paths } => {
                let mut out = doc.clone();
                for path in paths {
                    out.remove_path(path);
                }
                out
            }
        }
    }
}
