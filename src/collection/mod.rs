//! Collection API
//!
//! `Collection` is the public surface of one document collection. Every
//! operation runs as a task against the shared `CollectionState`: writes
//! exclusively, reads concurrently with each other. Shape and query
//! compilation errors surface before anything is queued.

mod cursor;
mod state;

use std::path::Path;
use std::sync::Arc;

use serde_json::Value;

use crate::document::{codec, simplify_key, DocValue, Document, ObjectId};
use crate::errors::{DbError, DbResult};
use crate::index::{IndexOptions, IndexSpec};
use crate::query::{FindPlan, Query, QueryError};
use crate::queue::TaskQueue;
use crate::update::UpdateSpec;

pub use cursor::Cursor;
pub use state::{CollectionOptions, CollectionState};

use cursor::Projection;

/// Outcome of an `update` call.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateResult {
    /// Documents updated, or 1 for an upsert.
    pub n: usize,
    pub updated_existing: bool,
    /// Identifier of the document created by an upsert.
    pub upserted: Option<DocValue>,
}

/// Outcome of a `save` call.
#[derive(Debug, Clone, PartialEq)]
pub enum SaveResult {
    /// A new document was created with this identifier.
    Created(DocValue),
    /// An existing document was overwritten.
    Updated,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct UpdateOptions {
    pub multi: bool,
    pub upsert: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RemoveOptions {
    /// Remove at most one matching document.
    pub single: bool,
}

#[derive(Debug, Clone, Default)]
pub struct FindModifyOptions {
    /// Return the post-update document instead of the pre-image.
    pub new: bool,
    pub upsert: bool,
    /// Projection applied to the returned document.
    pub fields: Option<Value>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct EnsureIndexOptions {
    pub unique: bool,
}

/// Point-in-time collection statistics.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionStats {
    pub name: String,
    pub count: usize,
    pub log_size: u64,
    pub indexes: usize,
}

/// A handle to one open collection. Cloning shares the underlying state.
#[derive(Clone)]
pub struct Collection {
    inner: Arc<CollectionInner>,
}

struct CollectionInner {
    name: String,
    queue: TaskQueue<CollectionState>,
}

impl Collection {
    /// Opens the collection backed by the log file at `path`, replaying it
    /// into memory.
    pub fn open(path: &Path, name: &str, options: CollectionOptions) -> DbResult<Self> {
        let state = CollectionState::open(path, name, options)?;
        Ok(Collection {
            inner: Arc::new(CollectionInner {
                name: name.to_string(),
                queue: TaskQueue::new(state),
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub(crate) fn queue(&self) -> &TaskQueue<CollectionState> {
        &self.inner.queue
    }

    /// Inserts documents, generating identifiers where absent. A duplicate
    /// identifier aborts the task; documents already written stay durable.
    pub async fn insert(&self, docs: &[Value]) -> DbResult<Vec<Document>> {
        let mut parsed = Vec::with_capacity(docs.len());
        for raw in docs {
            let doc = codec::document_from_wire(raw)?;
            doc.validate_shape()?;
            parsed.push(doc);
        }

        self.inner
            .queue
            .exclusive(move |state| {
                let mut out = Vec::with_capacity(parsed.len());
                for mut doc in parsed {
                    if let Some(id) = doc.id() {
                        let key = simplify_key(id);
                        if state.contains(&key) {
                            return Err(DbError::DuplicateId(key));
                        }
                    }
                    state.put_doc(&mut doc)?;
                    out.push(doc);
                }
                Ok(out)
            })
            .await
    }

    pub async fn insert_one(&self, doc: &Value) -> DbResult<Document> {
        let mut inserted = self.insert(std::slice::from_ref(doc)).await?;
        inserted.pop().ok_or(DbError::Shape(
            crate::document::ShapeError::NotAnObject,
        ))
    }

    /// Builds a cursor over the matching documents.
    pub fn find(&self, query: &Value) -> DbResult<Cursor> {
        Ok(Cursor::new(self.clone(), Query::compile(query)?))
    }

    pub async fn find_one(&self, query: &Value) -> DbResult<Option<Document>> {
        self.find(query)?.next_object().await
    }

    pub async fn count(&self, query: &Value) -> DbResult<usize> {
        self.find(query)?.count().await
    }

    /// Applies an update to matching documents, or upserts when nothing
    /// matches and `upsert` is set.
    pub async fn update(
        &self,
        query: &Value,
        update: &Value,
        opts: UpdateOptions,
    ) -> DbResult<UpdateResult> {
        let query = Query::compile(query)?;
        let spec = UpdateSpec::parse(update)?;

        self.inner
            .queue
            .exclusive(move |state| {
                let plan = FindPlan {
                    query: query.clone(),
                    sort: None,
                    skip: 0,
                    limit: if opts.multi { 0 } else { 1 },
                    hint: None,
                };
                let positions = state.run_find(plan)?;

                if positions.is_empty() {
                    if !opts.upsert {
                        return Ok(UpdateResult {
                            n: 0,
                            updated_existing: false,
                            upserted: None,
                        });
                    }
                    let mut base = spec.upsert_base(&query)?;
                    if base.id().is_none() {
                        base.set_id(DocValue::Id(ObjectId::new()));
                    }
                    state.put_doc(&mut base)?;
                    return Ok(UpdateResult {
                        n: 1,
                        updated_existing: false,
                        upserted: base.id().cloned(),
                    });
                }

                let mut n = 0;
                for pos in positions {
                    let mut doc = state.get_doc(pos)?;
                    spec.apply(&mut doc, false)?;
                    state.put_doc(&mut doc)?;
                    n += 1;
                }
                Ok(UpdateResult {
                    n,
                    updated_existing: true,
                    upserted: None,
                })
            })
            .await
    }

    /// Inserts the document, or overwrites the existing document carrying
    /// the same identifier.
    pub async fn save(&self, doc: &Value) -> DbResult<SaveResult> {
        let mut doc = codec::document_from_wire(doc)?;
        doc.validate_shape()?;

        self.inner
            .queue
            .exclusive(move |state| {
                let existed = doc
                    .id()
                    .map(|id| state.contains(&simplify_key(id)))
                    .unwrap_or(false);
                state.put_doc(&mut doc)?;
                if existed {
                    Ok(SaveResult::Updated)
                } else {
                    doc.id()
                        .cloned()
                        .map(SaveResult::Created)
                        .ok_or(DbError::Shape(crate::document::ShapeError::MissingId))
                }
            })
            .await
    }

    /// Removes matching documents, returning how many were removed.
    pub async fn remove(&self, query: &Value, opts: RemoveOptions) -> DbResult<usize> {
        let query = Query::compile(query)?;

        self.inner
            .queue
            .exclusive(move |state| {
                let plan = FindPlan {
                    query,
                    sort: None,
                    skip: 0,
                    limit: if opts.single { 1 } else { 0 },
                    hint: None,
                };
                let positions = state.run_find(plan)?;
                let mut removed = 0;
                for pos in positions {
                    let doc = state.get_doc(pos)?;
                    if let Some(id) = doc.id() {
                        if state.remove_doc(&simplify_key(id))? {
                            removed += 1;
                        }
                    }
                }
                Ok(removed)
            })
            .await
    }

    /// Atomically finds one document and applies an update to it,
    /// returning the pre-image (or the post-update document when `new` is
    /// set).
    pub async fn find_and_modify(
        &self,
        query: &Value,
        sort: &Value,
        update: &Value,
        opts: FindModifyOptions,
    ) -> DbResult<Option<Document>> {
        let query = Query::compile(query)?;
        let sort = IndexSpec::parse(sort)?;
        let spec = UpdateSpec::parse(update)?;
        let projection = match &opts.fields {
            Some(fields) => Projection::parse(fields)?,
            None => None,
        };

        self.inner
            .queue
            .exclusive(move |state| {
                let plan = FindPlan {
                    query: query.clone(),
                    sort,
                    skip: 0,
                    limit: 1,
                    hint: None,
                };
                let positions = state.run_find(plan)?;

                let result = match positions.first() {
                    None => {
                        if !opts.upsert {
                            return Ok(None);
                        }
                        let mut base = spec.upsert_base(&query)?;
                        if base.id().is_none() {
                            base.set_id(DocValue::Id(ObjectId::new()));
                        }
                        state.put_doc(&mut base)?;
                        if opts.new {
                            Some(base)
                        } else {
                            None
                        }
                    }
                    Some(&pos) => {
                        let before = state.get_doc(pos)?;
                        let mut after = before.clone();
                        spec.apply(&mut after, false)?;
                        state.put_doc(&mut after)?;
                        Some(if opts.new { after } else { before })
                    }
                };
                Ok(result.map(|doc| match &projection {
                    Some(projection) => projection.apply(&doc),
                    None => doc,
                }))
            })
            .await
    }

    /// Atomically finds one document and removes it, returning the
    /// removed document.
    pub async fn find_and_remove(
        &self,
        query: &Value,
        sort: &Value,
    ) -> DbResult<Option<Document>> {
        let query = Query::compile(query)?;
        let sort = IndexSpec::parse(sort)?;

        self.inner
            .queue
            .exclusive(move |state| {
                let plan = FindPlan {
                    query,
                    sort,
                    skip: 0,
                    limit: 1,
                    hint: None,
                };
                match state.run_find(plan)?.first() {
                    None => Ok(None),
                    Some(&pos) => {
                        let doc = state.get_doc(pos)?;
                        if let Some(id) = doc.id() {
                            state.remove_doc(&simplify_key(id))?;
                        }
                        Ok(Some(doc))
                    }
                }
            })
            .await
    }

    /// Distinct values of a field across matching documents, flattening
    /// array values, in value order.
    pub async fn distinct(&self, field: &str, query: &Value) -> DbResult<Vec<DocValue>> {
        let query = Query::compile(query)?;
        let field = field.to_string();

        self.inner
            .queue
            .shared(move |state| {
                let plan = FindPlan {
                    query,
                    sort: None,
                    skip: 0,
                    limit: 0,
                    hint: None,
                };
                let mut values = Vec::new();
                for pos in state.run_find(plan)? {
                    let doc = state.get_doc(pos)?;
                    match doc.get_path(&field) {
                        Some(DocValue::Array(items)) => values.extend(items.iter().cloned()),
                        Some(value) => values.push(value.clone()),
                        None => {}
                    }
                }
                values.sort_by(crate::document::compare);
                values.dedup();
                Ok(values)
            })
            .await
    }

    pub async fn stats(&self) -> CollectionStats {
        self.inner
            .queue
            .shared(|state| CollectionStats {
                name: state.name().to_string(),
                count: state.doc_count(),
                log_size: state.log_size(),
                indexes: state.index_names().len(),
            })
            .await
    }

    /// Declares an index, backfilling it from existing documents, and
    /// returns its canonical name. Idempotent. When the queue is idle the
    /// registration happens synchronously.
    pub async fn ensure_index(&self, spec: &Value, opts: EnsureIndexOptions) -> DbResult<String> {
        let spec = IndexSpec::parse(spec)?.ok_or(QueryError::NoFields)?;
        let options = IndexOptions {
            unique: opts.unique,
            array_mode: false,
        };

        let queued_spec = spec.clone();
        if let Some(result) = self
            .inner
            .queue
            .try_exclusive(move |state| state.declare_index(queued_spec, options))
        {
            return result;
        }
        self.inner
            .queue
            .exclusive(move |state| state.declare_index(spec, options))
            .await
    }

    pub async fn index_exists(&self, spec: &Value) -> DbResult<bool> {
        let spec = match IndexSpec::parse(spec)? {
            Some(spec) => spec,
            None => return Ok(false),
        };
        let key = spec.key();
        Ok(self
            .inner
            .queue
            .shared(move |state| state.index_for(&key).is_some())
            .await)
    }

    /// Canonical names of all declared indexes.
    pub async fn indexes(&self) -> Vec<String> {
        self.inner.queue.shared(|state| state.index_names()).await
    }
}
