//! Per-collection engine state
//!
//! `CollectionState` owns everything behind the task queue: the record
//! log, the position index rebuilt from it at open time, the declared
//! field indexes, and the object cache. All mutation happens inside an
//! exclusive task; the log and cache sit behind their own mutexes so
//! shared read tasks can still fault documents in.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Mutex;

use chrono::Utc;

use crate::cache::ObjectCache;
use crate::document::{codec, simplify_key, DocValue, Document, ObjectId, ShapeError};
use crate::errors::DbResult;
use crate::index::{FieldIndex, IndexOptions, IndexSpec};
use crate::log::{Entry, EntryKey, RecordLog};
use crate::observability::Logger;
use crate::query::{find_positions, FindPlan};

/// Engine options inherited from the owning database.
#[derive(Debug, Clone, Copy)]
pub struct CollectionOptions {
    /// Total object cache budget, in serialized bytes.
    pub cache_size: usize,
    /// Per-document cache cap; larger documents bypass the cache.
    pub cache_max_obj_size: usize,
    /// Array-aware matching and indexing.
    pub search_in_array: bool,
}

impl Default for CollectionOptions {
    fn default() -> Self {
        CollectionOptions {
            cache_size: 16 * 1024 * 1024,
            cache_max_obj_size: 1024 * 1024,
            search_in_array: false,
        }
    }
}

pub struct CollectionState {
    name: String,
    options: CollectionOptions,
    log: Mutex<RecordLog>,
    cache: Mutex<ObjectCache>,
    /// Position index: simplified identifier to latest snapshot offset.
    store: HashMap<String, u64>,
    /// Declared field indexes, keyed by normalized spec key.
    indexes: BTreeMap<String, FieldIndex>,
    /// Last sequence number written or replayed.
    seq: u64,
}

impl CollectionState {
    /// Opens the collection's log, replays it into the position index, and
    /// declares the mandatory identifier index.
    pub fn open(path: &Path, name: &str, options: CollectionOptions) -> DbResult<Self> {
        let mut log = RecordLog::open(path)?;
        let mut store = HashMap::new();
        let mut seq = 0u64;
        for (offset, key) in log.replay_keys()? {
            seq = seq.max(key.seq);
            if key.is_delete() {
                store.remove(&key.id);
            } else {
                store.insert(key.id, offset);
            }
        }

        let mut state = CollectionState {
            name: name.to_string(),
            options,
            log: Mutex::new(log),
            cache: Mutex::new(ObjectCache::new(
                options.cache_size,
                options.cache_max_obj_size,
            )),
            store,
            indexes: BTreeMap::new(),
            seq,
        };
        state.declare_index(
            IndexSpec::single("_id"),
            IndexOptions {
                unique: true,
                array_mode: false,
            },
        )?;

        Logger::info(
            "COLLECTION_OPEN",
            &[
                ("collection", &state.name),
                ("documents", &state.store.len().to_string()),
            ],
        );
        Ok(state)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn doc_count(&self) -> usize {
        self.store.len()
    }

    pub fn log_size(&self) -> u64 {
        self.log
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    pub fn contains(&self, id_key: &str) -> bool {
        self.store.contains_key(id_key)
    }

    pub fn position_of(&self, id_key: &str) -> Option<u64> {
        self.store.get(id_key).copied()
    }

    /// Materializes the document at a log offset, cache first.
    pub fn get_doc(&self, pos: u64) -> DbResult<Document> {
        if let Some(doc) = self
            .cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(pos)
        {
            return Ok(doc);
        }

        let entry = match self
            .log
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .read_at(pos)
        {
            Ok(entry) => entry,
            Err(err) => {
                Logger::error(
                    "LOG_READ_FAILED",
                    &[
                        ("collection", &self.name),
                        ("offset", &pos.to_string()),
                        ("error", &err.to_string()),
                    ],
                );
                return Err(err.into());
            }
        };
        let wire: serde_json::Value = serde_json::from_slice(&entry.payload)?;
        let doc = codec::document_from_wire(&wire)?;
        self.cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .put(pos, doc.clone(), entry.payload.len());
        Ok(doc)
    }

    /// Resolves a plan to log offsets in result order.
    pub fn run_find(&self, plan: FindPlan) -> DbResult<Vec<u64>> {
        find_positions(
            &self.store,
            &self.indexes,
            plan,
            self.options.search_in_array,
            |pos| self.get_doc(pos),
        )
    }

    /// Persists a document snapshot: validate, append, then bring the
    /// position index, field indexes, and cache in line. Returns the new
    /// offset. The log write happens before any in-memory mutation so a
    /// failure leaves the indexes untouched for this document.
    pub fn put_doc(&mut self, doc: &mut Document) -> DbResult<u64> {
        doc.validate_shape()?;
        if doc.id().is_none() {
            doc.set_id(DocValue::Id(ObjectId::new()));
        }
        let id = doc.id().cloned().ok_or(ShapeError::MissingId)?;
        let id_key = simplify_key(&id);

        let payload = serde_json::to_vec(&codec::document_to_wire(doc))?;
        for index in self.indexes.values().filter(|index| index.is_unique()) {
            index.check_unique(doc, &id_key)?;
        }

        let old_pos = self.store.get(&id_key).copied();
        let old_doc = match old_pos {
            Some(pos) => Some(self.get_doc(pos)?),
            None => None,
        };

        self.seq += 1;
        let entry = Entry {
            key: EntryKey::snapshot(&id_key, self.seq, Utc::now().timestamp_millis(), &payload),
            payload,
        };
        let pos = self
            .log
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .append(&entry)?;

        // Old values leave the indexes before new ones enter, so an
        // overwrite never leaves stale entries behind.
        if let Some(old) = &old_doc {
            for index in self.indexes.values_mut() {
                index.del(old, &id_key);
            }
        }
        if let Some(old) = old_pos {
            self.cache
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .remove(old);
        }
        for index in self.indexes.values_mut() {
            index.set(doc, id_key.clone());
        }
        self.store.insert(id_key, pos);
        self.cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .put(pos, doc.clone(), entry.payload.len());
        Ok(pos)
    }

    /// Appends a delete marker and drops the document from the position
    /// index, every field index, and the cache.
    pub fn remove_doc(&mut self, id_key: &str) -> DbResult<bool> {
        let pos = match self.store.get(id_key).copied() {
            Some(pos) => pos,
            None => return Ok(false),
        };
        let doc = self.get_doc(pos)?;
        let id_owned = id_key.to_string();

        self.seq += 1;
        let entry = Entry {
            key: EntryKey::delete(id_key, self.seq, Utc::now().timestamp_millis()),
            payload: Vec::new(),
        };
        self.log
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .append(&entry)?;

        for index in self.indexes.values_mut() {
            index.del(&doc, &id_owned);
        }
        self.store.remove(id_key);
        self.cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(pos);
        Ok(true)
    }

    /// Declares a field index and backfills it from the current document
    /// set. Idempotent: re-declaring a registered spec key returns the
    /// existing index's name without rebuilding.
    pub fn declare_index(&mut self, spec: IndexSpec, options: IndexOptions) -> DbResult<String> {
        let key = spec.key();
        if let Some(existing) = self.indexes.get(&key) {
            return Ok(existing.name().to_string());
        }

        let mut index = FieldIndex::new(
            spec,
            IndexOptions {
                unique: options.unique,
                array_mode: options.array_mode || self.options.search_in_array,
            },
        );
        let positions: Vec<(String, u64)> = self
            .store
            .iter()
            .map(|(id, pos)| (id.clone(), *pos))
            .collect();
        for (id, pos) in positions {
            let doc = self.get_doc(pos)?;
            index.check_unique(&doc, &id)?;
            index.set(&doc, id);
        }

        if !self.store.is_empty() {
            Logger::info(
                "INDEX_BACKFILL",
                &[
                    ("collection", &self.name),
                    ("index", index.name()),
                    ("documents", &self.store.len().to_string()),
                    ("keys", &index.key_count().to_string()),
                ],
            );
        }
        let name = index.name().to_string();
        self.indexes.insert(key, index);
        Ok(name)
    }

    pub fn index_for(&self, key: &str) -> Option<&FieldIndex> {
        self.indexes.get(key)
    }

    pub fn index_names(&self) -> Vec<String> {
        self.indexes
            .values()
            .map(|index| index.name().to_string())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn doc(raw: serde_json::Value) -> Document {
        Document::try_from(raw).unwrap()
    }

    fn open(dir: &TempDir) -> CollectionState {
        CollectionState::open(
            &dir.path().join("c1"),
            "c1",
            CollectionOptions::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_put_get_roundtrip() {
        let dir = TempDir::new().unwrap();
        let mut state = open(&dir);

        let mut d = doc(json!({"_id": "a", "num": 1}));
        let pos = state.put_doc(&mut d).unwrap();
        assert_eq!(state.get_doc(pos).unwrap(), d);
        assert_eq!(state.position_of("a"), Some(pos));
        assert_eq!(state.doc_count(), 1);
    }

    #[test]
    fn test_missing_id_is_generated() {
        let dir = TempDir::new().unwrap();
        let mut state = open(&dir);

        let mut d = doc(json!({"num": 1}));
        state.put_doc(&mut d).unwrap();
        assert!(matches!(d.id(), Some(DocValue::Id(_))));
    }

    #[test]
    fn test_overwrite_is_last_writer_wins() {
        let dir = TempDir::new().unwrap();
        let mut state = open(&dir);

        let mut v1 = doc(json!({"_id": "a", "num": 1}));
        let p1 = state.put_doc(&mut v1).unwrap();
        let mut v2 = doc(json!({"_id": "a", "num": 2}));
        let p2 = state.put_doc(&mut v2).unwrap();

        assert_ne!(p1, p2);
        assert_eq!(state.doc_count(), 1);
        assert_eq!(state.get_doc(state.position_of("a").unwrap()).unwrap(), v2);
    }

    #[test]
    fn test_replay_restores_state() {
        let dir = TempDir::new().unwrap();
        {
            let mut state = open(&dir);
            state.put_doc(&mut doc(json!({"_id": "a", "num": 1}))).unwrap();
            state.put_doc(&mut doc(json!({"_id": "b", "num": 2}))).unwrap();
            state.put_doc(&mut doc(json!({"_id": "a", "num": 3}))).unwrap();
            state.remove_doc("b").unwrap();
        }

        let state = open(&dir);
        assert_eq!(state.doc_count(), 1);
        let pos = state.position_of("a").unwrap();
        assert_eq!(
            state.get_doc(pos).unwrap().get("num"),
            Some(&DocValue::Number(3.0))
        );
        assert_eq!(state.position_of("b"), None);
    }

    #[test]
    fn test_remove_clears_indexes() {
        let dir = TempDir::new().unwrap();
        let mut state = open(&dir);
        state
            .declare_index(IndexSpec::single("num"), IndexOptions::default())
            .unwrap();
        state.put_doc(&mut doc(json!({"_id": "a", "num": 1}))).unwrap();

        assert!(state.remove_doc("a").unwrap());
        assert!(!state.remove_doc("a").unwrap());
        assert!(state.index_for("num").map(|i| i.is_empty()).unwrap_or(false));
        assert!(state
            .index_for("_id")
            .map(|i| i.is_empty())
            .unwrap_or(false));
    }

    #[test]
    fn test_index_backfill_and_idempotence() {
        let dir = TempDir::new().unwrap();
        let mut state = open(&dir);
        for i in 0..5 {
            state
                .put_doc(&mut doc(json!({"_id": format!("d{}", i), "num": i})))
                .unwrap();
        }

        let name = state
            .declare_index(IndexSpec::single("num"), IndexOptions::default())
            .unwrap();
        assert_eq!(name, "num_1");
        assert_eq!(state.index_for("num").unwrap().all().len(), 5);

        // Re-declaration returns the same name without rebuilding.
        let again = state
            .declare_index(IndexSpec::single("num"), IndexOptions::default())
            .unwrap();
        assert_eq!(again, name);
    }

    #[test]
    fn test_index_tracks_updates() {
        let dir = TempDir::new().unwrap();
        let mut state = open(&dir);
        state
            .declare_index(IndexSpec::single("num"), IndexOptions::default())
            .unwrap();

        state.put_doc(&mut doc(json!({"_id": "a", "num": 1}))).unwrap();
        state.put_doc(&mut doc(json!({"_id": "a", "num": 9}))).unwrap();

        let index = state.index_for("num").unwrap();
        use crate::index::IndexKey;
        assert!(index.lookup_eq(&IndexKey::from_number(1.0)).is_empty());
        assert_eq!(index.lookup_eq(&IndexKey::from_number(9.0)), vec!["a"]);
    }
}
