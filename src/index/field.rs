//! Secondary field indexes
//!
//! A `FieldIndex` is an ordered structure mapping indexed values to the set
//! of identifiers currently holding that value. It supports point lookup,
//! bounded range lookup, full ordered traversal, and removal of a specific
//! (value, identifier) pair. After any successful write, every live index
//! reflects exactly the current document state.
//!
//! The identifier type is generic: collection indexes use simplified key
//! strings, while the planner builds temporary sort indexes over raw log
//! offsets.

use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;

use crate::document::Document;

use super::errors::IndexError;
use super::key::IndexKey;
use super::spec::IndexSpec;

/// Options for a declared index.
#[derive(Debug, Clone, Copy, Default)]
pub struct IndexOptions {
    /// Reject a second document carrying an already-indexed value.
    pub unique: bool,
    /// Index one entry per element of array-valued fields.
    pub array_mode: bool,
}

/// An ordered value-to-identifier-set index over one field path or a
/// composite key.
#[derive(Debug, Clone)]
pub struct FieldIndex<V: Ord + Clone = String> {
    name: String,
    spec: IndexSpec,
    unique: bool,
    array_mode: bool,
    tree: BTreeMap<IndexKey, BTreeSet<V>>,
}

impl<V: Ord + Clone> FieldIndex<V> {
    pub fn new(spec: IndexSpec, options: IndexOptions) -> Self {
        FieldIndex {
            name: spec.name(),
            unique: options.unique,
            array_mode: options.array_mode,
            spec,
            tree: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Normalized field-spec key this index is registered under.
    pub fn key(&self) -> String {
        self.spec.key()
    }

    pub fn spec(&self) -> &IndexSpec {
        &self.spec
    }

    pub fn is_unique(&self) -> bool {
        self.unique
    }

    /// Whether a query on this single field path can be served here.
    pub fn supports(&self, field_path: &str) -> bool {
        self.spec.fields.len() == 1 && self.spec.fields[0] == field_path
    }

    /// Index keys a document contributes. Composite indexes contribute one
    /// composite key; array mode contributes one key per element.
    fn keys_for(&self, doc: &Document) -> Vec<IndexKey> {
        if self.spec.is_composite() {
            let parts = self
                .spec
                .fields
                .iter()
                .map(|f| {
                    doc.get_path(f)
                        .map(IndexKey::from_value)
                        .unwrap_or(IndexKey::Null)
                })
                .collect();
            return vec![IndexKey::Composite(parts)];
        }

        let field = &self.spec.fields[0];
        match doc.get_path(field) {
            Some(crate::document::DocValue::Array(items)) if self.array_mode => {
                items.iter().map(IndexKey::from_value).collect()
            }
            Some(value) => vec![IndexKey::from_value(value)],
            None => vec![IndexKey::Null],
        }
    }

    /// Checks unique constraints without mutating; called before the log
    /// append so a violating document never reaches the file.
    pub fn check_unique(&self, doc: &Document, id: &V) -> Result<(), IndexError> {
        if !self.unique {
            return Ok(());
        }
        for key in self.keys_for(doc) {
            if let Some(ids) = self.tree.get(&key) {
                if ids.iter().any(|existing| existing != id) {
                    return Err(IndexError::DuplicateKey {
                        index: self.name.clone(),
                        key: format!("{:?}", key),
                    });
                }
            }
        }
        Ok(())
    }

    /// Registers a document's current values under its identifier.
    pub fn set(&mut self, doc: &Document, id: V) {
        for key in self.keys_for(doc) {
            self.tree.entry(key).or_default().insert(id.clone());
        }
    }

    /// Removes a document's values for its identifier. Keys left without
    /// identifiers are dropped entirely.
    pub fn del(&mut self, doc: &Document, id: &V) {
        for key in self.keys_for(doc) {
            if let Some(ids) = self.tree.get_mut(&key) {
                ids.remove(id);
                if ids.is_empty() {
                    self.tree.remove(&key);
                }
            }
        }
    }

    /// Full traversal, ascending by indexed value. An identifier indexed
    /// under several values (array mode) appears once, at its first.
    pub fn all(&self) -> Vec<V> {
        let mut seen: BTreeSet<&V> = BTreeSet::new();
        let mut out = Vec::new();
        for ids in self.tree.values() {
            for id in ids {
                if seen.insert(id) {
                    out.push(id.clone());
                }
            }
        }
        out
    }

    /// Identifiers holding exactly this value.
    pub fn lookup_eq(&self, key: &IndexKey) -> Vec<V> {
        self.tree
            .get(key)
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Identifiers within the given bounds, ascending by value, each
    /// emitted once. Each bound is a key plus an inclusivity flag.
    pub fn lookup_range(
        &self,
        min: Option<(&IndexKey, bool)>,
        max: Option<(&IndexKey, bool)>,
    ) -> Vec<V> {
        let lower = match min {
            Some((key, true)) => Bound::Included(key),
            Some((key, false)) => Bound::Excluded(key),
            None => Bound::Unbounded,
        };
        let upper = match max {
            Some((key, true)) => Bound::Included(key),
            Some((key, false)) => Bound::Excluded(key),
            None => Bound::Unbounded,
        };

        let mut seen: BTreeSet<&V> = BTreeSet::new();
        let mut out = Vec::new();
        for ids in self.tree.range((lower, upper)).map(|(_, ids)| ids) {
            for id in ids {
                if seen.insert(id) {
                    out.push(id.clone());
                }
            }
        }
        out
    }

    /// Number of distinct indexed values.
    pub fn key_count(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }
}
