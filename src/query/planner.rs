//! Query planning
//!
//! `find_positions` turns a compiled query plus sort/skip/limit into the
//! ordered list of log offsets to materialize. It prefers index-driven
//! retrieval over full scans, intersects multiple index result sets
//! smallest-first, and elides an explicit sort pass whenever an index can
//! supply the order directly. Only the residual predicate (conditions no
//! index served) forces document materialization.

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::document::Document;
use crate::errors::DbError;
use crate::index::{FieldIndex, IndexKey, IndexOptions, IndexSpec};

use super::expr::{Condition, Query};
use super::matcher;

/// One planner invocation. `limit == 0` means unbounded.
#[derive(Debug, Clone)]
pub struct FindPlan {
    pub query: Query,
    pub sort: Option<IndexSpec>,
    pub skip: usize,
    pub limit: usize,
    /// Restricts index selection to these fields when present.
    pub hint: Option<Vec<String>>,
}

/// Resolves a plan to log offsets, in result order.
///
/// `store` is the live position index, `indexes` the declared field
/// indexes keyed by normalized spec key, and `fetch` materializes a
/// document from its offset (cache first, then log).
pub fn find_positions<F>(
    store: &HashMap<String, u64>,
    indexes: &BTreeMap<String, FieldIndex>,
    mut plan: FindPlan,
    array_aware: bool,
    mut fetch: F,
) -> Result<Vec<u64>, DbError>
where
    F: FnMut(u64) -> Result<Document, DbError>,
{
    let sort_key = plan.sort.as_ref().map(|s| s.key());
    let descending = plan.sort.as_ref().map(|s| s.order < 0).unwrap_or(false);

    // Candidate index fields: index-servable conditions, restricted by the
    // hint, restricted to declared single-field indexes.
    let mut index_fields: Vec<String> = plan
        .query
        .indexable_fields()
        .into_iter()
        .filter(|f| {
            plan.hint
                .as_ref()
                .map(|h| h.iter().any(|hf| hf == f))
                .unwrap_or(true)
        })
        .filter(|f| {
            indexes
                .get(f.as_str())
                .map_or(false, |index| index.supports(f))
        })
        .collect();

    let mut candidates: Vec<u64>;
    // True when `candidates` is already in the requested sort order.
    let mut sorted = false;

    if !index_fields.is_empty() {
        // Resolve each field's condition against its index; the condition
        // leaves the query so only the residual predicate remains.
        let mut id_sets: Vec<Vec<String>> = Vec::with_capacity(index_fields.len());
        for field in &index_fields {
            let cond = match plan.query.split(field) {
                Some(cond) => cond,
                None => continue,
            };
            let index = match indexes.get(field) {
                Some(index) => index,
                None => continue,
            };
            id_sets.push(resolve_against(index, &cond));
        }

        let ids = if id_sets.len() == 1 {
            let only = id_sets.pop().unwrap_or_default();
            // A single index whose field is the sort key yields the result
            // pre-sorted; range lookups traverse ascending.
            if index_fields.len() == 1 && sort_key.as_deref() == Some(index_fields[0].as_str()) {
                sorted = true;
            }
            only
        } else {
            intersect_smallest_first(id_sets)
        };

        candidates = ids.iter().filter_map(|id| store.get(id).copied()).collect();
        if sorted && descending {
            candidates.reverse();
        }
    } else if let Some(key) = sort_key.as_deref().filter(|k| indexes.contains_key(*k)) {
        // No usable query index, but the sort key has one: seed from its
        // ordered traversal and skip the sort pass.
        let index = &indexes[key];
        candidates = index
            .all()
            .iter()
            .filter_map(|id| store.get(id).copied())
            .collect();
        if descending {
            candidates.reverse();
        }
        sorted = true;
    } else {
        // Full scan, in log order.
        candidates = store.values().copied().collect();
        candidates.sort_unstable();
    }

    // An index over the sort key can still order an unsorted candidate set
    // by intersecting its full traversal against the candidates.
    if !sorted {
        if let Some(index) = sort_key.as_deref().and_then(|k| indexes.get(k)) {
            let wanted: HashSet<u64> = candidates.iter().copied().collect();
            candidates = index
                .all()
                .iter()
                .filter_map(|id| store.get(id).copied())
                .filter(|pos| wanted.contains(pos))
                .collect();
            if descending {
                candidates.reverse();
            }
            sorted = true;
        }
    }

    let sort_pending = plan.sort.is_some() && !sorted;

    // Nothing left to evaluate and nothing left to order: slice directly.
    if plan.query.is_empty() && !sort_pending {
        return Ok(slice(candidates, plan.skip, plan.limit));
    }

    if sort_pending {
        // Matching offsets feed a temporary index on the sort key, which is
        // then read back in order.
        let spec = plan
            .sort
            .clone()
            .unwrap_or_else(|| IndexSpec::single("_id"));
        let mut sorter: FieldIndex<u64> = FieldIndex::new(spec, IndexOptions::default());
        for pos in candidates {
            let doc = fetch(pos)?;
            if matcher::matches(&doc, &plan.query, array_aware) {
                sorter.set(&doc, pos);
            }
        }
        let mut ordered = sorter.all();
        if descending {
            ordered.reverse();
        }
        return Ok(slice(ordered, plan.skip, plan.limit));
    }

    // Order is already settled, so skip while scanning and stop at limit.
    let mut out = Vec::new();
    let mut skipped = 0;
    for pos in candidates {
        let doc = fetch(pos)?;
        if !matcher::matches(&doc, &plan.query, array_aware) {
            continue;
        }
        if skipped < plan.skip {
            skipped += 1;
            continue;
        }
        out.push(pos);
        if plan.limit > 0 && out.len() == plan.limit {
            break;
        }
    }
    Ok(out)
}

/// Resolves one index-servable condition to identifiers, ascending by
/// indexed value.
fn resolve_against(index: &FieldIndex, cond: &Condition) -> Vec<String> {
    match cond {
        Condition::Eq(value) => index.lookup_eq(&IndexKey::from_value(value)),
        Condition::Range { min, max } => {
            let mut lo = min
                .as_ref()
                .map(|(value, inclusive)| (IndexKey::from_value(value), *inclusive));
            let mut hi = max
                .as_ref()
                .map(|(value, inclusive)| (IndexKey::from_value(value), *inclusive));
            if let (Some((l, _)), Some((h, _))) = (&lo, &hi) {
                // Bounds of different type ranks bracket an empty set; no
                // value satisfies both under the matcher either.
                if std::mem::discriminant(l) != std::mem::discriminant(h) {
                    return Vec::new();
                }
            }
            // An open side is closed at the present bound's type rank so a
            // numeric range never sweeps strings or missing-field entries.
            if lo.is_none() {
                lo = hi.as_ref().map(|(h, _)| (rank_floor(h), true));
            }
            if hi.is_none() {
                hi = lo
                    .as_ref()
                    .and_then(|(l, _)| rank_ceiling(l).map(|k| (k, true)));
            }
            index.lookup_range(
                lo.as_ref().map(|(k, i)| (k, *i)),
                hi.as_ref().map(|(k, i)| (k, *i)),
            )
        }
        Condition::Other(_) => Vec::new(),
    }
}

/// Smallest key of the bound's type rank.
fn rank_floor(key: &IndexKey) -> IndexKey {
    match key {
        IndexKey::Null => IndexKey::Null,
        IndexKey::Bool(_) => IndexKey::Bool(false),
        IndexKey::Number(_) => IndexKey::Number(0),
        IndexKey::String(_) => IndexKey::String(String::new()),
        IndexKey::Composite(_) => IndexKey::Composite(Vec::new()),
    }
}

/// Largest key of the bound's type rank, or `None` when the rank has no
/// upper neighbor in a single-field index (strings sort last there).
fn rank_ceiling(key: &IndexKey) -> Option<IndexKey> {
    match key {
        IndexKey::Null => Some(IndexKey::Null),
        IndexKey::Bool(_) => Some(IndexKey::Bool(true)),
        IndexKey::Number(_) => Some(IndexKey::Number(u64::MAX)),
        IndexKey::String(_) | IndexKey::Composite(_) => None,
    }
}

/// Intersects id sets starting from the smallest, preserving its order.
fn intersect_smallest_first(mut sets: Vec<Vec<String>>) -> Vec<String> {
    if sets.is_empty() {
        return Vec::new();
    }
    sets.sort_by_key(Vec::len);
    let rest = sets.split_off(1);
    let seed = sets.pop().unwrap_or_default();
    let filters: Vec<HashSet<&str>> = rest
        .iter()
        .map(|set| set.iter().map(String::as_str).collect())
        .collect();
    seed.into_iter()
        .filter(|id| filters.iter().all(|f| f.contains(id.as_str())))
        .collect()
}

fn slice(mut positions: Vec<u64>, skip: usize, limit: usize) -> Vec<u64> {
    if skip >= positions.len() {
        return Vec::new();
    }
    let mut tail = positions.split_off(skip);
    if limit > 0 && tail.len() > limit {
        tail.truncate(limit);
    }
    tail
}
