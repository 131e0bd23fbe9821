//! Deserialized document cache
//!
//! Maps log offsets to materialized documents so repeated reads skip the
//! file and the codec. Bounded by total accounted size with LRU eviction;
//! a document larger than the per-object cap bypasses caching entirely.
//! The cache is never authoritative: a miss means nothing about the
//! document's existence.

use lru::LruCache;

use crate::document::Document;

pub struct ObjectCache {
    entries: LruCache<u64, (Document, usize)>,
    total: usize,
    capacity: usize,
    max_object: usize,
}

impl ObjectCache {
    /// `capacity` bounds the summed entry sizes; `max_object` caps any
    /// single entry. Sizes are the serialized payload lengths reported by
    /// the caller.
    pub fn new(capacity: usize, max_object: usize) -> Self {
        ObjectCache {
            entries: LruCache::unbounded(),
            total: 0,
            capacity,
            max_object,
        }
    }

    pub fn get(&mut self, offset: u64) -> Option<Document> {
        self.entries.get(&offset).map(|(doc, _)| doc.clone())
    }

    pub fn put(&mut self, offset: u64, doc: Document, size: usize) {
        if size > self.max_object || size > self.capacity {
            return;
        }
        if let Some((_, old)) = self.entries.put(offset, (doc, size)) {
            self.total -= old;
        }
        self.total += size;
        while self.total > self.capacity {
            match self.entries.pop_lru() {
                Some((_, (_, evicted))) => self.total -= evicted,
                None => break,
            }
        }
    }

    /// Drops a stale entry after its document is superseded or removed.
    pub fn remove(&mut self, offset: u64) {
        if let Some((_, size)) = self.entries.pop(&offset) {
            self.total -= size;
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total_size(&self) -> usize {
        self.total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::DocValue;

    fn doc(tag: u64) -> Document {
        let mut d = Document::new();
        d.insert("tag", DocValue::Number(tag as f64));
        d
    }

    #[test]
    fn test_get_after_put() {
        let mut cache = ObjectCache::new(1024, 256);
        cache.put(0, doc(1), 10);
        assert_eq!(cache.get(0), Some(doc(1)));
        assert_eq!(cache.get(99), None);
    }

    #[test]
    fn test_lru_eviction_by_total_size() {
        let mut cache = ObjectCache::new(100, 100);
        cache.put(0, doc(0), 40);
        cache.put(1, doc(1), 40);
        // Touch offset 0 so offset 1 is the eviction victim.
        cache.get(0);
        cache.put(2, doc(2), 40);

        assert!(cache.get(1).is_none());
        assert!(cache.get(0).is_some());
        assert!(cache.get(2).is_some());
        assert!(cache.total_size() <= 100);
    }

    #[test]
    fn test_oversized_entry_bypasses() {
        let mut cache = ObjectCache::new(1024, 50);
        cache.put(0, doc(0), 51);
        assert!(cache.is_empty());
        cache.put(1, doc(1), 50);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_replace_adjusts_accounting() {
        let mut cache = ObjectCache::new(100, 100);
        cache.put(0, doc(0), 60);
        cache.put(0, doc(1), 30);
        assert_eq!(cache.total_size(), 30);
        assert_eq!(cache.get(0), Some(doc(1)));
    }

    #[test]
    fn test_remove_frees_space() {
        let mut cache = ObjectCache::new(100, 100);
        cache.put(0, doc(0), 60);
        cache.remove(0);
        assert_eq!(cache.total_size(), 0);
        assert!(cache.get(0).is_none());
    }
}
