//! In-memory document values
//!
//! Documents are ordered string-keyed maps of `DocValue`. Dates, identifiers,
//! and binary blobs are closed variants determined at construction; the
//! `$wrap` tagging convention exists only on the wire (see `codec`).
//!
//! Numbers carry f64 semantics throughout the engine, matching the
//! comparison rules used by the matcher and the field indexes.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::{DateTime, TimeZone, Utc};

use super::errors::ShapeError;
use super::id::ObjectId;

/// A single document field value.
#[derive(Debug, Clone, PartialEq)]
pub enum DocValue {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    /// Epoch milliseconds.
    Date(i64),
    Id(ObjectId),
    Binary(Vec<u8>),
    Array(Vec<DocValue>),
    Object(Document),
}

impl DocValue {
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        DocValue::Date(dt.timestamp_millis())
    }

    pub fn as_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            DocValue::Date(ms) => Utc.timestamp_millis_opt(*ms).single(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            DocValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            DocValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, DocValue::Null)
    }

    /// Rank used for deterministic cross-type ordering:
    /// Null < Bool < Number < String < Date < Id < Binary < Array < Object.
    pub(crate) fn type_rank(&self) -> u8 {
        match self {
            DocValue::Null => 0,
            DocValue::Bool(_) => 1,
            DocValue::Number(_) => 2,
            DocValue::String(_) => 3,
            DocValue::Date(_) => 4,
            DocValue::Id(_) => 5,
            DocValue::Binary(_) => 6,
            DocValue::Array(_) => 7,
            DocValue::Object(_) => 8,
        }
    }
}

/// Total ordering over document values: type rank first, then natural
/// ordering within the type. Arrays and objects compare equal within their
/// rank (they are not sortable values).
pub fn compare(a: &DocValue, b: &DocValue) -> Ordering {
    let ra = a.type_rank();
    let rb = b.type_rank();
    if ra != rb {
        return ra.cmp(&rb);
    }
    match (a, b) {
        (DocValue::Bool(x), DocValue::Bool(y)) => x.cmp(y),
        (DocValue::Number(x), DocValue::Number(y)) => x.partial_cmp(y).unwrap_or(Ordering::Equal),
        (DocValue::String(x), DocValue::String(y)) => x.cmp(y),
        (DocValue::Date(x), DocValue::Date(y)) => x.cmp(y),
        (DocValue::Id(x), DocValue::Id(y)) => x.cmp(y),
        (DocValue::Binary(x), DocValue::Binary(y)) => x.cmp(y),
        _ => Ordering::Equal,
    }
}

/// A document: an ordered mapping from field names to values.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Document {
    fields: BTreeMap<String, DocValue>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&DocValue> {
        self.fields.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: DocValue) -> Option<DocValue> {
        self.fields.insert(key.into(), value)
    }

    pub fn remove(&mut self, key: &str) -> Option<DocValue> {
        self.fields.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &DocValue)> {
        self.fields.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.fields.keys()
    }

    /// The identifier value, if present.
    pub fn id(&self) -> Option<&DocValue> {
        self.fields.get("_id")
    }

    pub fn set_id(&mut self, id: DocValue) {
        self.fields.insert("_id".to_string(), id);
    }

    /// Resolves a dotted path (`"sub.num"`) to a value.
    pub fn get_path(&self, path: &str) -> Option<&DocValue> {
        let mut current = self;
        let mut segments = path.split('.').peekable();
        while let Some(segment) = segments.next() {
            let value = current.fields.get(segment)?;
            if segments.peek().is_none() {
                return Some(value);
            }
            match value {
                DocValue::Object(doc) => current = doc,
                _ => return None,
            }
        }
        None
    }

    /// Sets a dotted path, creating intermediate objects as needed. A
    /// non-object intermediate value is replaced by an object.
    pub fn set_path(&mut self, path: &str, value: DocValue) {
        let mut current = self;
        let mut segments = path.split('.').peekable();
        while let Some(segment) = segments.next() {
            if segments.peek().is_none() {
                current.fields.insert(segment.to_string(), value);
                return;
            }
            let entry = current
                .fields
                .entry(segment.to_string())
                .or_insert_with(|| DocValue::Object(Document::new()));
            if !matches!(entry, DocValue::Object(_)) {
                *entry = DocValue::Object(Document::new());
            }
            match entry {
                DocValue::Object(doc) => current = doc,
                _ => unreachable!(),
            }
        }
    }

    /// Removes a dotted path, returning the removed value.
    pub fn remove_path(&mut self, path: &str) -> Option<DocValue> {
        match path.split_once('.') {
            None => self.fields.remove(path),
            Some((head, rest)) => match self.fields.get_mut(head)? {
                DocValue::Object(doc) => doc.remove_path(rest),
                _ => None,
            },
        }
    }

    /// Enforces the document shape invariant recursively: no key starts
    /// with `$`, no key contains `.`.
    pub fn validate_shape(&self) -> Result<(), ShapeError> {
        for (key, value) in &self.fields {
            if key.starts_with('$') {
                return Err(ShapeError::DollarKey(key.clone()));
            }
            if key.contains('.') {
                return Err(ShapeError::DottedKey(key.clone()));
            }
            validate_value(value)?;
        }
        Ok(())
    }
}

fn validate_value(value: &DocValue) -> Result<(), ShapeError> {
    match value {
        DocValue::Object(doc) => doc.validate_shape(),
        DocValue::Array(items) => items.iter().try_for_each(validate_value),
        _ => Ok(()),
    }
}

impl FromIterator<(String, DocValue)> for Document {
    fn from_iter<T: IntoIterator<Item = (String, DocValue)>>(iter: T) -> Self {
        Document {
            fields: iter.into_iter().collect(),
        }
    }
}

/// Reduces an identifier value to the canonical string key used by the
/// position index and the identifier index. Numbers keep their shortest
/// decimal form so `1976` and `1976.0` address the same document.
pub fn simplify_key(id: &DocValue) -> String {
    match id {
        DocValue::Id(oid) => oid.to_hex(),
        DocValue::String(s) => s.clone(),
        DocValue::Number(n) => {
            if n.fract() == 0.0 && n.abs() < 9.0e15 {
                format!("{}", *n as i64)
            } else {
                format!("{}", n)
            }
        }
        DocValue::Date(ms) => format!("$date:{}", ms),
        DocValue::Bool(b) => format!("{}", b),
        other => format!("{:?}", other),
    }
}
