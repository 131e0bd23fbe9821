//! Wire codec for documents
//!
//! On the wire a date is framed as `{"$wrap":"$date","v":<epoch millis>}`,
//! an identifier as `{"$wrap":"$oid","v":<hex>}`, and a binary payload as
//! `{"$wrap":"$bin","v":<base64>}`. Tags are applied just before
//! serialization and reversed just after deserialization, recursively; the
//! in-memory document never carries them.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde_json::{json, Map, Value};

use super::errors::ShapeError;
use super::id::ObjectId;
use super::value::{DocValue, Document};

/// Converts an in-memory value to its wire form.
pub fn to_wire(value: &DocValue) -> Value {
    match value {
        DocValue::Null => Value::Null,
        DocValue::Bool(b) => Value::Bool(*b),
        DocValue::Number(n) => number_to_wire(*n),
        DocValue::String(s) => Value::String(s.clone()),
        DocValue::Date(ms) => json!({ "$wrap": "$date", "v": ms }),
        DocValue::Id(oid) => json!({ "$wrap": "$oid", "v": oid.to_hex() }),
        DocValue::Binary(bytes) => json!({ "$wrap": "$bin", "v": BASE64.encode(bytes) }),
        DocValue::Array(items) => Value::Array(items.iter().map(to_wire).collect()),
        DocValue::Object(doc) => document_to_wire(doc),
    }
}

/// Converts a wire value back to its in-memory form, reversing tags.
pub fn from_wire(value: &Value) -> DocValue {
    match value {
        Value::Null => DocValue::Null,
        Value::Bool(b) => DocValue::Bool(*b),
        Value::Number(n) => DocValue::Number(n.as_f64().unwrap_or(0.0)),
        Value::String(s) => DocValue::String(s.clone()),
        Value::Array(items) => DocValue::Array(items.iter().map(from_wire).collect()),
        Value::Object(map) => from_wire_object(map),
    }
}

fn from_wire_object(map: &Map<String, Value>) -> DocValue {
    if let Some(tag) = map.get("$wrap").and_then(Value::as_str) {
        match (tag, map.get("v")) {
            ("$date", Some(v)) => {
                if let Some(ms) = v.as_i64() {
                    return DocValue::Date(ms);
                }
            }
            ("$oid", Some(v)) => {
                if let Some(oid) = v.as_str().and_then(ObjectId::parse_str) {
                    return DocValue::Id(oid);
                }
            }
            ("$bin", Some(v)) => {
                if let Some(bytes) = v.as_str().and_then(|s| BASE64.decode(s).ok()) {
                    return DocValue::Binary(bytes);
                }
            }
            _ => {}
        }
    }
    DocValue::Object(
        map.iter()
            .map(|(k, v)| (k.clone(), from_wire(v)))
            .collect(),
    )
}

/// Serializes a document to its wire object form.
pub fn document_to_wire(doc: &Document) -> Value {
    let mut map = Map::new();
    for (key, value) in doc.iter() {
        map.insert(key.clone(), to_wire(value));
    }
    Value::Object(map)
}

/// Deserializes a wire object into a document.
pub fn document_from_wire(value: &Value) -> Result<Document, ShapeError> {
    match from_wire(value) {
        DocValue::Object(doc) => Ok(doc),
        _ => Err(ShapeError::NotAnObject),
    }
}

/// Whole numbers in the f64 range of i64 are written as JSON integers so
/// that wrap followed by unwrap reproduces the original serialization.
fn number_to_wire(n: f64) -> Value {
    if n.fract() == 0.0 && n.is_finite() && n.abs() < 9.0e15 {
        Value::Number((n as i64).into())
    } else {
        serde_json::Number::from_f64(n)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}

impl TryFrom<Value> for Document {
    type Error = ShapeError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        document_from_wire(&value)
    }
}
