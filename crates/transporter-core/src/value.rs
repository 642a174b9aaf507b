//! The tagged scalar/value model carried in [`crate::message::Message::data`].
//!
//! Extended scalars (binary, datetime, decimal, object-id) reuse `bson`'s
//! wire-proven types instead of inventing new ones, so a consumer can tell a
//! binary blob from a string by tag alone and every value round-trips
//! byte-identically.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A document is an unordered mapping from field name to value.
///
/// `BTreeMap` is used rather than an order-preserving map because key
/// insertion order is not semantically meaningful — round-trip through a
/// log or store may reorder keys.
pub type Document = BTreeMap<String, Value>;

/// A value flowing through the pipeline as part of a [`crate::message::Message`].
///
/// Covers the scalar kinds a reader adaptor may need to preserve round-trip:
/// plain JSON-ish scalars plus the extended types common to document stores
/// (binary blobs, datetimes, arbitrary-precision decimals, object ids).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Binary(bson::Binary),
    DateTime(bson::DateTime),
    Decimal(bson::Decimal128),
    ObjectId(bson::oid::ObjectId),
    Sequence(Vec<Value>),
    Document(Document),
}

impl Value {
    /// Name of the tag, used by `status` output and log diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::Binary(_) => "binary",
            Value::DateTime(_) => "datetime",
            Value::Decimal(_) => "decimal",
            Value::ObjectId(_) => "object_id",
            Value::Sequence(_) => "sequence",
            Value::Document(_) => "document",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_document(&self) -> Option<&Document> {
        match self {
            Value::Document(d) => Some(d),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_bincode() {
        let mut doc = Document::new();
        doc.insert("name".into(), Value::Str("alice".into()));
        doc.insert("age".into(), Value::Int(30));
        doc.insert(
            "blob".into(),
            Value::Binary(bson::Binary {
                subtype: bson::spec::BinarySubtype::Generic,
                bytes: vec![1, 2, 3],
            }),
        );
        let original = Value::Document(doc);

        let encoded = bincode::serialize(&original).expect("encode");
        let decoded: Value = bincode::deserialize(&encoded).expect("decode");
        assert_eq!(original, decoded);
    }

    #[test]
    fn kind_distinguishes_binary_from_string() {
        assert_eq!(Value::Str("x".into()).kind(), "str");
        assert_eq!(
            Value::Binary(bson::Binary {
                subtype: bson::spec::BinarySubtype::Generic,
                bytes: vec![]
            })
            .kind(),
            "binary"
        );
    }
}
