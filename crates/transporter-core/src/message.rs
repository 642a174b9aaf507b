//! The record type flowing through the pipeline.

use serde::{Deserialize, Serialize};

use crate::value::{Document, Value};

/// Kind of change a [`Message`] represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Op {
    Insert,
    Update,
    Delete,
    Command,
    Noop,
}

/// A record emitted by the reader and carried along every edge it traverses.
///
/// Messages are immutable once emitted: transform nodes produce new messages,
/// they never mutate in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub op: Op,
    /// Monotonic 64-bit value assigned by the reader at emission.
    pub timestamp: i64,
    /// `"<database>.<object>"` — the source bucket this message belongs to.
    pub namespace: String,
    pub data: Document,
    /// Monotonically increasing sequence assigned by the reader, used to
    /// correlate a committed offset back to the reader `State` it was
    /// produced under.
    pub sequence: u64,
}

impl Message {
    pub fn new(op: Op, timestamp: i64, namespace: impl Into<String>, sequence: u64) -> Self {
        Self {
            op,
            timestamp,
            namespace: namespace.into(),
            data: Document::new(),
            sequence,
        }
    }

    pub fn with_data(mut self, data: Document) -> Self {
        self.data = data;
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_sets_fields() {
        let msg = Message::new(Op::Insert, 10, "db.users", 0)
            .with_field("name", "alice")
            .with_field("age", 30i64);
        assert_eq!(msg.namespace, "db.users");
        assert_eq!(msg.data.get("name").and_then(Value::as_str), Some("alice"));
    }
}
