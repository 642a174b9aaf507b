//! Per-namespace reader progress.

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// Snapshot phase vs continuous change-data-capture phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Copy,
    Sync,
}

/// Resumable reader progress for one namespace.
///
/// Invariant: within one pipeline instance there is at most one live `State`
/// per namespace; writing a newer `State` (by `timestamp`) replaces the
/// older atomically. Enforced by [`State::supersedes`] at the call sites
/// that persist state, not by this type itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct State {
    /// Opaque value the reader recognizes: resume token, timestamp, or OID.
    pub identifier: Value,
    pub timestamp: i64,
    pub namespace: String,
    pub mode: Mode,
}

impl State {
    pub fn new(namespace: impl Into<String>, identifier: Value, timestamp: i64, mode: Mode) -> Self {
        Self {
            identifier,
            timestamp,
            namespace: namespace.into(),
            mode,
        }
    }

    /// True when `self` is newer than `other` and may replace it. Older
    /// states must never overwrite newer ones.
    pub fn supersedes(&self, other: &State) -> bool {
        self.namespace == other.namespace && self.timestamp > other.timestamp
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newer_timestamp_supersedes_older() {
        let older = State::new("db.users", Value::Int(1), 100, Mode::Copy);
        let newer = State::new("db.users", Value::Int(2), 200, Mode::Sync);
        assert!(newer.supersedes(&older));
        assert!(!older.supersedes(&newer));
    }

    #[test]
    fn different_namespace_never_supersedes() {
        let a = State::new("db.a", Value::Int(1), 500, Mode::Copy);
        let b = State::new("db.b", Value::Int(1), 100, Mode::Copy);
        assert!(!a.supersedes(&b));
    }
}
