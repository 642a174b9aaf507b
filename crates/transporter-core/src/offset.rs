//! Per-writer monotonically non-decreasing commit position.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A position in a writer's commit log. Offsets are assigned by the writer
/// as it appends to its commit log and are independent across writers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Offset(pub u64);

impl Offset {
    pub const ZERO: Offset = Offset(0);

    pub fn next(self) -> Offset {
        Offset(self.0 + 1)
    }
}

impl fmt::Display for Offset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Offset {
    fn from(v: u64) -> Self {
        Offset(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_increments() {
        assert_eq!(Offset(3).next(), Offset(4));
    }

    #[test]
    fn ord_is_numeric() {
        assert!(Offset(1) < Offset(2));
    }
}
