//! Regex-based per-edge drop predicate.

use regex::Regex;

use crate::error::TransporterError;
use crate::message::Message;

/// A compiled namespace filter. Matching is **partial** (regex `find`, not
/// full-string anchoring), chosen to align with the default pattern `.*`
/// matching everything.
#[derive(Debug, Clone)]
pub struct NamespaceFilter {
    pattern: String,
    regex: Regex,
}

impl NamespaceFilter {
    /// Default pattern when unspecified: `.*`, matching every namespace.
    pub const DEFAULT_PATTERN: &'static str = ".*";

    pub fn compile(pattern: &str) -> Result<Self, TransporterError> {
        let regex = Regex::new(pattern)
            .map_err(|e| TransporterError::Configuration(format!("invalid namespace filter {pattern:?}: {e}")))?;
        Ok(Self {
            pattern: pattern.to_string(),
            regex,
        })
    }

    pub fn default_filter() -> Self {
        Self::compile(Self::DEFAULT_PATTERN).expect("default pattern is always valid")
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// True when `message.namespace` passes this filter.
    pub fn accepts(&self, message: &Message) -> bool {
        self.regex.is_match(&message.namespace)
    }
}
