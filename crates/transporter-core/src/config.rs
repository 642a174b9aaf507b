//! Declarative pipeline description exposed to the embedding tool: adaptors
//! are named and looked up in a registry rather than matched on a closed
//! set of concrete types.

use serde::{Deserialize, Serialize};

/// Complete pipeline specification loaded from YAML configuration.
///
/// # Example YAML
///
/// ```yaml
/// name: users-to-warehouse
/// reader:
///   id: src
///   adaptor: jsonl
///   options: { path: "./data/users.jsonl" }
/// transforms:
///   - id: drop-deletes
///     transform: drop_op
///     filter: "db\\.users"
///     options: { op: delete }
/// writers:
///   - id: warehouse
///     adaptor: jsonl
///     filter: "db\\..*"
///     options: { path: "./out/warehouse.jsonl" }
///     bulk: { max_batch_size: 100, max_batch_interval_ms: 1000 }
/// edges:
///   - [src, drop-deletes]
///   - [drop-deletes, warehouse]
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSpec {
    pub name: String,
    pub reader: ReaderSpec,
    #[serde(default)]
    pub transforms: Vec<TransformSpec>,
    pub writers: Vec<WriterSpec>,
    /// Directed edges, `(from_node_id, to_node_id)`. The reader is the
    /// implicit root; transform and writer ids are the node ids declared
    /// above.
    pub edges: Vec<(String, String)>,
    /// Directory durability artifacts (commit logs, error logs, the
    /// offset/state store) are written under.
    #[serde(default = "default_state_dir")]
    pub state_dir: String,
}

fn default_state_dir() -> String {
    "./transporter-state".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReaderSpec {
    pub id: String,
    /// Key into the `ReaderRegistry` the CLI composes.
    pub adaptor: String,
    #[serde(default)]
    pub options: serde_yaml::Mapping,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformSpec {
    pub id: String,
    /// Key into the `TransformRegistry` the CLI composes.
    pub transform: String,
    /// Namespace filter applied before this transform runs.
    /// Defaults to [`crate::filter::NamespaceFilter::DEFAULT_PATTERN`].
    #[serde(default)]
    pub filter: Option<String>,
    #[serde(default)]
    pub options: serde_yaml::Mapping,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriterSpec {
    pub id: String,
    /// Key into the `WriterRegistry` the CLI composes.
    pub adaptor: String,
    /// Namespace filter applied before ingestion.
    #[serde(default)]
    pub filter: Option<String>,
    #[serde(default)]
    pub options: serde_yaml::Mapping,
    #[serde(default)]
    pub bulk: BulkConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
}

/// Batch sizing for the writer's background drain task.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct BulkConfig {
    pub max_batch_size: usize,
    pub max_batch_interval_ms: u64,
    /// Bounded buffer capacity `accept` blocks against once full.
    pub buffer_capacity: usize,
}

impl Default for BulkConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 100,
            max_batch_interval_ms: 1_000,
            buffer_capacity: 1_000,
        }
    }
}

/// Commit log truncation policy. The error log is truncated only by
/// explicit operator action and has no retention policy.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    /// Entries whose offset is at least this far behind the durable offset
    /// may be dropped on truncation. `None` disables size-based retention.
    pub keep_last_n: Option<u64>,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self { keep_last_n: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_yaml() {
        let yaml = r#"
name: demo
reader:
  id: src
  adaptor: in_memory
writers:
  - id: w1
    adaptor: in_memory
edges:
  - [src, w1]
"#;
        let spec: PipelineSpec = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(spec.name, "demo");
        assert_eq!(spec.writers.len(), 1);
        assert_eq!(spec.edges, vec![("src".to_string(), "w1".to_string())]);
        assert_eq!(spec.writers[0].bulk.max_batch_size, 100);
    }
}
