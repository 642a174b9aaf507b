//! # Transporter IO
//!
//! Concrete reader/writer adaptors and the name-keyed
//! registries a pipeline is composed from at startup. Adaptors live here;
//! the traits they implement live in `transporter-core`.

pub mod in_memory;
pub mod jsonl;
pub mod registry;
pub mod transforms;

pub use in_memory::{FailurePolicy, InMemoryReader, InMemoryWriter};
pub use jsonl::{JsonlReader, JsonlWriter};
pub use registry::{ReaderRegistry, TransformRegistry, WriterRegistry};

use serde_yaml::Mapping;
use std::path::PathBuf;
use transporter_core::TransporterError;

use crate::registry::require_str;

/// A `ReaderRegistry` with `jsonl` pre-registered. `in_memory` adaptors are
/// built programmatically (they take fixtures, not YAML options) so they
/// are not registered here. The CLI starts from this and layers any custom
/// adaptors on top.
pub fn builtin_readers() -> ReaderRegistry {
    let mut registry = ReaderRegistry::new();
    registry.register("jsonl", |options: &Mapping| {
        let raw = require_str(options, "path")?;
        let path = PathBuf::from(raw);
        let id = format!("jsonl:{raw}");
        Ok(Box::new(JsonlReader::new(id, path)) as Box<dyn transporter_core::ReaderAdaptor>)
    });
    registry
}

/// A `WriterRegistry` with `jsonl` pre-registered. See [`builtin_readers`]
/// for why `in_memory` is deliberately absent.
pub fn builtin_writers() -> WriterRegistry {
    let mut registry = WriterRegistry::new();
    registry.register("jsonl", |options: &Mapping| {
        let raw = require_str(options, "path")?;
        let path = PathBuf::from(raw);
        let id = format!("jsonl:{raw}");
        JsonlWriter::open(id, path)
            .map(|w| Box::new(w) as Box<dyn transporter_core::WriterAdaptor>)
            .map_err(TransporterError::Durability)
    });
    registry
}

/// A `TransformRegistry` with the four built-ins from [`transforms`].
pub fn builtin_transforms() -> TransformRegistry {
    transforms::builtin_transforms()
}
