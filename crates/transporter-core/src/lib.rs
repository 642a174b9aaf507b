//! # Transporter Core
//!
//! Foundational types shared by every other crate in the workspace: the
//! message and state model that flows through a pipeline, the namespace
//! filter, the reader/writer/transform capability traits, structured error
//! kinds, and the declarative pipeline configuration format.
//!
//! This crate has no durability or concurrency logic of its own — see
//! `transporter-durability` and `transporter-runtime` for that. It exists so
//! adaptors (`transporter-io`) and the runtime can depend on a shared
//! vocabulary without depending on each other.

pub mod config;
pub mod error;
pub mod filter;
pub mod message;
pub mod offset;
pub mod state;
pub mod traits;
pub mod value;

pub use config::{BulkConfig, PipelineSpec, ReaderSpec, RetentionConfig, TransformSpec, WriterSpec};
pub use error::{Result, TransporterError};
pub use filter::NamespaceFilter;
pub use message::{Message, Op};
pub use offset::Offset;
pub use state::{Mode, State};
pub use traits::{BulkOutcome, Emitted, MessageRx, MessageTx, ReaderAdaptor, TransformFn, TransformOutcome, WriterAdaptor};
pub use value::{Document, Value};
