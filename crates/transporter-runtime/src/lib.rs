//! # Transporter Runtime
//!
//! The concurrent machinery that drives a pipeline: the writer runtime
//! (commit/error log + bulk batching), the reader runtime (startup
//! sequence), the transform node (filter + user callable), and the
//! supervisor that wires them into a DAG and owns the shutdown sequence.

pub mod reader;
pub mod supervisor;
pub mod transform_node;
pub mod writer;

pub use reader::ReaderRuntime;
pub use supervisor::{PipelineSupervisor, TerminationReport};
pub use transform_node::TransformNode;
pub use writer::{Fault, WriterRuntime};
