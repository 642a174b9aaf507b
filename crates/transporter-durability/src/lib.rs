//! # Transporter Durability
//!
//! The hardest part of the pipeline runtime: the per-writer commit log and
//! error log, plus the offset & state store they feed. Together these give
//! the pipeline its at-least-once delivery and resume-after-restart
//! guarantees.

pub mod commit_log;
pub mod error_log;
mod frame;
pub mod store;

pub use commit_log::{CommitLog, CommitLogEntry, Recovered};
pub use error_log::{ErrorLog, ErrorLogEntry};
pub use store::OffsetStateStore;
