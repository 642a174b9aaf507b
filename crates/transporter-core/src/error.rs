//! Structured error kinds for the pipeline runtime.

use thiserror::Error;

/// The five error kinds the pipeline can fail with, each carrying the
/// supervisor-relevant context needed to decide how to shut down.
#[derive(Debug, Error)]
pub enum TransporterError {
    /// Invalid regex, missing adaptor, malformed graph. Fatal at startup;
    /// no logs touched.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Bulk write failure reported by a writer adaptor. Recorded in the
    /// error log; pipeline stops. Operator-recoverable.
    #[error("transient sink error in writer {writer_id}: {source}")]
    TransientSink {
        writer_id: String,
        #[source]
        source: anyhow::Error,
    },

    /// Non-drop error return from a transform. Fatal; nothing appended to
    /// the error log since the message never reached a writer.
    #[error("transform error in {transform_id}: {source}")]
    Transform {
        transform_id: String,
        #[source]
        source: anyhow::Error,
    },

    /// Log append, fsync, or state-store write failure. Fatal; the
    /// pipeline aborts without acknowledging further messages upstream.
    #[error("durability error: {0}")]
    Durability(#[source] anyhow::Error),

    /// Reader adaptor failure. Fatal, but writers are given a chance to
    /// flush in-flight batches.
    #[error("source error: {0}")]
    Source(#[source] anyhow::Error),

    /// A channel between nodes closed unexpectedly.
    #[error("channel closed: {0}")]
    ChannelClosed(&'static str),
}

impl TransporterError {
    /// Process exit code: `1` for any runtime failure, `2` for
    /// configuration errors caught before anything ran.
    pub fn exit_code(&self) -> i32 {
        match self {
            TransporterError::Configuration(_) => 2,
            _ => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, TransporterError>;
