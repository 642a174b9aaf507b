//! Capability abstractions consumed/exposed by the core.
//!
//! Adaptors are external collaborators: only the shape the core needs to
//! drive them is specified here.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::TransporterError;
use crate::message::Message;
use crate::state::State;

/// A message paired with the reader `State` that reflects the reader's
/// position *after* emitting it. This is what actually travels along a DAG
/// edge: transforms rewrite `message` but thread `state_after` through
/// unchanged, so a writer several hops downstream can still correlate the
/// offset it assigns back to the namespace's resume point.
#[derive(Debug, Clone)]
pub struct Emitted {
    pub message: Message,
    pub state_after: State,
}

/// Channel carrying `(message, state_after)` pairs along one DAG edge.
pub type MessageTx = mpsc::Sender<Emitted>;
pub type MessageRx = mpsc::Receiver<Emitted>;

/// Reader adaptor contract consumed by the core.
///
/// `start` is handed the prior `State` for every namespace the reader
/// already has progress for (possibly empty on first run) and streams
/// `(message, state_after)` pairs until cancelled or exhausted.
#[async_trait]
pub trait ReaderAdaptor: Send + Sync {
    fn name(&self) -> &str;

    async fn start(
        &mut self,
        states: Vec<State>,
        tx: MessageTx,
        cancel: CancellationToken,
    ) -> Result<(), TransporterError>;

    /// Idempotent.
    async fn stop(&mut self) -> Result<(), TransporterError> {
        Ok(())
    }
}

/// Outcome of a bulk write attempt.
#[derive(Debug)]
pub enum BulkOutcome {
    Ok,
    /// Only the messages at these batch-relative indices failed.
    Partial { failed: Vec<usize> },
    Error { description: String },
}

/// Writer adaptor contract consumed by the core.
#[async_trait]
pub trait WriterAdaptor: Send + Sync {
    fn name(&self) -> &str;

    async fn bulk_write(&mut self, batch: &[Message]) -> Result<BulkOutcome, TransporterError>;

    /// Idempotent.
    async fn close(&mut self) -> Result<(), TransporterError> {
        Ok(())
    }
}

/// Result of applying a transform to one message.
pub enum TransformOutcome {
    Emit(Message),
    Drop,
    Error(anyhow::Error),
}

/// Opaque, synchronous (from the pipeline's perspective) user callable. A
/// transform that needs to wait holds up its edge — callers invoke this
/// from within the edge's own task, never concurrently with itself.
pub trait TransformFn: Send + Sync {
    fn call(&self, message: Message) -> TransformOutcome;
}

/// Blanket impl so a plain closure can serve as a transform.
impl<F> TransformFn for F
where
    F: Fn(Message) -> TransformOutcome + Send + Sync,
{
    fn call(&self, message: Message) -> TransformOutcome {
        self(message)
    }
}
