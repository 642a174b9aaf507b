//! In-memory reader/writer adaptors for tests and demos.
//!
//! The writer supports failure injection so the durability subsystem's
//! error-log and crash-recovery paths can be exercised without a real sink.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use transporter_core::{BulkOutcome, Emitted, Message, MessageTx, ReaderAdaptor, State, TransporterError, WriterAdaptor};

/// Replays a fixed sequence of `(message, state_after)` pairs, then stops.
/// Ignores the prior `State` handed to it at startup — a real CDC adaptor
/// would resume from it; this fixture exists to drive deterministic tests.
pub struct InMemoryReader {
    id: String,
    fixtures: Vec<(Message, State)>,
}

impl InMemoryReader {
    pub fn new(id: impl Into<String>, fixtures: Vec<(Message, State)>) -> Self {
        Self { id: id.into(), fixtures }
    }
}

#[async_trait]
impl ReaderAdaptor for InMemoryReader {
    fn name(&self) -> &str {
        &self.id
    }

    async fn start(
        &mut self,
        _states: Vec<State>,
        tx: MessageTx,
        cancel: CancellationToken,
    ) -> Result<(), TransporterError> {
        for (message, state_after) in self.fixtures.drain(..) {
            tokio::select! {
                _ = cancel.cancelled() => break,
                result = tx.send(Emitted { message, state_after }) => {
                    if result.is_err() {
                        break;
                    }
                }
            }
        }
        Ok(())
    }
}

/// How many times in a row `bulk_write` should fail before succeeding.
#[derive(Debug, Clone, Copy, Default)]
pub enum FailurePolicy {
    #[default]
    Never,
    /// Fail the next `n` calls, then succeed.
    FailNext(u32),
    /// Fail every call.
    Always,
}

/// Writer adaptor that records every accepted message, with optional
/// injected failures for exercising the error log and crash-recovery tests.
pub struct InMemoryWriter {
    id: String,
    sink: Arc<Mutex<Vec<Message>>>,
    policy: FailurePolicy,
}

impl InMemoryWriter {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            sink: Arc::new(Mutex::new(Vec::new())),
            policy: FailurePolicy::Never,
        }
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Handle to the recorded messages, for assertions in tests.
    pub fn sink(&self) -> Arc<Mutex<Vec<Message>>> {
        self.sink.clone()
    }
}

#[async_trait]
impl WriterAdaptor for InMemoryWriter {
    fn name(&self) -> &str {
        &self.id
    }

    async fn bulk_write(&mut self, batch: &[Message]) -> Result<BulkOutcome, TransporterError> {
        match self.policy {
            FailurePolicy::Always => {
                return Ok(BulkOutcome::Error {
                    description: format!("{} is configured to always fail", self.id),
                })
            }
            FailurePolicy::FailNext(remaining) if remaining > 0 => {
                self.policy = FailurePolicy::FailNext(remaining - 1);
                return Ok(BulkOutcome::Error {
                    description: format!("{} injected failure, {remaining} remaining", self.id),
                });
            }
            _ => {}
        }
        self.sink.lock().unwrap().extend_from_slice(batch);
        Ok(BulkOutcome::Ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;
    use transporter_core::{Mode, Op, Value};

    fn fixture(ns: &str, seq: u64) -> (Message, State) {
        (
            Message::new(Op::Insert, seq as i64, ns, seq),
            State::new(ns, Value::Int(seq as i64), seq as i64, Mode::Sync),
        )
    }

    #[tokio::test]
    async fn replays_fixtures_in_order() {
        let mut reader = InMemoryReader::new("src", vec![fixture("db.a", 0), fixture("db.a", 1)]);
        let (tx, mut rx) = mpsc::channel(8);
        reader.start(vec![], tx, CancellationToken::new()).await.unwrap();

        assert_eq!(rx.recv().await.unwrap().message.sequence, 0);
        assert_eq!(rx.recv().await.unwrap().message.sequence, 1);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn fail_next_then_succeeds() {
        let mut writer = InMemoryWriter::new("w1").with_failure_policy(FailurePolicy::FailNext(2));
        let batch = vec![fixture("db.a", 0).0];

        assert!(matches!(writer.bulk_write(&batch).await.unwrap(), BulkOutcome::Error { .. }));
        assert!(matches!(writer.bulk_write(&batch).await.unwrap(), BulkOutcome::Error { .. }));
        assert!(matches!(writer.bulk_write(&batch).await.unwrap(), BulkOutcome::Ok));
        assert_eq!(writer.sink().lock().unwrap().len(), 1);
    }
}
