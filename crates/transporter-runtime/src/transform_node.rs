//! Transform node: one edge of a fan-out, from upstream channel to downstream channel.
//!
//! Applies the namespace filter, then the opaque user transform. A `drop`
//! (filter or transform) removes the message from this edge only — other
//! fan-out paths see their own copy and are unaffected.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use transporter_core::{Emitted, MessageRx, MessageTx, NamespaceFilter, TransformFn, TransformOutcome, TransporterError};

pub struct TransformNode {
    id: String,
    filter: NamespaceFilter,
    transform: Arc<dyn TransformFn>,
}

impl TransformNode {
    pub fn new(id: impl Into<String>, filter: NamespaceFilter, transform: Arc<dyn TransformFn>) -> Self {
        Self {
            id: id.into(),
            filter,
            transform,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Run until the upstream channel closes or cancellation is observed.
    /// Transforms are synchronous from the pipeline's perspective: this loop
    /// never processes more than one message concurrently.
    pub async fn run(
        &self,
        mut rx: MessageRx,
        tx: MessageTx,
        cancel: CancellationToken,
    ) -> Result<(), TransporterError> {
        info!(transform = %self.id, "transform node started");
        loop {
            let emitted = tokio::select! {
                _ = cancel.cancelled() => {
                    info!(transform = %self.id, "transform node cancelled");
                    break;
                }
                next = rx.recv() => match next {
                    Some(e) => e,
                    None => break,
                },
            };

            if !self.filter.accepts(&emitted.message) {
                debug!(transform = %self.id, namespace = %emitted.message.namespace, "filtered before transform");
                continue;
            }

            match self.transform.call(emitted.message) {
                TransformOutcome::Emit(message) => {
                    let out = Emitted {
                        message,
                        state_after: emitted.state_after,
                    };
                    if tx.send(out).await.is_err() {
                        warn!(transform = %self.id, "downstream closed, stopping");
                        break;
                    }
                }
                TransformOutcome::Drop => {
                    debug!(transform = %self.id, "transform dropped message");
                }
                TransformOutcome::Error(source) => {
                    return Err(TransporterError::Transform {
                        transform_id: self.id.clone(),
                        source,
                    });
                }
            }
        }
        info!(transform = %self.id, "transform node finished");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;
    use transporter_core::{Mode, Op, Message, State, Value};

    fn emitted(ns: &str, op: Op) -> Emitted {
        Emitted {
            message: Message::new(op, 0, ns, 0),
            state_after: State::new(ns, Value::Int(0), 0, Mode::Sync),
        }
    }

    #[tokio::test]
    async fn drops_matching_op() {
        let node = TransformNode::new(
            "drop-deletes",
            NamespaceFilter::default_filter(),
            Arc::new(|e: transporter_core::Message| {
                if e.op == Op::Delete {
                    TransformOutcome::Drop
                } else {
                    TransformOutcome::Emit(e)
                }
            }),
        );
        let (in_tx, in_rx) = mpsc::channel(8);
        let (out_tx, mut out_rx) = mpsc::channel(8);

        in_tx.send(emitted("db.users", Op::Insert)).await.unwrap();
        in_tx.send(emitted("db.users", Op::Delete)).await.unwrap();
        in_tx.send(emitted("db.users", Op::Update)).await.unwrap();
        drop(in_tx);

        node.run(in_rx, out_tx, CancellationToken::new()).await.unwrap();

        let first = out_rx.recv().await.unwrap();
        assert_eq!(first.message.op, Op::Insert);
        let second = out_rx.recv().await.unwrap();
        assert_eq!(second.message.op, Op::Update);
        assert!(out_rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn namespace_filter_drops_before_transform_runs() {
        let node = TransformNode::new(
            "only-a",
            NamespaceFilter::compile(r"db\.a").unwrap(),
            Arc::new(TransformOutcome::Emit as fn(transporter_core::Message) -> TransformOutcome),
        );
        let (in_tx, in_rx) = mpsc::channel(8);
        let (out_tx, mut out_rx) = mpsc::channel(8);
        in_tx.send(emitted("db.b", Op::Insert)).await.unwrap();
        drop(in_tx);

        node.run(in_rx, out_tx, CancellationToken::new()).await.unwrap();
        assert!(out_rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn transform_error_is_fatal() {
        let node = TransformNode::new(
            "boom",
            NamespaceFilter::default_filter(),
            Arc::new(|_: transporter_core::Message| TransformOutcome::Error(anyhow::anyhow!("boom"))),
        );
        let (in_tx, in_rx) = mpsc::channel(8);
        let (out_tx, _out_rx) = mpsc::channel(8);
        in_tx.send(emitted("db.users", Op::Insert)).await.unwrap();
        drop(in_tx);

        let err = node.run(in_rx, out_tx, CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, TransporterError::Transform { .. }));
    }
}
