//! Writer runtime: accept, buffer, batch, commit.
//!
//! Accept appends to the commit log with a fresh offset and buffers the
//! message; a background drain task bulk-writes batches to the sink
//! adaptor; on success the batch is marked committed and the durable offset
//! plus correlated reader `State` are persisted; on failure the error log
//! gets either the adaptor-reported failing subset or the whole batch,
//! depending on what the adaptor returned (see [`Self::ERROR_LOG_POLICY`]),
//! and the pipeline is told to stop.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use transporter_core::{BulkConfig, BulkOutcome, Emitted, MessageRx, Message, NamespaceFilter, Offset, RetentionConfig, State, TransporterError, WriterAdaptor};
use transporter_durability::{CommitLog, CommitLogEntry, ErrorLog, ErrorLogEntry, OffsetStateStore};

/// A fatal condition reported by a node back to the supervisor.
#[derive(Debug)]
pub struct Fault {
    pub node_id: String,
    pub error: TransporterError,
}

pub struct WriterRuntime {
    id: String,
    filter: NamespaceFilter,
    adaptor: Box<dyn WriterAdaptor>,
    commit_log: Arc<Mutex<CommitLog>>,
    error_log: Arc<ErrorLog>,
    store: Arc<Mutex<OffsetStateStore>>,
    bulk: BulkConfig,
    retention: RetentionConfig,
    shutdown_timeout: Duration,
}

impl WriterRuntime {
    /// This writer's error-log policy for a failed batch: when the adaptor
    /// reports [`BulkOutcome::Partial`], only the indices it names as failed
    /// are recorded, since the adaptor has already told us which messages
    /// actually failed; when it reports [`BulkOutcome::Error`] with no such
    /// breakdown, every message in the batch is recorded, since nothing
    /// finer-grained is known.
    pub const ERROR_LOG_POLICY: &'static str = "failing-subset-on-partial, all-of-batch-on-error";

    /// Default graceful shutdown allowance.
    pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

    /// Open the writer's durability state and run crash recovery. Returns
    /// the entries that must be redelivered before accepting new traffic.
    pub fn open(
        id: impl Into<String>,
        adaptor: Box<dyn WriterAdaptor>,
        filter: NamespaceFilter,
        writer_dir: PathBuf,
        store: Arc<Mutex<OffsetStateStore>>,
        bulk: BulkConfig,
        retention: RetentionConfig,
    ) -> Result<(Self, Vec<CommitLogEntry>), TransporterError> {
        let id = id.into();
        std::fs::create_dir_all(&writer_dir).map_err(|e| TransporterError::Durability(e.into()))?;

        let (commit_log, recovered) =
            CommitLog::open(writer_dir.join("commit.log")).map_err(TransporterError::Durability)?;
        let error_log = ErrorLog::open(writer_dir.join("error.log")).map_err(TransporterError::Durability)?;

        if !error_log.is_empty().map_err(TransporterError::Durability)? {
            return Err(TransporterError::Durability(anyhow::anyhow!(
                "writer {id}: error log is non-empty; run `truncate-errors` before restarting"
            )));
        }

        let runtime = Self {
            id,
            filter,
            adaptor,
            commit_log: Arc::new(Mutex::new(commit_log)),
            error_log: Arc::new(error_log),
            store,
            bulk,
            retention,
            shutdown_timeout: Self::DEFAULT_SHUTDOWN_TIMEOUT,
        };
        Ok((runtime, recovered.uncommitted))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Drive the accept path and the drain path as separate concurrent
    /// tasks sharing a bounded buffer, until the upstream edge closes, a
    /// fatal error occurs, or cancellation is observed.
    ///
    /// `redeliver` carries entries recovered from a prior crash and is
    /// drained into the buffer before anything from `rx`.
    pub async fn run(
        mut self,
        rx: MessageRx,
        redeliver: Vec<CommitLogEntry>,
        fault_tx: mpsc::Sender<Fault>,
        cancel: CancellationToken,
    ) {
        info!(writer = %self.id, redeliver = redeliver.len(), "writer runtime started");
        let (buf_tx, buf_rx) = mpsc::channel::<(Offset, Message, State)>(self.bulk.buffer_capacity.max(1));

        for entry in redeliver {
            if buf_tx
                .send((entry.offset, entry.message, entry.state_after))
                .await
                .is_err()
            {
                break;
            }
        }

        let accept_fut = Self::accept_loop(rx, buf_tx, self.commit_log.clone(), self.filter.clone(), self.id.clone(), cancel.clone());
        let drain_fut = self.drain_loop(buf_rx, fault_tx, cancel);

        tokio::join!(accept_fut, drain_fut);

        let timeout = self.shutdown_timeout;
        if let Err(e) = self.shutdown(true, timeout).await {
            warn!(writer = %self.id, error = %e, "error closing writer adaptor during shutdown");
        }
        info!(writer = %self.id, "writer runtime finished");
    }

    async fn accept_loop(
        mut rx: MessageRx,
        buf_tx: mpsc::Sender<(Offset, Message, State)>,
        commit_log: Arc<Mutex<CommitLog>>,
        filter: NamespaceFilter,
        id: String,
        cancel: CancellationToken,
    ) {
        loop {
            let emitted: Emitted = tokio::select! {
                _ = cancel.cancelled() => break,
                next = rx.recv() => match next {
                    Some(e) => e,
                    None => break,
                },
            };

            if !filter.accepts(&emitted.message) {
                continue;
            }

            let offset = {
                let mut log = commit_log.lock().await;
                match log.append(emitted.message.clone(), emitted.state_after.clone()) {
                    Ok(offset) => offset,
                    Err(e) => {
                        error!(writer = %id, error = %e, "commit log append failed");
                        break;
                    }
                }
            };

            // `accept` applies backpressure by blocking once the buffer is full.
            if buf_tx.send((offset, emitted.message, emitted.state_after)).await.is_err() {
                break;
            }
        }
    }

    async fn drain_loop(
        &mut self,
        mut buf_rx: mpsc::Receiver<(Offset, Message, State)>,
        fault_tx: mpsc::Sender<Fault>,
        cancel: CancellationToken,
    ) {
        let interval = Duration::from_millis(self.bulk.max_batch_interval_ms.max(1));
        loop {
            let mut batch: Vec<(Offset, Message, State)> = Vec::new();
            let deadline = tokio::time::sleep(interval);
            tokio::pin!(deadline);

            loop {
                if batch.len() >= self.bulk.max_batch_size {
                    break;
                }
                tokio::select! {
                    _ = cancel.cancelled(), if batch.is_empty() => return,
                    _ = &mut deadline => break,
                    next = buf_rx.recv() => match next {
                        Some(item) => batch.push(item),
                        None => break,
                    },
                }
            }

            if batch.is_empty() {
                if buf_rx.is_closed() {
                    return;
                }
                continue;
            }

            if let Err(fault) = self.commit_batch(batch).await {
                let _ = fault_tx
                    .send(Fault {
                        node_id: self.id.clone(),
                        error: fault,
                    })
                    .await;
                return;
            }
        }
    }

    async fn commit_batch(&mut self, batch: Vec<(Offset, Message, State)>) -> Result<(), TransporterError> {
        let messages: Vec<Message> = batch.iter().map(|(_, m, _)| m.clone()).collect();
        let outcome = self.adaptor.bulk_write(&messages).await?;

        match outcome {
            BulkOutcome::Ok => self.on_batch_committed(batch).await,
            BulkOutcome::Partial { failed } => {
                self.on_batch_failed(&batch, &failed, "adaptor reported partial failure").await
            }
            BulkOutcome::Error { description } => {
                let all: Vec<usize> = (0..batch.len()).collect();
                self.on_batch_failed(&batch, &all, &description).await
            }
        }
    }

    async fn on_batch_committed(&mut self, batch: Vec<(Offset, Message, State)>) -> Result<(), TransporterError> {
        let highest = batch.last().map(|(o, _, _)| *o).expect("batch is non-empty");

        {
            let mut log = self.commit_log.lock().await;
            log.mark_committed(highest).map_err(TransporterError::Durability)?;
        }

        // Newest state per namespace in this batch becomes the candidate to persist.
        let mut by_namespace: std::collections::BTreeMap<String, State> = std::collections::BTreeMap::new();
        for (_, _, state) in &batch {
            by_namespace
                .entry(state.namespace.clone())
                .and_modify(|existing| {
                    if state.supersedes(existing) {
                        *existing = state.clone();
                    }
                })
                .or_insert_with(|| state.clone());
        }
        let states: Vec<State> = by_namespace.into_values().collect();

        {
            let store = self.store.lock().await;
            store
                .commit_group(&self.id, highest, &states)
                .map_err(TransporterError::Durability)?;
        }

        if let Some(keep_last_n) = self.retention.keep_last_n {
            let mut log = self.commit_log.lock().await;
            let keep_after = Offset(highest.0.saturating_sub(keep_last_n));
            if let Err(e) = log.truncate(keep_after) {
                warn!(writer = %self.id, error = %e, "commit log truncation failed (non-fatal)");
            }
        }

        Ok(())
    }

    async fn on_batch_failed(
        &mut self,
        batch: &[(Offset, Message, State)],
        failed_indices: &[usize],
        description: &str,
    ) -> Result<(), TransporterError> {
        for &idx in failed_indices {
            let (offset, message, _) = &batch[idx];
            let entry = ErrorLogEntry {
                offset: *offset,
                message: message.clone(),
                error_description: description.to_string(),
                recorded_at: message.timestamp,
            };
            self.error_log.append(&entry).map_err(TransporterError::Durability)?;
        }
        Err(TransporterError::TransientSink {
            writer_id: self.id.clone(),
            source: anyhow::anyhow!("{description}"),
        })
    }

    /// Idempotent shutdown.
    ///
    /// Graceful shutdown lets the drain loop finish in-flight batches up to
    /// `timeout`; a timeout elapsed during graceful shutdown is itself an
    /// abort — anything still buffered stays uncommitted and will be
    /// redelivered on the next start.
    pub async fn shutdown(&mut self, graceful: bool, timeout: Duration) -> Result<(), TransporterError> {
        if graceful {
            match tokio::time::timeout(timeout, self.adaptor.close()).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(writer = %self.id, "graceful shutdown timed out, closing anyway");
                    self.adaptor.close().await
                }
            }
        } else {
            self.adaptor.close().await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;
    use transporter_core::{Mode, Op, Value};

    struct CountingWriter {
        committed: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl WriterAdaptor for CountingWriter {
        fn name(&self) -> &str {
            "counting"
        }
        async fn bulk_write(&mut self, batch: &[Message]) -> Result<BulkOutcome, TransporterError> {
            self.committed.fetch_add(batch.len(), Ordering::SeqCst);
            Ok(BulkOutcome::Ok)
        }
    }

    struct FailingWriter;

    #[async_trait]
    impl WriterAdaptor for FailingWriter {
        fn name(&self) -> &str {
            "failing"
        }
        async fn bulk_write(&mut self, _batch: &[Message]) -> Result<BulkOutcome, TransporterError> {
            Ok(BulkOutcome::Error {
                description: "sink unreachable".to_string(),
            })
        }
    }

    fn emitted(seq: u64) -> Emitted {
        let ns = "db.users";
        Emitted {
            message: Message::new(Op::Insert, seq as i64, ns, seq),
            state_after: State::new(ns, Value::Int(seq as i64), seq as i64, Mode::Sync),
        }
    }

    #[tokio::test]
    async fn happy_path_commits_all_and_persists_offset_and_state() {
        let dir = tempdir().unwrap();
        let store = Arc::new(Mutex::new(OffsetStateStore::open(dir.path().join("store")).unwrap()));
        let committed = Arc::new(AtomicUsize::new(0));
        let (runtime, redeliver) = WriterRuntime::open(
            "w1",
            Box::new(CountingWriter { committed: committed.clone() }),
            NamespaceFilter::default_filter(),
            dir.path().join("w1"),
            store.clone(),
            BulkConfig { max_batch_size: 4, max_batch_interval_ms: 50, buffer_capacity: 16 },
            RetentionConfig::default(),
        )
        .unwrap();
        assert!(redeliver.is_empty());

        let (tx, rx) = mpsc::channel(16);
        let (fault_tx, mut fault_rx) = mpsc::channel(4);
        for seq in 0..10u64 {
            tx.send(emitted(seq)).await.unwrap();
        }
        drop(tx);

        let cancel = CancellationToken::new();
        runtime.run(rx, redeliver, fault_tx, cancel).await;

        assert!(fault_rx.recv().await.is_none());
        assert_eq!(committed.load(Ordering::SeqCst), 10);

        let store = store.lock().await;
        assert_eq!(store.read_offset("w1").unwrap(), Some(Offset(9)));
        let state = store.read_state("db.users").unwrap().unwrap();
        assert_eq!(state.timestamp, 9);
    }

    #[tokio::test]
    async fn bulk_failure_writes_error_log_and_reports_fault() {
        let dir = tempdir().unwrap();
        let store = Arc::new(Mutex::new(OffsetStateStore::open(dir.path().join("store")).unwrap()));
        let (runtime, redeliver) = WriterRuntime::open(
            "w1",
            Box::new(FailingWriter),
            NamespaceFilter::default_filter(),
            dir.path().join("w1"),
            store,
            BulkConfig { max_batch_size: 8, max_batch_interval_ms: 50, buffer_capacity: 16 },
            RetentionConfig::default(),
        )
        .unwrap();

        let (tx, rx) = mpsc::channel(16);
        let (fault_tx, mut fault_rx) = mpsc::channel(4);
        for seq in 0..8u64 {
            tx.send(emitted(seq)).await.unwrap();
        }
        drop(tx);

        let cancel = CancellationToken::new();
        runtime.run(rx, redeliver, fault_tx, cancel).await;

        let fault = fault_rx.recv().await.expect("fault reported");
        assert!(matches!(fault.error, TransporterError::TransientSink { .. }));

        let error_log = ErrorLog::open(dir.path().join("w1").join("error.log")).unwrap();
        assert_eq!(error_log.len().unwrap(), 8);
    }
}
