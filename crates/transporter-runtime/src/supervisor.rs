//! Pipeline supervisor: builds and runs the node graph.
//!
//! Builds the DAG described by a `PipelineSpec`, wires bounded channels
//! along every edge with real fan-out where a node has more than one
//! downstream target, starts every node, and drives the shutdown sequence
//! when a fault or cancellation arrives: stop the reader, let transforms
//! drain, give writers a chance to flush gracefully, then report
//! termination.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use transporter_core::{
    Emitted, MessageRx, MessageTx, NamespaceFilter, PipelineSpec, ReaderAdaptor, TransformFn, TransporterError,
    WriterAdaptor,
};
use transporter_durability::OffsetStateStore;

use crate::reader::ReaderRuntime;
use crate::transform_node::TransformNode;
use crate::writer::{Fault, WriterRuntime};

/// Per-edge channel capacity for the bounded FIFO channels wiring the graph.
const EDGE_BUFFER_CAPACITY: usize = 256;

/// What the pipeline run ended with.
#[derive(Debug)]
pub struct TerminationReport {
    pub cause: Option<Fault>,
}

pub struct PipelineSupervisor {
    spec: PipelineSpec,
    reader: Box<dyn ReaderAdaptor>,
    /// Keyed by node id — the caller (the CLI) is responsible for
    /// instantiating one transform/writer per node, since `options` differ
    /// per node even when two nodes share a registry key.
    transforms: HashMap<String, Arc<dyn TransformFn>>,
    writers: HashMap<String, Box<dyn WriterAdaptor>>,
    state_dir: PathBuf,
}

impl PipelineSupervisor {
    pub fn new(
        spec: PipelineSpec,
        reader: Box<dyn ReaderAdaptor>,
        transforms: HashMap<String, Arc<dyn TransformFn>>,
        writers: HashMap<String, Box<dyn WriterAdaptor>>,
    ) -> Self {
        let state_dir = PathBuf::from(spec.state_dir.clone());
        Self {
            spec,
            reader,
            transforms,
            writers,
            state_dir,
        }
    }

    /// Validate the graph, wire channels, start every node, and run until a
    /// fatal fault arrives or `cancel` fires, then drive every node through
    /// shutdown before returning.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<TerminationReport, TransporterError> {
        self.validate_graph()?;

        let store = Arc::new(AsyncMutex::new(
            OffsetStateStore::open(self.state_dir.join("offsets-states")).map_err(TransporterError::Durability)?,
        ));

        let mut downstream: HashMap<String, Vec<String>> = HashMap::new();
        for (from, to) in &self.spec.edges {
            downstream.entry(from.clone()).or_default().push(to.clone());
        }

        let mut inputs: HashMap<String, (MessageTx, Option<MessageRx>)> = HashMap::new();
        for t in &self.spec.transforms {
            let (tx, rx) = mpsc::channel(EDGE_BUFFER_CAPACITY);
            inputs.insert(t.id.clone(), (tx, Some(rx)));
        }
        for w in &self.spec.writers {
            let (tx, rx) = mpsc::channel(EDGE_BUFFER_CAPACITY);
            inputs.insert(w.id.clone(), (tx, Some(rx)));
        }

        let (fault_tx, mut fault_rx) = mpsc::channel::<Fault>(16);
        let mut handles: Vec<JoinHandle<()>> = Vec::new();

        let reader_id = self.spec.reader.id.clone();
        let reader_out = self.fanout_sender(&reader_id, &downstream, &inputs, &cancel, &mut handles)?;
        let reader_runtime = Arc::new(ReaderRuntime::new(reader_id, self.reader, store.clone()));
        let reader_for_task = reader_runtime.clone();
        let reader_fault_tx = fault_tx.clone();
        let reader_cancel = cancel.clone();
        handles.push(tokio::spawn(async move {
            reader_for_task.run(reader_out, reader_fault_tx, reader_cancel).await;
        }));

        for t in &self.spec.transforms {
            let rx = inputs
                .get_mut(&t.id)
                .and_then(|(_, rx)| rx.take())
                .ok_or_else(|| TransporterError::Configuration(format!("transform {} has no input edge", t.id)))?;
            let tx = self.fanout_sender(&t.id, &downstream, &inputs, &cancel, &mut handles)?;
            let filter = match &t.filter {
                Some(p) => NamespaceFilter::compile(p)?,
                None => NamespaceFilter::default_filter(),
            };
            let transform = self
                .transforms
                .remove(&t.id)
                .ok_or_else(|| TransporterError::Configuration(format!("no transform registered for node {}", t.id)))?;
            let node = TransformNode::new(t.id.clone(), filter, transform);
            let node_fault_tx = fault_tx.clone();
            let node_cancel = cancel.clone();
            let node_id = t.id.clone();
            handles.push(tokio::spawn(async move {
                if let Err(error) = node.run(rx, tx, node_cancel).await {
                    let _ = node_fault_tx.send(Fault { node_id, error }).await;
                }
            }));
        }

        for w in &self.spec.writers {
            let rx = inputs
                .get_mut(&w.id)
                .and_then(|(_, rx)| rx.take())
                .ok_or_else(|| TransporterError::Configuration(format!("writer {} has no input edge", w.id)))?;
            let filter = match &w.filter {
                Some(p) => NamespaceFilter::compile(p)?,
                None => NamespaceFilter::default_filter(),
            };
            let adaptor = self
                .writers
                .remove(&w.id)
                .ok_or_else(|| TransporterError::Configuration(format!("no writer adaptor registered for {}", w.id)))?;
            let writer_dir = self.state_dir.join("writers").join(&w.id);
            let (runtime, redeliver) =
                WriterRuntime::open(w.id.clone(), adaptor, filter, writer_dir, store.clone(), w.bulk, w.retention)?;
            let node_fault_tx = fault_tx.clone();
            let node_cancel = cancel.clone();
            handles.push(tokio::spawn(async move {
                runtime.run(rx, redeliver, node_fault_tx, node_cancel).await;
            }));
        }

        drop(fault_tx);

        let cause = tokio::select! {
            fault = fault_rx.recv() => fault,
            _ = cancel.cancelled() => None,
        };
        if cause.is_some() {
            cancel.cancel();
        }
        if let Some(f) = &cause {
            error!(node = %f.node_id, error = %f.error, "fatal fault, shutting down pipeline");
        } else {
            info!("shutdown requested, draining pipeline");
        }

        // Step 1 of the shutdown sequence (§4.8): stop the reader explicitly.
        // Cancelling the shared token is enough for an adaptor whose `start`
        // loop simply observes it, but `stop()` is the contract adaptors with
        // an external resource (socket, cursor, subscription) rely on.
        if let Err(e) = reader_runtime.stop().await {
            error!(error = %e, "reader stop failed during shutdown");
        }

        for handle in handles {
            let _ = handle.await;
        }

        Ok(TerminationReport { cause })
    }

    fn validate_graph(&self) -> Result<(), TransporterError> {
        let mut known: HashSet<&str> = HashSet::new();
        known.insert(self.spec.reader.id.as_str());
        for t in &self.spec.transforms {
            known.insert(t.id.as_str());
        }
        for w in &self.spec.writers {
            known.insert(w.id.as_str());
        }

        for (from, to) in &self.spec.edges {
            if !known.contains(from.as_str()) {
                return Err(TransporterError::Configuration(format!("edge references unknown node {from}")));
            }
            if !known.contains(to.as_str()) {
                return Err(TransporterError::Configuration(format!("edge references unknown node {to}")));
            }
            if self.spec.writers.iter().any(|w| w.id == *from) {
                return Err(TransporterError::Configuration(format!("writer {from} cannot have outgoing edges")));
            }
        }
        if !self.spec.edges.iter().any(|(from, _)| *from == self.spec.reader.id) {
            return Err(TransporterError::Configuration("reader has no outgoing edge".to_string()));
        }
        Ok(())
    }

    /// The sender node `id` should emit to: the sole downstream node's input
    /// sender directly, or — when `id` fans out to more than one target — an
    /// internal channel drained by a dedicated fanout task that clones every
    /// `Emitted` to each target, so a drop on one fan-out edge never affects
    /// another.
    fn fanout_sender(
        &self,
        id: &str,
        downstream: &HashMap<String, Vec<String>>,
        inputs: &HashMap<String, (MessageTx, Option<MessageRx>)>,
        cancel: &CancellationToken,
        handles: &mut Vec<JoinHandle<()>>,
    ) -> Result<MessageTx, TransporterError> {
        let targets = downstream.get(id).cloned().unwrap_or_default();
        match targets.as_slice() {
            [] => Err(TransporterError::Configuration(format!("{id} has no downstream target"))),
            [only] => inputs
                .get(only)
                .map(|(tx, _)| tx.clone())
                .ok_or_else(|| TransporterError::Configuration(format!("unknown downstream target {only}"))),
            many => {
                let mut senders = Vec::with_capacity(many.len());
                for target in many {
                    let tx = inputs
                        .get(target)
                        .map(|(tx, _)| tx.clone())
                        .ok_or_else(|| TransporterError::Configuration(format!("unknown downstream target {target}")))?;
                    senders.push(tx);
                }
                let (pre_tx, mut pre_rx) = mpsc::channel::<Emitted>(EDGE_BUFFER_CAPACITY);
                let fanout_cancel = cancel.clone();
                handles.push(tokio::spawn(async move {
                    loop {
                        let emitted = tokio::select! {
                            _ = fanout_cancel.cancelled() => break,
                            next = pre_rx.recv() => match next {
                                Some(e) => e,
                                None => break,
                            },
                        };
                        for tx in &senders {
                            if tx.send(emitted.clone()).await.is_err() {
                                break;
                            }
                        }
                    }
                }));
                Ok(pre_tx)
            }
        }
    }
}
