//! Newline-delimited-JSON file reader/writer pair.
//!
//! Each line is one JSON-encoded `Message`. The reader resumes per namespace
//! using the `State.timestamp` high-water mark handed to it at startup
//! rather than a byte offset, since the file may be rewritten between runs.

use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use transporter_core::{BulkOutcome, Emitted, Message, MessageTx, Mode, ReaderAdaptor, State, TransporterError, Value, WriterAdaptor};

pub struct JsonlReader {
    id: String,
    path: PathBuf,
}

impl JsonlReader {
    pub fn new(id: impl Into<String>, path: PathBuf) -> Self {
        Self { id: id.into(), path }
    }
}

#[async_trait]
impl ReaderAdaptor for JsonlReader {
    fn name(&self) -> &str {
        &self.id
    }

    async fn start(
        &mut self,
        states: Vec<State>,
        tx: MessageTx,
        cancel: CancellationToken,
    ) -> Result<(), TransporterError> {
        let file = std::fs::File::open(&self.path).map_err(|e| TransporterError::Source(e.into()))?;
        let reader = BufReader::new(file);

        let mut high_water: HashMap<String, i64> = states.into_iter().map(|s| (s.namespace, s.timestamp)).collect();
        let mut sequence = 0u64;

        for line in reader.lines() {
            if cancel.is_cancelled() {
                break;
            }
            let line = line.map_err(|e| TransporterError::Source(e.into()))?;
            if line.trim().is_empty() {
                continue;
            }
            let mut message: Message = match serde_json::from_str(&line) {
                Ok(m) => m,
                Err(e) => {
                    warn!(reader = %self.id, error = %e, "skipping malformed line");
                    continue;
                }
            };

            if let Some(&last_ts) = high_water.get(&message.namespace) {
                if message.timestamp <= last_ts {
                    continue;
                }
            }

            message.sequence = sequence;
            sequence += 1;
            high_water.insert(message.namespace.clone(), message.timestamp);

            let state_after = State::new(
                message.namespace.clone(),
                Value::Int(message.timestamp),
                message.timestamp,
                Mode::Sync,
            );

            if tx.send(Emitted { message, state_after }).await.is_err() {
                break;
            }
        }

        info!(reader = %self.id, "reached end of file");
        Ok(())
    }
}

pub struct JsonlWriter {
    id: String,
    file: std::fs::File,
}

impl JsonlWriter {
    pub fn open(id: impl Into<String>, path: PathBuf) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self { id: id.into(), file })
    }
}

#[async_trait]
impl WriterAdaptor for JsonlWriter {
    fn name(&self) -> &str {
        &self.id
    }

    async fn bulk_write(&mut self, batch: &[Message]) -> Result<BulkOutcome, TransporterError> {
        for message in batch {
            let line = serde_json::to_string(message).map_err(|e| TransporterError::TransientSink {
                writer_id: self.id.clone(),
                source: e.into(),
            })?;
            writeln!(self.file, "{line}").map_err(|e| TransporterError::TransientSink {
                writer_id: self.id.clone(),
                source: e.into(),
            })?;
        }
        self.file.flush().map_err(|e| TransporterError::TransientSink {
            writer_id: self.id.clone(),
            source: e.into(),
        })?;
        Ok(BulkOutcome::Ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use tokio::sync::mpsc;
    use transporter_core::Op;

    #[tokio::test]
    async fn writes_then_reads_back_in_order() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.jsonl");

        let mut writer = JsonlWriter::open("w1", path.clone()).unwrap();
        let batch = vec![
            Message::new(Op::Insert, 1, "db.users", 0),
            Message::new(Op::Insert, 2, "db.users", 1),
        ];
        writer.bulk_write(&batch).await.unwrap();

        let mut reader = JsonlReader::new("r1", path);
        let (tx, mut rx) = mpsc::channel(8);
        reader.start(vec![], tx, CancellationToken::new()).await.unwrap();

        let first = rx.recv().await.unwrap();
        assert_eq!(first.message.timestamp, 1);
        let second = rx.recv().await.unwrap();
        assert_eq!(second.message.timestamp, 2);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn resumes_after_high_water_mark() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.jsonl");
        let mut writer = JsonlWriter::open("w1", path.clone()).unwrap();
        writer
            .bulk_write(&[
                Message::new(Op::Insert, 1, "db.users", 0),
                Message::new(Op::Insert, 2, "db.users", 1),
                Message::new(Op::Insert, 3, "db.users", 2),
            ])
            .await
            .unwrap();

        let mut reader = JsonlReader::new("r1", path);
        let (tx, mut rx) = mpsc::channel(8);
        let prior_state = State::new("db.users", Value::Int(2), 2, Mode::Sync);
        reader.start(vec![prior_state], tx, CancellationToken::new()).await.unwrap();

        let only = rx.recv().await.unwrap();
        assert_eq!(only.message.timestamp, 3);
        assert!(rx.recv().await.is_none());
    }
}
