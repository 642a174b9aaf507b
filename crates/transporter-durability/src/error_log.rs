//! Per-writer append-only error log.
//!
//! Presence of any entry is a hard stop signal: the pipeline refuses to
//! start until the operator truncates it.

use std::fs::OpenOptions;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use transporter_core::{Message, Offset};

use crate::frame::{read_frame, write_frame};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorLogEntry {
    pub offset: Offset,
    pub message: Message,
    pub error_description: String,
    pub recorded_at: i64,
}

pub struct ErrorLog {
    path: PathBuf,
}

impl ErrorLog {
    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self { path })
    }

    /// Append one entry and fsync immediately — an error log write must
    /// survive the crash that's about to follow it.
    pub fn append(&self, entry: &ErrorLogEntry) -> anyhow::Result<()> {
        let payload = bincode::serialize(entry)?;
        let mut file = OpenOptions::new().append(true).open(&self.path)?;
        write_frame(&mut file, &payload)?;
        file.sync_data()?;
        Ok(())
    }

    pub fn read_all(&self) -> anyhow::Result<Vec<ErrorLogEntry>> {
        let file = OpenOptions::new().read(true).open(&self.path)?;
        let mut reader = BufReader::new(file);
        let mut out = Vec::new();
        while let Some(payload) = read_frame(&mut reader)? {
            out.push(bincode::deserialize(&payload)?);
        }
        Ok(out)
    }

    pub fn is_empty(&self) -> anyhow::Result<bool> {
        Ok(self.read_all()?.is_empty())
    }

    pub fn len(&self) -> anyhow::Result<usize> {
        Ok(self.read_all()?.len())
    }

    /// `truncate-errors <pipeline>`: the only operator action that clears
    /// this log.
    pub fn truncate(&self) -> anyhow::Result<()> {
        OpenOptions::new().write(true).truncate(true).open(&self.path)?;
        Ok(())
    }
}
