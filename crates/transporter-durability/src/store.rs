//! Offset & state store: `writer_offset: writer_id -> Offset` and
//! `reader_state: namespace -> State`.
//!
//! Realized as a file per writer for offsets, a file per namespace for
//! state, each written via write-to-temp-file + fsync + rename. Renames
//! are atomic at the filesystem level, so a reader of either file always
//! sees either the old or the new value, never a torn write.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use transporter_core::{Offset, State};

/// The single shared mutable resource in the system: all access funnels
/// through here, one file per key, serialized by the writer's own drain
/// loop (only one task ever writes a given writer's offset or a given
/// namespace's state).
pub struct OffsetStateStore {
    root: PathBuf,
}

impl OffsetStateStore {
    pub fn open(root: impl AsRef<Path>) -> anyhow::Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(root.join("offsets"))?;
        fs::create_dir_all(root.join("states"))?;
        Ok(Self { root })
    }

    fn offset_path(&self, writer_id: &str) -> PathBuf {
        self.root.join("offsets").join(format!("{writer_id}.json"))
    }

    fn state_path(&self, namespace: &str) -> PathBuf {
        self.root.join("states").join(format!("{}.json", sanitize(namespace)))
    }

    pub fn read_offset(&self, writer_id: &str) -> anyhow::Result<Option<Offset>> {
        let path = self.offset_path(writer_id);
        read_json(&path)
    }

    pub fn read_state(&self, namespace: &str) -> anyhow::Result<Option<State>> {
        let path = self.state_path(namespace);
        read_json(&path)
    }

    pub fn read_all_states(&self) -> anyhow::Result<Vec<State>> {
        let dir = self.root.join("states");
        let mut out = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            if let Some(state) = read_json(&entry.path())? {
                out.push(state);
            }
        }
        Ok(out)
    }

    /// Atomically advance `writer_id`'s offset and replace the persisted
    /// state for every namespace in `states`, in that order, so a recovered
    /// pipeline never observes a writer offset newer than the reader state
    /// it corresponds to.
    ///
    /// Each `State` only replaces what's on disk if it's newer by
    /// timestamp — older states never overwrite newer ones.
    pub fn commit_group(&self, writer_id: &str, offset: Offset, states: &[State]) -> anyhow::Result<()> {
        for state in states {
            let path = self.state_path(&state.namespace);
            if let Some(existing) = read_json::<State>(&path)? {
                if !state.supersedes(&existing) {
                    continue;
                }
            }
            write_json_atomic(&path, state)?;
        }
        // Offset is written last: on replay, an offset with no matching
        // fresh state just means the state write is redone next batch.
        write_json_atomic(&self.offset_path(writer_id), &offset)?;
        Ok(())
    }
}

fn sanitize(namespace: &str) -> String {
    namespace.replace(['/', '\\'], "_")
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let bytes = fs::read(path)?;
    Ok(Some(serde_json::from_slice(&bytes)?))
}

fn write_json_atomic<T: serde::Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    let tmp_path = path.with_extension("tmp");
    {
        let mut tmp: File = OpenOptions::new().write(true).create(true).truncate(true).open(&tmp_path)?;
        let bytes = serde_json::to_vec(value)?;
        tmp.write_all(&bytes)?;
        tmp.sync_all()?;
    }
    fs::rename(&tmp_path, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use transporter_core::{Mode, Value};

    fn state(ns: &str, ts: i64) -> State {
        State::new(ns, Value::Int(ts), ts, Mode::Sync)
    }

    #[test]
    fn round_trips_offset_and_state() {
        let dir = tempdir().unwrap();
        let store = OffsetStateStore::open(dir.path()).unwrap();
        store.commit_group("w1", Offset(9), &[state("db.users", 9)]).unwrap();

        assert_eq!(store.read_offset("w1").unwrap(), Some(Offset(9)));
        assert_eq!(store.read_state("db.users").unwrap(), Some(state("db.users", 9)));
    }

    #[test]
    fn older_state_never_overwrites_newer() {
        let dir = tempdir().unwrap();
        let store = OffsetStateStore::open(dir.path()).unwrap();
        store.commit_group("w1", Offset(5), &[state("db.users", 500)]).unwrap();
        store.commit_group("w1", Offset(6), &[state("db.users", 100)]).unwrap();

        let current = store.read_state("db.users").unwrap().unwrap();
        assert_eq!(current.timestamp, 500);
        // offset still advances independent of whether the state was applied
        assert_eq!(store.read_offset("w1").unwrap(), Some(Offset(6)));
    }

    #[test]
    fn read_all_states_lists_every_namespace() {
        let dir = tempdir().unwrap();
        let store = OffsetStateStore::open(dir.path()).unwrap();
        store.commit_group("w1", Offset(1), &[state("db.a", 1), state("db.b", 1)]).unwrap();

        let mut namespaces: Vec<String> = store.read_all_states().unwrap().into_iter().map(|s| s.namespace).collect();
        namespaces.sort();
        assert_eq!(namespaces, vec!["db.a".to_string(), "db.b".to_string()]);
    }
}
