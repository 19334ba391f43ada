//! JSON file backend.
//!
//! ```text
//! <dir>/snapshot.json   all baseline records, rewritten atomically on flush
//! <dir>/changes.jsonl   change history, one JSON object per line, append-only
//! ```
//!
//! The snapshot is loaded once on [`FileStore::open`] and kept in memory.
//! Upserts only touch memory; [`BaselineStore::flush`] writes
//! `snapshot.json.tmp` then renames it over `snapshot.json`. The sync pipeline
//! flushes once per machine, so a crash mid-machine loses at most that
//! machine's baseline updates, which the next pass re-derives.

use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use compwatch_core::{BaselineRecord, ChangeRecord, EntityCode, MachineId};

use super::{BaselineStore, ChangeRecorder, UpsertOutcome};
use crate::error::{io_err, StoreError};

pub const SNAPSHOT_FILE: &str = "snapshot.json";
pub const CHANGES_FILE: &str = "changes.jsonl";

/// On-disk snapshot payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SnapshotFile {
    updated_at: DateTime<Utc>,
    #[serde(default)]
    records: Vec<BaselineRecord>,
}

type Key = (MachineId, EntityCode);

#[derive(Debug)]
pub struct FileStore {
    dir: PathBuf,
    records: BTreeMap<Key, BaselineRecord>,
    /// Memory holds upserts not yet written to `snapshot.json`.
    dirty: bool,
}

impl FileStore {
    /// Open (creating if needed) the store rooted at `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;

        let path = dir.join(SNAPSHOT_FILE);
        let records = match std::fs::read_to_string(&path) {
            Ok(contents) => {
                let snapshot: SnapshotFile = serde_json::from_str(&contents)?;
                snapshot
                    .records
                    .into_iter()
                    .map(|r| ((r.machine_id.clone(), r.entity), r))
                    .collect()
            }
            Err(e) if e.kind() == ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(io_err(&path, e)),
        };
        Ok(Self {
            dir,
            records,
            dirty: false,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.dir.join(SNAPSHOT_FILE)
    }

    pub fn changes_path(&self) -> PathBuf {
        self.dir.join(CHANGES_FILE)
    }

    /// The store directory must exist and be a directory.
    pub fn ping(&self) -> Result<(), StoreError> {
        let meta = std::fs::metadata(&self.dir).map_err(|e| io_err(&self.dir, e))?;
        if meta.is_dir() {
            Ok(())
        } else {
            Err(StoreError::Unreachable(format!(
                "{} is not a directory",
                self.dir.display()
            )))
        }
    }

    /// Read the full change history back, oldest first.
    pub fn load_changes(&self) -> Result<Vec<ChangeRecord>, StoreError> {
        let path = self.changes_path();
        let file = match std::fs::File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_err(&path, e)),
        };
        let mut changes = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line.map_err(|e| io_err(&path, e))?;
            if line.trim().is_empty() {
                continue;
            }
            changes.push(serde_json::from_str(&line)?);
        }
        Ok(changes)
    }

    fn save(&self) -> Result<(), StoreError> {
        let snapshot = SnapshotFile {
            updated_at: Utc::now(),
            records: self.records.values().cloned().collect(),
        };
        let json = serde_json::to_string_pretty(&snapshot)?;
        let path = self.snapshot_path();
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, &json).map_err(|e| io_err(&tmp, e))?;
        if let Err(e) = std::fs::rename(&tmp, &path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(io_err(&path, e));
        }
        Ok(())
    }
}

impl BaselineStore for FileStore {
    fn get(
        &self,
        machine_id: &MachineId,
        entity: EntityCode,
    ) -> Result<Option<BaselineRecord>, StoreError> {
        Ok(self.records.get(&(machine_id.clone(), entity)).cloned())
    }

    fn upsert(&mut self, record: &BaselineRecord) -> Result<UpsertOutcome, StoreError> {
        let key = (record.machine_id.clone(), record.entity);
        let previous = self.records.insert(key, record.clone());
        self.dirty = true;

        Ok(if previous.is_some() {
            UpsertOutcome::Updated
        } else {
            UpsertOutcome::Inserted
        })
    }

    fn list(&self, machine_id: &MachineId) -> Result<Vec<BaselineRecord>, StoreError> {
        Ok(self
            .records
            .range((machine_id.clone(), EntityCode::Tool(0))..)
            .take_while(|((m, _), _)| m == machine_id)
            .map(|(_, r)| r.clone())
            .collect())
    }

    /// Write the snapshot if anything changed since the last flush. A failed
    /// write keeps the store dirty so the next flush retries.
    fn flush(&mut self) -> Result<(), StoreError> {
        if !self.dirty {
            return Ok(());
        }
        self.save()?;
        self.dirty = false;
        Ok(())
    }
}

impl ChangeRecorder for FileStore {
    fn append(&mut self, record: &ChangeRecord) -> Result<(), StoreError> {
        let path = self.changes_path();
        let mut line = serde_json::to_string(record)?;
        line.push('\n');
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| io_err(&path, e))?;
        file.write_all(line.as_bytes())
            .map_err(|e| io_err(&path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use compwatch_core::{Field, FieldValues};
    use tempfile::TempDir;

    fn record(machine: &str, entity: EntityCode, field: Field, mm: f64) -> BaselineRecord {
        let mut values = FieldValues::new();
        values.insert(field, Some(mm));
        BaselineRecord::merge(None, &MachineId::from(machine), entity, &values, Utc::now())
    }

    #[test]
    fn empty_store_when_directory_is_new() {
        let tmp = TempDir::new().unwrap();
        let store = FileStore::open(tmp.path().join("data")).unwrap();
        assert!(store.list(&MachineId::from("M1")).unwrap().is_empty());
        assert!(store.load_changes().unwrap().is_empty());
        store.ping().unwrap();
    }

    #[test]
    fn upsert_inserts_then_updates_one_row() {
        let tmp = TempDir::new().unwrap();
        let mut store = FileStore::open(tmp.path()).unwrap();
        let first = record("M1", EntityCode::Tool(5), Field::RadiusWear, 0.120);
        let second = record("M1", EntityCode::Tool(5), Field::RadiusWear, 0.134);

        assert_eq!(store.upsert(&first).unwrap(), UpsertOutcome::Inserted);
        assert_eq!(store.upsert(&second).unwrap(), UpsertOutcome::Updated);

        let rows = store.list(&MachineId::from("M1")).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].value(Field::RadiusWear), Some(0.134));
    }

    #[test]
    fn snapshot_survives_reopen() {
        let tmp = TempDir::new().unwrap();
        {
            let mut store = FileStore::open(tmp.path()).unwrap();
            store
                .upsert(&record("M1", EntityCode::Coordinate(3), Field::Z, -12.5))
                .unwrap();
            store.flush().unwrap();
        }
        let store = FileStore::open(tmp.path()).unwrap();
        let row = store
            .get(&MachineId::from("M1"), EntityCode::Coordinate(3))
            .unwrap()
            .expect("row");
        assert_eq!(row.value(Field::Z), Some(-12.5));
        assert_eq!(row.value(Field::X), None);
    }

    #[test]
    fn upserts_reach_disk_only_on_flush() {
        let tmp = TempDir::new().unwrap();
        let mut store = FileStore::open(tmp.path()).unwrap();
        store.flush().unwrap();
        assert!(!store.snapshot_path().exists(), "clean flush writes nothing");

        for n in 1..=3 {
            store
                .upsert(&record("M1", EntityCode::Tool(n), Field::RadiusWear, 0.1))
                .unwrap();
        }
        assert!(!store.snapshot_path().exists());

        store.flush().unwrap();
        let reopened = FileStore::open(tmp.path()).unwrap();
        assert_eq!(reopened.list(&MachineId::from("M1")).unwrap().len(), 3);
    }

    #[test]
    fn failed_flush_is_retried_by_the_next_one() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("data");
        let mut store = FileStore::open(&dir).unwrap();
        store
            .upsert(&record("M1", EntityCode::Tool(1), Field::LengthWear, 0.01))
            .unwrap();

        std::fs::remove_dir_all(&dir).unwrap();
        assert!(matches!(store.flush(), Err(StoreError::Io { .. })));

        std::fs::create_dir_all(&dir).unwrap();
        store.flush().unwrap();
        assert!(store.snapshot_path().exists());
    }

    #[test]
    fn tmp_file_cleaned_up_after_save() {
        let tmp = TempDir::new().unwrap();
        let mut store = FileStore::open(tmp.path()).unwrap();
        store
            .upsert(&record("M1", EntityCode::Tool(1), Field::LengthWear, 0.01))
            .unwrap();
        store.flush().unwrap();
        assert!(store.snapshot_path().exists());
        assert!(!store.snapshot_path().with_extension("json.tmp").exists());
    }

    #[test]
    fn list_is_scoped_to_one_machine() {
        let tmp = TempDir::new().unwrap();
        let mut store = FileStore::open(tmp.path()).unwrap();
        for (machine, entity) in [
            ("M1", EntityCode::Tool(2)),
            ("M2", EntityCode::Tool(1)),
            ("M1", EntityCode::Coordinate(1)),
        ] {
            store
                .upsert(&record(machine, entity, Field::RadiusWear, 1.0))
                .unwrap();
        }
        let m1: Vec<_> = store
            .list(&MachineId::from("M1"))
            .unwrap()
            .into_iter()
            .map(|r| r.entity)
            .collect();
        assert_eq!(m1, vec![EntityCode::Tool(2), EntityCode::Coordinate(1)]);
    }

    #[test]
    fn changes_append_as_json_lines() {
        let tmp = TempDir::new().unwrap();
        let mut store = FileStore::open(tmp.path()).unwrap();
        for new_value in [0.1, 0.2] {
            store
                .append(&ChangeRecord {
                    machine_id: MachineId::from("M1"),
                    entity: EntityCode::Tool(5),
                    field: Field::RadiusWear,
                    old_value: None,
                    new_value,
                    delta: new_value,
                    changed_at: Utc::now(),
                })
                .unwrap();
        }
        let raw = std::fs::read_to_string(store.changes_path()).unwrap();
        assert_eq!(raw.lines().count(), 2);
        assert!(raw.contains(r#""entity":"T5""#));

        let changes = store.load_changes().unwrap();
        assert_eq!(changes.len(), 2);
        assert!((changes[1].new_value - 0.2).abs() < 1e-12);
    }

    #[test]
    fn corrupt_snapshot_is_an_error() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join(SNAPSHOT_FILE), "{ not json").unwrap();
        assert!(matches!(
            FileStore::open(tmp.path()),
            Err(StoreError::Json(_))
        ));
    }
}
