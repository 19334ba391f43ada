//! Backing store: the baseline snapshot table and the change history.
//!
//! [`BaselineStore`] holds one row per `(machine, entity)`; [`ChangeRecorder`]
//! only ever appends. Both are implemented by the JSON file backend
//! ([`FileStore`]), the PostgREST backend ([`RestStore`]), the [`Store`] enum
//! selecting between them, and the non-persisting [`DryRunStore`] overlay.

pub mod dry_run;
pub mod file;
pub mod rest;

use compwatch_core::{BaselineRecord, ChangeRecord, EntityCode, MachineId};

use crate::error::StoreError;

pub use dry_run::DryRunStore;
pub use file::FileStore;
pub use rest::{RestInventory, RestStore};

/// Whether an upsert created the row or replaced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

/// Keyed `(machine, entity)` → last-known snapshot.
pub trait BaselineStore {
    fn get(
        &self,
        machine_id: &MachineId,
        entity: EntityCode,
    ) -> Result<Option<BaselineRecord>, StoreError>;

    /// Insert the row if none exists for the record's key, else replace it.
    fn upsert(&mut self, record: &BaselineRecord) -> Result<UpsertOutcome, StoreError>;

    /// Every stored baseline of one machine, ordered by entity.
    fn list(&self, machine_id: &MachineId) -> Result<Vec<BaselineRecord>, StoreError>;

    /// Make buffered upserts durable. Backends that write through on every
    /// upsert keep the default.
    fn flush(&mut self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Append-only change history.
pub trait ChangeRecorder {
    fn append(&mut self, record: &ChangeRecord) -> Result<(), StoreError>;
}

/// The configured backend.
pub enum Store {
    File(FileStore),
    Rest(RestStore),
}

impl Store {
    /// Lightweight reachability check, run once at startup.
    pub fn ping(&self) -> Result<(), StoreError> {
        match self {
            Store::File(store) => store.ping(),
            Store::Rest(store) => store.ping(),
        }
    }

    /// Human-readable location, for logs.
    pub fn describe(&self) -> String {
        match self {
            Store::File(store) => format!("file:{}", store.dir().display()),
            Store::Rest(store) => format!("rest:{}", store.base_url()),
        }
    }
}

impl BaselineStore for Store {
    fn get(
        &self,
        machine_id: &MachineId,
        entity: EntityCode,
    ) -> Result<Option<BaselineRecord>, StoreError> {
        match self {
            Store::File(store) => store.get(machine_id, entity),
            Store::Rest(store) => store.get(machine_id, entity),
        }
    }

    fn upsert(&mut self, record: &BaselineRecord) -> Result<UpsertOutcome, StoreError> {
        match self {
            Store::File(store) => store.upsert(record),
            Store::Rest(store) => store.upsert(record),
        }
    }

    fn list(&self, machine_id: &MachineId) -> Result<Vec<BaselineRecord>, StoreError> {
        match self {
            Store::File(store) => store.list(machine_id),
            Store::Rest(store) => store.list(machine_id),
        }
    }

    fn flush(&mut self) -> Result<(), StoreError> {
        match self {
            Store::File(store) => store.flush(),
            Store::Rest(store) => store.flush(),
        }
    }
}

impl ChangeRecorder for Store {
    fn append(&mut self, record: &ChangeRecord) -> Result<(), StoreError> {
        match self {
            Store::File(store) => store.append(record),
            Store::Rest(store) => store.append(record),
        }
    }
}
