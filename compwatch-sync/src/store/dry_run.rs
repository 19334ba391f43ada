//! Non-persisting overlay used by `sync --dry-run`.
//!
//! Reads fall through to the wrapped store unless this run already upserted the
//! key; writes stay in memory.

use std::collections::BTreeMap;

use compwatch_core::{BaselineRecord, ChangeRecord, EntityCode, MachineId};

use super::{BaselineStore, ChangeRecorder, UpsertOutcome};
use crate::error::StoreError;

pub struct DryRunStore<'a, S: BaselineStore> {
    inner: &'a S,
    baselines: BTreeMap<(MachineId, EntityCode), BaselineRecord>,
    changes: Vec<ChangeRecord>,
}

impl<'a, S: BaselineStore> DryRunStore<'a, S> {
    pub fn new(inner: &'a S) -> Self {
        Self {
            inner,
            baselines: BTreeMap::new(),
            changes: Vec::new(),
        }
    }

    /// Changes that would have been recorded.
    pub fn changes(&self) -> &[ChangeRecord] {
        &self.changes
    }

    /// Baselines that would have been written.
    pub fn pending_baselines(&self) -> usize {
        self.baselines.len()
    }
}

impl<S: BaselineStore> BaselineStore for DryRunStore<'_, S> {
    fn get(
        &self,
        machine_id: &MachineId,
        entity: EntityCode,
    ) -> Result<Option<BaselineRecord>, StoreError> {
        match self.baselines.get(&(machine_id.clone(), entity)) {
            Some(record) => Ok(Some(record.clone())),
            None => self.inner.get(machine_id, entity),
        }
    }

    fn upsert(&mut self, record: &BaselineRecord) -> Result<UpsertOutcome, StoreError> {
        let existed = self.get(&record.machine_id, record.entity)?.is_some();
        self.baselines.insert(
            (record.machine_id.clone(), record.entity),
            record.clone(),
        );
        Ok(if existed {
            UpsertOutcome::Updated
        } else {
            UpsertOutcome::Inserted
        })
    }

    fn list(&self, machine_id: &MachineId) -> Result<Vec<BaselineRecord>, StoreError> {
        let mut merged: BTreeMap<EntityCode, BaselineRecord> = self
            .inner
            .list(machine_id)?
            .into_iter()
            .map(|r| (r.entity, r))
            .collect();
        for ((m, entity), record) in &self.baselines {
            if m == machine_id {
                merged.insert(*entity, record.clone());
            }
        }
        Ok(merged.into_values().collect())
    }
}

impl<S: BaselineStore> ChangeRecorder for DryRunStore<'_, S> {
    fn append(&mut self, record: &ChangeRecord) -> Result<(), StoreError> {
        self.changes.push(record.clone());
        Ok(())
    }
}
