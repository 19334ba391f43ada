//! SyncCycle: the per-machine routine and the pass over all machines.
//!
//! Per machine, strictly in this order:
//!
//! 1. connect
//! 2. read every tool register
//! 3. per tool entity: diff → record changes → upsert baseline
//! 4. read the five coordinate axes
//! 5. merge axes into per-coordinate-system readings
//! 6. per coordinate entity: diff → record changes → upsert baseline
//! 7. disconnect
//! 8. flush the machine's baselines to the store
//!
//! The initialization pass and every steady-state pass call the same
//! [`run_pass`]. Nothing here returns early on a per-entity, per-axis or
//! per-machine failure: it is logged, counted in the summary, and the pass
//! moves on.

use chrono::Utc;

use compwatch_core::{BaselineRecord, Inventory, Machine, MachineId, RawReading, RegisterCatalog};
use compwatch_gateway::{read_coordinates, read_tools, DeviceReader, ReadMode};

use crate::diff::DiffEngine;
use crate::error::SyncError;
use crate::recorder::record_all;
use crate::store::{BaselineStore, ChangeRecorder, UpsertOutcome};

// ---------------------------------------------------------------------------
// Options and summaries
// ---------------------------------------------------------------------------

/// Settings shared by every machine in a pass.
#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    pub catalog: RegisterCatalog,
    pub read_mode: ReadMode,
    pub engine: DiffEngine,
    /// Restrict the pass to one machine.
    pub machine: Option<MachineId>,
}

/// What happened to one machine during a pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MachineSummary {
    pub machine_id: MachineId,
    pub address: String,
    /// False when the gateway session could not be opened.
    pub connected: bool,
    /// Entities diffed and persisted.
    pub checked: usize,
    /// Entities skipped by zero-suppression.
    pub skipped: usize,
    /// Entities with at least one change.
    pub changed: usize,
    pub records_written: usize,
    pub records_failed: usize,
    pub baselines_inserted: usize,
    pub baselines_updated: usize,
    pub baselines_failed: usize,
    /// Gateway calls whose data was treated as absent.
    pub unavailable_reads: usize,
    /// Every change detected, recorded or not.
    pub changes: Vec<compwatch_core::ChangeRecord>,
}

impl MachineSummary {
    fn new(machine: &Machine, address: &str) -> Self {
        Self {
            machine_id: machine.id.clone(),
            address: address.to_string(),
            ..Default::default()
        }
    }

    pub fn baselines_written(&self) -> usize {
        self.baselines_inserted + self.baselines_updated
    }
}

/// Aggregate of one pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PassSummary {
    pub machines: Vec<MachineSummary>,
}

impl PassSummary {
    pub fn total_changes(&self) -> usize {
        self.machines.iter().map(|m| m.changes.len()).sum()
    }

    pub fn unreachable_machines(&self) -> usize {
        self.machines.iter().filter(|m| !m.connected).count()
    }

    pub fn failures(&self) -> usize {
        self.machines
            .iter()
            .map(|m| m.records_failed + m.baselines_failed)
            .sum()
    }
}

// ---------------------------------------------------------------------------
// Pass
// ---------------------------------------------------------------------------

/// Run one pass over every monitored machine, sequentially.
///
/// Fails only when the machine list cannot be obtained or the requested
/// machine is not monitored.
pub fn run_pass<I, R, S>(
    inventory: &I,
    reader: &R,
    store: &mut S,
    options: &SyncOptions,
) -> Result<PassSummary, SyncError>
where
    I: Inventory + ?Sized,
    R: DeviceReader + ?Sized,
    S: BaselineStore + ChangeRecorder,
{
    let mut machines = inventory.monitored_machines()?;
    if let Some(only) = &options.machine {
        machines.retain(|m| &m.id == only);
        if machines.is_empty() {
            return Err(SyncError::MachineNotFound(only.to_string()));
        }
    }

    tracing::info!(machines = machines.len(), "sync pass started");
    let mut summary = PassSummary::default();
    for machine in &machines {
        summary
            .machines
            .push(sync_machine(reader, store, machine, options));
    }
    tracing::info!(
        machines = summary.machines.len(),
        unreachable = summary.unreachable_machines(),
        changes = summary.total_changes(),
        failures = summary.failures(),
        "sync pass finished",
    );
    Ok(summary)
}

// ---------------------------------------------------------------------------
// Per machine
// ---------------------------------------------------------------------------

/// Read, diff and persist every monitored entity of one machine.
pub fn sync_machine<R, S>(
    reader: &R,
    store: &mut S,
    machine: &Machine,
    options: &SyncOptions,
) -> MachineSummary
where
    R: DeviceReader + ?Sized,
    S: BaselineStore + ChangeRecorder,
{
    let Some(address) = machine.address() else {
        return MachineSummary::new(machine, "");
    };
    let mut summary = MachineSummary::new(machine, address);

    if let Err(err) = reader.connect(address) {
        tracing::warn!(
            machine = %machine.id,
            address,
            error = %err,
            "could not open gateway session; machine skipped this pass",
        );
        summary.unavailable_reads += 1;
        return summary;
    }
    summary.connected = true;

    let tools = read_tools(reader, address, &options.catalog, options.read_mode);
    summary.unavailable_reads += tools.failed_calls;
    for reading in &tools.readings {
        process_entity(store, &options.engine, &machine.id, reading, &mut summary);
    }

    let coordinates = read_coordinates(reader, address);
    summary.unavailable_reads += coordinates.failed_calls;
    for reading in &coordinates.readings {
        process_entity(store, &options.engine, &machine.id, reading, &mut summary);
    }

    reader.disconnect();

    if let Err(err) = store.flush() {
        tracing::error!(
            machine = %machine.id,
            error = %err,
            "failed to persist baselines; retrying on the next flush",
        );
        summary.baselines_failed += summary.baselines_written();
        summary.baselines_inserted = 0;
        summary.baselines_updated = 0;
    }

    tracing::info!(
        machine = %machine.id,
        checked = summary.checked,
        skipped = summary.skipped,
        changed = summary.changed,
        records_written = summary.records_written,
        records_failed = summary.records_failed,
        baselines_written = summary.baselines_written(),
        baselines_failed = summary.baselines_failed,
        unavailable_reads = summary.unavailable_reads,
        "machine synced",
    );
    summary
}

fn process_entity<S>(
    store: &mut S,
    engine: &DiffEngine,
    machine_id: &MachineId,
    reading: &RawReading,
    summary: &mut MachineSummary,
) where
    S: BaselineStore + ChangeRecorder,
{
    let entity = reading.entity;
    let current = reading.to_mm();
    if DiffEngine::is_suppressed(&current) {
        summary.skipped += 1;
        return;
    }

    // Read the baseline right before diffing so an earlier upsert in this
    // pass is always seen.
    let baseline = match store.get(machine_id, entity) {
        Ok(baseline) => baseline,
        Err(err) => {
            tracing::error!(
                machine = %machine_id,
                entity = %entity,
                error = %err,
                "could not read baseline; entity skipped",
            );
            summary.baselines_failed += 1;
            return;
        }
    };
    summary.checked += 1;

    let now = Utc::now();
    let changes = engine.compare(machine_id, entity, &current, baseline.as_ref(), now);
    if !changes.is_empty() {
        summary.changed += 1;
        let tally = record_all(store, &changes);
        summary.records_written += tally.written;
        summary.records_failed += tally.failed;
        summary.changes.extend(changes);
    }

    let record = BaselineRecord::merge(baseline.as_ref(), machine_id, entity, &current, now);
    match store.upsert(&record) {
        Ok(UpsertOutcome::Inserted) => summary.baselines_inserted += 1,
        Ok(UpsertOutcome::Updated) => summary.baselines_updated += 1,
        Err(err) => {
            tracing::error!(
                machine = %machine_id,
                entity = %entity,
                error = %err,
                "failed to upsert baseline",
            );
            summary.baselines_failed += 1;
        }
    }
}
