//! DiffEngine: current reading vs. stored baseline.
//!
//! Two rules decide what is emitted:
//!
//! 1. Zero-suppression: an entity whose every field is absent or exactly zero
//!    is skipped altogether (no baseline write, no change).
//! 2. Threshold: a present field whose value differs from the baseline by
//!    more than [`CHANGE_THRESHOLD_MM`] produces one [`ChangeRecord`].
//!
//! Absent fields are never compared.

use chrono::{DateTime, Utc};

use compwatch_core::{BaselineRecord, ChangeRecord, EntityCode, FieldValues, MachineId};

/// Minimum drift reported, in millimeters.
///
/// Registers resolve to 0.001 mm, so any real one-count change exceeds this
/// while float noise from the raw/1000 conversion does not.
pub const CHANGE_THRESHOLD_MM: f64 = 0.0005;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DiffEngine {
    threshold: f64,
}

impl Default for DiffEngine {
    fn default() -> Self {
        Self::new(CHANGE_THRESHOLD_MM)
    }
}

impl DiffEngine {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold: threshold.abs(),
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// True when every field is absent or numerically zero.
    pub fn is_suppressed(current: &FieldValues) -> bool {
        current.values().all(|v| v.map_or(true, |mm| mm == 0.0))
    }

    /// Changes for one entity, in field order.
    ///
    /// The delta is measured against the stored baseline, or against `0.0`
    /// when there is none; `old_value` keeps the distinction.
    pub fn compare(
        &self,
        machine_id: &MachineId,
        entity: EntityCode,
        current: &FieldValues,
        baseline: Option<&BaselineRecord>,
        now: DateTime<Utc>,
    ) -> Vec<ChangeRecord> {
        if Self::is_suppressed(current) {
            return Vec::new();
        }

        entity
            .fields()
            .iter()
            .filter_map(|field| {
                let new_value = current.get(field).copied().flatten()?;
                let old_value = baseline.and_then(|b| b.value(*field));
                let delta = new_value - old_value.unwrap_or(0.0);
                (delta.abs() > self.threshold).then(|| ChangeRecord {
                    machine_id: machine_id.clone(),
                    entity,
                    field: *field,
                    old_value,
                    new_value,
                    delta,
                    changed_at: now,
                })
            })
            .collect()
    }
}
