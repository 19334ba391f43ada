//! Best-effort change recording.

use compwatch_core::ChangeRecord;

use crate::store::ChangeRecorder;

/// How many records of a batch were persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordTally {
    pub written: usize,
    pub failed: usize,
}

/// Append every change; a failed append is logged and the rest continue.
pub fn record_all<R: ChangeRecorder + ?Sized>(
    recorder: &mut R,
    changes: &[ChangeRecord],
) -> RecordTally {
    let mut tally = RecordTally::default();
    for change in changes {
        match recorder.append(change) {
            Ok(()) => {
                tracing::info!(
                    machine = %change.machine_id,
                    entity = %change.entity,
                    field = %change.field,
                    old = change.old_or_zero(),
                    new = change.new_value,
                    delta = change.delta,
                    "offset changed",
                );
                tally.written += 1;
            }
            Err(err) => {
                tracing::error!(
                    machine = %change.machine_id,
                    entity = %change.entity,
                    field = %change.field,
                    error = %err,
                    "failed to record change; dropping it",
                );
                tally.failed += 1;
            }
        }
    }
    tally
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use compwatch_core::{EntityCode, Field, MachineId};

    use crate::error::StoreError;

    /// Rejects every second append.
    #[derive(Default)]
    struct Flaky {
        calls: usize,
        kept: Vec<ChangeRecord>,
    }

    impl ChangeRecorder for Flaky {
        fn append(&mut self, record: &ChangeRecord) -> Result<(), StoreError> {
            self.calls += 1;
            if self.calls % 2 == 0 {
                return Err(StoreError::Persistence("HTTP 503".to_string()));
            }
            self.kept.push(record.clone());
            Ok(())
        }
    }

    fn change(field: Field) -> ChangeRecord {
        ChangeRecord {
            machine_id: MachineId::from("M1"),
            entity: EntityCode::Tool(1),
            field,
            old_value: Some(0.0),
            new_value: 0.01,
            delta: 0.01,
            changed_at: Utc::now(),
        }
    }

    #[test]
    fn one_failure_does_not_stop_the_rest() {
        let changes: Vec<_> = Field::TOOL.into_iter().map(change).collect();
        let mut recorder = Flaky::default();

        let tally = record_all(&mut recorder, &changes);
        assert_eq!(tally, RecordTally { written: 2, failed: 2 });
        assert_eq!(recorder.calls, 4);
        assert_eq!(recorder.kept[1].field, Field::LengthGeometry);
    }
}
