//! # compwatch-sync
//!
//! Drift detection and persistence.
//!
//! Call [`run_pass`] to read, diff and persist every monitored machine once,
//! or [`sync_machine`] for a single machine. Baselines and change history go
//! through the [`BaselineStore`] and [`ChangeRecorder`] traits; [`Store`] picks
//! the file or REST backend.

pub mod diff;
pub mod error;
pub mod pipeline;
pub mod recorder;
pub mod store;

pub use diff::{DiffEngine, CHANGE_THRESHOLD_MM};
pub use error::{StoreError, SyncError};
pub use pipeline::{run_pass, sync_machine, MachineSummary, PassSummary, SyncOptions};
pub use recorder::{record_all, RecordTally};
pub use store::{
    BaselineStore, ChangeRecorder, DryRunStore, FileStore, RestInventory, RestStore, Store,
    UpsertOutcome,
};
