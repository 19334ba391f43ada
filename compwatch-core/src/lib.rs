//! compwatch core library: domain types, register catalog, unit conversion,
//! machine inventory.
//!
//! - [`types`]: machines, entities, fields, axes, readings, records
//! - [`catalog`]: [`RegisterCatalog`], the set of monitored entities
//! - [`units`]: device-native ↔ millimeter conversion
//! - [`inventory`]: [`Inventory`] trait and the YAML file inventory
//! - [`error`]: [`CoreError`], [`InventoryError`]

pub mod catalog;
pub mod error;
pub mod inventory;
pub mod types;
pub mod units;

pub use catalog::RegisterCatalog;
pub use error::{CoreError, InventoryError};
pub use inventory::{FileInventory, Inventory};
pub use types::{
    Axis, BaselineRecord, ChangeRecord, EntityCode, EntityKind, Field, FieldValues, Machine,
    MachineId, RawReading,
};
