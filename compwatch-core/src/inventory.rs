//! Machine inventory.
//!
//! The machine list is read fresh at the start of every pass. Only machines
//! with a non-blank device address are monitored.
//!
//! # File layout
//!
//! ```yaml
//! machines:
//!   - id: 7f0c…
//!     display_number: "5701"
//!     device_address: 10.0.10.21
//!   - id: 91aa…
//!     display_number: "5702"      # no address, listed but not monitored
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::InventoryError;
use crate::types::Machine;

/// Source of the machine list.
pub trait Inventory {
    /// Every machine known to the inventory, monitored or not.
    fn machines(&self) -> Result<Vec<Machine>, InventoryError>;

    /// Machines that carry a device address, in inventory order.
    fn monitored_machines(&self) -> Result<Vec<Machine>, InventoryError> {
        let mut machines = self.machines()?;
        machines.retain(Machine::is_monitored);
        Ok(machines)
    }
}

/// On-disk inventory payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryFile {
    #[serde(default)]
    pub machines: Vec<Machine>,
}

/// YAML-file backed inventory, re-read on every call.
#[derive(Debug, Clone)]
pub struct FileInventory {
    path: PathBuf,
}

impl FileInventory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Inventory for FileInventory {
    fn machines(&self) -> Result<Vec<Machine>, InventoryError> {
        Ok(load_at(&self.path)?.machines)
    }
}

/// Load an inventory file. A missing file is an error: the pass is skipped.
pub fn load_at(path: &Path) -> Result<InventoryFile, InventoryError> {
    let contents = std::fs::read_to_string(path).map_err(|source| InventoryError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_yaml::from_str(&contents).map_err(|source| InventoryError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
