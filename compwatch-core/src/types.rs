//! Domain types for compwatch.
//!
//! Raw register values are `i32` in device-native units (thousandths of a
//! millimeter). Everything persisted or compared is `f64` millimeters.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::units::raw_to_mm;

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Identifier of a machine in the inventory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MachineId(pub String);

impl fmt::Display for MachineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for MachineId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for MachineId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Machine
// ---------------------------------------------------------------------------

/// A machine controller as listed by the inventory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Machine {
    pub id: MachineId,
    #[serde(default)]
    pub display_number: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_address: Option<String>,
}

impl Machine {
    /// The device address, if set and non-blank.
    pub fn address(&self) -> Option<&str> {
        self.device_address
            .as_deref()
            .map(str::trim)
            .filter(|addr| !addr.is_empty())
    }

    /// Only machines with a device address are monitored.
    pub fn is_monitored(&self) -> bool {
        self.address().is_some()
    }
}

// ---------------------------------------------------------------------------
// Fields and axes
// ---------------------------------------------------------------------------

/// A tracked numeric field of an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Field {
    RadiusGeometry,
    RadiusWear,
    LengthGeometry,
    LengthWear,
    X,
    Y,
    Z,
    C,
    B,
}

impl Field {
    /// Fields carried by tool entities.
    pub const TOOL: [Field; 4] = [
        Field::RadiusGeometry,
        Field::RadiusWear,
        Field::LengthGeometry,
        Field::LengthWear,
    ];

    /// Fields carried by coordinate-system entities, in axis order.
    pub const COORDINATE: [Field; 5] = [Field::X, Field::Y, Field::Z, Field::C, Field::B];

    pub fn as_str(self) -> &'static str {
        match self {
            Field::RadiusGeometry => "radiusGeometry",
            Field::RadiusWear => "radiusWear",
            Field::LengthGeometry => "lengthGeometry",
            Field::LengthWear => "lengthWear",
            Field::X => "x",
            Field::Y => "y",
            Field::Z => "z",
            Field::C => "c",
            Field::B => "b",
        }
    }

    /// Column name in the snapshot table.
    pub fn column(self) -> &'static str {
        match self {
            Field::RadiusGeometry => "radius_geometry",
            Field::RadiusWear => "radius_wear",
            Field::LengthGeometry => "length_geometry",
            Field::LengthWear => "length_wear",
            Field::X => "coord_x",
            Field::Y => "coord_y",
            Field::Z => "coord_z",
            Field::C => "coord_c",
            Field::B => "coord_b",
        }
    }

    pub fn all() -> impl Iterator<Item = Field> {
        Field::TOOL.into_iter().chain(Field::COORDINATE)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Field {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Field::all()
            .find(|field| field.as_str() == s || field.column() == s)
            .ok_or_else(|| CoreError::UnknownField(s.to_owned()))
    }
}

/// A work-coordinate axis. The device numbers axes 1..=5; storage is 0-indexed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Axis {
    X,
    Y,
    Z,
    C,
    B,
}

impl Axis {
    pub const ALL: [Axis; 5] = [Axis::X, Axis::Y, Axis::Z, Axis::C, Axis::B];

    /// 0-based position in [`Axis::ALL`].
    pub fn index(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
            Axis::C => 3,
            Axis::B => 4,
        }
    }

    /// Axis number as the controller expects it (1-based).
    pub fn device_number(self) -> u8 {
        self.index() as u8 + 1
    }

    pub fn from_device_number(n: u8) -> Option<Axis> {
        Axis::ALL.get(usize::from(n).checked_sub(1)?).copied()
    }

    pub fn field(self) -> Field {
        Field::COORDINATE[self.index()]
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Axis::X => "X",
            Axis::Y => "Y",
            Axis::Z => "Z",
            Axis::C => "C",
            Axis::B => "B",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// Entities
// ---------------------------------------------------------------------------

/// Which schema an entity follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Tool,
    Coordinate,
}

impl EntityKind {
    pub fn fields(self) -> &'static [Field] {
        match self {
            EntityKind::Tool => &Field::TOOL,
            EntityKind::Coordinate => &Field::COORDINATE,
        }
    }
}

/// Stable key of a monitored entity: `T<n>` for tool slots, `P<n>` for
/// coordinate systems.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum EntityCode {
    Tool(u16),
    Coordinate(u8),
}

impl EntityCode {
    pub fn kind(self) -> EntityKind {
        match self {
            EntityCode::Tool(_) => EntityKind::Tool,
            EntityCode::Coordinate(_) => EntityKind::Coordinate,
        }
    }

    pub fn fields(self) -> &'static [Field] {
        self.kind().fields()
    }
}

impl fmt::Display for EntityCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityCode::Tool(n) => write!(f, "T{n}"),
            EntityCode::Coordinate(n) => write!(f, "P{n}"),
        }
    }
}

impl FromStr for EntityCode {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || CoreError::InvalidEntityCode(s.to_owned());
        let (prefix, digits) = s.split_at_checked(1).ok_or_else(invalid)?;
        match prefix {
            "T" => match digits.parse::<u16>() {
                Ok(n) if n >= 1 => Ok(EntityCode::Tool(n)),
                _ => Err(invalid()),
            },
            "P" => match digits.parse::<u8>() {
                Ok(n) if crate::catalog::COORDINATE_SYSTEMS.contains(&n) => {
                    Ok(EntityCode::Coordinate(n))
                }
                _ => Err(invalid()),
            },
            _ => Err(invalid()),
        }
    }
}

impl TryFrom<String> for EntityCode {
    type Error = CoreError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<EntityCode> for String {
    fn from(code: EntityCode) -> Self {
        code.to_string()
    }
}

// ---------------------------------------------------------------------------
// Readings and records
// ---------------------------------------------------------------------------

/// Field → millimeter value, `None` meaning absent.
pub type FieldValues = BTreeMap<Field, Option<f64>>;

/// One entity's register values in device-native units, as read this cycle.
///
/// Every field of the entity's schema has a slot; `None` means the read failed
/// or the register was not reported. A present `0` is a valid measurement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawReading {
    pub entity: EntityCode,
    values: BTreeMap<Field, Option<i32>>,
}

impl RawReading {
    /// A reading with every field absent.
    pub fn absent(entity: EntityCode) -> Self {
        let values = entity.fields().iter().map(|f| (*f, None)).collect();
        Self { entity, values }
    }

    /// Set one field. Fields outside the entity's schema are ignored.
    pub fn set(&mut self, field: Field, value: Option<i32>) {
        if let Some(slot) = self.values.get_mut(&field) {
            *slot = value;
        }
    }

    pub fn with(mut self, field: Field, value: Option<i32>) -> Self {
        self.set(field, value);
        self
    }

    pub fn get(&self, field: Field) -> Option<i32> {
        self.values.get(&field).copied().flatten()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Field, Option<i32>)> + '_ {
        self.values.iter().map(|(f, v)| (*f, *v))
    }

    /// True when no field carries a value.
    pub fn is_absent(&self) -> bool {
        self.values.values().all(Option::is_none)
    }

    /// Convert to engineering units.
    pub fn to_mm(&self) -> FieldValues {
        self.values
            .iter()
            .map(|(field, raw)| (*field, raw.map(raw_to_mm)))
            .collect()
    }
}

/// Last-known snapshot of one entity on one machine, in millimeters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineRecord {
    pub machine_id: MachineId,
    pub entity: EntityCode,
    pub values: FieldValues,
    pub observed_at: DateTime<Utc>,
}

impl BaselineRecord {
    pub fn value(&self, field: Field) -> Option<f64> {
        self.values.get(&field).copied().flatten()
    }

    /// Build the record to persist after observing `current`.
    ///
    /// Present fields overwrite; absent fields keep the previous baseline value.
    pub fn merge(
        previous: Option<&BaselineRecord>,
        machine_id: &MachineId,
        entity: EntityCode,
        current: &FieldValues,
        observed_at: DateTime<Utc>,
    ) -> BaselineRecord {
        let values = entity
            .fields()
            .iter()
            .map(|field| {
                let now = current.get(field).copied().flatten();
                let before = previous.and_then(|p| p.value(*field));
                (*field, now.or(before))
            })
            .collect();
        BaselineRecord {
            machine_id: machine_id.clone(),
            entity,
            values,
            observed_at,
        }
    }
}

/// An immutable record of one field's drift.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub machine_id: MachineId,
    pub entity: EntityCode,
    pub field: Field,
    /// The stored baseline value; `None` when no baseline existed.
    pub old_value: Option<f64>,
    pub new_value: f64,
    pub delta: f64,
    pub changed_at: DateTime<Utc>,
}

impl ChangeRecord {
    /// Old value for display, `0.0` when there was no baseline.
    pub fn old_or_zero(&self) -> f64 {
        self.old_value.unwrap_or(0.0)
    }
}

impl fmt::Display for ChangeRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}: {:.3} -> {:.3} ({:+.3})",
            self.machine_id,
            self.entity,
            self.field,
            self.old_or_zero(),
            self.new_value,
            self.delta
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
