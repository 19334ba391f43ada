//! Register catalog: the set of entities monitored on every machine.
//!
//! Tool slots `T<start>..=T<end>` and coordinate systems `P1..=P48`. The
//! controller addresses coordinate systems by a device offset shifted by
//! [`COORDINATE_OFFSET_SHIFT`] from the logical index.

use std::ops::RangeInclusive;

use crate::error::CoreError;
use crate::types::EntityCode;

/// Logical coordinate-system indices.
pub const COORDINATE_SYSTEMS: RangeInclusive<u8> = 1..=48;

/// `device offset = logical index + shift`.
pub const COORDINATE_OFFSET_SHIFT: u16 = 6;

/// Device offset of logical coordinate system `index`, or `None` outside 1..=48.
pub fn device_offset(index: u8) -> Option<u16> {
    COORDINATE_SYSTEMS
        .contains(&index)
        .then(|| u16::from(index) + COORDINATE_OFFSET_SHIFT)
}

/// Logical coordinate-system index of a device offset, or `None` outside 7..=54.
pub fn logical_index(offset: u16) -> Option<u8> {
    let index = offset.checked_sub(COORDINATE_OFFSET_SHIFT)?;
    let index = u8::try_from(index).ok()?;
    COORDINATE_SYSTEMS.contains(&index).then_some(index)
}

/// First and last device offsets of the coordinate range.
pub fn device_offset_span() -> (u16, u16) {
    (
        u16::from(*COORDINATE_SYSTEMS.start()) + COORDINATE_OFFSET_SHIFT,
        u16::from(*COORDINATE_SYSTEMS.end()) + COORDINATE_OFFSET_SHIFT,
    )
}

/// Enumerates monitored entities.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterCatalog {
    tools: RangeInclusive<u16>,
}

impl RegisterCatalog {
    pub fn new(tool_start: u16, tool_end: u16) -> Result<Self, CoreError> {
        if tool_start == 0 || tool_end < tool_start {
            return Err(CoreError::InvalidToolRange {
                start: tool_start,
                end: tool_end,
            });
        }
        Ok(Self {
            tools: tool_start..=tool_end,
        })
    }

    pub fn tool_range(&self) -> RangeInclusive<u16> {
        self.tools.clone()
    }

    pub fn tools(&self) -> impl Iterator<Item = EntityCode> {
        self.tools.clone().map(EntityCode::Tool)
    }

    pub fn coordinates(&self) -> impl Iterator<Item = EntityCode> {
        COORDINATE_SYSTEMS.map(EntityCode::Coordinate)
    }

    /// Every monitored entity, tools first.
    pub fn entities(&self) -> impl Iterator<Item = EntityCode> {
        self.tools().chain(self.coordinates())
    }

    pub fn contains(&self, entity: EntityCode) -> bool {
        match entity {
            EntityCode::Tool(n) => self.tools.contains(&n),
            EntityCode::Coordinate(n) => COORDINATE_SYSTEMS.contains(&n),
        }
    }
}

impl Default for RegisterCatalog {
    fn default() -> Self {
        Self { tools: 1..=100 }
    }
}
