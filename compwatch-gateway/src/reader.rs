//! DeviceReader: register retrieval with per-call failure isolation.
//!
//! [`DeviceReader`] is the seam between the sync engine and the gateway.
//! [`read_tools`] and [`read_coordinates`] apply the failure policy on top of
//! it: a failed call is logged, its data is treated as absent, and nothing is
//! retried until the next pass.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use compwatch_core::{
    catalog::{device_offset_span, logical_index},
    Axis, EntityCode, RawReading, RegisterCatalog,
};

use crate::client::GatewayClient;
use crate::error::GatewayError;
use crate::wire::{decode_axis_values, decode_tool, decode_tool_range};

/// Register access for one controller at a time.
pub trait DeviceReader {
    /// Open a session with the controller at `address`.
    fn connect(&self, address: &str) -> Result<(), GatewayError>;

    /// Close the current session. Failures are not reported.
    fn disconnect(&self);

    /// Per-item fetch of one tool's offsets.
    fn read_single(&self, address: &str, tool: u16) -> Result<RawReading, GatewayError>;

    /// Batched fetch of tools `start..=end`, keyed by tool number.
    fn read_tool_range(
        &self,
        address: &str,
        start: u16,
        end: u16,
    ) -> Result<BTreeMap<u16, RawReading>, GatewayError>;

    /// One axis across device offsets `start_offset..=end_offset`, in offset order.
    fn read_coordinate_axis(
        &self,
        address: &str,
        axis: Axis,
        start_offset: u16,
        end_offset: u16,
    ) -> Result<Vec<Option<i32>>, GatewayError>;
}

/// [`DeviceReader`] backed by the HTTP device gateway.
pub struct GatewayReader {
    client: GatewayClient,
    port: u16,
}

impl GatewayReader {
    pub fn new(client: GatewayClient, port: u16) -> Self {
        Self { client, port }
    }
}

impl DeviceReader for GatewayReader {
    fn connect(&self, address: &str) -> Result<(), GatewayError> {
        self.client.connect(address, self.port)
    }

    fn disconnect(&self) {
        if let Err(err) = self.client.disconnect() {
            tracing::debug!(error = %err, "gateway disconnect failed");
        }
    }

    fn read_single(&self, _address: &str, tool: u16) -> Result<RawReading, GatewayError> {
        let data = self.client.read_item(tool)?;
        decode_tool(&data, Some(tool))
            .ok_or_else(|| GatewayError::Decode(format!("tool {tool} payload without number")))
    }

    fn read_tool_range(
        &self,
        _address: &str,
        start: u16,
        end: u16,
    ) -> Result<BTreeMap<u16, RawReading>, GatewayError> {
        let data = self.client.read_range(start, end)?;
        Ok(decode_tool_range(&data))
    }

    fn read_coordinate_axis(
        &self,
        _address: &str,
        axis: Axis,
        start_offset: u16,
        end_offset: u16,
    ) -> Result<Vec<Option<i32>>, GatewayError> {
        let data = self.client.read_axis_range(axis, start_offset, end_offset)?;
        Ok(decode_axis_values(&data))
    }
}

// ---------------------------------------------------------------------------
// Read mode
// ---------------------------------------------------------------------------

/// How tool registers are fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadMode {
    /// One batched call for the whole tool range.
    #[default]
    Ranged,
    /// One call per tool, pausing `delay` between items.
    PerItem { delay: Duration },
}

impl fmt::Display for ReadMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadMode::Ranged => f.write_str("ranged"),
            ReadMode::PerItem { delay } => write!(f, "per-item ({}ms)", delay.as_millis()),
        }
    }
}

impl FromStr for ReadMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ranged" | "range" | "batch" => Ok(ReadMode::Ranged),
            "per-item" | "per_item" | "single" => Ok(ReadMode::PerItem {
                delay: Duration::from_millis(500),
            }),
            other => Err(format!(
                "unknown read mode '{other}'; expected: ranged, per-item"
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// Degrading reads
// ---------------------------------------------------------------------------

/// Readings for one entity group plus how many device calls failed.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReadOutcome {
    /// One reading per catalog entity, in catalog order.
    pub readings: Vec<RawReading>,
    pub failed_calls: usize,
}

/// Read every tool in the catalog. Failed calls leave their tools absent.
pub fn read_tools<R: DeviceReader + ?Sized>(
    reader: &R,
    address: &str,
    catalog: &RegisterCatalog,
    mode: ReadMode,
) -> ReadOutcome {
    let range = catalog.tool_range();
    match mode {
        ReadMode::Ranged => {
            let (mut by_number, failed_calls) =
                match reader.read_tool_range(address, *range.start(), *range.end()) {
                    Ok(tools) => (tools, 0),
                    Err(err) => {
                        log_read_failure(address, "tool range", &err);
                        (BTreeMap::new(), 1)
                    }
                };
            let readings = catalog
                .tools()
                .map(|entity| take_tool(&mut by_number, entity))
                .collect();
            ReadOutcome {
                readings,
                failed_calls,
            }
        }
        ReadMode::PerItem { delay } => {
            let mut outcome = ReadOutcome::default();
            for (i, entity) in catalog.tools().enumerate() {
                if i > 0 && !delay.is_zero() {
                    std::thread::sleep(delay);
                }
                let EntityCode::Tool(number) = entity else {
                    continue;
                };
                let reading = match reader.read_single(address, number) {
                    Ok(reading) if reading.entity == entity => reading,
                    Ok(other) => {
                        tracing::warn!(
                            address,
                            read = %entity,
                            returned = %other.entity,
                            "gateway returned another tool; treating as absent",
                        );
                        outcome.failed_calls += 1;
                        RawReading::absent(entity)
                    }
                    Err(err) => {
                        log_read_failure(address, &entity.to_string(), &err);
                        outcome.failed_calls += 1;
                        RawReading::absent(entity)
                    }
                };
                outcome.readings.push(reading);
            }
            outcome
        }
    }
}

fn take_tool(by_number: &mut BTreeMap<u16, RawReading>, entity: EntityCode) -> RawReading {
    match entity {
        EntityCode::Tool(n) => by_number
            .remove(&n)
            .unwrap_or_else(|| RawReading::absent(entity)),
        EntityCode::Coordinate(_) => RawReading::absent(entity),
    }
}

/// Read all five axes over the full coordinate range and merge them into one
/// reading per coordinate system. Each axis call is independent.
pub fn read_coordinates<R: DeviceReader + ?Sized>(reader: &R, address: &str) -> ReadOutcome {
    let (start, end) = device_offset_span();
    let mut failed_calls = 0;
    let mut per_axis = Vec::with_capacity(Axis::ALL.len());
    for axis in Axis::ALL {
        match reader.read_coordinate_axis(address, axis, start, end) {
            Ok(values) => per_axis.push((axis, values)),
            Err(err) => {
                log_read_failure(address, &format!("axis {axis}"), &err);
                failed_calls += 1;
            }
        }
    }
    ReadOutcome {
        readings: merge_axes(start, &per_axis),
        failed_calls,
    }
}

/// Merge per-axis value sequences into per-coordinate-system readings.
///
/// Position `i` of an axis sequence is device offset `start_offset + i`.
/// Positions that map outside the coordinate range are ignored; systems an axis
/// did not cover keep that field absent. Always yields `P1..=P48` in order.
pub fn merge_axes(start_offset: u16, per_axis: &[(Axis, Vec<Option<i32>>)]) -> Vec<RawReading> {
    let mut merged: BTreeMap<u8, RawReading> = compwatch_core::catalog::COORDINATE_SYSTEMS
        .map(|n| (n, RawReading::absent(EntityCode::Coordinate(n))))
        .collect();

    for (axis, values) in per_axis {
        for (i, value) in values.iter().enumerate() {
            let Some(index) = u16::try_from(i)
                .ok()
                .and_then(|i| start_offset.checked_add(i))
                .and_then(logical_index)
            else {
                continue;
            };
            if let Some(reading) = merged.get_mut(&index) {
                reading.set(axis.field(), *value);
            }
        }
    }
    merged.into_values().collect()
}

fn log_read_failure(address: &str, what: &str, err: &GatewayError) {
    match err {
        GatewayError::Protocol { message, code } => tracing::warn!(
            address,
            read = what,
            code,
            message = %message,
            "gateway rejected read; treating as absent",
        ),
        _ => tracing::warn!(
            address,
            read = what,
            error = %err,
            "gateway read failed; treating as absent",
        ),
    }
}
