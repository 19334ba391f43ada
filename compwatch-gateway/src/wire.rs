//! Gateway wire format and the decode step into typed readings.
//!
//! Every gateway response is a JSON envelope:
//!
//! ```json
//! { "success": true, "data": { ... }, "error": null, "errorCode": 0 }
//! ```
//!
//! Payloads are kept as [`serde_json::Value`] until decoded field by field, so
//! one malformed register degrades only itself to absent.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use compwatch_core::{EntityCode, Field, RawReading};

/// Response envelope shared by every gateway endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    #[serde(default)]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub error_code: i64,
}

/// Body of `POST /api/focas/connect`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectRequest {
    pub ip_address: String,
    pub port: u16,
}

/// Accepted key spellings per tool field, preferred first.
const TOOL_KEYS: [(Field, [&str; 2]); 4] = [
    (Field::RadiusGeometry, ["cutterRadiusGeometry", "radiusGeometry"]),
    (Field::RadiusWear, ["cutterRadiusWear", "radiusWear"]),
    (Field::LengthGeometry, ["toolLengthGeometry", "lengthGeometry"]),
    (Field::LengthWear, ["toolLengthWear", "lengthWear"]),
];

/// Decode one register value. Anything but a 32-bit integer is absent.
pub fn decode_register(value: Option<&Value>) -> Option<i32> {
    value
        .and_then(Value::as_i64)
        .and_then(|n| i32::try_from(n).ok())
}

/// Decode a single tool payload.
///
/// `tool_number` is used when the payload does not carry its own.
/// Returns `None` when no tool number can be established.
pub fn decode_tool(data: &Value, tool_number: Option<u16>) -> Option<RawReading> {
    let number = data
        .get("toolNumber")
        .and_then(Value::as_u64)
        .and_then(|n| u16::try_from(n).ok())
        .filter(|n| *n > 0)
        .or(tool_number)?;

    let mut reading = RawReading::absent(EntityCode::Tool(number));
    for (field, keys) in TOOL_KEYS {
        let value = keys.iter().find_map(|key| data.get(*key));
        reading.set(field, decode_register(value));
    }
    Some(reading)
}

/// Decode a tool-range payload `{ "tools": [ ... ] }` into tool number → reading.
///
/// Entries without a valid `toolNumber` are dropped.
pub fn decode_tool_range(data: &Value) -> BTreeMap<u16, RawReading> {
    let Some(tools) = data.get("tools").and_then(Value::as_array) else {
        return BTreeMap::new();
    };
    tools
        .iter()
        .filter_map(|entry| decode_tool(entry, None))
        .filter_map(|reading| match reading.entity {
            EntityCode::Tool(n) => Some((n, reading)),
            EntityCode::Coordinate(_) => None,
        })
        .collect()
}

/// Decode an axis-range payload `{ "data": [raw, ...] }` into ordered values.
pub fn decode_axis_values(data: &Value) -> Vec<Option<i32>> {
    data.get("data")
        .and_then(Value::as_array)
        .map(|values| values.iter().map(|v| decode_register(Some(v))).collect())
        .unwrap_or_default()
}

/// Buffer length the controller expects for a single-axis range read.
pub fn axis_range_length(start_offset: u16, end_offset: u16) -> u32 {
    let count = u32::from(end_offset.saturating_sub(start_offset)) + 1;
    6 + 4 * count
}
