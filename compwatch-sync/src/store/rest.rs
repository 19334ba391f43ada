//! PostgREST backend and REST machine inventory.
//!
//! Tables:
//!
//! - `offset_snapshots`: one row per `(machine_id, entity_code)`, one column
//!   per field (`radius_geometry` … `coord_b`) plus `observed_at`
//! - `offset_changes`: append-only `(machine_id, entity_code, field,
//!   old_value, new_value, delta, changed_at)`
//! - `machines`: `(id, display_number, device_address)`
//!
//! The API key is sent both as `apikey` and as a bearer token, which is what
//! hosted PostgREST deployments expect.

use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};

use compwatch_core::{
    BaselineRecord, ChangeRecord, EntityCode, FieldValues, Inventory, InventoryError, Machine,
    MachineId,
};

use super::{BaselineStore, ChangeRecorder, UpsertOutcome};
use crate::error::StoreError;

pub const SNAPSHOT_TABLE: &str = "offset_snapshots";
pub const CHANGES_TABLE: &str = "offset_changes";
pub const MACHINES_TABLE: &str = "machines";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Authenticated PostgREST endpoint shared by the store and the inventory.
struct RestApi {
    agent: ureq::Agent,
    base_url: String,
    api_key: String,
}

impl RestApi {
    fn new(base_url: &str, api_key: &str) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(REQUEST_TIMEOUT).build();
        Self {
            agent,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    fn request(&self, method: &str, table: &str) -> ureq::Request {
        self.agent
            .request(method, &format!("{}/{table}", self.base_url))
            .set("apikey", &self.api_key)
            .set("Authorization", &format!("Bearer {}", self.api_key))
            .set("Accept", "application/json")
    }

    fn select(&self, table: &str, query: &[(&str, &str)]) -> Result<Vec<Value>, StoreError> {
        let mut request = self.request("GET", table);
        for (key, value) in query {
            request = request.query(key, value);
        }
        let response = request.call().map_err(request_error)?;
        response
            .into_json::<Vec<Value>>()
            .map_err(|e| StoreError::Decode(e.to_string()))
    }

    fn send(
        &self,
        method: &str,
        table: &str,
        query: &[(&str, &str)],
        body: Value,
    ) -> Result<(), StoreError> {
        let mut request = self
            .request(method, table)
            .set("Prefer", "return=minimal");
        for (key, value) in query {
            request = request.query(key, value);
        }
        request.send_json(body).map_err(request_error)?;
        Ok(())
    }
}

fn request_error(err: ureq::Error) -> StoreError {
    match err {
        ureq::Error::Status(status, response) => {
            let body = response.into_string().unwrap_or_default();
            StoreError::Persistence(format!("HTTP {status}: {}", body.trim()))
        }
        ureq::Error::Transport(transport) => StoreError::Unreachable(transport.to_string()),
    }
}

fn eq(value: impl std::fmt::Display) -> String {
    format!("eq.{value}")
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

/// Snapshot row for `record`. Only the entity's own columns are included.
fn snapshot_row(record: &BaselineRecord) -> Value {
    let mut row = Map::new();
    row.insert("machine_id".into(), Value::from(record.machine_id.0.clone()));
    row.insert("entity_code".into(), Value::from(record.entity.to_string()));
    for field in record.entity.fields() {
        row.insert(field.column().into(), record.value(*field).into());
    }
    row.insert(
        "observed_at".into(),
        Value::from(record.observed_at.to_rfc3339()),
    );
    Value::Object(row)
}

fn parse_snapshot_row(row: &Value) -> Result<BaselineRecord, StoreError> {
    let text = |key: &str| {
        row.get(key)
            .and_then(Value::as_str)
            .ok_or_else(|| StoreError::Decode(format!("snapshot row without {key}")))
    };
    let entity: EntityCode = text("entity_code")?
        .parse()
        .map_err(|e: compwatch_core::CoreError| StoreError::Decode(e.to_string()))?;
    let observed_at = observed_at_of(row.get("observed_at").and_then(Value::as_str))
        .unwrap_or_else(|| {
            tracing::warn!(
                entity = %entity,
                observed_at = ?row.get("observed_at"),
                "unreadable observed_at on snapshot row; using current time",
            );
            Utc::now()
        });
    let values: FieldValues = entity
        .fields()
        .iter()
        .map(|field| (*field, row.get(field.column()).and_then(Value::as_f64)))
        .collect();
    Ok(BaselineRecord {
        machine_id: machine_id_of(row.get("machine_id"))
            .ok_or_else(|| StoreError::Decode("snapshot row without machine_id".into()))?,
        entity,
        values,
        observed_at,
    })
}

/// RFC 3339, or a naive timestamp (`timestamp` column) taken as UTC.
fn observed_at_of(raw: Option<&str>) -> Option<DateTime<Utc>> {
    let raw = raw?.trim();
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Some(at.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .map(|naive| naive.and_utc())
}

/// Machine ids may be text or numeric columns.
fn machine_id_of(value: Option<&Value>) -> Option<MachineId> {
    match value? {
        Value::String(s) if !s.is_empty() => Some(MachineId(s.clone())),
        Value::Number(n) => Some(MachineId(n.to_string())),
        _ => None,
    }
}

fn change_row(record: &ChangeRecord) -> Value {
    serde_json::json!({
        "machine_id": record.machine_id.0,
        "entity_code": record.entity.to_string(),
        "field": record.field.as_str(),
        "old_value": record.old_value,
        "new_value": record.new_value,
        "delta": record.delta,
        "changed_at": record.changed_at.to_rfc3339(),
    })
}

// ---------------------------------------------------------------------------
// RestStore
// ---------------------------------------------------------------------------

pub struct RestStore {
    api: RestApi,
}

impl RestStore {
    pub fn new(base_url: &str, api_key: &str) -> Self {
        Self {
            api: RestApi::new(base_url, api_key),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.api.base_url
    }

    pub fn ping(&self) -> Result<(), StoreError> {
        self.api
            .select(MACHINES_TABLE, &[("select", "id"), ("limit", "1")])
            .map(|_| ())
    }
}

impl BaselineStore for RestStore {
    fn get(
        &self,
        machine_id: &MachineId,
        entity: EntityCode,
    ) -> Result<Option<BaselineRecord>, StoreError> {
        let machine = eq(machine_id);
        let code = eq(entity);
        let rows = self.api.select(
            SNAPSHOT_TABLE,
            &[
                ("select", "*"),
                ("machine_id", &machine),
                ("entity_code", &code),
                ("limit", "1"),
            ],
        )?;
        rows.first().map(parse_snapshot_row).transpose()
    }

    fn upsert(&mut self, record: &BaselineRecord) -> Result<UpsertOutcome, StoreError> {
        let machine = eq(&record.machine_id);
        let code = eq(record.entity);
        let existing = self.api.select(
            SNAPSHOT_TABLE,
            &[
                ("select", "entity_code"),
                ("machine_id", &machine),
                ("entity_code", &code),
                ("limit", "1"),
            ],
        )?;

        let row = snapshot_row(record);
        if existing.is_empty() {
            self.api.send("POST", SNAPSHOT_TABLE, &[], row)?;
            Ok(UpsertOutcome::Inserted)
        } else {
            self.api.send(
                "PATCH",
                SNAPSHOT_TABLE,
                &[("machine_id", &machine), ("entity_code", &code)],
                row,
            )?;
            Ok(UpsertOutcome::Updated)
        }
    }

    fn list(&self, machine_id: &MachineId) -> Result<Vec<BaselineRecord>, StoreError> {
        let machine = eq(machine_id);
        let rows = self
            .api
            .select(SNAPSHOT_TABLE, &[("select", "*"), ("machine_id", &machine)])?;
        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            match parse_snapshot_row(row) {
                Ok(record) => records.push(record),
                Err(err) => tracing::warn!(machine = %machine_id, error = %err, "skipping snapshot row"),
            }
        }
        records.sort_by_key(|r| r.entity);
        Ok(records)
    }
}

impl ChangeRecorder for RestStore {
    fn append(&mut self, record: &ChangeRecord) -> Result<(), StoreError> {
        self.api.send("POST", CHANGES_TABLE, &[], change_row(record))
    }
}

// ---------------------------------------------------------------------------
// RestInventory
// ---------------------------------------------------------------------------

/// Machine list from the `machines` table.
pub struct RestInventory {
    api: RestApi,
}

impl RestInventory {
    pub fn new(base_url: &str, api_key: &str) -> Self {
        Self {
            api: RestApi::new(base_url, api_key),
        }
    }
}

#[derive(Debug, Deserialize)]
struct MachineRow {
    id: Value,
    #[serde(default)]
    display_number: Option<Value>,
    #[serde(default)]
    device_address: Option<String>,
}

impl Inventory for RestInventory {
    fn machines(&self) -> Result<Vec<Machine>, InventoryError> {
        let rows = self
            .api
            .select(
                MACHINES_TABLE,
                &[("select", "id,display_number,device_address")],
            )
            .map_err(|e| InventoryError::Unavailable(e.to_string()))?;

        let mut machines = Vec::with_capacity(rows.len());
        for row in rows {
            let row: MachineRow = serde_json::from_value(row)
                .map_err(|e| InventoryError::Unavailable(format!("malformed machine row: {e}")))?;
            let Some(id) = machine_id_of(Some(&row.id)) else {
                continue;
            };
            let display_number = match row.display_number {
                Some(Value::String(s)) => s,
                Some(Value::Number(n)) => n.to_string(),
                _ => String::new(),
            };
            machines.push(Machine {
                id,
                display_number,
                device_address: row.device_address,
            });
        }
        Ok(machines)
    }
}
