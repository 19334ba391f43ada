//! `compwatch status`: stored baselines of one machine.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use compwatch_core::{BaselineRecord, EntityKind, Field, MachineId};
use compwatch_daemon::Config;
use compwatch_sync::BaselineStore;

use super::mm_cell;

/// Arguments for `compwatch status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Machine id to show.
    #[arg(long)]
    pub machine: String,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct StatusJson<'a> {
    machine: &'a MachineId,
    records: &'a [BaselineRecord],
}

#[derive(Tabled)]
struct ToolRow {
    #[tabled(rename = "tool")]
    entity: String,
    #[tabled(rename = "radius geo")]
    radius_geometry: String,
    #[tabled(rename = "radius wear")]
    radius_wear: String,
    #[tabled(rename = "length geo")]
    length_geometry: String,
    #[tabled(rename = "length wear")]
    length_wear: String,
    #[tabled(rename = "observed")]
    observed: String,
}

#[derive(Tabled)]
struct CoordinateRow {
    #[tabled(rename = "system")]
    entity: String,
    x: String,
    y: String,
    z: String,
    c: String,
    b: String,
    #[tabled(rename = "observed")]
    observed: String,
}

impl StatusArgs {
    pub fn run(self, config: Config) -> Result<()> {
        let machine = MachineId::from(self.machine);
        let store = config.open_store().context("failed to open store")?;
        let records = store
            .list(&machine)
            .with_context(|| format!("failed to list baselines of {machine}"))?;

        if self.json {
            let report = StatusJson {
                machine: &machine,
                records: &records,
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
            return Ok(());
        }

        if records.is_empty() {
            println!("No baselines stored for {}.", machine.to_string().bold());
            return Ok(());
        }

        print_tables(&machine, &records);
        Ok(())
    }
}

fn observed(record: &BaselineRecord) -> String {
    record.observed_at.format("%Y-%m-%d %H:%M:%S").to_string()
}

fn print_tables(machine: &MachineId, records: &[BaselineRecord]) {
    let tools: Vec<ToolRow> = records
        .iter()
        .filter(|r| r.entity.kind() == EntityKind::Tool)
        .map(|r| ToolRow {
            entity: r.entity.to_string(),
            radius_geometry: mm_cell(r.value(Field::RadiusGeometry)),
            radius_wear: mm_cell(r.value(Field::RadiusWear)),
            length_geometry: mm_cell(r.value(Field::LengthGeometry)),
            length_wear: mm_cell(r.value(Field::LengthWear)),
            observed: observed(r),
        })
        .collect();
    let coordinates: Vec<CoordinateRow> = records
        .iter()
        .filter(|r| r.entity.kind() == EntityKind::Coordinate)
        .map(|r| CoordinateRow {
            entity: r.entity.to_string(),
            x: mm_cell(r.value(Field::X)),
            y: mm_cell(r.value(Field::Y)),
            z: mm_cell(r.value(Field::Z)),
            c: mm_cell(r.value(Field::C)),
            b: mm_cell(r.value(Field::B)),
            observed: observed(r),
        })
        .collect();

    println!("{}", machine.to_string().bold());
    if !tools.is_empty() {
        println!("{}", Table::new(tools).with(Style::rounded()));
    }
    if !coordinates.is_empty() {
        println!("{}", Table::new(coordinates).with(Style::rounded()));
    }
}
