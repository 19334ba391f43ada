//! `compwatch read`: raw register dump from one controller.

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;

use compwatch_core::{units::raw_to_mm, EntityCode, Field, RawReading, RegisterCatalog};
use compwatch_daemon::{init_tracing, Config};
use compwatch_gateway::{read_coordinates, read_tools, DeviceReader};

/// Arguments for `compwatch read`.
#[derive(Args, Debug)]
pub struct ReadArgs {
    /// Controller address as the gateway knows it.
    pub address: String,

    /// First tool to read (defaults to the configured range).
    #[arg(long)]
    pub tool_start: Option<u16>,

    /// Last tool to read (defaults to the configured range).
    #[arg(long)]
    pub tool_end: Option<u16>,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct EntityJson {
    entity: EntityCode,
    values: Vec<(Field, f64)>,
}

impl ReadArgs {
    pub fn run(self, config: Config) -> Result<()> {
        init_tracing(config.log_format, "warn");

        let range = config.catalog.tool_range();
        let catalog = RegisterCatalog::new(
            self.tool_start.unwrap_or(*range.start()),
            self.tool_end.unwrap_or(*range.end()),
        )
        .context("invalid tool range")?;

        let reader = config.reader();
        reader
            .connect(&self.address)
            .with_context(|| format!("could not open a session with {}", self.address))?;
        let tools = read_tools(&reader, &self.address, &catalog, config.read_mode);
        let coordinates = read_coordinates(&reader, &self.address);
        reader.disconnect();

        let failed = tools.failed_calls + coordinates.failed_calls;
        let present: Vec<EntityJson> = tools
            .readings
            .iter()
            .chain(&coordinates.readings)
            .filter(|r| !r.is_absent())
            .map(present_values)
            .collect();

        if self.json {
            println!("{}", serde_json::to_string_pretty(&present)?);
        } else {
            for entity in &present {
                let cells: Vec<String> = entity
                    .values
                    .iter()
                    .map(|(field, mm)| format!("{field}={mm:.3}"))
                    .collect();
                println!("{:>4}  {}", entity.entity.to_string().bold(), cells.join("  "));
            }
            if failed > 0 {
                println!("{} {} gateway call(s) failed", "!".yellow(), failed);
            }
        }

        if present.is_empty() && failed > 0 {
            bail!("no registers could be read from {}", self.address);
        }
        Ok(())
    }
}

fn present_values(reading: &RawReading) -> EntityJson {
    EntityJson {
        entity: reading.entity,
        values: reading
            .iter()
            .filter_map(|(field, raw)| raw.map(|raw| (field, raw_to_mm(raw))))
            .collect(),
    }
}
