//! `compwatch sync`: one pass, then exit.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;

use compwatch_core::{ChangeRecord, MachineId};
use compwatch_daemon::{init_tracing, Config};
use compwatch_sync::{run_pass, DryRunStore, MachineSummary, PassSummary};

/// Arguments for `compwatch sync`.
#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Only sync this machine id.
    #[arg(long)]
    pub machine: Option<String>,

    /// Read and diff, but write nothing to the store.
    #[arg(long)]
    pub dry_run: bool,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct SyncReportJson<'a> {
    dry_run: bool,
    machines: Vec<MachineJson<'a>>,
}

#[derive(Serialize)]
struct MachineJson<'a> {
    machine: &'a MachineId,
    address: &'a str,
    connected: bool,
    checked: usize,
    skipped: usize,
    baselines_written: usize,
    failures: usize,
    changes: &'a [ChangeRecord],
}

impl SyncArgs {
    pub fn run(self, config: Config) -> Result<()> {
        init_tracing(config.log_format, "warn");

        let mut options = config.sync_options();
        options.machine = self.machine.map(MachineId::from);

        let mut store = config.open_store().context("failed to open store")?;
        let inventory = config.inventory();
        let reader = config.reader();

        let summary = if self.dry_run {
            let mut overlay = DryRunStore::new(&store);
            run_pass(inventory.as_ref(), &reader, &mut overlay, &options)
        } else {
            run_pass(inventory.as_ref(), &reader, &mut store, &options)
        }
        .context("sync pass failed")?;

        if self.json {
            print_json(&summary, self.dry_run)?;
        } else {
            print_results(&summary, self.dry_run);
        }
        Ok(())
    }
}

fn print_json(summary: &PassSummary, dry_run: bool) -> Result<()> {
    let report = SyncReportJson {
        dry_run,
        machines: summary.machines.iter().map(machine_json).collect(),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn machine_json(m: &MachineSummary) -> MachineJson<'_> {
    MachineJson {
        machine: &m.machine_id,
        address: &m.address,
        connected: m.connected,
        checked: m.checked,
        skipped: m.skipped,
        baselines_written: m.baselines_written(),
        failures: m.records_failed + m.baselines_failed,
        changes: &m.changes,
    }
}

fn print_results(summary: &PassSummary, dry_run: bool) {
    if summary.machines.is_empty() {
        println!("No monitored machines.");
        return;
    }

    for m in &summary.machines {
        if !m.connected {
            println!(
                "{} {} ({}): gateway session failed",
                "✗".red(),
                m.machine_id,
                m.address
            );
            continue;
        }
        let failures = m.records_failed + m.baselines_failed;
        let mark = if failures > 0 { "!".yellow() } else { "✓".green() };
        println!(
            "{} {} ({}): {} checked, {} skipped, {} changed",
            mark,
            m.machine_id,
            m.address,
            m.checked,
            m.skipped,
            m.changes.len()
        );
        for change in &m.changes {
            println!("    {}", change.to_string().dimmed());
        }
        if failures > 0 {
            println!("    {} write failures (see log)", failures);
        }
    }

    let total = summary.total_changes();
    if dry_run {
        println!(
            "\n{} {} change(s) found; nothing written",
            "dry run:".cyan(),
            total
        );
    } else {
        println!("\n{} change(s) recorded", total);
    }
}
