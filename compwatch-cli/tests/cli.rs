use std::path::Path;
use std::process::Command;

use assert_cmd::prelude::*;
use chrono::Utc;
use predicates::str::contains;
use tempfile::TempDir;

use compwatch_core::{BaselineRecord, EntityCode, Field, FieldValues, MachineId};
use compwatch_sync::{BaselineStore, FileStore};

/// Gateway address nothing listens on.
const DEAD_GATEWAY: &str = "http://127.0.0.1:1";

fn compwatch_cmd(workdir: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("compwatch"));
    cmd.env_clear()
        .current_dir(workdir)
        .env("COMPWATCH_STORE_DIR", workdir.join("data"))
        .env("COMPWATCH_GATEWAY_URL", DEAD_GATEWAY);
    cmd
}

fn write_inventory(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("machines.yaml");
    std::fs::write(
        &path,
        r#"
machines:
  - id: m1
    display_number: "5701"
    device_address: 10.0.10.21
  - id: m2
    display_number: "5702"
"#,
    )
    .expect("write inventory");
    path
}

#[test]
fn help_lists_subcommands() {
    let tmp = TempDir::new().expect("tmp");
    compwatch_cmd(tmp.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(contains("run"))
        .stdout(contains("sync"))
        .stdout(contains("status"))
        .stdout(contains("read"));
}

#[test]
fn dry_run_with_unreachable_gateway_writes_nothing() {
    let tmp = TempDir::new().expect("tmp");
    let inventory = write_inventory(tmp.path());

    compwatch_cmd(tmp.path())
        .env("COMPWATCH_INVENTORY_FILE", &inventory)
        .args(["sync", "--dry-run"])
        .assert()
        .success()
        .stdout(contains("m1"))
        .stdout(contains("gateway session failed"))
        .stdout(contains("nothing written"));

    assert!(!tmp.path().join("data").join("snapshot.json").exists());
}

#[test]
fn sync_of_unknown_machine_fails() {
    let tmp = TempDir::new().expect("tmp");
    let inventory = write_inventory(tmp.path());

    compwatch_cmd(tmp.path())
        .env("COMPWATCH_INVENTORY_FILE", &inventory)
        .args(["sync", "--machine", "m9"])
        .assert()
        .failure()
        .stderr(contains("not found"));
}

#[test]
fn sync_without_inventory_fails() {
    let tmp = TempDir::new().expect("tmp");
    compwatch_cmd(tmp.path())
        .arg("sync")
        .assert()
        .failure()
        .stderr(contains("sync pass failed"));
}

#[test]
fn status_json_lists_stored_baselines() {
    let tmp = TempDir::new().expect("tmp");
    let mut store = FileStore::open(tmp.path().join("data")).expect("store");
    let mut values = FieldValues::new();
    values.insert(Field::RadiusWear, Some(0.012));
    values.insert(Field::LengthGeometry, Some(120.5));
    let record = BaselineRecord::merge(
        None,
        &MachineId::from("m1"),
        EntityCode::Tool(5),
        &values,
        Utc::now(),
    );
    store.upsert(&record).expect("seed");
    store.flush().expect("flush");

    compwatch_cmd(tmp.path())
        .args(["status", "--machine", "m1", "--json"])
        .assert()
        .success()
        .stdout(contains("\"machine\": \"m1\""))
        .stdout(contains("T5"));

    compwatch_cmd(tmp.path())
        .args(["status", "--machine", "m1"])
        .assert()
        .success()
        .stdout(contains("T5"))
        .stdout(contains("120.500"));
}

#[test]
fn status_of_machine_without_baselines() {
    let tmp = TempDir::new().expect("tmp");
    compwatch_cmd(tmp.path())
        .args(["status", "--machine", "m1"])
        .assert()
        .success()
        .stdout(contains("No baselines stored"));
}

#[test]
fn invalid_tool_range_is_rejected() {
    let tmp = TempDir::new().expect("tmp");
    compwatch_cmd(tmp.path())
        .env("COMPWATCH_TOOL_RANGE_START", "0")
        .args(["status", "--machine", "m1"])
        .assert()
        .failure()
        .stderr(contains("COMPWATCH_"));
}

#[test]
fn read_against_unreachable_gateway_fails() {
    let tmp = TempDir::new().expect("tmp");
    compwatch_cmd(tmp.path())
        .args(["read", "10.0.10.21", "--tool-start", "1", "--tool-end", "4"])
        .assert()
        .failure()
        .stderr(contains("could not open a session"));
}

#[test]
fn run_with_unusable_store_exits_with_error() {
    let tmp = TempDir::new().expect("tmp");
    let blocker = tmp.path().join("not-a-dir");
    std::fs::write(&blocker, "x").expect("write");

    compwatch_cmd(tmp.path())
        .env("COMPWATCH_STORE_DIR", blocker.join("data"))
        .arg("run")
        .assert()
        .failure()
        .stderr(contains("daemon exited with error"));
}
