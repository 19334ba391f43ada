//! RestStore / RestInventory against a loopback PostgREST responder.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpListener;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use chrono::Utc;
use compwatch_core::{
    BaselineRecord, ChangeRecord, EntityCode, Field, FieldValues, Inventory, InventoryError,
    MachineId,
};
use compwatch_sync::{
    BaselineStore, ChangeRecorder, RestInventory, RestStore, StoreError, UpsertOutcome,
};

const API_KEY: &str = "service-key";

#[derive(Debug, Clone)]
struct Captured {
    method: String,
    path: String,
    headers: Vec<(String, String)>,
    body: String,
}

impl Captured {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    fn json(&self) -> serde_json::Value {
        serde_json::from_str(&self.body).expect("json body")
    }
}

type Seen = Arc<Mutex<Vec<Captured>>>;

/// Serve `count` connections; `route` gets the 0-based request index.
fn serve<F>(count: usize, route: F) -> (String, Seen, thread::JoinHandle<()>)
where
    F: Fn(usize, &str, &str) -> (u16, String) + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind loopback");
    let base = format!("http://{}", listener.local_addr().expect("addr"));
    let seen: Seen = Arc::default();
    let log = Arc::clone(&seen);
    let counter = AtomicUsize::new(0);

    let handle = thread::spawn(move || {
        for stream in listener.incoming().take(count) {
            let mut stream = stream.expect("accept");
            let mut reader = BufReader::new(stream.try_clone().expect("clone"));

            let mut request_line = String::new();
            reader.read_line(&mut request_line).expect("request line");
            let mut parts = request_line.split_whitespace();
            let method = parts.next().unwrap_or_default().to_string();
            let path = parts.next().unwrap_or_default().to_string();

            let mut headers = Vec::new();
            let mut content_length = 0usize;
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).expect("header");
                let line = line.trim_end();
                if line.is_empty() {
                    break;
                }
                if let Some((name, value)) = line.split_once(':') {
                    let value = value.trim().to_string();
                    if name.eq_ignore_ascii_case("content-length") {
                        content_length = value.parse().unwrap_or(0);
                    }
                    headers.push((name.to_string(), value));
                }
            }
            let mut body = vec![0u8; content_length];
            reader.read_exact(&mut body).expect("body");

            let index = counter.fetch_add(1, Ordering::SeqCst);
            let (status, payload) = route(index, &method, &path);
            log.lock().expect("lock").push(Captured {
                method,
                path,
                headers,
                body: String::from_utf8_lossy(&body).into_owned(),
            });

            let response = format!(
                "HTTP/1.1 {status} X\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{payload}",
                payload.len()
            );
            stream.write_all(response.as_bytes()).expect("write");
        }
    });
    (base, seen, handle)
}

fn tool_record(wear: f64) -> BaselineRecord {
    let mut values = FieldValues::new();
    values.insert(Field::RadiusWear, Some(wear));
    BaselineRecord::merge(
        None,
        &MachineId::from("M1"),
        EntityCode::Tool(5),
        &values,
        Utc::now(),
    )
}

#[test]
fn get_selects_one_row_by_key_and_accepts_naive_timestamps() {
    let (base, seen, handle) = serve(1, |_, _, _| {
        (
            200,
            r#"[{"machine_id":"M1","entity_code":"T5","radius_wear":0.12,"observed_at":"2024-05-01T10:00:00.123456"}]"#
                .to_string(),
        )
    });
    let store = RestStore::new(&format!("{base}/"), API_KEY);

    let record = store
        .get(&MachineId::from("M1"), EntityCode::Tool(5))
        .expect("get")
        .expect("row");
    handle.join().expect("server");

    assert_eq!(record.value(Field::RadiusWear), Some(0.12));
    assert_eq!(record.value(Field::LengthWear), None);

    let seen = seen.lock().expect("lock");
    assert_eq!(seen[0].method, "GET");
    assert_eq!(
        seen[0].path,
        "/offset_snapshots?select=*&machine_id=eq.M1&entity_code=eq.T5&limit=1"
    );
    assert_eq!(seen[0].header("apikey"), Some(API_KEY));
    assert_eq!(
        seen[0].header("authorization"),
        Some("Bearer service-key")
    );
}

#[test]
fn get_without_row_is_none() {
    let (base, _seen, handle) = serve(1, |_, _, _| (200, "[]".to_string()));
    let store = RestStore::new(&base, API_KEY);
    let row = store
        .get(&MachineId::from("M1"), EntityCode::Coordinate(2))
        .expect("get");
    handle.join().expect("server");
    assert!(row.is_none());
}

#[test]
fn upsert_posts_new_rows_and_patches_existing_ones() {
    let (base, seen, handle) = serve(4, |index, _, _| match index {
        0 => (200, "[]".to_string()),
        1 => (201, String::new()),
        2 => (200, r#"[{"entity_code":"T5"}]"#.to_string()),
        _ => (204, String::new()),
    });
    let mut store = RestStore::new(&base, API_KEY);

    let first = store.upsert(&tool_record(0.12)).expect("insert");
    let second = store.upsert(&tool_record(0.134)).expect("update");
    handle.join().expect("server");

    assert_eq!(first, UpsertOutcome::Inserted);
    assert_eq!(second, UpsertOutcome::Updated);

    let seen = seen.lock().expect("lock");
    let lookup = "/offset_snapshots?select=entity_code&machine_id=eq.M1&entity_code=eq.T5&limit=1";
    assert_eq!((seen[0].method.as_str(), seen[0].path.as_str()), ("GET", lookup));
    assert_eq!((seen[2].method.as_str(), seen[2].path.as_str()), ("GET", lookup));

    assert_eq!(seen[1].method, "POST");
    assert_eq!(seen[1].path, "/offset_snapshots");
    assert_eq!(seen[1].header("prefer"), Some("return=minimal"));
    let inserted = seen[1].json();
    assert_eq!(inserted["machine_id"], "M1");
    assert_eq!(inserted["entity_code"], "T5");
    assert_eq!(inserted["radius_wear"], 0.12);
    assert!(inserted["radius_geometry"].is_null());
    assert!(inserted.get("coord_x").is_none());

    assert_eq!(seen[3].method, "PATCH");
    assert_eq!(
        seen[3].path,
        "/offset_snapshots?machine_id=eq.M1&entity_code=eq.T5"
    );
    assert_eq!(seen[3].json()["radius_wear"], 0.134);
}

#[test]
fn append_posts_to_the_change_table() {
    let (base, seen, handle) = serve(1, |_, _, _| (201, String::new()));
    let mut store = RestStore::new(&base, API_KEY);

    store
        .append(&ChangeRecord {
            machine_id: MachineId::from("M1"),
            entity: EntityCode::Coordinate(7),
            field: Field::Z,
            old_value: Some(-12.5),
            new_value: -12.49,
            delta: 0.01,
            changed_at: Utc::now(),
        })
        .expect("append");
    handle.join().expect("server");

    let seen = seen.lock().expect("lock");
    assert_eq!(seen[0].method, "POST");
    assert_eq!(seen[0].path, "/offset_changes");
    let row = seen[0].json();
    assert_eq!(row["entity_code"], "P7");
    assert_eq!(row["field"], "z");
    assert_eq!(row["old_value"], -12.5);
    assert_eq!(row["new_value"], -12.49);
}

#[test]
fn rejected_write_is_a_persistence_error() {
    let (base, _seen, handle) = serve(1, |_, _, _| {
        (409, r#"{"message":"duplicate key"}"#.to_string())
    });
    let mut store = RestStore::new(&base, API_KEY);

    let err = store
        .append(&ChangeRecord {
            machine_id: MachineId::from("M1"),
            entity: EntityCode::Tool(1),
            field: Field::LengthWear,
            old_value: None,
            new_value: 0.01,
            delta: 0.01,
            changed_at: Utc::now(),
        })
        .expect_err("conflict");
    handle.join().expect("server");

    match err {
        StoreError::Persistence(message) => {
            assert!(message.contains("HTTP 409"), "{message}");
            assert!(message.contains("duplicate key"), "{message}");
        }
        other => panic!("expected persistence error, got {other:?}"),
    }
}

#[test]
fn ping_selects_a_single_machine_id() {
    let (base, seen, handle) = serve(1, |_, _, _| (200, "[]".to_string()));
    RestStore::new(&base, API_KEY).ping().expect("ping");
    handle.join().expect("server");

    assert_eq!(seen.lock().expect("lock")[0].path, "/machines?select=id&limit=1");
}

#[test]
fn unreachable_endpoint_is_reported_as_unreachable() {
    let store = RestStore::new("http://127.0.0.1:1", API_KEY);
    assert!(matches!(store.ping(), Err(StoreError::Unreachable(_))));
    assert!(matches!(
        store.get(&MachineId::from("M1"), EntityCode::Tool(1)),
        Err(StoreError::Unreachable(_))
    ));
}

#[test]
fn inventory_reads_machine_rows() {
    let (base, seen, handle) = serve(1, |_, _, _| {
        (
            200,
            r#"[
                {"id":7,"display_number":5701,"device_address":"10.0.0.7"},
                {"id":"m2","display_number":"5702","device_address":null},
                {"id":null,"display_number":"5703","device_address":"10.0.0.9"}
            ]"#
            .to_string(),
        )
    });
    let inventory = RestInventory::new(&base, API_KEY);

    let machines = inventory.machines().expect("machines");
    handle.join().expect("server");

    assert!(seen.lock().expect("lock")[0].path.starts_with("/machines?select=id"));
    assert_eq!(machines.len(), 2);
    assert_eq!(machines[0].id, MachineId::from("7"));
    assert_eq!(machines[0].display_number, "5701");
    assert_eq!(machines[0].address(), Some("10.0.0.7"));
    assert_eq!(machines[1].id, MachineId::from("m2"));
    assert!(!machines[1].is_monitored());
}

#[test]
fn inventory_server_error_makes_the_list_unavailable() {
    let (base, _seen, handle) = serve(1, |_, _, _| (500, "{}".to_string()));
    let err = RestInventory::new(&base, API_KEY)
        .monitored_machines()
        .expect_err("server error");
    handle.join().expect("server");
    assert!(matches!(err, InventoryError::Unavailable(_)));
}
