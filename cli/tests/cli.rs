//! End-to-end tests driving the `evchain` binary.

use std::path::Path;
use std::process::{Command, Output, Stdio};

use serde_json::Value;

use evchain_contracts::event::TELEMETRY_PURGED;
use evchain_core::traits::EventLog;
use evchain_store::EventStore;

// ── Helpers ───────────────────────────────────────────────────────────────────

fn evchain(dir: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_evchain"));
    cmd.arg("--dir").arg(dir).env_remove("EVCHAIN_HOME").env("RUST_LOG", "error");
    cmd
}

fn run(dir: &Path, args: &[&str]) -> Output {
    evchain(dir).args(args).output().expect("spawn evchain")
}

fn stdout_json(output: &Output) -> Value {
    serde_json::from_slice(&output.stdout).unwrap_or_else(|e| {
        panic!(
            "stdout is not JSON ({e}): {}",
            String::from_utf8_lossy(&output.stdout)
        )
    })
}

fn record_args(actor: &str, n: usize) -> Vec<String> {
    vec![
        "record".to_string(),
        "--event-type".to_string(),
        "plan.generated".to_string(),
        "--actor-id".to_string(),
        actor.to_string(),
        "--data".to_string(),
        format!("{{\"quest_count\": {}}}", n),
    ]
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[test]
fn record_then_verify_and_status() {
    let dir = tempfile::tempdir().unwrap();

    let out = evchain(dir.path())
        .args(record_args("human:jordan", 3))
        .output()
        .unwrap();
    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));
    let row = stdout_json(&out);
    assert_eq!(row["event_type"], "plan.generated");
    assert_eq!(row["build"]["tool"], "evchain");
    assert_eq!(row["prev_hash"], "0".repeat(64));

    let out = run(dir.path(), &["verify"]);
    assert!(out.status.success());
    assert_eq!(stdout_json(&out)["ok"], true);

    let out = run(dir.path(), &["status"]);
    let status = stdout_json(&out);
    assert_eq!(status["row_count"], 1);
    assert_eq!(status["tail_event_hash"], row["event_hash"]);
    assert!(status["tail_defect"].is_null());
}

#[test]
fn concurrent_processes_share_one_chain() {
    let dir = tempfile::tempdir().unwrap();
    let writers = 8;

    let children: Vec<_> = (0..writers)
        .map(|i| {
            evchain(dir.path())
                .args(record_args(&format!("agent:{}", i), i))
                .stdout(Stdio::null())
                .stderr(Stdio::piped())
                .spawn()
                .unwrap()
        })
        .collect();
    for child in children {
        let out = child.wait_with_output().unwrap();
        assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));
    }

    let store = EventStore::open_default(dir.path()).unwrap();
    let report = store.verify().unwrap();
    assert!(report.ok, "violations: {:?}", report.violations);
    assert_eq!(report.checked_rows, writers);
}

#[test]
fn tampered_store_fails_verify_and_blocks_record() {
    let dir = tempfile::tempdir().unwrap();
    for i in 0..2 {
        assert!(evchain(dir.path()).args(record_args("human:jordan", i)).status().unwrap().success());
    }
    let events = dir.path().join("events.jsonl");
    let text = std::fs::read_to_string(&events).unwrap();
    std::fs::write(&events, text.replace("\"quest_count\":1", "\"quest_count\":9")).unwrap();

    let out = run(dir.path(), &["verify"]);
    assert_eq!(out.status.code(), Some(1));
    assert_eq!(stdout_json(&out)["ok"], false);

    let out = evchain(dir.path())
        .args(record_args("human:jordan", 5))
        .output()
        .unwrap();
    assert_eq!(out.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&out.stderr).contains("CHAIN_BROKEN: "));

    let status = stdout_json(&run(dir.path(), &["status"]));
    assert_eq!(status["tail_defect"], "event_hash_mismatch");
    assert!(status["tail_event_hash"].is_null());

    let out = run(dir.path(), &["rotate"]);
    assert!(out.status.success());
    assert_eq!(stdout_json(&out)["archived"], 2);
    assert!(evchain(dir.path()).args(record_args("human:jordan", 5)).status().unwrap().success());
}

#[test]
fn purge_records_a_retention_event() {
    let dir = tempfile::tempdir().unwrap();
    let mut args = record_args("human:jordan", 1);
    args.extend(["--at".to_string(), "2020-01-01T00:00:00Z".to_string()]);
    assert!(evchain(dir.path()).args(&args).status().unwrap().success());

    let out = run(dir.path(), &["purge", "--older-than", "30d"]);
    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));
    assert_eq!(stdout_json(&out)["archived"], 1);

    let store = EventStore::open_default(dir.path()).unwrap();
    let rows = store.rows().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].event.event_type, TELEMETRY_PURGED);
    assert_eq!(rows[0].event.data["purged_count"], 1);
    let archive = rows[0].event.data["archive_file"].as_str().unwrap();
    assert!(archive.starts_with("events-purged-"));
    assert!(dir.path().join("archive").join(archive).exists());
    assert!(store.verify().unwrap().ok);
}

#[test]
fn snapshot_and_diff() {
    let dir = tempfile::tempdir().unwrap();
    assert!(evchain(dir.path()).args(record_args("human:jordan", 2)).status().unwrap().success());

    let a = dir.path().join("a.json");
    let a_str = a.to_str().unwrap();
    let out = run(dir.path(), &["snapshot", "--range", "1d", "--out", a_str]);
    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));
    assert_eq!(stdout_json(&out)["sha256"].as_str().unwrap().len(), 64);

    assert!(evchain(dir.path()).args(record_args("human:jordan", 4)).status().unwrap().success());
    let b = dir.path().join("b.json");
    let b_str = b.to_str().unwrap();
    assert!(run(dir.path(), &["export", "--range", "1d", "--out", b_str]).status.success());

    let out = run(dir.path(), &["diff", a_str, b_str, "--json"]);
    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));
    let delta = stdout_json(&out);
    assert_eq!(delta["counters"]["plans_generated"], 1);
    assert_eq!(delta["counters"]["quests_planned"], 4);

    let out = run(dir.path(), &["diff", a_str, b_str]);
    let text = String::from_utf8(out.stdout).unwrap();
    assert!(text.contains("- plans_generated: +1"), "{text}");
}

#[test]
fn bad_window_is_reported_with_its_code() {
    let dir = tempfile::tempdir().unwrap();
    let out = run(dir.path(), &["purge", "--older-than", "0d"]);
    assert_eq!(out.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&out.stderr).contains("INVALID_WINDOW: "));
}
