use predicates::prelude::*;

use super::common::*;

#[test]
fn replay_writes_local_file_references() {
  let env = TestEnv::new();
  let artifact = env.artifact("app.bin", "binary");
  env.write_events(&[started(), named_set("0", &artifact), finished()]);

  env
    .replay()
    .args(["--format", "json"])
    .assert()
    .success()
    .stdout(predicate::str::contains("Events: 3/3"));

  let log = std::fs::read_to_string(&env.out_path).unwrap();
  assert_eq!(log.lines().count(), 3);
  assert!(log.contains("file://"));
  assert!(!log.contains("\"path\""), "local paths must be converted");
}

#[test]
fn replay_into_store_uses_content_addresses() {
  let env = TestEnv::new();
  let artifact = env.artifact("lib.a", "archive");
  let store = env.path().join("store");
  env.write_events(&[started(), named_set("0", &artifact), finished()]);

  env
    .replay()
    .args(["--format", "json", "--uploader", "store", "--store-dir"])
    .arg(&store)
    .assert()
    .success();

  let log = std::fs::read_to_string(&env.out_path).unwrap();
  assert!(log.contains("cas://sha256/"));
  assert!(store.join("cas").is_dir());
}

#[test]
fn store_uploader_requires_store_dir() {
  let env = TestEnv::new();
  env.write_events(&[started()]);

  env
    .replay()
    .args(["--uploader", "store"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("--store-dir"));
}

#[test]
fn missing_artifact_leaves_stream_incomplete() {
  let env = TestEnv::new();
  let missing = env.path().join("never-built.o");
  env.write_events(&[started(), named_set("0", &missing), finished()]);

  env
    .replay()
    .assert()
    .failure()
    .stderr(predicate::str::contains("event stream incomplete"))
    .stderr(predicate::str::contains("1 of 3 events written"));
}

#[test]
fn no_path_conversion_keeps_missing_paths() {
  let env = TestEnv::new();
  let missing = env.path().join("never-built.o");
  env.write_events(&[started(), named_set("0", &missing), finished()]);

  env
    .replay()
    .args(["--format", "json", "--no-path-conversion"])
    .assert()
    .success();

  let log = std::fs::read_to_string(&env.out_path).unwrap();
  assert!(log.contains("never-built.o"));
  assert!(!log.contains("file://"));
}

#[test]
fn json_output_reports_summary() {
  let env = TestEnv::new();
  env.write_events(&[started(), finished()]);

  let output = env
    .replay()
    .args(["--output", "json", "--flush-interval", "10ms"])
    .output()
    .unwrap();
  assert!(output.status.success());

  let summary: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
  assert_eq!(summary["status"], "completed");
  assert_eq!(summary["events"], 2);
  assert_eq!(summary["written"], 2);
  assert_eq!(summary["failure"], serde_json::Value::Null);
}

#[test]
fn invalid_event_line_is_reported() {
  let env = TestEnv::new();
  std::fs::write(&env.events_path, "{\"id\": 5}\n").unwrap();

  env
    .replay()
    .assert()
    .failure()
    .stderr(predicate::str::contains("events.jsonl:1"));
}
