//! Shared test helpers for CLI integration tests.

use std::path::{Path, PathBuf};

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use tempfile::TempDir;

pub fn bes_cmd() -> Command {
  cargo_bin_cmd!("bes")
}

/// Isolated test environment.
///
/// Each test gets its own temporary directory holding the recorded events, any
/// artifacts they reference, and the event log written by `bes replay`.
pub struct TestEnv {
  pub temp: TempDir,
  pub events_path: PathBuf,
  pub out_path: PathBuf,
}

impl TestEnv {
  pub fn new() -> Self {
    let temp = TempDir::new().unwrap();
    let events_path = temp.path().join("events.jsonl");
    let out_path = temp.path().join("logs").join("build_events.bin");
    Self {
      temp,
      events_path,
      out_path,
    }
  }

  pub fn path(&self) -> &Path {
    self.temp.path()
  }

  /// Create an artifact file and return its absolute path.
  pub fn artifact(&self, name: &str, content: &str) -> PathBuf {
    let path = self.temp.path().join(name);
    std::fs::write(&path, content).unwrap();
    path
  }

  /// Write recorded events, one JSON document per line.
  pub fn write_events(&self, events: &[serde_json::Value]) {
    let lines: Vec<String> = events.iter().map(|event| event.to_string()).collect();
    std::fs::write(&self.events_path, lines.join("\n") + "\n").unwrap();
  }

  /// A `bes replay` command for this environment.
  pub fn replay(&self) -> Command {
    let mut cmd = bes_cmd();
    cmd
      .current_dir(self.path())
      .arg("replay")
      .arg(&self.events_path)
      .arg("-o")
      .arg(&self.out_path);
    cmd
  }

  /// A `bes dump` command for the event log written by `replay`.
  pub fn dump(&self) -> Command {
    let mut cmd = bes_cmd();
    cmd.arg("dump").arg(&self.out_path);
    cmd
  }
}

pub fn started() -> serde_json::Value {
  serde_json::json!({
    "id": { "kind": "build_started" },
    "payload": { "type": "started", "uuid": "u-1", "command": "build", "start_time_millis": 1 }
  })
}

pub fn named_set(id: &str, path: &Path) -> serde_json::Value {
  serde_json::json!({
    "id": { "kind": "named_set", "id": id },
    "payload": {
      "type": "named_set_of_files",
      "files": [{ "name": "out", "path": path }]
    }
  })
}

pub fn finished() -> serde_json::Value {
  serde_json::json!({
    "id": { "kind": "build_finished" },
    "last_message": true,
    "payload": {
      "type": "build_finished",
      "exit_code": { "name": "SUCCESS", "code": 0 },
      "finish_time_millis": 2
    }
  })
}
