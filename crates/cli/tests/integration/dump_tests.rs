use predicates::prelude::*;

use super::common::*;

#[test]
fn dump_prints_events_in_order() {
  let env = TestEnv::new();
  let artifact = env.artifact("app.bin", "binary");
  env.write_events(&[started(), named_set("0", &artifact), finished()]);
  env.replay().assert().success();

  env
    .dump()
    .assert()
    .success()
    .stdout(predicate::str::is_match(r"(?s)0 → started.*1 → named_set:0.*2 → finished \(last\)").unwrap())
    .stdout(predicate::str::contains("file://"));
}

#[test]
fn dump_json_output_reports_completeness() {
  let env = TestEnv::new();
  env.write_events(&[started(), finished()]);
  env.replay().assert().success();

  let output = env.dump().args(["--output", "json"]).output().unwrap();
  assert!(output.status.success());

  let dumped: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
  assert_eq!(dumped["events"].as_array().unwrap().len(), 2);
  assert_eq!(dumped["truncated"], false);
  assert_eq!(dumped["complete"], true);
}

#[test]
fn dump_notes_truncated_tail() {
  let env = TestEnv::new();
  env.write_events(&[started(), finished()]);
  env.replay().assert().success();

  let bytes = std::fs::read(&env.out_path).unwrap();
  std::fs::write(&env.out_path, &bytes[..bytes.len() - 4]).unwrap();

  env
    .dump()
    .assert()
    .success()
    .stdout(predicate::str::contains("Events: 1"))
    .stderr(predicate::str::contains("truncated"));
}

#[test]
fn dump_json_stream() {
  let env = TestEnv::new();
  env.write_events(&[started(), finished()]);
  env.replay().args(["--format", "json"]).assert().success();

  env
    .dump()
    .args(["--format", "json"])
    .assert()
    .success()
    .stdout(predicate::str::contains("finished (last)"));
}

#[test]
fn dump_rejects_text_streams() {
  let env = TestEnv::new();
  env.write_events(&[started()]);
  env.replay().args(["--format", "text"]).assert().success();

  env
    .dump()
    .args(["--format", "text"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("cannot be decoded"));
}
