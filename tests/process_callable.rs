#![cfg(unix)]

use exercise_harness::engine::evaluate_all;
use exercise_harness::registry::CallableRegistry;
use exercise_harness::source::parse_payload;
use exercise_harness::types::Got;
use serde_json::json;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::time::{Duration, Instant};
use tempfile::tempdir;

fn script(dir: &Path, name: &str, body: &str) {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
}

#[test]
fn executables_in_a_directory_become_functions() {
    let dir = tempdir().unwrap();
    script(dir.path(), "answer.sh", "cat > /dev/null\necho 42");
    script(dir.path(), "echo_args", "cat");
    script(dir.path(), "broken", "cat > /dev/null\necho 'nope' >&2\nexit 3");
    fs::write(dir.path().join("notes.txt"), "not executable").unwrap();

    let registry = CallableRegistry::from_dir(dir.path(), Duration::from_secs(10)).unwrap();
    assert_eq!(
        registry.names().collect::<Vec<_>>(),
        ["answer", "broken", "echo_args"]
    );

    let collection = parse_payload(
        r#"{"test_cases": {
            "answer": [{"input": [], "output": 42}],
            "echo_args": [{"input": [1, [2, "x"]], "output": [1, [2, "x"]]}],
            "broken": [{"input": [], "output": null}],
            "notes": [{"input": [], "output": null}]
        }}"#,
    )
    .unwrap();
    let report = evaluate_all(&collection, &registry);

    assert_eq!(report.missing, ["notes"]);
    let by_name = |n: &str| report.tested.iter().find(|r| r.name == n).unwrap();
    assert_eq!(by_name("answer").passed, 1);
    assert_eq!(by_name("echo_args").passed, 1);
    let broken = by_name("broken");
    assert_eq!(broken.passed, 0);
    assert!(matches!(&broken.results[0].got, Got::Error(m) if m.contains("nope")));
}

#[test]
fn slow_program_is_stopped() {
    let dir = tempdir().unwrap();
    script(dir.path(), "sleepy", "sleep 5\necho 1");
    let registry = CallableRegistry::from_dir(dir.path(), Duration::from_millis(200)).unwrap();
    let collection =
        parse_payload(r#"{"test_cases": {"sleepy": [{"input": [], "output": 1}]}}"#).unwrap();
    let report = evaluate_all(&collection, &registry);
    assert!(matches!(&report.tested[0].results[0].got, Got::Error(m) if m.contains("Timed out")));
}

#[test]
fn large_answer_is_read_while_the_program_runs() {
    let dir = tempdir().unwrap();
    script(
        dir.path(),
        "long_text",
        "printf '\"'\nhead -c 200000 /dev/zero | tr '\\000' 'a'\nprintf '\"\\n'",
    );
    let registry = CallableRegistry::from_dir(dir.path(), Duration::from_secs(10)).unwrap();
    let payload = json!({"test_cases": {
        "long_text": [{"input": [], "output": "a".repeat(200_000)}]
    }});
    let collection = parse_payload(&payload.to_string()).unwrap();
    let report = evaluate_all(&collection, &registry);
    let result = &report.tested[0].results[0];
    assert!(result.passed, "{:?}", result.got);
}

#[test]
fn program_may_ignore_its_arguments() {
    let dir = tempdir().unwrap();
    script(dir.path(), "one", "echo 1");
    let registry = CallableRegistry::from_dir(dir.path(), Duration::from_secs(10)).unwrap();
    let payload = json!({"test_cases": {
        "one": [{"input": ["x".repeat(300_000)], "output": 1}]
    }});
    let collection = parse_payload(&payload.to_string()).unwrap();
    let report = evaluate_all(&collection, &registry);
    let result = &report.tested[0].results[0];
    assert!(result.passed, "{:?}", result.got);
}

#[test]
fn timeout_applies_when_arguments_are_never_read() {
    let dir = tempdir().unwrap();
    script(dir.path(), "stuck", "sleep 5\necho 1");
    let registry = CallableRegistry::from_dir(dir.path(), Duration::from_millis(300)).unwrap();
    let payload = json!({"test_cases": {
        "stuck": [{"input": ["x".repeat(300_000)], "output": 1}]
    }});
    let collection = parse_payload(&payload.to_string()).unwrap();
    let started = Instant::now();
    let report = evaluate_all(&collection, &registry);
    assert!(started.elapsed() < Duration::from_secs(4));
    assert!(matches!(&report.tested[0].results[0].got, Got::Error(m) if m.contains("Timed out")));
}
