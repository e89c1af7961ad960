use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;

fn init_project() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    cargo_bin_cmd!("dimload")
        .args(["init", dir.path().to_str().unwrap(), "--name", "purchasing"])
        .assert()
        .success();
    dir
}

#[test]
fn test_init_writes_project_files() {
    let dir = init_project();

    let config = std::fs::read_to_string(dir.path().join("dimload.yaml")).unwrap();
    assert!(config.contains("name: purchasing"));
    assert!(config.contains("{{ env_var('DIMLOAD_SOURCE_URL'"));

    let ddl = std::fs::read_to_string(dir.path().join("warehouse.sql")).unwrap();
    assert!(ddl.contains("CREATE TABLE IF NOT EXISTS dw.fact_purchase"));
}

#[test]
fn test_init_refuses_existing_project() {
    let dir = init_project();
    cargo_bin_cmd!("dimload")
        .args(["init", dir.path().to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already contains a dimload.yaml"));
}

#[test]
fn test_validate_generated_project() {
    let dir = init_project();
    cargo_bin_cmd!("dimload")
        .args(["--config", dir.path().to_str().unwrap(), "validate"])
        .assert()
        .success()
        .stderr(predicate::str::contains("Configuration is valid"));
}

#[test]
fn test_validate_reports_missing_variable() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("dimload.yaml"),
        r#"
name: broken
source:
  url: "{{ env_var('DIMLOAD_TEST_UNSET_SOURCE') }}"
warehouse:
  url: postgres://localhost/dw
"#,
    )
    .unwrap();

    cargo_bin_cmd!("dimload")
        .env_remove("DIMLOAD_TEST_UNSET_SOURCE")
        .args(["--config", dir.path().to_str().unwrap(), "validate"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("DIMLOAD_TEST_UNSET_SOURCE"));
}

#[test]
fn test_validate_rejects_inverted_calendar() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("custom.yaml");
    std::fs::write(
        &config,
        r#"
name: broken
source:
  url: postgres://localhost/oltp
warehouse:
  url: postgres://localhost/dw
time_dimension:
  start: 2025-01-01
  end: 2024-01-01
"#,
    )
    .unwrap();

    cargo_bin_cmd!("dimload")
        .args(["--config", config.to_str().unwrap(), "validate"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("time_dimension.start"));
}

#[test]
fn test_plan_lists_fact_after_dimensions() {
    let dir = init_project();
    cargo_bin_cmd!("dimload")
        .args(["--config", dir.path().to_str().unwrap(), "plan"])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "step 1: dim_time, dim_product, dim_vendor",
        ))
        .stdout(predicate::str::contains("step 2: fact_purchase"))
        .stdout(predicate::str::contains(
            "reloading dim_vendor empties fact_purchase",
        ));
}

#[test]
fn test_plan_json() {
    let dir = init_project();
    let output = cargo_bin_cmd!("dimload")
        .args(["--config", dir.path().to_str().unwrap(), "plan", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let plan: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(plan["project"], "purchasing");
    assert_eq!(plan["layers"][1][0], "fact_purchase");
    assert_eq!(plan["invalidates"]["dim_product"][0], "fact_purchase");
    assert!(plan["invalidates"].get("fact_purchase").is_none());
    assert_eq!(plan["facts"]["on_lookup_miss"], "zero");
    assert_eq!(plan["facts"]["on_date_out_of_range"], "unknown");
}

#[test]
fn test_run_fails_on_bad_connection_string() {
    let dir = init_project();
    cargo_bin_cmd!("dimload")
        .env("DIMLOAD_SOURCE_URL", "not a url")
        .args(["--config", dir.path().to_str().unwrap(), "run"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to connect to source database"));
}

#[test]
fn test_json_logs() {
    let dir = init_project();
    let output = cargo_bin_cmd!("dimload")
        .args([
            "--log-format",
            "json",
            "--config",
            dir.path().to_str().unwrap(),
            "validate",
        ])
        .output()
        .unwrap();
    assert!(output.status.success());

    let stderr = String::from_utf8(output.stderr).unwrap();
    let first = stderr.lines().next().unwrap();
    let line: serde_json::Value = serde_json::from_str(first).unwrap();
    assert_eq!(line["level"], "INFO");
}
