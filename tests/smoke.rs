//! Smoke tests -- verify the binary runs and key subcommands exist.

use assert_cmd::Command;

#[test]
fn test_cli_help() {
    Command::cargo_bin("qamedic")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicates::str::contains(
            "Appliance-grade QA test orchestration",
        ));
}

#[test]
fn test_cli_version() {
    Command::cargo_bin("qamedic")
        .unwrap()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicates::str::contains("qamedic"));
}

#[test]
fn test_run_subcommand_exists() {
    Command::cargo_bin("qamedic")
        .unwrap()
        .args(["run", "--help"])
        .assert()
        .success()
        .stdout(predicates::str::contains("--category"));
}

#[test]
fn test_history_subcommand_exists() {
    Command::cargo_bin("qamedic")
        .unwrap()
        .args(["history", "--help"])
        .assert()
        .success();
}

#[test]
fn test_urls_subcommands_exist() {
    Command::cargo_bin("qamedic")
        .unwrap()
        .args(["urls", "list", "--help"])
        .assert()
        .success();
}

#[test]
fn test_reset_refuses_without_confirmation() {
    Command::cargo_bin("qamedic")
        .unwrap()
        .arg("reset")
        .assert()
        .failure()
        .stderr(predicates::str::contains("--yes"));
}

#[test]
fn test_run_unknown_category_records_failure() {
    let dir = tempfile::TempDir::new().unwrap();
    let config = format!(
        r#"
[reporting]
json = false
html = false

[paths]
database = "{}"
"#,
        dir.path().join("qa.db").display()
    );
    let config_path = dir.path().join("qamedic.toml");
    std::fs::write(&config_path, config).unwrap();

    Command::cargo_bin("qamedic")
        .unwrap()
        .env("QAMEDIC_CONFIG", &config_path)
        .args(["run", "--category", "bogus", "--json"])
        .assert()
        .success()
        .stdout(predicates::str::contains("Unsupported test category"));

    Command::cargo_bin("qamedic")
        .unwrap()
        .env("QAMEDIC_CONFIG", &config_path)
        .args(["stats", "--json"])
        .assert()
        .success()
        .stdout(predicates::str::contains("\"total\": 1"));
}

#[test]
fn test_stats_on_empty_store_reports_zero_rate() {
    let dir = tempfile::TempDir::new().unwrap();
    let config = format!(
        r#"
[paths]
database = "{}"
"#,
        dir.path().join("qa.db").display()
    );
    let config_path = dir.path().join("qamedic.toml");
    std::fs::write(&config_path, config).unwrap();

    Command::cargo_bin("qamedic")
        .unwrap()
        .env("QAMEDIC_CONFIG", &config_path)
        .args(["stats", "--json"])
        .assert()
        .success()
        .stdout(predicates::str::contains("\"pass_rate\": 0"))
        .stdout(predicates::str::contains("\"total\": 0"));
}
