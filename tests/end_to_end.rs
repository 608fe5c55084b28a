//! End-to-end runs against a scratch SQLite database.

use std::fmt::Write as _;

use assert_cmd::Command;
use signalsearcher::config::Config;
use signalsearcher::report::{ReportFormat, CSV_HEADER};
use signalsearcher::sequencer::Record;
use signalsearcher::storage::{self, schema::DEFAULT_TABLE};
use tokio_util::sync::CancellationToken;

/// One series too short to analyse, and one that halves in 2015.
fn fixture_lines() -> String {
    let mut out = String::from("asn,loc,date,count,download\n");
    for month in 1..6 {
        writeln!(out, "AS1,mars,2001-{month:02},3,2").unwrap();
    }
    for year in 2013..2019 {
        for month in 1..=12 {
            let download = if year < 2015 { 20 } else { 10 };
            writeln!(out, "AS2,venus,{year}-{month:02},3,{download}").unwrap();
        }
    }
    out
}

const EXPECTED_LINE: &str = "66, AS2, venus, 2014-08-01, 2016-06-01, \
    https://viz.measurementlab.net/location/venus?aggr=month&isps=AS2&start=2013-08-01&end=2016-06-01";

#[tokio::test]
async fn test_scan_library() {
    let dir = tempfile::TempDir::new().unwrap();
    let db = dir.path().join("rows.db");
    let pool = storage::open_pool(db.to_str().unwrap(), DEFAULT_TABLE).unwrap();
    {
        let mut conn = pool.get().unwrap();
        storage::import_rows(&mut conn, DEFAULT_TABLE, fixture_lines().as_bytes()).unwrap();
        // Rows land out of order; the scan must still group them.
        storage::insert_record(&conn, DEFAULT_TABLE, &Record::new("AS0", "earth", "2001-01", 1, 1.0))
            .unwrap();
    }

    let mut config = Config::default();
    config.source.db_path = db;

    let mut out = Vec::new();
    let summary = signalsearcher::scan(&config, &mut out, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.series, 3);
    assert_eq!(summary.series_skipped, 2);
    assert_eq!(summary.incidents, 1);

    let text = String::from_utf8(out).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines, [CSV_HEADER, EXPECTED_LINE]);
}

#[tokio::test]
async fn test_scan_library_json() {
    let dir = tempfile::TempDir::new().unwrap();
    let db = dir.path().join("rows.db");
    let pool = storage::open_pool(db.to_str().unwrap(), DEFAULT_TABLE).unwrap();
    {
        let mut conn = pool.get().unwrap();
        storage::import_rows(&mut conn, DEFAULT_TABLE, fixture_lines().as_bytes()).unwrap();
    }

    let mut config = Config::default();
    config.source.db_path = db;
    config.report.format = ReportFormat::Json;

    let mut out = Vec::new();
    signalsearcher::scan(&config, &mut out, CancellationToken::new())
        .await
        .unwrap();

    let text = String::from_utf8(out).unwrap();
    let lines: Vec<serde_json::Value> = text
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0]["asn"], "AS2");
    assert_eq!(lines[0]["end"], "2016-06-01");
    assert_eq!(lines[0]["affected_count"], 66);
}

#[test]
fn test_cli_import_then_scan() {
    let dir = tempfile::TempDir::new().unwrap();
    let db = dir.path().join("data").join("rows.db");
    let input = dir.path().join("rows.csv");
    std::fs::write(&input, fixture_lines()).unwrap();

    Command::cargo_bin("signalsearcher")
        .unwrap()
        .env_remove("SIGNALSEARCHER_CONFIG")
        .args(["import", "--input"])
        .arg(&input)
        .arg("--db")
        .arg(&db)
        .assert()
        .success()
        .stdout(predicates::str::contains("Imported 77 rows"));

    let output = Command::cargo_bin("signalsearcher")
        .unwrap()
        .env_remove("SIGNALSEARCHER_CONFIG")
        .arg("scan")
        .arg("--db")
        .arg(&db)
        .output()
        .unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).unwrap();
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines, [CSV_HEADER, EXPECTED_LINE]);
}

#[test]
fn test_cli_scan_rejects_malformed_month() {
    let dir = tempfile::TempDir::new().unwrap();
    let db = dir.path().join("rows.db");
    let input = dir.path().join("rows.csv");
    std::fs::write(&input, "asn,loc,date,count,download\nAS1,mars,March 2001,3,2\n").unwrap();

    Command::cargo_bin("signalsearcher")
        .unwrap()
        .env_remove("SIGNALSEARCHER_CONFIG")
        .args(["import", "--input"])
        .arg(&input)
        .arg("--db")
        .arg(&db)
        .assert()
        .success();

    Command::cargo_bin("signalsearcher")
        .unwrap()
        .env_remove("SIGNALSEARCHER_CONFIG")
        .arg("scan")
        .arg("--db")
        .arg(&db)
        .assert()
        .failure()
        .stderr(predicates::str::contains("March 2001"));
}

#[tokio::test]
async fn test_scan_library_missing_db_is_not_created() {
    let dir = tempfile::TempDir::new().unwrap();
    let db = dir.path().join("typo.db");

    let mut config = Config::default();
    config.source.db_path = db.clone();

    let mut out = Vec::new();
    let err = signalsearcher::scan(&config, &mut out, CancellationToken::new())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("database not found"), "{err}");
    assert!(!db.exists());
    assert!(out.is_empty());
}

#[test]
fn test_cli_scan_missing_db_fails() {
    let dir = tempfile::TempDir::new().unwrap();
    let db = dir.path().join("typo.db");

    Command::cargo_bin("signalsearcher")
        .unwrap()
        .env_remove("SIGNALSEARCHER_CONFIG")
        .arg("scan")
        .arg("--db")
        .arg(&db)
        .assert()
        .failure()
        .stderr(predicates::str::contains("database not found"));
    assert!(!db.exists());
}

#[test]
fn test_cli_import_quoted_csv() {
    let dir = tempfile::TempDir::new().unwrap();
    let db = dir.path().join("rows.db");
    let input = dir.path().join("rows.csv");
    std::fs::write(
        &input,
        "\"asn\",\"loc\",\"date\",\"count\",\"download\"\nAS1,\"nauscaoakland, ca\",2001-01,3,2.5\n",
    )
    .unwrap();

    Command::cargo_bin("signalsearcher")
        .unwrap()
        .env_remove("SIGNALSEARCHER_CONFIG")
        .args(["import", "--input"])
        .arg(&input)
        .arg("--db")
        .arg(&db)
        .assert()
        .success()
        .stdout(predicates::str::contains("Imported 1 rows"));
}

#[test]
fn test_cli_logs_config_fallback() {
    let dir = tempfile::TempDir::new().unwrap();
    let db = dir.path().join("rows.db");
    let input = dir.path().join("rows.csv");
    std::fs::write(&input, fixture_lines()).unwrap();

    Command::cargo_bin("signalsearcher")
        .unwrap()
        .env("SIGNALSEARCHER_CONFIG", dir.path().join("missing.toml"))
        .env_remove("RUST_LOG")
        .args(["import", "--input"])
        .arg(&input)
        .arg("--db")
        .arg(&db)
        .assert()
        .success()
        .stderr(predicates::str::contains("could not be loaded"));
}

#[test]
fn test_cli_logs_explicit_config() {
    let dir = tempfile::TempDir::new().unwrap();
    let config = dir.path().join("signalsearcher.toml");
    std::fs::write(&config, "[logging]\nlevel = \"info\"\n").unwrap();
    let input = dir.path().join("rows.csv");
    std::fs::write(&input, fixture_lines()).unwrap();

    Command::cargo_bin("signalsearcher")
        .unwrap()
        .env_remove("SIGNALSEARCHER_CONFIG")
        .env_remove("RUST_LOG")
        .arg("--config")
        .arg(&config)
        .args(["import", "--input"])
        .arg(&input)
        .arg("--db")
        .arg(dir.path().join("rows.db"))
        .assert()
        .success()
        .stderr(predicates::str::contains("loaded configuration"));
}
