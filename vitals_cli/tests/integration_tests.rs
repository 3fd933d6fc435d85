//! Integration tests for the vitals binary.
//!
//! These tests verify end-to-end behavior including:
//! - Ingesting saved pages into the store
//! - Showing, charting and exporting stored records
//! - Idempotent re-ingestion

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const DIARY: &str = r#"<html><body>
<div class="printDiary">
  <h1>Monday 01 January 2024</h1>
  <div class="occasionTags" data-occasioname="Lunch">
    <table><tr><th class="colNutri subtot">700</th></tr></table>
  </div>
  <div class="occasionExercise">
    <table><tr><th class="colNutri subtot">150</th></tr></table>
  </div>
</div>
<div class="printDiary">
  <h1>Tuesday 02 January 2024</h1>
  <div class="occasionTags" data-occasioname="Dinner">
    <table><tr><th class="colNutri subtot">1,900</th></tr></table>
  </div>
</div>
<div class="printDiary">
  <h1>Wednesday 03 January 2024</h1>
  <div class="occasionTags" data-occasioname="Breakfast">
    <table><tr><th class="colNutri subtot">400</th></tr></table>
  </div>
</div>
</body></html>"#;

const MASS: &str = r#"<table class="dataTableContent">
  <tr><th>Date</th><th>Weight</th></tr>
  <tr><td class="colDate">Mon 01 Jan 2024</td><td class="colWeight colorPrimary">121.0 Kg</td></tr>
  <tr><td class="colDate">Wed 03 Jan 2024</td><td class="colWeight colorPrimary">120.0 Kg</td></tr>
</table>"#;

const WAIST: &str = r#"<table class="dataTableContent dataTableOther">
  <tr><td class="colDate">Mon 01 Jan 2024</td><td class="colMeasureType">110.3 cm</td></tr>
  <tr><td class="colDate">Tue 02 Jan 2024</td><td class="colMeasureType">109.7 cm</td></tr>
</table>"#;

/// Helper to create a test data directory
fn setup_test_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp dir")
}

/// Helper to get the path to the CLI binary
fn cli() -> Command {
    Command::new(assert_cmd::cargo::cargo_bin!("vitals"))
}

/// Saved pages plus a config that keeps the host's config out of the test
struct Fixture {
    _dir: TempDir,
    data_dir: PathBuf,
    pages_dir: PathBuf,
    config_path: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let dir = setup_test_dir();
        let data_dir = dir.path().join("data");
        let pages_dir = dir.path().join("pages");
        fs::create_dir_all(&pages_dir).unwrap();
        write_pages(&pages_dir, DIARY, MASS, WAIST);

        let config_path = dir.path().join("config.toml");
        fs::write(
            &config_path,
            "[chart]\nema_window = 3\nprojection_end = \"2024-03-01\"\n",
        )
        .unwrap();

        Self {
            _dir: dir,
            data_dir,
            pages_dir,
            config_path,
        }
    }

    fn cmd(&self, subcommand: &str) -> Command {
        let mut cmd = cli();
        cmd.arg(subcommand)
            .arg("--data-dir")
            .arg(&self.data_dir)
            .arg("--config")
            .arg(&self.config_path);
        cmd
    }

    fn ingest(&self) -> assert_cmd::assert::Assert {
        self.cmd("ingest").arg("--pages").arg(&self.pages_dir).assert()
    }

    fn store_path(&self) -> PathBuf {
        self.data_dir.join("store.json")
    }
}

fn write_pages(dir: &Path, diary: &str, mass: &str, waist: &str) {
    fs::write(dir.join("calorie_diary.html"), diary).unwrap();
    fs::write(dir.join("mass_log.html"), mass).unwrap();
    fs::write(dir.join("waist_log.html"), waist).unwrap();
}

#[test]
fn test_cli_help() {
    cli()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Health measurement reconciliation and trend charts",
        ));
}

#[test]
fn test_ingest_creates_store() {
    let fixture = Fixture::new();

    fixture
        .ingest()
        .success()
        .stdout(predicate::str::contains("Refresh complete"))
        .stdout(predicate::str::contains("Calorie days:     3"))
        .stdout(predicate::str::contains("Inserted 6, replaced 0, unchanged 0"));

    let store: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(fixture.store_path()).unwrap()).unwrap();
    assert_eq!(store["daily_kcal"]["2024-01-01"]["net_kcal"], 550.0);
    assert_eq!(store["daily_kcal"]["2024-01-02"]["net_kcal"], 1900.0);
    assert!(store["daily_mass_waist"]["2024-01-02"]["mass_kg"].is_null());
    assert_eq!(store["daily_mass_waist"]["2024-01-03"]["mass_kg"], 120.0);
}

#[test]
fn test_reingest_is_idempotent() {
    let fixture = Fixture::new();
    fixture.ingest().success();
    let before = fs::read_to_string(fixture.store_path()).unwrap();

    fixture
        .ingest()
        .success()
        .stdout(predicate::str::contains("Inserted 0, replaced 0, unchanged 6"))
        .stdout(predicate::str::contains("store not rewritten"));

    assert_eq!(fs::read_to_string(fixture.store_path()).unwrap(), before);
}

#[test]
fn test_reingest_replaces_corrected_day() {
    let fixture = Fixture::new();
    fixture.ingest().success();

    let corrected = DIARY.replace("1,900", "1,650");
    write_pages(&fixture.pages_dir, &corrected, MASS, WAIST);

    fixture
        .ingest()
        .success()
        .stdout(predicate::str::contains("Inserted 0, replaced 1, unchanged 5"));

    fixture
        .cmd("show")
        .arg("--collection")
        .arg("kcal")
        .assert()
        .success()
        .stdout(predicate::str::contains("1650"))
        .stdout(predicate::str::contains("1900").not());
}

#[test]
fn test_ingest_skips_malformed_rows() {
    let fixture = Fixture::new();
    let diary = DIARY.replace("Wednesday 03 January 2024", "Wednesday 31 Smarch 2024");
    write_pages(&fixture.pages_dir, &diary, MASS, WAIST);

    fixture
        .ingest()
        .success()
        .stdout(predicate::str::contains("Calorie days:     2 (1 diary rows skipped)"));
}

#[test]
fn test_show_both_collections() {
    let fixture = Fixture::new();
    fixture.ingest().success();

    fixture
        .cmd("show")
        .assert()
        .success()
        .stdout(predicate::str::contains("Daily kcal (3 days)"))
        .stdout(predicate::str::contains("Daily mass/waist (3 days)"))
        .stdout(predicate::str::contains("2024-01-01"))
        .stdout(predicate::str::contains("121.0"));
}

#[test]
fn test_show_filters_by_collection_and_range() {
    let fixture = Fixture::new();
    fixture.ingest().success();

    fixture
        .cmd("show")
        .arg("--collection")
        .arg("mass-waist")
        .arg("--from")
        .arg("2024-01-02")
        .arg("--to")
        .arg("2024-01-03")
        .assert()
        .success()
        .stdout(predicate::str::contains("Daily kcal").not())
        .stdout(predicate::str::contains("Daily mass/waist (2 days)"))
        .stdout(predicate::str::contains("2024-01-01").not());
}

#[test]
fn test_show_empty_store() {
    let fixture = Fixture::new();

    fixture
        .cmd("show")
        .assert()
        .success()
        .stdout(predicate::str::contains("Daily kcal (0 days)"));

    // Reading never creates a store file
    assert!(!fixture.store_path().exists());
}

#[test]
fn test_chart_writes_payload() {
    let fixture = Fixture::new();
    fixture.ingest().success();
    let out = fixture.data_dir.join("charts").join("payload.json");

    fixture
        .cmd("chart")
        .arg("--out")
        .arg(&out)
        .assert()
        .success()
        .stdout(predicate::str::contains("Chart data written"));

    let payload: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&out).unwrap()).unwrap();

    let raw = payload["net_kcal"]["raw"]["points"].as_array().unwrap();
    assert_eq!(raw.len(), 3);
    assert_eq!(raw[0]["date"], "2024-01-01");

    // Window 3: 550, then 0.5 * 1900 + 0.5 * 550
    let smoothed = payload["net_kcal"]["smoothed"]["points"].as_array().unwrap();
    assert_eq!(smoothed[1]["value"], 1225.0);

    assert_eq!(payload["mass_kg"]["goal_value"], 100.0);
    let trend = payload["mass_kg"]["trend"]["points"].as_array().unwrap();
    assert_eq!(trend.last().unwrap()["date"], "2024-03-01");

    assert!(payload["body_fat_pct"]["goal"].is_null());
    assert_eq!(
        payload["calorie_breakdown"]["categories"].as_array().unwrap().len(),
        5
    );
}

#[test]
fn test_chart_with_date_window() {
    let fixture = Fixture::new();
    fixture.ingest().success();
    let out = fixture.data_dir.join("payload.json");

    fixture
        .cmd("chart")
        .arg("--out")
        .arg(&out)
        .arg("--from")
        .arg("2024-01-02")
        .assert()
        .success();

    let payload: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&out).unwrap()).unwrap();
    let raw = payload["net_kcal"]["raw"]["points"].as_array().unwrap();
    assert_eq!(raw.len(), 2);
    assert_eq!(raw[0]["date"], "2024-01-02");
}

#[test]
fn test_export_writes_both_csv_files() {
    let fixture = Fixture::new();
    fixture.ingest().success();
    let out_dir = fixture.data_dir.join("export");

    fixture
        .cmd("export")
        .arg("--out-dir")
        .arg(&out_dir)
        .assert()
        .success()
        .stdout(predicate::str::contains("Exported 3 calorie days"))
        .stdout(predicate::str::contains("Exported 3 measurement days"));

    let kcal = fs::read_to_string(out_dir.join("daily_kcal.csv")).unwrap();
    assert!(kcal.starts_with("date,breakfast,lunch,dinner,snacks,drinks,exercise_kcal,net_kcal"));
    assert!(kcal.contains("2024-01-01,0.0,700.0,0.0,0.0,0.0,150.0,550.0"));

    let mass = fs::read_to_string(out_dir.join("daily_mass_waist.csv")).unwrap();
    assert!(mass.starts_with("date,mass_kg,waist_cm,body_fat_pct"));
    assert!(mass.contains("2024-01-03,120.0,,"));
}
