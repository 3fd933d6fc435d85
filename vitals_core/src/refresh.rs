//! Refresh coordination: one ingestion pass at a time, with a status snapshot.
//!
//! A pass is fetch, scan, extract, then one batch upsert. A second caller
//! arriving while a pass is in flight is turned away, not queued.

use crate::derive::BodyProfile;
use crate::extract::{extract_calorie_records, extract_mass_waist_records};
use crate::page::{scan_calorie_diary, scan_mass_log, scan_waist_log};
use crate::store::{BatchSummary, IngestBatch, JsonFileBackend, ReconciliationStore, StoreBackend};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Mutex, MutexGuard};

pub const CALORIE_DIARY_FILE: &str = "calorie_diary.html";
pub const MASS_LOG_FILE: &str = "mass_log.html";
pub const WAIST_LOG_FILE: &str = "waist_log.html";

const IDLE: u8 = 0;
const RUNNING: u8 = 1;

/// Raw text of the three source pages
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SourcePages {
    pub calorie_diary: String,
    pub mass_log: String,
    pub waist_log: String,
}

/// Where a refresh pass gets its pages from
pub trait PageSource: Send + Sync {
    fn fetch(&self) -> Result<SourcePages>;
}

/// Pages previously saved to a directory
#[derive(Clone, Debug)]
pub struct DirectoryPageSource {
    dir: PathBuf,
}

impl DirectoryPageSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn read_page(&self, name: &str) -> Result<String> {
        let path = self.dir.join(name);
        std::fs::read_to_string(&path)
            .map_err(|e| Error::Upstream(format!("cannot read {:?}: {}", path, e)))
    }
}

impl PageSource for DirectoryPageSource {
    fn fetch(&self) -> Result<SourcePages> {
        Ok(SourcePages {
            calorie_diary: self.read_page(CALORIE_DIARY_FILE)?,
            mass_log: self.read_page(MASS_LOG_FILE)?,
            waist_log: self.read_page(WAIST_LOG_FILE)?,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshState {
    Idle,
    Running,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LastResult {
    Success,
    Failure,
}

/// Point-in-time copy of the coordinator status
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StatusSnapshot {
    pub state: RefreshState,
    pub message: Option<String>,
    pub last_run: Option<DateTime<Utc>>,
    pub last_result: Option<LastResult>,
}

impl Default for StatusSnapshot {
    fn default() -> Self {
        Self {
            state: RefreshState::Idle,
            message: None,
            last_run: None,
            last_result: None,
        }
    }
}

/// What one successful pass did
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RefreshReport {
    pub diary_rows: usize,
    pub diary_rows_skipped: usize,
    pub measurement_rows: usize,
    pub measurement_rows_skipped: usize,
    pub calorie_records: usize,
    pub mass_waist_records: usize,
    pub batch: BatchSummary,
}

impl RefreshReport {
    pub fn summary_line(&self) -> String {
        format!(
            "{} calorie days, {} measurement days ({} inserted, {} replaced, {} unchanged, {} rows skipped)",
            self.calorie_records,
            self.mass_waist_records,
            self.batch.inserted,
            self.batch.replaced,
            self.batch.unchanged,
            self.diary_rows_skipped + self.measurement_rows_skipped
        )
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum RefreshOutcome {
    AlreadyRunning,
    Completed(RefreshReport),
    Failed(String),
}

/// Returns the state flag to idle when the pass ends, however it ends
struct RunningGuard<'a> {
    state: &'a AtomicU8,
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.state.store(IDLE, Ordering::Release);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Single-flight owner of the store and its page source
pub struct RefreshCoordinator<S: PageSource, B: StoreBackend = JsonFileBackend> {
    source: S,
    store: Mutex<ReconciliationStore<B>>,
    profile: BodyProfile,
    state: AtomicU8,
    status: Mutex<StatusSnapshot>,
}

impl<S: PageSource, B: StoreBackend> RefreshCoordinator<S, B> {
    pub fn new(source: S, store: ReconciliationStore<B>, profile: BodyProfile) -> Self {
        Self {
            source,
            store: Mutex::new(store),
            profile,
            state: AtomicU8::new(IDLE),
            status: Mutex::new(StatusSnapshot::default()),
        }
    }

    /// Run one pass unless one is already running
    pub fn start_refresh(&self) -> RefreshOutcome {
        if self
            .state
            .compare_exchange(IDLE, RUNNING, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::info!("Refresh already running, request rejected");
            return RefreshOutcome::AlreadyRunning;
        }
        let guard = RunningGuard { state: &self.state };
        lock(&self.status).message = Some("Refresh in progress".into());

        let result = match catch_unwind(AssertUnwindSafe(|| self.run_pass())) {
            Ok(result) => result,
            Err(_) => Err(Error::Internal("refresh pass panicked".into())),
        };

        let (outcome, snapshot) = match result {
            Ok(report) => {
                tracing::info!("Refresh complete: {}", report.summary_line());
                (
                    RefreshOutcome::Completed(report),
                    StatusSnapshot {
                        state: RefreshState::Idle,
                        message: Some(report.summary_line()),
                        last_run: Some(Utc::now()),
                        last_result: Some(LastResult::Success),
                    },
                )
            }
            Err(e) => {
                tracing::warn!("Refresh failed: {}", e);
                (
                    RefreshOutcome::Failed(e.to_string()),
                    StatusSnapshot {
                        state: RefreshState::Idle,
                        message: Some(e.to_string()),
                        last_run: Some(Utc::now()),
                        last_result: Some(LastResult::Failure),
                    },
                )
            }
        };

        *lock(&self.status) = snapshot;
        drop(guard);
        outcome
    }

    /// Current status; `state` always agrees with the single-flight flag
    pub fn get_status(&self) -> StatusSnapshot {
        let mut snapshot = lock(&self.status).clone();
        snapshot.state = if self.is_running() {
            RefreshState::Running
        } else {
            RefreshState::Idle
        };
        snapshot
    }

    pub fn is_running(&self) -> bool {
        self.state.load(Ordering::Acquire) == RUNNING
    }

    /// Read access to the store between passes
    pub fn with_store<T>(&self, f: impl FnOnce(&ReconciliationStore<B>) -> T) -> T {
        f(&lock(&self.store))
    }

    fn run_pass(&self) -> Result<RefreshReport> {
        let pages = self.source.fetch().map_err(|e| match e {
            Error::Upstream(_) => e,
            other => Error::Upstream(other.to_string()),
        })?;

        let diary_rows = scan_calorie_diary(&pages.calorie_diary);
        let mass_rows = scan_mass_log(&pages.mass_log);
        let waist_rows = scan_waist_log(&pages.waist_log);
        tracing::debug!(
            "Scanned {} diary, {} mass, {} waist rows",
            diary_rows.len(),
            mass_rows.len(),
            waist_rows.len()
        );

        let calories = extract_calorie_records(&diary_rows);
        let measurements = extract_mass_waist_records(&mass_rows, &waist_rows, &self.profile);

        let mut report = RefreshReport {
            diary_rows: diary_rows.len(),
            diary_rows_skipped: calories.skipped,
            measurement_rows: mass_rows.len() + waist_rows.len(),
            measurement_rows_skipped: measurements.skipped,
            calorie_records: calories.records.len(),
            mass_waist_records: measurements.records.len(),
            batch: BatchSummary::default(),
        };

        let batch = IngestBatch {
            calories: calories.records,
            mass_waist: measurements.records,
        };
        report.batch = lock(&self.store).apply_batch(batch)?;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::{ymd, FlakyBackend};
    use crate::MealCategory;
    use std::sync::mpsc;
    use std::sync::Arc;

    const DIARY: &str = r#"
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
  <h1>Someday 99 January 2024</h1>
  <div class="occasionTags" data-occasioname="Lunch">
    <table><tr><th class="colNutri subtot">1</th></tr></table>
  </div>
</div>
<div class="printDiary">
  <h1>Tuesday 02 January 2024</h1>
  <div class="occasionTags" data-occasioname="Dinner">
    <table><tr><th class="colNutri subtot">900</th></tr></table>
  </div>
</div>"#;

    const MASS: &str = r#"
<table class="dataTableContent">
  <tr><td class="colDate">Mon 01 Jan 2024</td><td class="colWeight colorPrimary">120.4 Kg</td></tr>
</table>"#;

    const WAIST: &str = r#"
<table class="dataTableContent dataTableOther">
  <tr><td class="colDate">Mon 01 Jan 2024</td><td class="colMeasureType">110 cm</td></tr>
  <tr><td class="colDate">Tue 02 Jan 2024</td><td class="colMeasureType">109 cm</td></tr>
</table>"#;

    fn pages() -> SourcePages {
        SourcePages {
            calorie_diary: DIARY.into(),
            mass_log: MASS.into(),
            waist_log: WAIST.into(),
        }
    }

    struct StaticSource(SourcePages);

    impl PageSource for StaticSource {
        fn fetch(&self) -> Result<SourcePages> {
            Ok(self.0.clone())
        }
    }

    struct PanickingSource;

    impl PageSource for PanickingSource {
        fn fetch(&self) -> Result<SourcePages> {
            panic!("scraper bug");
        }
    }

    struct FailingSource;

    impl PageSource for FailingSource {
        fn fetch(&self) -> Result<SourcePages> {
            Err(Error::Upstream("login rejected".into()))
        }
    }

    /// Signals when fetch starts, then blocks until released
    struct GatedSource {
        entered: Mutex<mpsc::Sender<()>>,
        release: Mutex<mpsc::Receiver<()>>,
    }

    impl PageSource for GatedSource {
        fn fetch(&self) -> Result<SourcePages> {
            let _ = lock(&self.entered).send(());
            let _ = lock(&self.release).recv();
            Ok(pages())
        }
    }

    fn json_store(dir: &Path) -> ReconciliationStore {
        ReconciliationStore::open(dir.join("store.json")).unwrap()
    }

    #[test]
    fn test_refresh_ingests_pages() {
        crate::logging::init_test();
        let temp_dir = tempfile::tempdir().unwrap();
        let coordinator = RefreshCoordinator::new(
            StaticSource(pages()),
            json_store(temp_dir.path()),
            BodyProfile::default(),
        );

        let report = match coordinator.start_refresh() {
            RefreshOutcome::Completed(report) => report,
            other => panic!("unexpected outcome {:?}", other),
        };
        assert_eq!(report.diary_rows, 3);
        assert_eq!(report.diary_rows_skipped, 1);
        assert_eq!(report.calorie_records, 2);
        assert_eq!(report.mass_waist_records, 2);
        assert_eq!(report.batch.inserted, 4);
        assert!(report.batch.written);

        coordinator.with_store(|store| {
            let monday = store.calories().get(ymd(2024, 1, 1)).unwrap();
            assert_eq!(monday.meal(MealCategory::Lunch), 700.0);
            assert_eq!(monday.net_kcal(), 550.0);
            let tuesday = store.mass_waist().get(ymd(2024, 1, 2)).unwrap();
            assert_eq!(tuesday.mass_kg(), None);
            assert!(tuesday.body_fat_pct().is_some());
        });

        let status = coordinator.get_status();
        assert_eq!(status.state, RefreshState::Idle);
        assert_eq!(status.last_result, Some(LastResult::Success));
        assert!(status.last_run.is_some());
    }

    #[test]
    fn test_second_refresh_is_idempotent() {
        let temp_dir = tempfile::tempdir().unwrap();
        let backend = FlakyBackend::new(&temp_dir.path().join("store.json"));
        let writes = backend.writes.clone();
        let coordinator = RefreshCoordinator::new(
            StaticSource(pages()),
            ReconciliationStore::with_backend(backend).unwrap(),
            BodyProfile::default(),
        );

        assert!(matches!(coordinator.start_refresh(), RefreshOutcome::Completed(_)));
        match coordinator.start_refresh() {
            RefreshOutcome::Completed(report) => {
                assert_eq!(report.batch.unchanged, 4);
                assert!(!report.batch.written);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(writes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_concurrent_refresh_is_rejected() {
        let temp_dir = tempfile::tempdir().unwrap();
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let source = GatedSource {
            entered: Mutex::new(entered_tx),
            release: Mutex::new(release_rx),
        };
        let coordinator = Arc::new(RefreshCoordinator::new(
            source,
            json_store(temp_dir.path()),
            BodyProfile::default(),
        ));

        let worker = {
            let coordinator = Arc::clone(&coordinator);
            std::thread::spawn(move || coordinator.start_refresh())
        };
        entered_rx.recv().unwrap();

        assert!(coordinator.is_running());
        assert_eq!(coordinator.get_status().state, RefreshState::Running);
        assert_eq!(coordinator.start_refresh(), RefreshOutcome::AlreadyRunning);
        // The rejected call did no work
        coordinator.with_store(|store| assert!(store.calories().is_empty()));

        release_tx.send(()).unwrap();
        assert!(matches!(worker.join().unwrap(), RefreshOutcome::Completed(_)));
        assert!(!coordinator.is_running());
        coordinator.with_store(|store| assert_eq!(store.calories().len(), 2));
    }

    #[test]
    fn test_upstream_failure_leaves_store_untouched() {
        let temp_dir = tempfile::tempdir().unwrap();
        let coordinator = RefreshCoordinator::new(
            FailingSource,
            json_store(temp_dir.path()),
            BodyProfile::default(),
        );

        match coordinator.start_refresh() {
            RefreshOutcome::Failed(message) => assert!(message.contains("login rejected")),
            other => panic!("unexpected outcome {:?}", other),
        }
        assert!(!temp_dir.path().join("store.json").exists());

        let status = coordinator.get_status();
        assert_eq!(status.state, RefreshState::Idle);
        assert_eq!(status.last_result, Some(LastResult::Failure));
        assert!(status.message.unwrap().starts_with("Upstream error"));
        assert!(!coordinator.is_running());
    }

    #[test]
    fn test_panic_is_reported_as_internal_failure() {
        let temp_dir = tempfile::tempdir().unwrap();
        let coordinator = RefreshCoordinator::new(
            PanickingSource,
            json_store(temp_dir.path()),
            BodyProfile::default(),
        );

        match coordinator.start_refresh() {
            RefreshOutcome::Failed(message) => assert!(message.starts_with("Internal error")),
            other => panic!("unexpected outcome {:?}", other),
        }
        let status = coordinator.get_status();
        assert_eq!(status.state, RefreshState::Idle);
        assert_eq!(status.last_result, Some(LastResult::Failure));
        assert!(!status.message.unwrap().contains("Upstream"));
        assert!(!coordinator.is_running());
    }

    #[test]
    fn test_status_state_follows_running_flag() {
        let temp_dir = tempfile::tempdir().unwrap();
        let coordinator = RefreshCoordinator::new(
            StaticSource(pages()),
            json_store(temp_dir.path()),
            BodyProfile::default(),
        );
        assert_eq!(coordinator.get_status().state, RefreshState::Idle);

        // Whenever a refresh would be rejected, status says running
        coordinator.state.store(RUNNING, Ordering::Release);
        assert_eq!(coordinator.get_status().state, RefreshState::Running);
        assert_eq!(coordinator.start_refresh(), RefreshOutcome::AlreadyRunning);

        coordinator.state.store(IDLE, Ordering::Release);
        assert!(matches!(coordinator.start_refresh(), RefreshOutcome::Completed(_)));
        assert_eq!(coordinator.get_status().state, RefreshState::Idle);
    }

    #[test]
    fn test_store_failure_reports_and_recovers() {
        let temp_dir = tempfile::tempdir().unwrap();
        let backend = FlakyBackend::new(&temp_dir.path().join("store.json"));
        let fail = backend.fail.clone();
        let coordinator = RefreshCoordinator::new(
            StaticSource(pages()),
            ReconciliationStore::with_backend(backend).unwrap(),
            BodyProfile::default(),
        );

        fail.store(true, Ordering::SeqCst);
        match coordinator.start_refresh() {
            RefreshOutcome::Failed(message) => assert!(message.starts_with("Store error")),
            other => panic!("unexpected outcome {:?}", other),
        }
        coordinator.with_store(|store| {
            assert!(store.calories().is_empty());
            assert!(store.mass_waist().is_empty());
        });

        // The flag was released, so the next pass runs
        fail.store(false, Ordering::SeqCst);
        assert!(matches!(coordinator.start_refresh(), RefreshOutcome::Completed(_)));
    }

    #[test]
    fn test_directory_source_reads_saved_pages() {
        let temp_dir = tempfile::tempdir().unwrap();
        std::fs::write(temp_dir.path().join(CALORIE_DIARY_FILE), DIARY).unwrap();
        std::fs::write(temp_dir.path().join(MASS_LOG_FILE), MASS).unwrap();

        let source = DirectoryPageSource::new(temp_dir.path());
        assert!(matches!(source.fetch(), Err(Error::Upstream(_))));

        std::fs::write(temp_dir.path().join(WAIST_LOG_FILE), WAIST).unwrap();
        let fetched = source.fetch().unwrap();
        assert_eq!(fetched, pages());
    }
}
