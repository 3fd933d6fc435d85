//! Reconciliation store: two date-keyed collections with upsert semantics.
//!
//! The whole store is one JSON document. A batch of upserts is staged on a
//! copy of the document, written with a single atomic replace, and only then
//! swapped in, so a failed write leaves both the file and the in-memory view
//! exactly as they were.

use crate::derive::BodyProfile;
use crate::{DailyCalorieRecord, DatedRecord, Error, MassWaistRecord, Result};
use chrono::NaiveDate;
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// The two collections held by the store
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CollectionKind {
    DailyKcal,
    DailyMassWaist,
}

impl CollectionKind {
    pub fn name(&self) -> &'static str {
        match self {
            CollectionKind::DailyKcal => "daily_kcal",
            CollectionKind::DailyMassWaist => "daily_mass_waist",
        }
    }
}

/// What an upsert did to its collection
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Replaced,
    Unchanged,
}

/// Records keyed by date; iteration is always in ascending date order
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct RecordCollection<R> {
    records: BTreeMap<NaiveDate, R>,
}

impl<R> Default for RecordCollection<R> {
    fn default() -> Self {
        Self {
            records: BTreeMap::new(),
        }
    }
}

impl<R: DatedRecord + Clone + PartialEq> RecordCollection<R> {
    /// Insert or wholesale-replace the record under its date
    pub fn upsert(&mut self, record: R) -> UpsertOutcome {
        let date = record.date();
        match self.records.get(&date) {
            Some(existing) if *existing == record => UpsertOutcome::Unchanged,
            Some(_) => {
                self.records.insert(date, record);
                UpsertOutcome::Replaced
            }
            None => {
                self.records.insert(date, record);
                UpsertOutcome::Inserted
            }
        }
    }

    pub fn get(&self, date: NaiveDate) -> Option<&R> {
        self.records.get(&date)
    }

    /// Records with `start <= date <= end`, ascending. Empty if `start > end`.
    pub fn query(&self, start: NaiveDate, end: NaiveDate) -> Vec<&R> {
        if start > end {
            return Vec::new();
        }
        self.records.range(start..=end).map(|(_, r)| r).collect()
    }

    /// Every record, ascending
    pub fn all(&self) -> Vec<&R> {
        self.records.values().collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Re-key by each record's own date. Keys on disk may be hand-edited.
    fn rekeyed(self, kind: CollectionKind) -> Self {
        let mut records = BTreeMap::new();
        for (key, record) in self.records {
            if key != record.date() {
                tracing::warn!(
                    "{}: record keyed {} carries date {}, re-keying",
                    kind.name(),
                    key,
                    record.date()
                );
            }
            records.insert(record.date(), record);
        }
        Self { records }
    }
}

impl RecordCollection<MassWaistRecord> {
    /// Recompute every body-fat estimate with `profile`
    fn rederived(self, profile: &BodyProfile) -> Self {
        let mut records = BTreeMap::new();
        for (date, record) in self.records {
            let fresh = MassWaistRecord::new(date, record.mass_kg, record.waist_cm, profile);
            if fresh.body_fat_pct != record.body_fat_pct {
                tracing::debug!("daily_mass_waist: re-derived body fat for {}", date);
            }
            records.insert(date, fresh);
        }
        Self { records }
    }
}

/// The persisted document
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct StoreDocument {
    #[serde(default)]
    pub daily_kcal: RecordCollection<DailyCalorieRecord>,

    #[serde(default)]
    pub daily_mass_waist: RecordCollection<MassWaistRecord>,
}

/// Upserts applied together by [`ReconciliationStore::apply_batch`]
#[derive(Clone, Debug, Default)]
pub struct IngestBatch {
    pub calories: Vec<DailyCalorieRecord>,
    pub mass_waist: Vec<MassWaistRecord>,
}

impl IngestBatch {
    pub fn is_empty(&self) -> bool {
        self.calories.is_empty() && self.mass_waist.is_empty()
    }
}

/// Counts for one applied batch
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub inserted: usize,
    pub replaced: usize,
    pub unchanged: usize,
    /// False when nothing changed and the write was skipped
    pub written: bool,
}

impl BatchSummary {
    fn record(&mut self, outcome: UpsertOutcome) {
        match outcome {
            UpsertOutcome::Inserted => self.inserted += 1,
            UpsertOutcome::Replaced => self.replaced += 1,
            UpsertOutcome::Unchanged => self.unchanged += 1,
        }
    }

    fn changed(&self) -> bool {
        self.inserted + self.replaced > 0
    }
}

/// Persistence seam for the store document
pub trait StoreBackend {
    /// Load the document, `None` if nothing has been persisted yet
    fn load(&self) -> Result<Option<StoreDocument>>;

    /// Replace the persisted document atomically
    fn persist(&mut self, document: &StoreDocument) -> Result<()>;
}

/// Pretty-printed JSON file, replaced via temp file + rename
pub struct JsonFileBackend {
    path: PathBuf,
}

impl JsonFileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn parent_dir(&self) -> PathBuf {
        match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }
}

impl StoreBackend for JsonFileBackend {
    fn load(&self) -> Result<Option<StoreDocument>> {
        if !self.path.exists() {
            tracing::info!("No store file at {:?}, starting empty", self.path);
            return Ok(None);
        }

        let file = File::open(&self.path)?;
        // Acquire shared lock for reading
        file.lock_shared()?;

        let mut contents = String::new();
        let read = std::io::BufReader::new(&file).read_to_string(&mut contents);
        file.unlock()?;
        read?;

        if contents.trim().is_empty() {
            tracing::warn!("Store file {:?} is empty, starting empty", self.path);
            return Ok(None);
        }

        let document: StoreDocument = serde_json::from_str(&contents).map_err(|e| {
            Error::Store(format!("corrupt store file {:?}: {}", self.path, e))
        })?;
        tracing::debug!("Loaded store from {:?}", self.path);
        Ok(Some(document))
    }

    fn persist(&mut self, document: &StoreDocument) -> Result<()> {
        let parent = self.parent_dir();
        std::fs::create_dir_all(&parent)?;

        // Temp file in the same directory so the rename is atomic
        let temp = NamedTempFile::new_in(&parent)?;
        temp.as_file().lock_exclusive()?;

        {
            let mut writer = std::io::BufWriter::new(temp.as_file());
            let contents = serde_json::to_string_pretty(document)?;
            writer.write_all(contents.as_bytes())?;
            writer.write_all(b"\n")?;
            writer.flush()?;
        }

        temp.as_file().sync_all()?;
        temp.as_file().unlock()?;

        // Atomically replace old store file
        temp.persist(&self.path).map_err(|e| Error::Io(e.error))?;

        tracing::debug!("Persisted store to {:?}", self.path);
        Ok(())
    }
}

fn store_error(e: Error) -> Error {
    match e {
        Error::Store(_) => e,
        other => Error::Store(other.to_string()),
    }
}

/// Owner of the persisted health records
///
/// Single writer: callers serialize access (see `RefreshCoordinator`).
pub struct ReconciliationStore<B: StoreBackend = JsonFileBackend> {
    backend: B,
    document: StoreDocument,
}

impl ReconciliationStore<JsonFileBackend> {
    /// Open (or start) the JSON store at `path`
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        Self::with_backend(JsonFileBackend::new(path))
    }

    /// Like [`open`](Self::open), deriving body fat with `profile`
    pub fn open_with_profile(path: impl Into<PathBuf>, profile: &BodyProfile) -> Result<Self> {
        Self::with_backend_and_profile(JsonFileBackend::new(path), profile)
    }
}

impl<B: StoreBackend> ReconciliationStore<B> {
    pub fn with_backend(backend: B) -> Result<Self> {
        Self::with_backend_and_profile(backend, &BodyProfile::default())
    }

    /// Load through `backend`; derived fields are recomputed, never trusted
    pub fn with_backend_and_profile(backend: B, profile: &BodyProfile) -> Result<Self> {
        let document = backend.load().map_err(store_error)?.unwrap_or_default();
        let document = StoreDocument {
            daily_kcal: document.daily_kcal.rekeyed(CollectionKind::DailyKcal),
            daily_mass_waist: document
                .daily_mass_waist
                .rekeyed(CollectionKind::DailyMassWaist)
                .rederived(profile),
        };

        tracing::info!(
            "Store opened: {} calorie days, {} measurement days",
            document.daily_kcal.len(),
            document.daily_mass_waist.len()
        );
        Ok(Self { backend, document })
    }

    pub fn calories(&self) -> &RecordCollection<DailyCalorieRecord> {
        &self.document.daily_kcal
    }

    pub fn mass_waist(&self) -> &RecordCollection<MassWaistRecord> {
        &self.document.daily_mass_waist
    }

    pub fn document(&self) -> &StoreDocument {
        &self.document
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Upsert one calorie record and persist
    pub fn upsert_calorie(&mut self, record: DailyCalorieRecord) -> Result<UpsertOutcome> {
        let mut staged = self.document.clone();
        let outcome = staged.daily_kcal.upsert(record);
        self.commit(staged, outcome != UpsertOutcome::Unchanged)?;
        Ok(outcome)
    }

    /// Upsert one mass/waist record and persist
    pub fn upsert_mass_waist(&mut self, record: MassWaistRecord) -> Result<UpsertOutcome> {
        let mut staged = self.document.clone();
        let outcome = staged.daily_mass_waist.upsert(record);
        self.commit(staged, outcome != UpsertOutcome::Unchanged)?;
        Ok(outcome)
    }

    /// Apply every upsert in `batch`, all or nothing
    ///
    /// On error the store (file and memory) is unchanged. A batch that
    /// changes nothing is not written.
    pub fn apply_batch(&mut self, batch: IngestBatch) -> Result<BatchSummary> {
        let mut staged = self.document.clone();
        let mut summary = BatchSummary::default();

        for record in batch.calories {
            summary.record(staged.daily_kcal.upsert(record));
        }
        for record in batch.mass_waist {
            summary.record(staged.daily_mass_waist.upsert(record));
        }

        summary.written = summary.changed();
        self.commit(staged, summary.written)?;

        tracing::info!(
            "Batch applied: {} inserted, {} replaced, {} unchanged",
            summary.inserted,
            summary.replaced,
            summary.unchanged
        );
        Ok(summary)
    }

    fn commit(&mut self, staged: StoreDocument, changed: bool) -> Result<()> {
        if !changed {
            tracing::debug!("No changes, skipping store write");
            return Ok(());
        }
        self.backend.persist(&staged).map_err(store_error)?;
        self.document = staged;
        Ok(())
    }
}
