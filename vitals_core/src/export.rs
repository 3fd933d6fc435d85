//! CSV export of both store collections.

use crate::store::{ReconciliationStore, StoreBackend};
use crate::{DailyCalorieRecord, DatedRecord, MassWaistRecord, MealCategory, Result};
use std::fs::File;
use std::path::Path;

pub const CALORIES_CSV: &str = "daily_kcal.csv";
pub const MASS_WAIST_CSV: &str = "daily_mass_waist.csv";

const CALORIE_HEADERS: [&str; 8] = [
    "date",
    "breakfast",
    "lunch",
    "dinner",
    "snacks",
    "drinks",
    "exercise_kcal",
    "net_kcal",
];
const MASS_WAIST_HEADERS: [&str; 4] = ["date", "mass_kg", "waist_cm", "body_fat_pct"];

/// A row in the calorie CSV
#[derive(Debug, serde::Serialize)]
struct CalorieRow {
    date: String,
    breakfast: f64,
    lunch: f64,
    dinner: f64,
    snacks: f64,
    drinks: f64,
    exercise_kcal: f64,
    net_kcal: f64,
}

impl From<&DailyCalorieRecord> for CalorieRow {
    fn from(record: &DailyCalorieRecord) -> Self {
        CalorieRow {
            date: record.date().to_string(),
            breakfast: record.meal(MealCategory::Breakfast),
            lunch: record.meal(MealCategory::Lunch),
            dinner: record.meal(MealCategory::Dinner),
            snacks: record.meal(MealCategory::Snacks),
            drinks: record.meal(MealCategory::Drinks),
            exercise_kcal: record.exercise_kcal(),
            net_kcal: record.net_kcal(),
        }
    }
}

/// A row in the mass/waist CSV; absent values become empty cells
#[derive(Debug, serde::Serialize)]
struct MassWaistRow {
    date: String,
    mass_kg: Option<f64>,
    waist_cm: Option<f64>,
    body_fat_pct: Option<f64>,
}

impl From<&MassWaistRecord> for MassWaistRow {
    fn from(record: &MassWaistRecord) -> Self {
        MassWaistRow {
            date: record.date().to_string(),
            mass_kg: record.mass_kg(),
            waist_cm: record.waist_cm(),
            body_fat_pct: record.body_fat_pct(),
        }
    }
}

fn write_rows<T, R>(path: &Path, headers: &[&str], records: &[&T]) -> Result<usize>
where
    R: serde::Serialize,
    for<'a> R: From<&'a T>,
{
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let file = File::create(path)?;
    // Headers are written by hand so an empty collection still gets them
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(file);
    writer.write_record(headers)?;
    for record in records {
        writer.serialize(R::from(*record))?;
    }

    // Flush and sync to disk
    writer.flush()?;
    let file = writer
        .into_inner()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
    file.sync_all()?;

    tracing::info!("Wrote {} rows to {:?}", records.len(), path);
    Ok(records.len())
}

/// Write the calorie collection to `path`, one row per day
pub fn export_calories_csv<B: StoreBackend>(
    store: &ReconciliationStore<B>,
    path: &Path,
) -> Result<usize> {
    write_rows::<DailyCalorieRecord, CalorieRow>(path, &CALORIE_HEADERS, &store.calories().all())
}

/// Write the mass/waist collection to `path`, one row per day
pub fn export_mass_waist_csv<B: StoreBackend>(
    store: &ReconciliationStore<B>,
    path: &Path,
) -> Result<usize> {
    write_rows::<MassWaistRecord, MassWaistRow>(path, &MASS_WAIST_HEADERS, &store.mass_waist().all())
}
