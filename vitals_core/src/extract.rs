//! Record extraction: raw row fragments into typed daily records.
//!
//! Failures are row-scoped. A row with a malformed date or value is logged,
//! counted and skipped; the rest of the batch is still extracted.

use crate::derive::BodyProfile;
use crate::{DailyCalorieRecord, Error, MassWaistRecord, MealCategory, RawRow, Result};
use chrono::NaiveDate;
use std::collections::BTreeMap;

/// Source date format, e.g. "Monday 01 January 2024"
///
/// Chrono accepts full or abbreviated names for `%A` and `%B`, so the
/// "Mon 01 Jan 2024" spelling of the measurement logs parses too.
pub const SOURCE_DATE_FORMAT: &str = "%A %d %B %Y";

/// Field label for exercise kcal on calorie rows
pub const EXERCISE_FIELD: &str = "Exercise";

/// Field label for body mass on mass log rows
pub const MASS_FIELD: &str = "Mass";

/// Field label for waist circumference on waist log rows
pub const WAIST_FIELD: &str = "Waist";

/// Records extracted from one batch plus the number of rows skipped
#[derive(Clone, Debug, PartialEq)]
pub struct Extraction<T> {
    pub records: Vec<T>,
    pub skipped: usize,
}

impl<T> Default for Extraction<T> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            skipped: 0,
        }
    }
}

/// Parse a source date into a calendar date
pub fn parse_source_date(text: &str) -> Result<NaiveDate> {
    let normalized = text.split_whitespace().collect::<Vec<_>>().join(" ");
    NaiveDate::parse_from_str(&normalized, SOURCE_DATE_FORMAT)
        .map_err(|e| Error::Parse(format!("invalid date '{}': {}", text, e)))
}

/// Parse a numeric cell, dropping a trailing unit and thousands separators
fn parse_amount(label: &str, text: &str, unit: Option<&str>) -> Result<f64> {
    let mut cleaned = text.trim();
    if let Some(unit) = unit {
        let cut = cleaned.len().saturating_sub(unit.len());
        if cleaned.is_char_boundary(cut) && cleaned[cut..].eq_ignore_ascii_case(unit) {
            cleaned = cleaned[..cut].trim_end();
        }
    }
    let cleaned = cleaned.replace(',', "");

    let value: f64 = cleaned
        .parse()
        .map_err(|_| Error::Parse(format!("invalid {} value '{}'", label, text)))?;
    if !value.is_finite() {
        return Err(Error::Parse(format!("non-finite {} value '{}'", label, text)));
    }
    Ok(value)
}

fn calorie_record(row: &RawRow) -> Result<DailyCalorieRecord> {
    let date = parse_source_date(&row.date_text)?;
    let mut meals = BTreeMap::new();
    let mut exercise = 0.0;

    for (label, text) in &row.fields {
        if label.eq_ignore_ascii_case(EXERCISE_FIELD) {
            exercise = parse_amount(label, text, Some("kcal"))?;
            if exercise < 0.0 {
                return Err(Error::Parse(format!("negative exercise '{}'", text)));
            }
        } else if let Some(category) = MealCategory::from_label(label) {
            let kcal = parse_amount(label, text, Some("kcal"))?;
            if kcal < 0.0 {
                return Err(Error::Parse(format!("negative {} '{}'", label, text)));
            }
            meals.insert(category, kcal);
        } else {
            tracing::debug!("Ignoring unknown diary field '{}' on {}", label, date);
        }
    }

    Ok(DailyCalorieRecord::new(date, meals, exercise))
}

/// Extract calorie records from diary rows
///
/// Missing categories and missing exercise count as zero. When a date occurs
/// more than once, the later row wins. Records come out in date order.
pub fn extract_calorie_records(rows: &[RawRow]) -> Extraction<DailyCalorieRecord> {
    let mut by_date = BTreeMap::new();
    let mut skipped = 0;

    for (idx, row) in rows.iter().enumerate() {
        match calorie_record(row) {
            Ok(record) => {
                by_date.insert(record.date, record);
            }
            Err(e) => {
                tracing::warn!("Skipping diary row {}: {}", idx + 1, e);
                skipped += 1;
            }
        }
    }

    Extraction {
        records: by_date.into_values().collect(),
        skipped,
    }
}

fn measurement(row: &RawRow, label: &str, unit: &str) -> Result<(NaiveDate, f64)> {
    let date = parse_source_date(&row.date_text)?;
    let text = row
        .field(label)
        .ok_or_else(|| Error::Parse(format!("missing {} field", label)))?;
    let value = parse_amount(label, text, Some(unit))?;
    if value <= 0.0 {
        return Err(Error::Parse(format!("non-positive {} '{}'", label, text)));
    }
    Ok((date, value))
}

/// Extract mass/waist records from the two measurement logs, merged by date
///
/// A date present in only one log gets the other field absent. The body-fat
/// estimate is derived for every record with a waist value.
pub fn extract_mass_waist_records(
    mass_rows: &[RawRow],
    waist_rows: &[RawRow],
    profile: &BodyProfile,
) -> Extraction<MassWaistRecord> {
    let mut merged: BTreeMap<NaiveDate, (Option<f64>, Option<f64>)> = BTreeMap::new();
    let mut skipped = 0;

    for (idx, row) in mass_rows.iter().enumerate() {
        match measurement(row, MASS_FIELD, "kg") {
            Ok((date, kg)) => merged.entry(date).or_default().0 = Some(kg),
            Err(e) => {
                tracing::warn!("Skipping mass row {}: {}", idx + 1, e);
                skipped += 1;
            }
        }
    }

    for (idx, row) in waist_rows.iter().enumerate() {
        match measurement(row, WAIST_FIELD, "cm") {
            Ok((date, cm)) => merged.entry(date).or_default().1 = Some(cm),
            Err(e) => {
                tracing::warn!("Skipping waist row {}: {}", idx + 1, e);
                skipped += 1;
            }
        }
    }

    let records = merged
        .into_iter()
        .map(|(date, (mass, waist))| MassWaistRecord::new(date, mass, waist, profile))
        .collect();

    Extraction { records, skipped }
}
