//! Core domain types for the vitals system.
//!
//! This module defines the fundamental types used throughout the system:
//! - Raw row fragments as supplied by the page scanner
//! - Daily calorie and mass/waist records
//! - Chart series points

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// Raw Input Types
// ============================================================================

/// One row fragment from a source page: a date text plus labeled field texts
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RawRow {
    pub date_text: String,
    pub fields: Vec<(String, String)>,
}

impl RawRow {
    pub fn new(date_text: impl Into<String>) -> Self {
        Self {
            date_text: date_text.into(),
            fields: Vec::new(),
        }
    }

    /// Builder-style field append
    pub fn with_field(mut self, label: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((label.into(), value.into()));
        self
    }

    /// Look up a field by label, ignoring ASCII case. The last occurrence wins.
    pub fn field(&self, label: &str) -> Option<&str> {
        self.fields
            .iter()
            .rev()
            .find(|(l, _)| l.eq_ignore_ascii_case(label))
            .map(|(_, v)| v.as_str())
    }
}

// ============================================================================
// Record Types
// ============================================================================

/// Meal occasion as labeled in the calorie diary
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MealCategory {
    Breakfast,
    Lunch,
    Dinner,
    Snacks,
    Drinks,
}

impl MealCategory {
    pub const ALL: [MealCategory; 5] = [
        MealCategory::Breakfast,
        MealCategory::Lunch,
        MealCategory::Dinner,
        MealCategory::Snacks,
        MealCategory::Drinks,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            MealCategory::Breakfast => "Breakfast",
            MealCategory::Lunch => "Lunch",
            MealCategory::Dinner => "Dinner",
            MealCategory::Snacks => "Snacks",
            MealCategory::Drinks => "Drinks",
        }
    }

    /// Parse a diary label ("Breakfast", "snacks", ...)
    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|c| c.name().eq_ignore_ascii_case(label.trim()))
    }
}

/// Records stored in the reconciliation store are keyed by calendar date
pub trait DatedRecord {
    fn date(&self) -> NaiveDate;
}

/// One day of calorie intake and exercise
///
/// `net_kcal` is derived; construct through [`DailyCalorieRecord::new`].
/// Deserialization recomputes it from the stored inputs.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(from = "CalorieRecordRepr")]
pub struct DailyCalorieRecord {
    pub(crate) date: NaiveDate,
    pub(crate) meal_categories: BTreeMap<MealCategory, f64>,
    pub(crate) exercise_kcal: f64,
    pub(crate) net_kcal: f64,
}

impl DailyCalorieRecord {
    pub fn meal_categories(&self) -> &BTreeMap<MealCategory, f64> {
        &self.meal_categories
    }

    pub fn meal(&self, category: MealCategory) -> f64 {
        self.meal_categories.get(&category).copied().unwrap_or(0.0)
    }

    pub fn exercise_kcal(&self) -> f64 {
        self.exercise_kcal
    }

    pub fn net_kcal(&self) -> f64 {
        self.net_kcal
    }

    /// Total intake before exercise
    pub fn intake_kcal(&self) -> f64 {
        self.meal_categories.values().sum()
    }
}

impl DatedRecord for DailyCalorieRecord {
    fn date(&self) -> NaiveDate {
        self.date
    }
}

/// On-disk shape of a calorie record. `net_kcal` is accepted and discarded.
#[derive(Deserialize)]
struct CalorieRecordRepr {
    date: NaiveDate,
    #[serde(default)]
    meal_categories: BTreeMap<MealCategory, f64>,
    #[serde(default)]
    exercise_kcal: f64,
    #[serde(default, rename = "net_kcal")]
    _net_kcal: Option<f64>,
}

impl From<CalorieRecordRepr> for DailyCalorieRecord {
    fn from(repr: CalorieRecordRepr) -> Self {
        DailyCalorieRecord::new(repr.date, repr.meal_categories, repr.exercise_kcal)
    }
}

/// One day of body measurements
///
/// `body_fat_pct` is derived from `waist_cm`; construct through
/// [`MassWaistRecord::new`]. Deserialization re-derives it with the default
/// [`BodyProfile`](crate::derive::BodyProfile); the store re-derives again
/// with the configured one.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(from = "MassWaistRecordRepr")]
pub struct MassWaistRecord {
    pub(crate) date: NaiveDate,
    pub(crate) mass_kg: Option<f64>,
    pub(crate) waist_cm: Option<f64>,
    pub(crate) body_fat_pct: Option<f64>,
}

impl MassWaistRecord {
    pub fn mass_kg(&self) -> Option<f64> {
        self.mass_kg
    }

    pub fn waist_cm(&self) -> Option<f64> {
        self.waist_cm
    }

    pub fn body_fat_pct(&self) -> Option<f64> {
        self.body_fat_pct
    }
}

impl DatedRecord for MassWaistRecord {
    fn date(&self) -> NaiveDate {
        self.date
    }
}

/// On-disk shape of a measurement record. `body_fat_pct` is discarded.
#[derive(Deserialize)]
struct MassWaistRecordRepr {
    date: NaiveDate,
    #[serde(default)]
    mass_kg: Option<f64>,
    #[serde(default)]
    waist_cm: Option<f64>,
    #[serde(default, rename = "body_fat_pct")]
    _body_fat_pct: Option<f64>,
}

impl From<MassWaistRecordRepr> for MassWaistRecord {
    fn from(repr: MassWaistRecordRepr) -> Self {
        MassWaistRecord::new(
            repr.date,
            repr.mass_kg,
            repr.waist_cm,
            &crate::derive::BodyProfile::default(),
        )
    }
}

// ============================================================================
// Series Types
// ============================================================================

/// A dated value for charting; `None` marks a gap
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct SeriesPoint {
    pub date: NaiveDate,
    pub value: Option<f64>,
}

impl SeriesPoint {
    pub fn new(date: NaiveDate, value: Option<f64>) -> Self {
        Self { date, value }
    }
}
