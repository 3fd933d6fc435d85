//! Derived metrics: net calories and the waist-based body-fat estimate.
//!
//! Derived fields are only ever produced here. Record constructors call into
//! this module so a record can never carry a derived value that disagrees
//! with its inputs.

use crate::{DailyCalorieRecord, Error, MassWaistRecord, MealCategory, Result};
use chrono::NaiveDate;
use std::collections::BTreeMap;

/// Neck circumference used by the body-fat estimate (cm)
pub const NECK_CM: f64 = 41.5;

/// Standing height used by the body-fat estimate (cm)
pub const HEIGHT_CM: f64 = 178.0;

/// The fixed body measurements the body-fat formula depends on
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BodyProfile {
    pub neck_cm: f64,
    pub height_cm: f64,
}

impl Default for BodyProfile {
    fn default() -> Self {
        Self {
            neck_cm: NECK_CM,
            height_cm: HEIGHT_CM,
        }
    }
}

/// Net calories for a day. Negative values are valid.
pub fn net_kcal(meal_categories: &BTreeMap<MealCategory, f64>, exercise_kcal: f64) -> f64 {
    meal_categories.values().sum::<f64>() - exercise_kcal
}

/// Body-fat percentage from waist circumference
///
/// `86.010 * log10(waist - neck) - 70.041 * log10(height) + 36.76`
///
/// Fails with [`Error::Derivation`] when a logarithm argument is not positive
/// or the result is not finite.
pub fn body_fat_estimate(waist_cm: f64, profile: &BodyProfile) -> Result<f64> {
    let girth = waist_cm - profile.neck_cm;
    if !(girth > 0.0) {
        return Err(Error::Derivation(format!(
            "waist {} cm does not exceed neck {} cm",
            waist_cm, profile.neck_cm
        )));
    }
    if !(profile.height_cm > 0.0) {
        return Err(Error::Derivation(format!(
            "height {} cm is not positive",
            profile.height_cm
        )));
    }

    let pct = 86.010 * girth.log10() - 70.041 * profile.height_cm.log10() + 36.76;
    if !pct.is_finite() {
        return Err(Error::Derivation(format!(
            "non-finite body fat for waist {} cm",
            waist_cm
        )));
    }
    Ok(pct)
}

/// Body-fat field for a record: present only when the estimate succeeds
pub fn body_fat_field(waist_cm: Option<f64>, profile: &BodyProfile) -> Option<f64> {
    let waist = waist_cm?;
    match body_fat_estimate(waist, profile) {
        Ok(pct) => Some(pct),
        Err(e) => {
            tracing::debug!("Body fat left absent: {}", e);
            None
        }
    }
}

impl DailyCalorieRecord {
    /// Build a calorie record; every category is present and `net_kcal` is computed
    pub fn new(
        date: NaiveDate,
        meal_categories: BTreeMap<MealCategory, f64>,
        exercise_kcal: f64,
    ) -> Self {
        let mut meals = meal_categories;
        for category in MealCategory::ALL {
            meals.entry(category).or_insert(0.0);
        }
        let net_kcal = net_kcal(&meals, exercise_kcal);

        Self {
            date,
            meal_categories: meals,
            exercise_kcal,
            net_kcal,
        }
    }
}

impl MassWaistRecord {
    /// Build a measurement record, deriving `body_fat_pct` from `waist_cm`
    pub fn new(
        date: NaiveDate,
        mass_kg: Option<f64>,
        waist_cm: Option<f64>,
        profile: &BodyProfile,
    ) -> Self {
        Self {
            date,
            mass_kg,
            waist_cm,
            body_fat_pct: body_fat_field(waist_cm, profile),
        }
    }
}
