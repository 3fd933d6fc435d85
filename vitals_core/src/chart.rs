//! Chart data assembly: raw, smoothed, trend and goal series per metric.
//!
//! Assembly is a pure read of the store. The payload is renderer-agnostic:
//! named series of `(date, value)` points plus a little scalar metadata.

use crate::config::ChartConfig;
use crate::smooth::GapResetEma;
use crate::store::{ReconciliationStore, StoreBackend};
use crate::{DailyCalorieRecord, DatedRecord, MassWaistRecord, MealCategory, Result, SeriesPoint};
use chrono::{Days, Duration, NaiveDate};
use serde::Serialize;

/// Slopes smaller than this (units per day) are treated as flat
pub const FLAT_SLOPE_PER_DAY: f64 = 1e-9;

/// Upper bound on projected trend length and crossing distance
const MAX_PROJECTION_DAYS: i64 = 36_600;

/// Metrics that get a full chart treatment
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    NetKcal,
    MassKg,
    BodyFatPct,
}

impl MetricKind {
    pub fn label(&self) -> &'static str {
        match self {
            MetricKind::NetKcal => "Net kcal",
            MetricKind::MassKg => "Mass (kg)",
            MetricKind::BodyFatPct => "Body fat (%)",
        }
    }
}

/// A named, date-ordered series
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Series {
    pub name: String,
    pub points: Vec<SeriesPoint>,
}

impl Series {
    pub fn new(name: impl Into<String>, points: Vec<SeriesPoint>) -> Self {
        Self {
            name: name.into(),
            points,
        }
    }
}

/// Ordinary least squares line, x measured in days since `origin`
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct LinearTrend {
    pub origin: NaiveDate,
    pub slope_per_day: f64,
    pub intercept: f64,
}

impl LinearTrend {
    /// Fit a line; `None` with fewer than two distinct dates
    pub fn fit(points: &[(NaiveDate, f64)]) -> Option<Self> {
        let origin = points.iter().map(|(d, _)| *d).min()?;
        let n = points.len() as f64;
        if points.len() < 2 {
            return None;
        }

        let xs: Vec<f64> = points
            .iter()
            .map(|(d, _)| (*d - origin).num_days() as f64)
            .collect();
        let mean_x = xs.iter().sum::<f64>() / n;
        let mean_y = points.iter().map(|(_, y)| y).sum::<f64>() / n;

        let sxx: f64 = xs.iter().map(|x| (x - mean_x).powi(2)).sum();
        let sxy: f64 = xs
            .iter()
            .zip(points.iter())
            .map(|(x, (_, y))| (x - mean_x) * (y - mean_y))
            .sum();

        if sxx <= 0.0 {
            return None;
        }
        let slope = sxy / sxx;
        let intercept = mean_y - slope * mean_x;
        if !slope.is_finite() || !intercept.is_finite() {
            return None;
        }

        Some(Self {
            origin,
            slope_per_day: slope,
            intercept,
        })
    }

    pub fn value_at(&self, date: NaiveDate) -> f64 {
        let x = (date - self.origin).num_days() as f64;
        self.intercept + self.slope_per_day * x
    }

    /// First whole day on or after `from` at which the line reaches `target`
    ///
    /// `None` when the line is flat, or already at or past `target` at `from`
    /// and moving away.
    pub fn crossing_date(&self, target: f64, from: NaiveDate) -> Option<NaiveDate> {
        if self.slope_per_day.abs() < FLAT_SLOPE_PER_DAY {
            return None;
        }
        let x_cross = (target - self.intercept) / self.slope_per_day;
        let x_from = (from - self.origin).num_days() as f64;
        if !x_cross.is_finite() || x_cross <= x_from {
            return None;
        }
        if x_cross - x_from > MAX_PROJECTION_DAYS as f64 {
            return None;
        }
        self.origin
            .checked_add_signed(Duration::days(x_cross.ceil() as i64))
    }
}

/// Everything the renderer needs for one metric
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MetricChart {
    pub metric: MetricKind,
    pub raw: Series,
    pub smoothed: Series,
    pub trend: Option<Series>,
    pub goal: Option<Series>,
    pub goal_value: Option<f64>,
    pub trend_fit: Option<LinearTrend>,
    pub projected_crossing: Option<NaiveDate>,
}

/// A stacked bar segment: the bar spans `base..base + value`
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct StackedPoint {
    pub date: NaiveDate,
    pub value: f64,
    pub base: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StackedSeries {
    pub name: String,
    pub points: Vec<StackedPoint>,
}

/// Per-meal stacked bars; the stack for a day starts at `-exercise`
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CalorieBreakdown {
    pub categories: Vec<StackedSeries>,
    pub exercise: Series,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ChartPayload {
    pub net_kcal: MetricChart,
    pub mass_kg: MetricChart,
    pub body_fat_pct: MetricChart,
    pub calorie_breakdown: CalorieBreakdown,
}

/// Builds [`ChartPayload`]s from the store
#[derive(Clone, Debug)]
pub struct ChartAssembler {
    ema: GapResetEma,
    trend_window: usize,
    projection_end: NaiveDate,
    net_kcal_goal: Option<f64>,
    mass_goal_kg: Option<f64>,
    body_fat_goal_pct: Option<f64>,
}

impl ChartAssembler {
    pub fn from_config(config: &ChartConfig) -> Result<Self> {
        if config.trend_window < 2 {
            return Err(crate::Error::Config(
                "trend window must be at least 2".into(),
            ));
        }
        Ok(Self {
            ema: GapResetEma::new(config.ema_window)?,
            trend_window: config.trend_window,
            projection_end: config.projection_end,
            net_kcal_goal: config.net_kcal_goal,
            mass_goal_kg: config.mass_goal_kg,
            body_fat_goal_pct: config.body_fat_goal_pct,
        })
    }

    /// Assemble all charts, optionally limited to `[from, to]`
    pub fn assemble<B: StoreBackend>(
        &self,
        store: &ReconciliationStore<B>,
        range: Option<(NaiveDate, NaiveDate)>,
    ) -> ChartPayload {
        let (calories, measurements) = match range {
            Some((from, to)) => (
                store.calories().query(from, to),
                store.mass_waist().query(from, to),
            ),
            None => (store.calories().all(), store.mass_waist().all()),
        };

        let net = points(&calories, |r: &DailyCalorieRecord| Some(r.net_kcal()));
        let mass = points(&measurements, |r: &MassWaistRecord| r.mass_kg());
        let fat = points(&measurements, |r: &MassWaistRecord| r.body_fat_pct());

        tracing::debug!(
            "Assembling charts from {} calorie and {} measurement days",
            calories.len(),
            measurements.len()
        );

        ChartPayload {
            net_kcal: self.metric_chart(MetricKind::NetKcal, net, self.net_kcal_goal),
            mass_kg: self.metric_chart(MetricKind::MassKg, mass, self.mass_goal_kg),
            body_fat_pct: self.metric_chart(MetricKind::BodyFatPct, fat, self.body_fat_goal_pct),
            calorie_breakdown: calorie_breakdown(&calories),
        }
    }

    /// Chart for one metric from its raw points
    pub fn metric_chart(
        &self,
        metric: MetricKind,
        raw: Vec<SeriesPoint>,
        goal_value: Option<f64>,
    ) -> MetricChart {
        let smoothed = self.ema.smooth(&raw);

        // Zero counts as a gap for the trend, as it does for the EMA
        let present: Vec<(NaiveDate, f64)> = raw
            .iter()
            .filter_map(|p| {
                p.value
                    .filter(|v| v.is_finite() && *v != 0.0)
                    .map(|v| (p.date, v))
            })
            .collect();
        let window_start = present.len().saturating_sub(self.trend_window);
        let window = &present[window_start..];

        let trend_fit = LinearTrend::fit(window);
        let last_date = raw.last().map(|p| p.date);

        let trend = trend_fit.and_then(|fit| {
            let start = window.first()?.0;
            let end = self.projection_end.max(last_date?);
            Some(Series::new(
                format!("{} trend", metric.label()),
                trend_points(&fit, start, end),
            ))
        });

        let goal = match (goal_value, raw.first(), last_date) {
            (Some(value), Some(first), Some(last)) => {
                let end = self.projection_end.max(last);
                Some(Series::new(
                    format!("{} goal", metric.label()),
                    vec![
                        SeriesPoint::new(first.date, Some(value)),
                        SeriesPoint::new(end, Some(value)),
                    ],
                ))
            }
            _ => None,
        };

        let projected_crossing = match (trend_fit, goal_value, window.last()) {
            (Some(fit), Some(target), Some((last, _))) => fit.crossing_date(target, *last),
            _ => None,
        };

        MetricChart {
            metric,
            raw: Series::new(metric.label(), raw),
            smoothed: Series::new(
                format!("{}-point EMA", self.ema.window()),
                smoothed,
            ),
            trend,
            goal,
            goal_value,
            trend_fit,
            projected_crossing,
        }
    }
}

fn points<R, F>(records: &[&R], value: F) -> Vec<SeriesPoint>
where
    R: DatedRecord,
    F: Fn(&R) -> Option<f64>,
{
    records
        .iter()
        .map(|r| SeriesPoint::new(r.date(), value(*r)))
        .collect()
}

fn trend_points(fit: &LinearTrend, start: NaiveDate, end: NaiveDate) -> Vec<SeriesPoint> {
    let days = (end - start).num_days().clamp(0, MAX_PROJECTION_DAYS) as u64;
    (0..=days)
        .filter_map(|offset| start.checked_add_days(Days::new(offset)))
        .map(|date| SeriesPoint::new(date, Some(fit.value_at(date))))
        .collect()
}

/// Stacked per-meal bars for the calorie chart
pub fn calorie_breakdown(records: &[&DailyCalorieRecord]) -> CalorieBreakdown {
    let mut categories: Vec<StackedSeries> = MealCategory::ALL
        .iter()
        .map(|c| StackedSeries {
            name: c.name().to_string(),
            points: Vec::with_capacity(records.len()),
        })
        .collect();
    let mut exercise = Vec::with_capacity(records.len());

    for record in records {
        let mut base = -record.exercise_kcal();
        for (series, category) in categories.iter_mut().zip(MealCategory::ALL) {
            let value = record.meal(category);
            series.points.push(StackedPoint {
                date: record.date(),
                value,
                base,
            });
            base += value;
        }
        exercise.push(SeriesPoint::new(record.date(), Some(-record.exercise_kcal())));
    }

    CalorieBreakdown {
        categories,
        exercise: Series::new("Exercise", exercise),
    }
}
