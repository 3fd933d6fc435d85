//! Gap-resetting exponential moving average.
//!
//! Unlike a textbook EMA, a zero or missing value does not get bridged: the
//! output at that point is absent, the running average is dropped, and the
//! next real value restarts the average at that raw value.

use crate::{Error, Result, SeriesPoint};

/// EMA over a window of `N` points, `alpha = 2 / (N + 1)`
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GapResetEma {
    window: usize,
    alpha: f64,
}

impl GapResetEma {
    pub fn new(window: usize) -> Result<Self> {
        if window == 0 {
            return Err(Error::Config("EMA window must be at least 1".into()));
        }
        Ok(Self {
            window,
            alpha: 2.0 / (window as f64 + 1.0),
        })
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    /// Smooth a date-ordered series; one output point per input point
    pub fn smooth(&self, points: &[SeriesPoint]) -> Vec<SeriesPoint> {
        let values: Vec<Option<f64>> = points.iter().map(|p| p.value).collect();
        points
            .iter()
            .zip(self.smooth_values(&values))
            .map(|(point, value)| SeriesPoint::new(point.date, value))
            .collect()
    }

    /// Same as [`smooth`](Self::smooth) over bare values
    ///
    /// Non-finite values count as absent.
    pub fn smooth_values(&self, values: &[Option<f64>]) -> Vec<Option<f64>> {
        let mut prev_ema: Option<f64> = None;

        values
            .iter()
            .map(|value| {
                let value = value.filter(|v| v.is_finite() && *v != 0.0);
                prev_ema = match (value, prev_ema) {
                    (None, _) => None,
                    (Some(v), None) => Some(v),
                    (Some(v), Some(prev)) => Some(self.alpha * v + (1.0 - self.alpha) * prev),
                };
                prev_ema
            })
            .collect()
    }
}
