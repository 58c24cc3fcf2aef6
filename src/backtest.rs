//! Forecast-versus-actual comparison over a fixed window.

use crate::config::DateRange;
use crate::series::{DailySeries, ForecastSet};
use log::{info, warn};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestResult {
    pub model: String,
    pub window: DateRange,
    pub forecast_days: usize,
    pub forecast_sum: f64,
    pub actual_sum: f64,
    pub abs_error: f64,
    /// `abs_error / |actual_sum|` as a fraction. `None` when the actual sum is zero.
    pub pct_error: Option<f64>,
}

/// Compare each forecast's total over `window` with the observed total.
/// Forecasts with no dates inside the window are skipped.
pub fn evaluate(forecasts: &ForecastSet, actual: &DailySeries, window: DateRange) -> Vec<BacktestResult> {
    let actual_sum: f64 = actual.restrict(window.start, window.end).values().iter().sum();
    info!(
        "Actual net flow {} to {}: {:.0}",
        window.start, window.end, actual_sum
    );

    forecasts
        .iter()
        .filter_map(|(name, series)| {
            let forecast_days = series.points.range(window.start..=window.end).count();
            if forecast_days == 0 {
                warn!("{}: no forecast data in backtest window", name);
                return None;
            }
            let forecast_sum = series.sum_between(window.start, window.end);
            let abs_error = (forecast_sum - actual_sum).abs();
            let pct_error = (actual_sum != 0.0).then(|| abs_error / actual_sum.abs());
            info!(
                "{:15}: {:.0} | error {:.0} ({})",
                name,
                forecast_sum,
                abs_error,
                pct_error.map_or("n/a".to_string(), |p| format!("{:.2}%", p * 100.0))
            );
            Some(BacktestResult {
                model: name.clone(),
                window,
                forecast_days,
                forecast_sum,
                actual_sum,
                abs_error,
                pct_error,
            })
        })
        .collect()
}
