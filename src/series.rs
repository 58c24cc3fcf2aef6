//! Date-indexed series shared by every stage of the pipeline.

use crate::error::{Result, XDateError};
use crate::utils::{mean, sample_std};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Net cash flow per observed date (deposits minus withdrawals).
///
/// Only dates present in the source data are stored. Gaps are kept as gaps;
/// nothing is forward-filled.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DailySeries {
    points: BTreeMap<NaiveDate, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesStats {
    pub count: usize,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub mean: f64,
    pub std: f64,
    pub positive_days: usize,
    pub negative_days: usize,
}

impl DailySeries {
    pub fn new(points: BTreeMap<NaiveDate, f64>) -> Self {
        Self { points }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn get(&self, date: &NaiveDate) -> Option<f64> {
        self.points.get(date).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&NaiveDate, &f64)> {
        self.points.iter()
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.points.keys().copied().collect()
    }

    pub fn values(&self) -> Vec<f64> {
        self.points.values().copied().collect()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.points.keys().next().copied()
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.points.keys().next_back().copied()
    }

    /// The last `n` observations (fewer if the series is shorter).
    pub fn tail(&self, n: usize) -> Vec<f64> {
        let values = self.values();
        let start = values.len().saturating_sub(n);
        values[start..].to_vec()
    }

    /// Observations with `start <= date <= end`.
    pub fn restrict(&self, start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            points: self
                .points
                .range(start..=end)
                .map(|(d, v)| (*d, *v))
                .collect(),
        }
    }

    pub fn stats(&self) -> SeriesStats {
        let values = self.values();
        SeriesStats {
            count: values.len(),
            start: self.first_date(),
            end: self.last_date(),
            mean: mean(&values).unwrap_or(0.0),
            std: sample_std(&values).unwrap_or(0.0),
            positive_days: values.iter().filter(|v| **v > 0.0).count(),
            negative_days: values.iter().filter(|v| **v < 0.0).count(),
        }
    }
}

/// Predicted net flow per future date, tagged with the producing model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastSeries {
    pub model: String,
    pub points: BTreeMap<NaiveDate, f64>,
}

/// Forecasts keyed by model name.
pub type ForecastSet = BTreeMap<String, ForecastSeries>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastStats {
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
    pub positive_days: usize,
    pub negative_days: usize,
    pub positive_share: f64,
}

impl ForecastSeries {
    /// Pairs `dates` with `values` position by position.
    pub fn from_values(model: impl Into<String>, dates: &[NaiveDate], values: &[f64]) -> Self {
        Self {
            model: model.into(),
            points: dates.iter().copied().zip(values.iter().copied()).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn values(&self) -> Vec<f64> {
        self.points.values().copied().collect()
    }

    pub fn is_finite(&self) -> bool {
        self.points.values().all(|v| v.is_finite())
    }

    /// Rejects the series wholesale if any value is NaN or infinite.
    pub fn validate(self) -> Result<Self> {
        if self.is_finite() {
            Ok(self)
        } else {
            Err(XDateError::ForecastDegenerate { model: self.model })
        }
    }

    pub fn sum_between(&self, start: NaiveDate, end: NaiveDate) -> f64 {
        self.points.range(start..=end).map(|(_, v)| v).sum()
    }

    pub fn stats(&self) -> Option<ForecastStats> {
        let values = self.values();
        let m = mean(&values)?;
        let positive_days = values.iter().filter(|v| **v > 0.0).count();
        Some(ForecastStats {
            mean: m,
            std: sample_std(&values).unwrap_or(0.0),
            min: values.iter().copied().fold(f64::INFINITY, f64::min),
            max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            positive_days,
            negative_days: values.iter().filter(|v| **v < 0.0).count(),
            positive_share: positive_days as f64 / values.len() as f64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    #[test]
    fn test_restrict_and_tail() {
        let series = DailySeries::new((1..=10).map(|d| (day(d), d as f64)).collect());
        let restricted = series.restrict(day(3), day(5));
        assert_eq!(restricted.values(), vec![3.0, 4.0, 5.0]);
        assert_eq!(series.tail(2), vec![9.0, 10.0]);
        assert_eq!(series.tail(50).len(), 10);
    }

    #[test]
    fn test_series_stats_counts_signs() {
        let series = DailySeries::new(
            vec![(day(1), -5.0), (day(2), 0.0), (day(3), 5.0), (day(4), 10.0)]
                .into_iter()
                .collect(),
        );
        let stats = series.stats();
        assert_eq!(stats.count, 4);
        assert_eq!(stats.positive_days, 2);
        assert_eq!(stats.negative_days, 1);
        assert!((stats.mean - 2.5).abs() < 1e-12);
        assert_eq!(stats.start, Some(day(1)));
        assert_eq!(stats.end, Some(day(4)));
    }

    #[test]
    fn test_validate_rejects_nan() {
        let dates = [day(1), day(2)];
        let good = ForecastSeries::from_values("ARIMA", &dates, &[1.0, 2.0]);
        assert!(good.validate().is_ok());

        let bad = ForecastSeries::from_values("ARIMA", &dates, &[1.0, f64::NAN]);
        match bad.validate() {
            Err(XDateError::ForecastDegenerate { model }) => assert_eq!(model, "ARIMA"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_forecast_stats() {
        let dates = [day(1), day(2), day(3), day(4)];
        let series = ForecastSeries::from_values("Seasonal", &dates, &[-2.0, 4.0, 6.0, -8.0]);
        let stats = series.stats().unwrap();
        assert!((stats.mean - 0.0).abs() < 1e-12);
        assert_eq!(stats.min, -8.0);
        assert_eq!(stats.max, 6.0);
        assert_eq!(stats.positive_days, 2);
        assert!((stats.positive_share - 0.5).abs() < 1e-12);
        assert!((series.sum_between(day(2), day(3)) - 10.0).abs() < 1e-12);
    }
}
