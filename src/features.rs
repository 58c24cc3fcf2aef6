//! Calendar, lag and rolling-window features for the tree ensemble.

use crate::error::{Result, XDateError};
use crate::series::DailySeries;
use crate::utils::{is_month_end, is_quarter_end, mean, quarter, sample_std};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

pub const LAGS: [usize; 4] = [1, 2, 3, 7];
pub const ROLLING_WINDOWS: [usize; 2] = [7, 30];

/// Fewest raw observations that can yield a feature row.
pub const MIN_OBSERVATIONS: usize = 30;

pub const FEATURE_NAMES: [&str; 16] = [
    "day_of_week",
    "day_of_month",
    "month",
    "quarter",
    "is_month_end",
    "is_quarter_end",
    "is_friday",
    "is_monday",
    "lag_1",
    "lag_2",
    "lag_3",
    "lag_7",
    "rolling_mean_7",
    "rolling_mean_30",
    "rolling_std_7",
    "rolling_std_30",
];

pub const FEATURE_COUNT: usize = FEATURE_NAMES.len();

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarFeatures {
    /// 0 = Monday.
    pub day_of_week: u32,
    pub day_of_month: u32,
    pub month: u32,
    pub quarter: u32,
    pub is_month_end: bool,
    pub is_quarter_end: bool,
    pub is_friday: bool,
    pub is_monday: bool,
}

impl CalendarFeatures {
    pub fn for_date(date: NaiveDate) -> Self {
        let dow = date.weekday().num_days_from_monday();
        Self {
            day_of_week: dow,
            day_of_month: date.day(),
            month: date.month(),
            quarter: quarter(date),
            is_month_end: is_month_end(date),
            is_quarter_end: is_quarter_end(date),
            is_friday: dow == 4,
            is_monday: dow == 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    pub date: NaiveDate,
    pub calendar: CalendarFeatures,
    /// Values at `LAGS` observations back.
    pub lags: [f64; 4],
    pub rolling_mean_7: f64,
    pub rolling_mean_30: f64,
    pub rolling_std_7: f64,
    pub rolling_std_30: f64,
    /// Observed net flow on `date`; `None` for future rows.
    pub net_flow: Option<f64>,
}

impl FeatureRow {
    /// Flattened in `FEATURE_NAMES` order.
    pub fn to_vector(&self) -> [f64; FEATURE_COUNT] {
        let c = &self.calendar;
        let flag = |b: bool| if b { 1.0 } else { 0.0 };
        [
            c.day_of_week as f64,
            c.day_of_month as f64,
            c.month as f64,
            c.quarter as f64,
            flag(c.is_month_end),
            flag(c.is_quarter_end),
            flag(c.is_friday),
            flag(c.is_monday),
            self.lags[0],
            self.lags[1],
            self.lags[2],
            self.lags[3],
            self.rolling_mean_7,
            self.rolling_mean_30,
            self.rolling_std_7,
            self.rolling_std_30,
        ]
    }
}

pub struct FeatureBuilder;

impl FeatureBuilder {
    /// One row per observation whose lag-7 and 30-observation windows are
    /// fully populated. Lags and windows count observations, not calendar days.
    pub fn build(series: &DailySeries) -> Result<Vec<FeatureRow>> {
        if series.len() < MIN_OBSERVATIONS {
            return Err(XDateError::InsufficientData {
                required: MIN_OBSERVATIONS,
                actual: series.len(),
            });
        }

        let dates = series.dates();
        let values = series.values();
        let first = (MIN_OBSERVATIONS - 1).max(LAGS[LAGS.len() - 1]);

        let mut rows = Vec::with_capacity(values.len() - first);
        for i in first..values.len() {
            let window_7 = &values[i + 1 - 7..=i];
            let window_30 = &values[i + 1 - 30..=i];
            let (Some(m7), Some(m30), Some(s7), Some(s30)) = (
                mean(window_7),
                mean(window_30),
                sample_std(window_7),
                sample_std(window_30),
            ) else {
                continue;
            };

            rows.push(FeatureRow {
                date: dates[i],
                calendar: CalendarFeatures::for_date(dates[i]),
                lags: LAGS.map(|k| values[i - k]),
                rolling_mean_7: m7,
                rolling_mean_30: m30,
                rolling_std_7: s7,
                rolling_std_30: s30,
                net_flow: Some(values[i]),
            });
        }

        Ok(rows)
    }

    /// Rows for undated future days. True lags are unknown, so every lag and
    /// rolling mean takes the mean of the last 30 observations and both rolling
    /// deviations take their standard deviation. This biases longer horizons
    /// toward the recent mean.
    pub fn future_rows(series: &DailySeries, dates: &[NaiveDate]) -> Result<Vec<FeatureRow>> {
        let recent = series.tail(30);
        let recent_mean = mean(&recent).ok_or(XDateError::EmptySeries)?;
        let recent_std = sample_std(&recent).unwrap_or(0.0);

        Ok(dates
            .iter()
            .map(|&date| FeatureRow {
                date,
                calendar: CalendarFeatures::for_date(date),
                lags: [recent_mean; 4],
                rolling_mean_7: recent_mean,
                rolling_mean_30: recent_mean,
                rolling_std_7: recent_std,
                rolling_std_30: recent_std,
                net_flow: None,
            })
            .collect())
    }
}
