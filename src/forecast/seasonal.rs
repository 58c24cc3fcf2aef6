//! Baseline-year seasonality scaled by a clamped year-over-year growth ratio.

use crate::config::{ModelKind, SeasonalConfig};
use crate::error::{Result, XDateError};
use crate::forecast::{FitDetail, FitReport};
use crate::series::DailySeries;
use crate::utils::mean;
use chrono::{Datelike, NaiveDate};
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const MODEL: &str = "Seasonal";
const DAY_SLOTS: usize = 366;

/// `recent_ytd / baseline_ytd`, bounded below by `floor` and above by `cap`.
/// A zero baseline yields 1.0.
pub fn growth_ratio(recent_ytd: f64, baseline_ytd: f64, floor: f64, cap: f64) -> f64 {
    let raw = if baseline_ytd != 0.0 {
        recent_ytd / baseline_ytd
    } else {
        1.0
    };
    if raw.is_finite() {
        raw.max(floor).min(cap)
    } else {
        1.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeasonalProfile {
    pub baseline_year: i32,
    pub recent_year: i32,
    pub baseline_average: f64,
    pub baseline_ytd_average: f64,
    pub recent_ytd_average: f64,
    pub growth_ratio: f64,
    /// Indexed by day of year minus one.
    pub daily_factors: Vec<f64>,
}

impl SeasonalProfile {
    pub fn build(history: &DailySeries, config: &SeasonalConfig) -> Result<Self> {
        let last = history.last_date().ok_or(XDateError::EmptySeries)?;
        let recent_year = last.year();
        let last_day = last.ordinal();
        let baseline_year = config.baseline_year.unwrap_or(recent_year - 1);

        let in_year = |year: i32| -> Vec<(NaiveDate, f64)> {
            history
                .iter()
                .filter(|(d, _)| d.year() == year)
                .map(|(d, v)| (*d, *v))
                .collect()
        };
        let baseline = in_year(baseline_year);
        let recent = in_year(recent_year);

        let baseline_values: Vec<f64> = baseline.iter().map(|(_, v)| *v).collect();
        let baseline_average = mean(&baseline_values).ok_or_else(|| {
            XDateError::model_fit(MODEL, format!("no observations in baseline year {}", baseline_year))
        })?;

        let baseline_ytd: Vec<f64> = baseline
            .iter()
            .filter(|(d, _)| d.ordinal() <= last_day)
            .map(|(_, v)| *v)
            .collect();
        let baseline_ytd_average = mean(&baseline_ytd).unwrap_or(baseline_average);
        let recent_values: Vec<f64> = recent.iter().map(|(_, v)| *v).collect();
        let recent_ytd_average = mean(&recent_values).unwrap_or(baseline_average);

        let growth = growth_ratio(
            recent_ytd_average,
            baseline_ytd_average,
            config.growth_floor,
            config.growth_cap,
        );

        let daily_factors = if baseline_average != 0.0 {
            let mut by_day: BTreeMap<u32, Vec<f64>> = BTreeMap::new();
            for (date, value) in &baseline {
                by_day.entry(date.ordinal()).or_default().push(*value);
            }
            let observed: BTreeMap<u32, f64> = by_day
                .into_iter()
                .filter_map(|(day, values)| mean(&values).map(|m| (day, m / baseline_average)))
                .collect();
            fill_nearest(&observed)
        } else {
            vec![1.0; DAY_SLOTS]
        };

        Ok(Self {
            baseline_year,
            recent_year,
            baseline_average,
            baseline_ytd_average,
            recent_ytd_average,
            growth_ratio: growth,
            daily_factors,
        })
    }

    /// Expected average flow for `year` before the seasonal factor.
    pub fn level_for_year(&self, year: i32) -> f64 {
        if self.baseline_average == 0.0 {
            return self.recent_ytd_average;
        }
        self.baseline_average * self.growth_ratio.powi(year - self.baseline_year)
    }

    pub fn factor_for(&self, date: NaiveDate) -> f64 {
        self.daily_factors
            .get(date.ordinal0() as usize)
            .copied()
            .unwrap_or(1.0)
    }

    pub fn value_for(&self, date: NaiveDate) -> f64 {
        self.level_for_year(date.year()) * self.factor_for(date)
    }
}

/// Expand sparse day-of-year factors to every slot. Each missing day copies
/// its nearest observed day; ties go to the later day.
fn fill_nearest(observed: &BTreeMap<u32, f64>) -> Vec<f64> {
    (1..=DAY_SLOTS as u32)
        .map(|day| {
            if let Some(v) = observed.get(&day) {
                return *v;
            }
            let before = observed.range(..day).next_back();
            let after = observed.range(day..).next();
            match (before, after) {
                (Some((b, bv)), Some((a, av))) => {
                    if day - b < a - day {
                        *bv
                    } else {
                        *av
                    }
                }
                (Some((_, v)), None) | (None, Some((_, v))) => *v,
                (None, None) => 1.0,
            }
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct SeasonalForecaster {
    config: SeasonalConfig,
    profile: Option<SeasonalProfile>,
}

impl SeasonalForecaster {
    pub fn new(config: SeasonalConfig) -> Self {
        Self {
            config,
            profile: None,
        }
    }

    pub fn profile(&self) -> Option<&SeasonalProfile> {
        self.profile.as_ref()
    }

    pub fn fit(&mut self, history: &DailySeries) -> Result<FitReport> {
        self.profile = None;
        self.config
            .validate()
            .map_err(|e| XDateError::model_fit(MODEL, e.to_string()))?;
        let profile = SeasonalProfile::build(history, &self.config)?;
        info!(
            "Seasonal model: baseline {} average {:.0}, {} YTD average {:.0}, growth ratio {:.3}",
            profile.baseline_year,
            profile.baseline_average,
            profile.recent_year,
            profile.recent_ytd_average,
            profile.growth_ratio
        );

        let report = FitReport {
            model: ModelKind::SeasonalGrowth,
            observations: history.len(),
            detail: FitDetail::SeasonalGrowth {
                baseline_year: profile.baseline_year,
                recent_year: profile.recent_year,
                baseline_average: profile.baseline_average,
                baseline_ytd_average: profile.baseline_ytd_average,
                recent_ytd_average: profile.recent_ytd_average,
                growth_ratio: profile.growth_ratio,
            },
        };
        self.profile = Some(profile);
        Ok(report)
    }

    pub fn predict(&self, dates: &[NaiveDate]) -> Result<Vec<f64>> {
        let profile = self
            .profile
            .as_ref()
            .ok_or_else(|| XDateError::model_fit(MODEL, "predict called before fit"))?;
        Ok(dates.iter().map(|d| profile.value_for(*d)).collect())
    }
}
