use crate::config::{ForecastConfig, ModelKind};
use crate::error::{Result, XDateError};
use crate::forecast::{Forecaster, ModelState, ENSEMBLE, HISTORICAL_AVERAGE};
use crate::series::{DailySeries, ForecastSeries, ForecastSet};
use crate::utils::{days_after, mean, sample_std};
use chrono::NaiveDate;
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use rayon::prelude::*;
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
pub struct ModelSlot {
    pub forecaster: Forecaster,
    pub state: ModelState,
}

/// Fits the configured forecasters and combines their forecasts.
#[derive(Debug, Clone)]
pub struct ForecastEngine {
    config: ForecastConfig,
    slots: Vec<ModelSlot>,
    history: DailySeries,
}

impl ForecastEngine {
    pub fn new(config: ForecastConfig) -> Self {
        let mut kinds: Vec<ModelKind> = Vec::new();
        for kind in &config.models {
            if !kinds.contains(kind) {
                kinds.push(*kind);
            }
        }
        let slots = kinds
            .into_iter()
            .map(|kind| ModelSlot {
                forecaster: Forecaster::from_config(kind, &config),
                state: ModelState::Untrained,
            })
            .collect();

        Self {
            config,
            slots,
            history: DailySeries::default(),
        }
    }

    /// Fit every model on `history`. Failures are recorded per model and never
    /// returned as errors.
    pub fn fit(&mut self, history: &DailySeries) -> BTreeMap<ModelKind, ModelState> {
        self.history = history.clone();

        self.slots.par_iter_mut().for_each(|slot| {
            slot.state = ModelState::Fitting;
            slot.state = match slot.forecaster.fit(history) {
                Ok(report) => ModelState::Fitted(report),
                Err(e) => ModelState::FitFailed(e.to_string()),
            };
        });

        for slot in &self.slots {
            match &slot.state {
                ModelState::Fitted(_) => info!("{} fitted", slot.forecaster.kind()),
                ModelState::FitFailed(reason) => {
                    warn!("{} failed to fit: {}", slot.forecaster.kind(), reason)
                }
                _ => {}
            }
        }

        self.states()
    }

    pub fn states(&self) -> BTreeMap<ModelKind, ModelState> {
        self.slots
            .iter()
            .map(|s| (s.forecaster.kind(), s.state.clone()))
            .collect()
    }

    pub fn fitted_models(&self) -> Vec<ModelKind> {
        self.slots
            .iter()
            .filter(|s| s.state.is_fitted())
            .map(|s| s.forecaster.kind())
            .collect()
    }

    /// Forecast `horizon_days` consecutive days after the last observation.
    ///
    /// Returns every fitted model whose forecast is finite plus their
    /// per-date mean under [`ENSEMBLE`]. With no usable model, returns only the
    /// [`HISTORICAL_AVERAGE`] draw.
    pub fn forecast(&self, horizon_days: usize) -> Result<ForecastSet> {
        let last = self.history.last_date().ok_or(XDateError::EngineExhausted)?;
        if horizon_days == 0 {
            return Err(XDateError::InvalidConfig(
                "forecast horizon must be at least one day".to_string(),
            ));
        }
        let dates = days_after(last, horizon_days)?;

        let mut forecasts = ForecastSet::new();
        for slot in self.slots.iter().filter(|s| s.state.is_fitted()) {
            match slot.forecaster.predict(&dates) {
                Ok(series) => {
                    forecasts.insert(series.model.clone(), series);
                }
                Err(e) => warn!("Excluding {} forecast: {}", slot.forecaster.kind(), e),
            }
        }

        if forecasts.is_empty() {
            warn!("No fitted model produced a usable forecast; using historical average");
            let fallback = self.historical_average(&dates)?;
            forecasts.insert(fallback.model.clone(), fallback);
        } else {
            let ensemble = ensemble_mean(&forecasts, &dates);
            forecasts.insert(ensemble.model.clone(), ensemble);
        }

        for (name, series) in &forecasts {
            if let Some(stats) = series.stats() {
                debug!(
                    "{} forecast: mean {:.0}, std {:.0}, range [{:.0}, {:.0}], positive share {:.2}",
                    name, stats.mean, stats.std, stats.min, stats.max, stats.positive_share
                );
            }
        }
        Ok(forecasts)
    }

    /// Independent normal draws around the historical mean with a shrunken
    /// standard deviation.
    fn historical_average(&self, dates: &[NaiveDate]) -> Result<ForecastSeries> {
        let values = self.history.values();
        let m = mean(&values).ok_or(XDateError::EngineExhausted)?;
        let std = sample_std(&values).unwrap_or(0.0) * self.config.fallback_std_scale;
        let normal = Normal::new(m, std).map_err(|_| XDateError::EngineExhausted)?;
        let mut rng = StdRng::seed_from_u64(self.config.fallback_seed);

        let draws: Vec<f64> = dates.iter().map(|_| normal.sample(&mut rng)).collect();
        ForecastSeries::from_values(HISTORICAL_AVERAGE, dates, &draws)
            .validate()
            .map_err(|_| XDateError::EngineExhausted)
    }
}

fn ensemble_mean(forecasts: &ForecastSet, dates: &[NaiveDate]) -> ForecastSeries {
    let values: Vec<f64> = dates
        .iter()
        .map(|date| {
            let members: Vec<f64> = forecasts
                .values()
                .filter_map(|s| s.points.get(date).copied())
                .collect();
            mean(&members).unwrap_or(0.0)
        })
        .collect();
    ForecastSeries::from_values(ENSEMBLE, dates, &values)
}
