//! The forecaster family and the engine that combines them.
//!
//! Every model is fitted independently through the [`Forecaster`] enum. A model
//! that fails to fit is demoted to [`ModelState::FitFailed`] and left out of
//! the ensemble; it never fails the engine as a whole.

pub mod arima;
pub mod engine;
pub mod forest;
pub mod seasonal;

pub use arima::{ArimaFit, ArimaForecaster, CandidateOutcome};
pub use engine::ForecastEngine;
pub use forest::{ForestForecaster, RandomForest};
pub use seasonal::{growth_ratio, SeasonalForecaster, SeasonalProfile};

use crate::config::{ArimaOrder, ForecastConfig, ModelKind};
use crate::error::{Result, XDateError};
use crate::series::{DailySeries, ForecastSeries};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Name of the per-date mean across fitted models.
pub const ENSEMBLE: &str = "Ensemble";

/// Name of the fallback drawn from the historical distribution.
pub const HISTORICAL_AVERAGE: &str = "HistoricalAvg";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ModelState {
    Untrained,
    Fitting,
    Fitted(FitReport),
    FitFailed(String),
}

impl ModelState {
    pub fn is_fitted(&self) -> bool {
        matches!(self, ModelState::Fitted(_))
    }
}

/// What a successful fit reports back to the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitReport {
    pub model: ModelKind,
    pub observations: usize,
    pub detail: FitDetail,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FitDetail {
    AutoRegressive {
        order: ArimaOrder,
        aic: f64,
        candidates: Vec<CandidateOutcome>,
    },
    SeasonalGrowth {
        baseline_year: i32,
        recent_year: i32,
        baseline_average: f64,
        baseline_ytd_average: f64,
        recent_ytd_average: f64,
        growth_ratio: f64,
    },
    TreeEnsemble {
        n_trees: usize,
        train_rows: usize,
        test_rows: usize,
        test_mae: Option<f64>,
        test_rmse: Option<f64>,
    },
}

/// One forecasting model, dispatched by variant.
#[derive(Debug, Clone)]
pub enum Forecaster {
    AutoRegressive(ArimaForecaster),
    SeasonalGrowth(SeasonalForecaster),
    TreeEnsemble(ForestForecaster),
}

impl Forecaster {
    pub fn from_config(kind: ModelKind, config: &ForecastConfig) -> Self {
        match kind {
            ModelKind::AutoRegressive => {
                Forecaster::AutoRegressive(ArimaForecaster::new(config.arima.clone()))
            }
            ModelKind::SeasonalGrowth => {
                Forecaster::SeasonalGrowth(SeasonalForecaster::new(config.seasonal.clone()))
            }
            ModelKind::TreeEnsemble => {
                Forecaster::TreeEnsemble(ForestForecaster::new(config.forest.clone()))
            }
        }
    }

    pub fn kind(&self) -> ModelKind {
        match self {
            Forecaster::AutoRegressive(_) => ModelKind::AutoRegressive,
            Forecaster::SeasonalGrowth(_) => ModelKind::SeasonalGrowth,
            Forecaster::TreeEnsemble(_) => ModelKind::TreeEnsemble,
        }
    }

    pub fn fit(&mut self, history: &DailySeries) -> Result<FitReport> {
        if history.is_empty() {
            return Err(XDateError::EmptySeries);
        }
        match self {
            Forecaster::AutoRegressive(m) => m.fit(history),
            Forecaster::SeasonalGrowth(m) => m.fit(history),
            Forecaster::TreeEnsemble(m) => m.fit(history),
        }
    }

    /// Values for `dates`, rejected wholesale if any is non-finite.
    pub fn predict(&self, dates: &[NaiveDate]) -> Result<ForecastSeries> {
        let values = match self {
            Forecaster::AutoRegressive(m) => m.predict(dates.len())?,
            Forecaster::SeasonalGrowth(m) => m.predict(dates)?,
            Forecaster::TreeEnsemble(m) => m.predict(dates)?,
        };
        if values.len() != dates.len() {
            return Err(XDateError::model_fit(
                self.kind().name(),
                format!("produced {} values for {} dates", values.len(), dates.len()),
            ));
        }
        ForecastSeries::from_values(self.kind().name(), dates, &values).validate()
    }
}
