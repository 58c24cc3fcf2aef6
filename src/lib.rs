//! # X-Date Forecaster
//!
//! A library for forecasting daily treasury net cash flow and simulating the
//! day the borrowing ceiling is breached (the "X-Date").
//!
//! ## Core Concepts
//!
//! - **Daily Series**: Net flow (deposits minus withdrawals) per observed date, gaps preserved
//! - **Forecasters**: ARIMA, seasonal growth and random forest, each fitted independently
//! - **Ensemble**: Per-date mean of every model that fitted; a seeded historical-average draw when none did
//! - **Simulation**: Cash is topped up from extraordinary measures, then new debt; breach when headroom <= 0
//! - **Scenarios**: One simulation per forecast, summarised as earliest, latest and average breach dates
//!
//! ## Example
//!
//! ```rust,ignore
//! use xdate_forecaster::*;
//! use chrono::NaiveDate;
//!
//! let records = load_raw_records_csv("daily_cash_flows.csv".as_ref())?;
//! let status = FiscalStatus {
//!     current_outstanding_debt: 36_000_000.0,
//!     current_cash_balance: 400_000.0,
//! };
//! let output = XDatePipeline::run(&records, &status, &PipelineConfig::default())?;
//!
//! if let Some(earliest) = &output.scenarios.earliest {
//!     println!("Earliest X-Date: {} ({})", earliest.date, earliest.model);
//! }
//! ```

pub mod backtest;
pub mod config;
pub mod error;
pub mod export;
pub mod features;
pub mod forecast;
pub mod ingestion;
pub mod math;
pub mod scenario;
pub mod series;
pub mod simulator;
pub mod utils;

pub use backtest::{evaluate as evaluate_backtest, BacktestResult};
pub use config::*;
pub use error::{Result, XDateError};
pub use export::{read_forecast_table, write_forecast_table, write_json, write_trajectory_csv};
pub use features::{FeatureBuilder, FeatureRow};
pub use forecast::{
    FitDetail, FitReport, ForecastEngine, Forecaster, ModelState, ENSEMBLE, HISTORICAL_AVERAGE,
};
pub use ingestion::{load_raw_records_csv, DataLoader, DailyFlowRecord, RawFlowRecord, TransactionType};
pub use scenario::{ScenarioAnalysis, ScenarioAnalyzer, ScenarioBound, ScenarioResult, ScenarioStatus};
pub use series::{DailySeries, ForecastSeries, ForecastSet};
pub use simulator::{
    FiscalState, FiscalStatus, SimulationDayRecord, SimulationOutcome, SimulationSummary,
    XDateSimulator,
};

use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineOutput {
    /// History after any date-range restriction.
    pub series: DailySeries,
    pub fit_reports: BTreeMap<ModelKind, ModelState>,
    pub forecasts: ForecastSet,
    pub initial_state: FiscalState,
    pub scenarios: ScenarioAnalysis,
}

impl PipelineOutput {
    pub fn summaries(&self) -> Vec<SimulationSummary> {
        self.scenarios
            .results
            .iter()
            .filter_map(|r| r.outcome.as_ref().map(|o| o.summary()))
            .collect()
    }
}

pub struct XDatePipeline;

impl XDatePipeline {
    /// Load, fit, forecast and simulate.
    ///
    /// Data errors and an exhausted engine are returned; individual model and
    /// scenario failures are recorded in the output instead.
    pub fn run(
        records: &[RawFlowRecord],
        status: &FiscalStatus,
        config: &PipelineConfig,
    ) -> Result<PipelineOutput> {
        let series = DataLoader::load(records)?;
        Self::run_series(series, status, config)
    }

    pub fn run_series(
        series: DailySeries,
        status: &FiscalStatus,
        config: &PipelineConfig,
    ) -> Result<PipelineOutput> {
        config.validate()?;

        let series = match &config.date_range {
            Some(range) => {
                let restricted = series.restrict(range.start, range.end);
                debug!(
                    "Restricted history to {}..={}: {} of {} days kept",
                    range.start,
                    range.end,
                    restricted.len(),
                    series.len()
                );
                restricted
            }
            None => series,
        };
        if series.is_empty() {
            return Err(XDateError::EmptySeries);
        }

        info!(
            "Fitting {} model(s) on {} days, forecasting {} days",
            config.forecast.models.len(),
            series.len(),
            config.horizon_days
        );
        let mut engine = ForecastEngine::new(config.forecast.clone());
        let fit_reports = engine.fit(&series);
        let forecasts = engine.forecast(config.horizon_days)?;

        let simulator = XDateSimulator::new(config.simulation.clone())?;
        let initial_state = simulator.initial_state(status);
        let scenarios = ScenarioAnalyzer::new(simulator).analyze(&initial_state, &forecasts);

        Ok(PipelineOutput {
            series,
            fit_reports,
            forecasts,
            initial_state,
            scenarios,
        })
    }
}
