//! One simulation per forecast model, aggregated into breach-date bounds.

use crate::series::ForecastSet;
use crate::simulator::{FiscalState, SimulationOutcome, XDateSimulator};
use chrono::{Days, NaiveDate};
use log::{info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ScenarioStatus {
    Breached { date: NaiveDate, days_ahead: i64 },
    NotReached,
    /// The simulation itself errored; counted as not reached.
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioResult {
    pub model: String,
    pub status: ScenarioStatus,
    pub outcome: Option<SimulationOutcome>,
}

impl ScenarioResult {
    pub fn breach(&self) -> Option<(NaiveDate, i64)> {
        match self.status {
            ScenarioStatus::Breached { date, days_ahead } => Some((date, days_ahead)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioBound {
    pub model: String,
    pub date: NaiveDate,
    pub days_ahead: i64,
    /// Day `days_ahead` is counted from.
    pub reference_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioAnalysis {
    /// In model-name order.
    pub results: Vec<ScenarioResult>,
    pub mean_days_to_breach: Option<f64>,
    pub average_date: Option<NaiveDate>,
    pub earliest: Option<ScenarioBound>,
    pub latest: Option<ScenarioBound>,
}

impl ScenarioAnalysis {
    pub fn breached(&self) -> Vec<&ScenarioResult> {
        self.results.iter().filter(|r| r.breach().is_some()).collect()
    }

    pub fn not_reached_count(&self) -> usize {
        self.results.len() - self.breached().len()
    }

    pub fn get(&self, model: &str) -> Option<&ScenarioResult> {
        self.results.iter().find(|r| r.model == model)
    }
}

pub struct ScenarioAnalyzer {
    simulator: XDateSimulator,
}

impl ScenarioAnalyzer {
    pub fn new(simulator: XDateSimulator) -> Self {
        Self { simulator }
    }

    /// Simulate every forecast from the same starting state. A failing
    /// scenario is recorded and never aborts the others.
    pub fn analyze(&self, initial: &FiscalState, forecasts: &ForecastSet) -> ScenarioAnalysis {
        let entries: Vec<_> = forecasts.iter().collect();
        let results: Vec<ScenarioResult> = entries
            .par_iter()
            .map(|(name, forecast)| {
                let state = initial.clone();
                match self.simulator.simulate(&state, forecast) {
                    Ok(outcome) => {
                        let status = match (outcome.breach_date, outcome.days_ahead()) {
                            (Some(date), Some(days_ahead)) => {
                                ScenarioStatus::Breached { date, days_ahead }
                            }
                            _ => ScenarioStatus::NotReached,
                        };
                        ScenarioResult {
                            model: (*name).clone(),
                            status,
                            outcome: Some(outcome),
                        }
                    }
                    Err(e) => {
                        warn!("Scenario {} failed: {}", name, e);
                        ScenarioResult {
                            model: (*name).clone(),
                            status: ScenarioStatus::Failed(e.to_string()),
                            outcome: None,
                        }
                    }
                }
            })
            .collect();

        let analysis = aggregate(results);
        log_analysis(&analysis);
        analysis
    }
}

fn aggregate(results: Vec<ScenarioResult>) -> ScenarioAnalysis {
    let bounds: Vec<ScenarioBound> = results
        .iter()
        .filter_map(|r| {
            let (date, days_ahead) = r.breach()?;
            Some(ScenarioBound {
                model: r.model.clone(),
                date,
                days_ahead,
                reference_date: r.outcome.as_ref()?.reference_date,
            })
        })
        .collect();

    let mean_days_to_breach = if bounds.is_empty() {
        None
    } else {
        Some(bounds.iter().map(|b| b.days_ahead as f64).sum::<f64>() / bounds.len() as f64)
    };

    // Breach dates are averaged from the earliest reference so scenarios
    // starting on different days share one origin.
    let average_date = bounds.iter().map(|b| b.reference_date).min().and_then(|anchor| {
        let offsets: Vec<f64> = bounds
            .iter()
            .map(|b| (b.date - anchor).num_days() as f64)
            .collect();
        let mean_offset = offsets.iter().sum::<f64>() / offsets.len() as f64;
        anchor.checked_add_days(Days::new(mean_offset.floor().max(0.0) as u64))
    });

    // Ties keep the first scenario in model-name order.
    let earliest = bounds
        .iter()
        .fold(None::<&ScenarioBound>, |acc, b| match acc {
            Some(a) if a.days_ahead <= b.days_ahead => Some(a),
            _ => Some(b),
        })
        .cloned();
    let latest = bounds
        .iter()
        .fold(None::<&ScenarioBound>, |acc, b| match acc {
            Some(a) if a.days_ahead >= b.days_ahead => Some(a),
            _ => Some(b),
        })
        .cloned();

    ScenarioAnalysis {
        results,
        mean_days_to_breach,
        average_date,
        earliest,
        latest,
    }
}

fn log_analysis(analysis: &ScenarioAnalysis) {
    for result in &analysis.results {
        match &result.status {
            ScenarioStatus::Breached { date, days_ahead } => {
                info!("{:15}: {} ({} days ahead)", result.model, date, days_ahead)
            }
            ScenarioStatus::NotReached => info!("{:15}: not reached", result.model),
            ScenarioStatus::Failed(reason) => {
                info!("{:15}: not reached (simulation failed: {})", result.model, reason)
            }
        }
    }
    if let (Some(avg), Some(early), Some(late)) =
        (analysis.average_date, &analysis.earliest, &analysis.latest)
    {
        info!(
            "Average breach date {}, earliest {} ({}), latest {} ({})",
            avg, early.date, early.model, late.date, late.model
        );
    }
}
