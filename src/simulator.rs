//! Day-by-day cash depletion, extraordinary measures and debt issuance
//! against a fixed borrowing ceiling.

use crate::config::SimulationConfig;
use crate::error::{Result, XDateError};
use crate::series::ForecastSeries;
use chrono::NaiveDate;
use log::{debug, info};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Current fiscal position supplied from outside the simulation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FiscalStatus {
    pub current_outstanding_debt: f64,
    pub current_cash_balance: f64,
}

/// Mutable state of one simulation run. Each run owns its own copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FiscalState {
    pub cash_balance: f64,
    pub outstanding_debt: f64,
    pub extraordinary_measures_remaining: f64,
    pub debt_ceiling: f64,
    pub minimum_operating_cash: f64,
}

impl FiscalState {
    pub fn debt_headroom(&self) -> f64 {
        self.debt_ceiling - self.outstanding_debt + self.extraordinary_measures_remaining
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationDayRecord {
    pub date: NaiveDate,
    pub daily_cash_flow: f64,
    pub cash_balance: f64,
    pub outstanding_debt: f64,
    pub new_debt_issued: f64,
    pub extraordinary_measures_used: f64,
    pub extraordinary_measures_remaining: f64,
    pub debt_headroom: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationOutcome {
    pub model: String,
    /// Day before the first simulated day; `days_ahead` counts from here.
    pub reference_date: NaiveDate,
    pub initial_state: FiscalState,
    pub trajectory: Vec<SimulationDayRecord>,
    pub breach_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitialConditions {
    pub current_debt: f64,
    pub current_cash: f64,
    pub debt_ceiling: f64,
    pub extraordinary_measures: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalState {
    pub final_debt: f64,
    pub final_cash: f64,
    pub final_headroom: f64,
    pub total_new_debt_issued: f64,
    pub total_measures_used: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationSummary {
    pub model: String,
    pub predicted_date: Option<NaiveDate>,
    pub days_ahead: Option<i64>,
    pub simulated_days: usize,
    pub initial_conditions: InitialConditions,
    pub final_state: FinalState,
}

impl SimulationOutcome {
    pub fn days_ahead(&self) -> Option<i64> {
        self.breach_date
            .map(|d| (d - self.reference_date).num_days())
    }

    pub fn final_state(&self) -> FinalState {
        let init = &self.initial_state;
        let last = self.trajectory.last();
        FinalState {
            final_debt: last.map_or(init.outstanding_debt, |r| r.outstanding_debt),
            final_cash: last.map_or(init.cash_balance, |r| r.cash_balance),
            final_headroom: last.map_or(init.debt_headroom(), |r| r.debt_headroom),
            total_new_debt_issued: self.trajectory.iter().map(|r| r.new_debt_issued).sum(),
            total_measures_used: self
                .trajectory
                .iter()
                .map(|r| r.extraordinary_measures_used)
                .sum(),
        }
    }

    pub fn summary(&self) -> SimulationSummary {
        let init = &self.initial_state;
        SimulationSummary {
            model: self.model.clone(),
            predicted_date: self.breach_date,
            days_ahead: self.days_ahead(),
            simulated_days: self.trajectory.len(),
            initial_conditions: InitialConditions {
                current_debt: init.outstanding_debt,
                current_cash: init.cash_balance,
                debt_ceiling: init.debt_ceiling,
                extraordinary_measures: init.extraordinary_measures_remaining,
            },
            final_state: self.final_state(),
        }
    }
}

pub struct XDateSimulator {
    config: SimulationConfig,
}

impl XDateSimulator {
    pub fn new(config: SimulationConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Starting state with the full extraordinary-measures capacity.
    pub fn initial_state(&self, status: &FiscalStatus) -> FiscalState {
        FiscalState {
            cash_balance: status.current_cash_balance,
            outstanding_debt: status.current_outstanding_debt,
            extraordinary_measures_remaining: self.config.extraordinary_measures_capacity,
            debt_ceiling: self.config.debt_ceiling,
            minimum_operating_cash: self.config.minimum_operating_cash,
        }
    }

    /// Run `forecast` forward from `initial` until headroom is exhausted or
    /// the forecast ends. `initial` is never mutated.
    ///
    /// Cash shortfalls are met first from extraordinary measures and then by
    /// new debt, even above the ceiling; the breach is detected after the
    /// day's funding.
    pub fn simulate(
        &self,
        initial: &FiscalState,
        forecast: &ForecastSeries,
    ) -> Result<SimulationOutcome> {
        let first = forecast.points.keys().next().copied().ok_or_else(|| {
            XDateError::Simulation(format!("{} forecast is empty", forecast.model))
        })?;
        let reference_date = first.pred_opt().ok_or_else(|| {
            XDateError::DateError(format!("No day before {}", first))
        })?;

        let mut state = initial.clone();
        let mut trajectory = Vec::with_capacity(forecast.len());
        let mut breach_date = None;

        for (i, (&date, &flow)) in forecast.points.iter().enumerate() {
            if !flow.is_finite() {
                return Err(XDateError::Simulation(format!(
                    "{} forecast has non-finite flow on {}",
                    forecast.model, date
                )));
            }

            state.cash_balance += flow;

            let mut measures_used = 0.0;
            let mut new_debt = 0.0;
            if state.cash_balance < state.minimum_operating_cash {
                let mut funding_needed = state.minimum_operating_cash - state.cash_balance;

                if state.extraordinary_measures_remaining > 0.0 {
                    measures_used = funding_needed.min(state.extraordinary_measures_remaining);
                    state.extraordinary_measures_remaining -= measures_used;
                    state.cash_balance += measures_used;
                    funding_needed -= measures_used;
                }

                if funding_needed > 0.0 {
                    new_debt = funding_needed;
                    state.outstanding_debt += new_debt;
                    state.cash_balance += new_debt;
                }
            }

            let headroom = state.debt_headroom();
            trajectory.push(SimulationDayRecord {
                date,
                daily_cash_flow: flow,
                cash_balance: state.cash_balance,
                outstanding_debt: state.outstanding_debt,
                new_debt_issued: new_debt,
                extraordinary_measures_used: measures_used,
                extraordinary_measures_remaining: state.extraordinary_measures_remaining,
                debt_headroom: headroom,
            });

            if headroom <= 0.0 {
                info!(
                    "{}: debt ceiling breached on {} (headroom {:.0}, debt {:.0})",
                    forecast.model, date, headroom, state.outstanding_debt
                );
                breach_date = Some(date);
                break;
            }

            if i % 30 == 0 {
                debug!(
                    "{} day {} ({}): cash {:.0}, debt {:.0}, headroom {:.0}",
                    forecast.model,
                    i + 1,
                    date,
                    state.cash_balance,
                    state.outstanding_debt,
                    headroom
                );
            }
        }

        if breach_date.is_none() {
            info!(
                "{}: ceiling not reached within {} days (headroom {:.0})",
                forecast.model,
                trajectory.len(),
                state.debt_headroom()
            );
        }

        Ok(SimulationOutcome {
            model: forecast.model.clone(),
            reference_date,
            initial_state: initial.clone(),
            trajectory,
            breach_date,
        })
    }
}
