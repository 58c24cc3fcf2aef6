//! ARIMA(p,d,q) fitted by conditional sum of squares.
//!
//! Coefficients come from a Hannan-Rissanen regression: a long autoregression
//! supplies innovation estimates, then the series is regressed on its own lags
//! and lagged innovations. A couple of refinement passes re-run the regression
//! on the recursive residuals and keep whichever pass has the lower SSE.
//! Candidate orders are scored by AIC and evaluated in parallel.

use crate::config::{ArimaConfig, ArimaOrder, ModelKind};
use crate::error::{Result, XDateError};
use crate::forecast::{FitDetail, FitReport};
use crate::math::regress;
use crate::series::DailySeries;
use log::{debug, info};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

const MODEL: &str = "ARIMA";
const REFINEMENT_PASSES: usize = 2;
/// Degrees of freedom left over after the regressors, per candidate.
const MIN_SPARE_OBSERVATIONS: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateOutcome {
    pub order: ArimaOrder,
    pub aic: Option<f64>,
    pub rejected: Option<String>,
}

/// A fitted ARIMA model plus the state needed to extend it forward.
#[derive(Debug, Clone)]
pub struct ArimaFit {
    pub order: ArimaOrder,
    pub constant: f64,
    pub ar: Vec<f64>,
    pub ma: Vec<f64>,
    pub sigma2: f64,
    pub aic: f64,
    differenced: Vec<f64>,
    residuals: Vec<f64>,
    /// Last value of the series at each differencing level below `d`.
    level_tails: Vec<f64>,
}

impl ArimaFit {
    pub fn estimate(history: &[f64], order: ArimaOrder) -> Result<Self> {
        let ArimaOrder { p, d, q } = order;
        let mut level_tails = Vec::with_capacity(d);
        let mut w = history.to_vec();
        for _ in 0..d {
            let last = *w
                .last()
                .ok_or_else(|| XDateError::model_fit(MODEL, "series exhausted by differencing"))?;
            level_tails.push(last);
            w = difference(&w);
        }

        let n = w.len();
        if n < p + q + MIN_SPARE_OBSERVATIONS {
            return Err(XDateError::model_fit(
                MODEL,
                format!("order {} needs more than {} differenced observations", order, n),
            ));
        }

        let with_constant = d == 0;
        let initial = if q == 0 {
            let rows: Vec<usize> = (p..n).collect();
            fit_regression(&w, &[], &rows, with_constant, p, 0)
        } else {
            let m = (2 * (p + q)).max(8).min(n / 4).max(p.max(q));
            let innovations = long_ar_residuals(&w, m).ok_or_else(|| {
                XDateError::model_fit(MODEL, format!("long AR({}) regression failed", m))
            })?;
            let rows: Vec<usize> = ((m + q).max(p)..n).collect();
            fit_regression(&w, &innovations, &rows, with_constant, p, q)
        }
        .ok_or_else(|| XDateError::model_fit(MODEL, format!("regression for {} failed", order)))?;

        let mut best = css_residuals(&w, &initial)
            .map(|(e, sse)| (initial, e, sse))
            .ok_or_else(|| XDateError::model_fit(MODEL, "non-finite residuals"))?;

        if q > 0 {
            for _ in 0..REFINEMENT_PASSES {
                let rows: Vec<usize> = (p.max(q)..n).collect();
                let Some(params) = fit_regression(&w, &best.1, &rows, with_constant, p, q) else {
                    break;
                };
                match css_residuals(&w, &params) {
                    Some((e, sse)) if sse < best.2 => best = (params, e, sse),
                    _ => break,
                }
            }
        }

        let (params, residuals, sse) = best;
        if !is_stationary(&params.ar) {
            return Err(XDateError::model_fit(MODEL, format!("{} is not stationary", order)));
        }
        let negated_ma: Vec<f64> = params.ma.iter().map(|b| -b).collect();
        if !is_stationary(&negated_ma) {
            return Err(XDateError::model_fit(MODEL, format!("{} is not invertible", order)));
        }

        let n_eff = (n - p) as f64;
        let sigma2 = (sse / n_eff).max(f64::MIN_POSITIVE);
        let log_likelihood = -0.5 * n_eff * ((2.0 * std::f64::consts::PI * sigma2).ln() + 1.0);
        let k = (p + q + usize::from(with_constant) + 1) as f64;
        let aic = 2.0 * k - 2.0 * log_likelihood;
        if !aic.is_finite() {
            return Err(XDateError::model_fit(MODEL, "non-finite AIC"));
        }

        Ok(Self {
            order,
            constant: params.constant,
            ar: params.ar,
            ma: params.ma,
            sigma2,
            aic,
            differenced: w,
            residuals,
            level_tails,
        })
    }

    /// Point forecasts with future innovations set to zero, integrated back
    /// to the original scale.
    pub fn forecast(&self, steps: usize) -> Vec<f64> {
        let n = self.differenced.len();
        let mut w = self.differenced.clone();
        let mut e = self.residuals.clone();
        w.reserve(steps);
        e.reserve(steps);

        for t in n..n + steps {
            let mut next = self.constant;
            for (i, a) in self.ar.iter().enumerate() {
                next += a * w[t - 1 - i];
            }
            for (j, b) in self.ma.iter().enumerate() {
                if let Some(prev) = t.checked_sub(j + 1).and_then(|idx| e.get(idx)) {
                    next += b * prev;
                }
            }
            w.push(next);
            e.push(0.0);
        }

        let mut out = w.split_off(n);
        for tail in self.level_tails.iter().rev() {
            let mut acc = *tail;
            for v in out.iter_mut() {
                acc += *v;
                *v = acc;
            }
        }
        out
    }
}

#[derive(Debug, Clone)]
struct Coefficients {
    constant: f64,
    ar: Vec<f64>,
    ma: Vec<f64>,
}

fn difference(values: &[f64]) -> Vec<f64> {
    values.windows(2).map(|w| w[1] - w[0]).collect()
}

/// Regress `w[t]` on an optional constant, `p` lags of `w` and `q` lags of
/// `innovations`, over the time indices in `rows`.
fn fit_regression(
    w: &[f64],
    innovations: &[f64],
    rows: &[usize],
    with_constant: bool,
    p: usize,
    q: usize,
) -> Option<Coefficients> {
    let ncols = usize::from(with_constant) + p + q;
    if ncols == 0 {
        return Some(Coefficients {
            constant: 0.0,
            ar: Vec::new(),
            ma: Vec::new(),
        });
    }

    let design: Vec<Vec<f64>> = rows
        .iter()
        .map(|&t| {
            let mut row = Vec::with_capacity(ncols);
            if with_constant {
                row.push(1.0);
            }
            row.extend((1..=p).map(|i| w[t - i]));
            row.extend((1..=q).map(|j| innovations[t - j]));
            row
        })
        .collect();
    let targets: Vec<f64> = rows.iter().map(|&t| w[t]).collect();

    let beta = regress(&design, &targets)?;
    let offset = usize::from(with_constant);
    Some(Coefficients {
        constant: if with_constant { beta[0] } else { 0.0 },
        ar: beta[offset..offset + p].to_vec(),
        ma: beta[offset + p..].to_vec(),
    })
}

fn long_ar_residuals(w: &[f64], m: usize) -> Option<Vec<f64>> {
    let rows: Vec<usize> = (m..w.len()).collect();
    let coeffs = fit_regression(w, &[], &rows, true, m, 0)?;
    let mut residuals = vec![0.0; w.len()];
    for &t in &rows {
        let fitted: f64 = coeffs.constant
            + coeffs
                .ar
                .iter()
                .enumerate()
                .map(|(i, a)| a * w[t - 1 - i])
                .sum::<f64>();
        residuals[t] = w[t] - fitted;
    }
    Some(residuals)
}

/// Recursive residuals with pre-sample innovations taken as zero.
fn css_residuals(w: &[f64], params: &Coefficients) -> Option<(Vec<f64>, f64)> {
    let p = params.ar.len();
    let mut e = vec![0.0; w.len()];
    let mut sse = 0.0;
    for t in p..w.len() {
        let mut fitted = params.constant;
        for (i, a) in params.ar.iter().enumerate() {
            fitted += a * w[t - 1 - i];
        }
        for (j, b) in params.ma.iter().enumerate() {
            if t > j {
                fitted += b * e[t - 1 - j];
            }
        }
        e[t] = w[t] - fitted;
        sse += e[t] * e[t];
    }
    sse.is_finite().then_some((e, sse))
}

/// Whether `1 - a1 z - ... - ak z^k` has all roots outside the unit circle,
/// via the Durbin-Levinson step-down recursion.
pub(crate) fn is_stationary(coeffs: &[f64]) -> bool {
    let mut a = coeffs.to_vec();
    while let Some(&r) = a.last() {
        if !r.is_finite() || r.abs() >= 1.0 {
            return false;
        }
        let k = a.len();
        let denom = 1.0 - r * r;
        a = (0..k - 1).map(|j| (a[j] + r * a[k - 2 - j]) / denom).collect();
    }
    true
}

#[derive(Debug, Clone)]
pub struct ArimaForecaster {
    config: ArimaConfig,
    fitted: Option<ArimaFit>,
}

impl ArimaForecaster {
    pub fn new(config: ArimaConfig) -> Self {
        Self {
            config,
            fitted: None,
        }
    }

    pub fn fitted(&self) -> Option<&ArimaFit> {
        self.fitted.as_ref()
    }

    fn evaluate(&self, history: &[f64], order: ArimaOrder) -> Result<ArimaFit> {
        self.screen(ArimaFit::estimate(history, order)?)
    }

    /// Reject a fit whose short test forecast is not entirely finite.
    fn screen(&self, fit: ArimaFit) -> Result<ArimaFit> {
        let test = fit.forecast(self.config.test_steps);
        if test.iter().all(|v| v.is_finite()) {
            Ok(fit)
        } else {
            Err(XDateError::ForecastDegenerate {
                model: format!("{}{}", MODEL, fit.order),
            })
        }
    }

    pub fn fit(&mut self, history: &DailySeries) -> Result<FitReport> {
        self.fitted = None;
        let values = history.values();
        if values.len() < self.config.min_observations {
            return Err(XDateError::InsufficientData {
                required: self.config.min_observations,
                actual: values.len(),
            });
        }

        let candidates = self.config.search.candidates();
        if candidates.is_empty() {
            return Err(XDateError::model_fit(MODEL, "no candidate orders configured"));
        }

        let results: Vec<Result<ArimaFit>> = candidates
            .par_iter()
            .map(|order| self.evaluate(&values, *order))
            .collect();
        let (best, outcomes) = select(&candidates, results);

        let best = best.ok_or_else(|| {
            XDateError::model_fit(MODEL, "no candidate order produced a finite forecast")
        })?;
        info!("Selected ARIMA{} with AIC {:.2}", best.order, best.aic);

        let report = FitReport {
            model: ModelKind::AutoRegressive,
            observations: values.len(),
            detail: FitDetail::AutoRegressive {
                order: best.order,
                aic: best.aic,
                candidates: outcomes,
            },
        };
        self.fitted = Some(best);
        Ok(report)
    }

    pub fn predict(&self, steps: usize) -> Result<Vec<f64>> {
        let fit = self
            .fitted
            .as_ref()
            .ok_or_else(|| XDateError::model_fit(MODEL, "predict called before fit"))?;
        Ok(fit.forecast(steps))
    }
}

/// Lowest AIC among the accepted candidates, plus every candidate's outcome.
/// Strict comparison keeps the earliest candidate on ties.
fn select(
    orders: &[ArimaOrder],
    results: Vec<Result<ArimaFit>>,
) -> (Option<ArimaFit>, Vec<CandidateOutcome>) {
    let mut outcomes = Vec::with_capacity(orders.len());
    let mut best: Option<ArimaFit> = None;
    for (order, result) in orders.iter().zip(results) {
        match result {
            Ok(fit) => {
                debug!("ARIMA{} AIC: {:.2}", order, fit.aic);
                outcomes.push(CandidateOutcome {
                    order: *order,
                    aic: Some(fit.aic),
                    rejected: None,
                });
                if best.as_ref().map_or(true, |b| fit.aic < b.aic) {
                    best = Some(fit);
                }
            }
            Err(e) => {
                debug!("ARIMA{} rejected: {}", order, e);
                outcomes.push(CandidateOutcome {
                    order: *order,
                    aic: None,
                    rejected: Some(e.to_string()),
                });
            }
        }
    }
    (best, outcomes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OrderSearch;
    use chrono::NaiveDate;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rand_distr::{Distribution, Normal};

    fn ar1_values(n: usize, phi: f64, seed: u64) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        let noise = Normal::new(0.0, 1.0).unwrap();
        let mut values = Vec::with_capacity(n);
        let mut prev = 0.0;
        for _ in 0..n {
            prev = phi * prev + noise.sample(&mut rng);
            values.push(prev);
        }
        values
    }

    fn to_series(values: &[f64]) -> DailySeries {
        let start = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
        DailySeries::new(
            values
                .iter()
                .enumerate()
                .map(|(i, v)| (start + chrono::Duration::days(i as i64), *v))
                .collect(),
        )
    }

    #[test]
    fn test_recovers_ar1_coefficient() {
        let values = ar1_values(600, 0.6, 7);
        let fit = ArimaFit::estimate(&values, ArimaOrder::new(1, 0, 0)).unwrap();
        assert!((fit.ar[0] - 0.6).abs() < 0.1, "phi = {}", fit.ar[0]);
        assert!(fit.constant.abs() < 0.3);
        assert!(fit.aic.is_finite());
    }

    #[test]
    fn test_arma_fit_is_finite() {
        let values = ar1_values(400, 0.5, 11);
        let fit = ArimaFit::estimate(&values, ArimaOrder::new(1, 0, 1)).unwrap();
        assert_eq!(fit.ar.len(), 1);
        assert_eq!(fit.ma.len(), 1);
        assert!(fit.forecast(30).iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_random_walk_forecast_is_flat() {
        // First difference is the constant 2; with no constant term the
        // differenced forecast is zero, so the level stays at its last value.
        let values: Vec<f64> = (0..40).map(|i| 2.0 * i as f64).collect();
        let fit = ArimaFit::estimate(&values, ArimaOrder::new(0, 1, 0)).unwrap();
        let forecast = fit.forecast(5);
        assert_eq!(forecast.len(), 5);
        assert!(forecast.iter().all(|v| (v - 78.0).abs() < 1e-9));
    }

    #[test]
    fn test_integration_restores_level() {
        let values = ar1_values(300, 0.3, 5)
            .iter()
            .scan(1000.0, |acc, x| {
                *acc += x;
                Some(*acc)
            })
            .collect::<Vec<f64>>();
        let fit = ArimaFit::estimate(&values, ArimaOrder::new(1, 1, 0)).unwrap();
        let last = *values.last().unwrap();
        let first = fit.forecast(1)[0];
        assert!((first - last).abs() < 10.0);
    }

    #[test]
    fn test_stationarity_check() {
        assert!(is_stationary(&[]));
        assert!(is_stationary(&[0.5]));
        assert!(!is_stationary(&[1.0]));
        assert!(is_stationary(&[0.5, 0.3]));
        assert!(!is_stationary(&[0.8, 0.3]));
        assert!(!is_stationary(&[f64::NAN]));
    }

    #[test]
    fn test_too_short_for_order() {
        let values = ar1_values(12, 0.5, 1);
        assert!(matches!(
            ArimaFit::estimate(&values, ArimaOrder::new(2, 0, 2)),
            Err(XDateError::ModelFit { .. })
        ));
    }

    #[test]
    fn test_forecaster_reports_every_candidate() {
        let series = to_series(&ar1_values(365, 0.4, 3));
        let mut model = ArimaForecaster::new(ArimaConfig::default());
        let report = model.fit(&series).unwrap();

        match report.detail {
            FitDetail::AutoRegressive {
                order,
                aic,
                candidates,
            } => {
                assert_eq!(candidates.len(), 4);
                let best = candidates
                    .iter()
                    .filter_map(|c| c.aic)
                    .fold(f64::INFINITY, f64::min);
                assert_eq!(aic, best);
                assert!(candidates.iter().any(|c| c.order == order));
            }
            other => panic!("unexpected detail: {:?}", other),
        }

        let forecast = model.predict(20).unwrap();
        assert_eq!(forecast.len(), 20);
        assert!(forecast.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_degenerate_candidate_is_skipped_for_next_order() {
        let model = ArimaForecaster::new(ArimaConfig::default());
        let values = ar1_values(300, 0.5, 13);
        let good_order = ArimaOrder::new(1, 0, 0);
        let good = model.evaluate(&values, good_order).unwrap();

        // Lower AIC than the good fit, but its first step overflows.
        let bad_order = ArimaOrder::new(1, 0, 1);
        let overflowing = ArimaFit {
            order: bad_order,
            constant: f64::MAX,
            ar: vec![0.9],
            ma: vec![0.0],
            sigma2: 1.0,
            aic: good.aic - 100.0,
            differenced: vec![f64::MAX],
            residuals: vec![0.0],
            level_tails: Vec::new(),
        };
        let screened = model.screen(overflowing);
        assert!(matches!(screened, Err(XDateError::ForecastDegenerate { .. })));

        let (best, outcomes) = select(&[bad_order, good_order], vec![screened, Ok(good)]);
        let best = best.unwrap();
        assert_eq!(best.order, good_order);
        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].order, bad_order);
        assert!(outcomes[0].aic.is_none());
        assert!(outcomes[0].rejected.as_deref().unwrap().contains("non-finite"));
        assert_eq!(outcomes[1].aic, Some(best.aic));
    }

    #[test]
    fn test_auto_search_enumerates_orders() {
        let config = ArimaConfig {
            search: OrderSearch::Auto {
                max_p: 1,
                max_d: 1,
                max_q: 1,
            },
            ..ArimaConfig::default()
        };
        let series = to_series(&ar1_values(200, 0.5, 9));
        let mut model = ArimaForecaster::new(config);
        let report = model.fit(&series).unwrap();
        match report.detail {
            FitDetail::AutoRegressive { candidates, .. } => assert_eq!(candidates.len(), 8),
            other => panic!("unexpected detail: {:?}", other),
        }
    }

    #[test]
    fn test_short_history_is_insufficient() {
        let series = to_series(&ar1_values(20, 0.5, 2));
        let mut model = ArimaForecaster::new(ArimaConfig::default());
        assert!(matches!(
            model.fit(&series),
            Err(XDateError::InsufficientData { .. })
        ));
        assert!(model.fitted().is_none());
    }
}
