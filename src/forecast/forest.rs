//! Random-forest regression over engineered feature rows.
//!
//! Trees are CART regressors split on variance reduction, each grown on its
//! own bootstrap sample with an RNG seeded from `seed + tree_index`, so the
//! forest is reproducible regardless of how rayon schedules the work.

use crate::config::{ForestConfig, ModelKind};
use crate::error::{Result, XDateError};
use crate::features::{FeatureBuilder, FEATURE_COUNT};
use crate::forecast::{FitDetail, FitReport};
use crate::series::DailySeries;
use chrono::NaiveDate;
use log::info;
use rand::prelude::*;
use rand::rngs::StdRng;
use rayon::prelude::*;

const MODEL: &str = "RandomForest";

pub type FeatureVector = [f64; FEATURE_COUNT];

#[derive(Debug, Clone)]
enum Node {
    Leaf(f64),
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

impl Node {
    fn predict(&self, x: &FeatureVector) -> f64 {
        let mut node = self;
        loop {
            match node {
                Node::Leaf(v) => return *v,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if x[*feature] <= *threshold { left } else { right };
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct GrowParams {
    max_depth: usize,
    min_samples_split: usize,
    min_samples_leaf: usize,
    max_features: usize,
}

struct BestSplit {
    feature: usize,
    threshold: f64,
    sse: f64,
}

fn sse_of(sum: f64, sum_sq: f64, n: usize) -> f64 {
    (sum_sq - sum * sum / n as f64).max(0.0)
}

fn grow(
    x: &[FeatureVector],
    y: &[f64],
    indices: &[usize],
    depth: usize,
    params: GrowParams,
    rng: &mut StdRng,
) -> Node {
    let n = indices.len();
    let sum: f64 = indices.iter().map(|&i| y[i]).sum();
    let sum_sq: f64 = indices.iter().map(|&i| y[i] * y[i]).sum();
    let leaf = Node::Leaf(sum / n as f64);
    let node_sse = sse_of(sum, sum_sq, n);

    if depth >= params.max_depth || n < params.min_samples_split || node_sse <= f64::EPSILON {
        return leaf;
    }

    let features: Vec<usize> = if params.max_features >= FEATURE_COUNT {
        (0..FEATURE_COUNT).collect()
    } else {
        let mut chosen = rand::seq::index::sample(rng, FEATURE_COUNT, params.max_features).into_vec();
        chosen.sort_unstable();
        chosen
    };

    let mut best: Option<BestSplit> = None;
    let mut sorted = indices.to_vec();
    for &feature in &features {
        sorted.sort_by(|&a, &b| x[a][feature].total_cmp(&x[b][feature]));

        let mut left_sum = 0.0;
        let mut left_sq = 0.0;
        for k in 1..n {
            let yi = y[sorted[k - 1]];
            left_sum += yi;
            left_sq += yi * yi;

            if k < params.min_samples_leaf || n - k < params.min_samples_leaf {
                continue;
            }
            let lo = x[sorted[k - 1]][feature];
            let hi = x[sorted[k]][feature];
            if lo == hi {
                continue;
            }

            let sse = sse_of(left_sum, left_sq, k) + sse_of(sum - left_sum, sum_sq - left_sq, n - k);
            if best.as_ref().map_or(true, |b| sse < b.sse) {
                best = Some(BestSplit {
                    feature,
                    threshold: 0.5 * (lo + hi),
                    sse,
                });
            }
        }
    }

    let Some(split) = best.filter(|b| b.sse < node_sse) else {
        return leaf;
    };

    let (left_idx, right_idx): (Vec<usize>, Vec<usize>) = indices
        .iter()
        .copied()
        .partition(|&i| x[i][split.feature] <= split.threshold);

    Node::Split {
        feature: split.feature,
        threshold: split.threshold,
        left: Box::new(grow(x, y, &left_idx, depth + 1, params, rng)),
        right: Box::new(grow(x, y, &right_idx, depth + 1, params, rng)),
    }
}

#[derive(Debug, Clone)]
pub struct RandomForest {
    trees: Vec<Node>,
}

impl RandomForest {
    pub fn train(x: &[FeatureVector], y: &[f64], config: &ForestConfig) -> Result<Self> {
        if x.is_empty() || x.len() != y.len() {
            return Err(XDateError::model_fit(
                MODEL,
                format!("{} feature rows for {} targets", x.len(), y.len()),
            ));
        }
        if config.n_trees == 0 {
            return Err(XDateError::model_fit(MODEL, "n_trees must be positive"));
        }

        let params = GrowParams {
            max_depth: config.max_depth,
            min_samples_split: config.min_samples_split.max(2),
            min_samples_leaf: config.min_samples_leaf.max(1),
            max_features: config.max_features.unwrap_or(FEATURE_COUNT).clamp(1, FEATURE_COUNT),
        };
        let n = x.len();

        let trees = (0..config.n_trees)
            .into_par_iter()
            .map(|tree| {
                let mut rng = StdRng::seed_from_u64(config.seed.wrapping_add(tree as u64));
                let sample: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
                grow(x, y, &sample, 0, params, &mut rng)
            })
            .collect();

        Ok(Self { trees })
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn predict(&self, x: &FeatureVector) -> f64 {
        self.trees.iter().map(|t| t.predict(x)).sum::<f64>() / self.trees.len() as f64
    }
}

#[derive(Debug, Clone)]
pub struct ForestForecaster {
    config: ForestConfig,
    forest: Option<RandomForest>,
    history: DailySeries,
}

impl ForestForecaster {
    pub fn new(config: ForestConfig) -> Self {
        Self {
            config,
            forest: None,
            history: DailySeries::default(),
        }
    }

    pub fn fit(&mut self, history: &DailySeries) -> Result<FitReport> {
        self.forest = None;
        self.config
            .validate()
            .map_err(|e| XDateError::model_fit(MODEL, e.to_string()))?;
        let rows = FeatureBuilder::build(history)?;
        let (x, y): (Vec<FeatureVector>, Vec<f64>) = rows
            .iter()
            .filter_map(|r| r.net_flow.map(|v| (r.to_vector(), v)))
            .unzip();

        // Chronological hold-out; rows are already in date order.
        let test_rows = (x.len() as f64 * self.config.test_fraction).floor() as usize;
        let train_rows = x.len() - test_rows;
        let forest = RandomForest::train(&x[..train_rows], &y[..train_rows], &self.config)?;

        let errors: Vec<f64> = x[train_rows..]
            .iter()
            .zip(&y[train_rows..])
            .map(|(xi, yi)| forest.predict(xi) - yi)
            .collect();
        let (test_mae, test_rmse) = if errors.is_empty() {
            (None, None)
        } else {
            let n = errors.len() as f64;
            (
                Some(errors.iter().map(|e| e.abs()).sum::<f64>() / n),
                Some((errors.iter().map(|e| e * e).sum::<f64>() / n).sqrt()),
            )
        };
        info!(
            "Random forest: {} trees on {} rows, hold-out MAE {:?}, RMSE {:?}",
            forest.n_trees(),
            train_rows,
            test_mae,
            test_rmse
        );

        let report = FitReport {
            model: ModelKind::TreeEnsemble,
            observations: history.len(),
            detail: FitDetail::TreeEnsemble {
                n_trees: forest.n_trees(),
                train_rows,
                test_rows,
                test_mae,
                test_rmse,
            },
        };
        self.forest = Some(forest);
        self.history = history.clone();
        Ok(report)
    }

    pub fn predict(&self, dates: &[NaiveDate]) -> Result<Vec<f64>> {
        let forest = self
            .forest
            .as_ref()
            .ok_or_else(|| XDateError::model_fit(MODEL, "predict called before fit"))?;
        let rows = FeatureBuilder::future_rows(&self.history, dates)?;
        Ok(rows.iter().map(|r| forest.predict(&r.to_vector())).collect())
    }
}
