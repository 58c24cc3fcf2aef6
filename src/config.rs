use crate::error::{Result, XDateError};
use chrono::NaiveDate;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// The forecasters the engine can fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "PascalCase")]
pub enum ModelKind {
    #[schemars(description = "ARIMA-family model selected by AIC over candidate (p,d,q) orders")]
    AutoRegressive,

    #[schemars(description = "Baseline-year seasonal factors scaled by a clamped year-over-year growth ratio")]
    SeasonalGrowth,

    #[schemars(description = "Random-forest regression on calendar, lag and rolling features")]
    TreeEnsemble,
}

impl ModelKind {
    pub const ALL: [ModelKind; 3] = [
        ModelKind::AutoRegressive,
        ModelKind::SeasonalGrowth,
        ModelKind::TreeEnsemble,
    ];

    /// Column/scenario name used in forecast tables.
    pub fn name(self) -> &'static str {
        match self {
            ModelKind::AutoRegressive => "ARIMA",
            ModelKind::SeasonalGrowth => "Seasonal",
            ModelKind::TreeEnsemble => "RandomForest",
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ArimaOrder {
    #[schemars(description = "Autoregressive order")]
    pub p: usize,
    #[schemars(description = "Differencing order")]
    pub d: usize,
    #[schemars(description = "Moving-average order")]
    pub q: usize,
}

impl ArimaOrder {
    pub const fn new(p: usize, d: usize, q: usize) -> Self {
        Self { p, d, q }
    }
}

impl fmt::Display for ArimaOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{},{})", self.p, self.d, self.q)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "mode", rename_all = "PascalCase")]
pub enum OrderSearch {
    #[schemars(description = "Try exactly these orders")]
    Fixed { orders: Vec<ArimaOrder> },

    #[schemars(description = "Try every order with p <= max_p, d <= max_d, q <= max_q")]
    Auto {
        max_p: usize,
        max_d: usize,
        max_q: usize,
    },
}

impl OrderSearch {
    pub fn candidates(&self) -> Vec<ArimaOrder> {
        match self {
            OrderSearch::Fixed { orders } => orders.clone(),
            OrderSearch::Auto { max_p, max_d, max_q } => {
                let mut out = Vec::new();
                for d in 0..=*max_d {
                    for p in 0..=*max_p {
                        for q in 0..=*max_q {
                            out.push(ArimaOrder::new(p, d, q));
                        }
                    }
                }
                out
            }
        }
    }
}

impl Default for OrderSearch {
    fn default() -> Self {
        OrderSearch::Fixed {
            orders: vec![
                ArimaOrder::new(1, 0, 1),
                ArimaOrder::new(1, 1, 1),
                ArimaOrder::new(2, 0, 1),
                ArimaOrder::new(1, 0, 2),
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ArimaConfig {
    pub search: OrderSearch,

    #[schemars(description = "Steps in the short test forecast that must be all finite for a candidate to be accepted")]
    pub test_steps: usize,

    #[schemars(description = "Minimum history length before any candidate is tried")]
    pub min_observations: usize,
}

impl Default for ArimaConfig {
    fn default() -> Self {
        Self {
            search: OrderSearch::default(),
            test_steps: 5,
            min_observations: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct SeasonalConfig {
    #[schemars(description = "Year whose daily pattern defines the seasonal factors. Defaults to the year before the last observation.")]
    pub baseline_year: Option<i32>,

    pub growth_floor: f64,

    pub growth_cap: f64,
}

impl Default for SeasonalConfig {
    fn default() -> Self {
        Self {
            baseline_year: None,
            growth_floor: 0.5,
            growth_cap: 2.0,
        }
    }
}

impl SeasonalConfig {
    pub fn validate(&self) -> Result<()> {
        let (floor, cap) = (self.growth_floor, self.growth_cap);
        if !(floor.is_finite() && cap.is_finite() && floor > 0.0 && floor <= cap) {
            return Err(XDateError::InvalidConfig(format!(
                "seasonal growth bounds [{}, {}] are not a valid positive interval",
                floor, cap
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ForestConfig {
    pub n_trees: usize,
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,

    #[schemars(description = "Trailing share of feature rows held out (chronologically) for evaluation")]
    pub test_fraction: f64,

    pub seed: u64,

    #[schemars(description = "Features considered per split. None uses every feature.")]
    pub max_features: Option<usize>,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            n_trees: 50,
            max_depth: 10,
            min_samples_split: 2,
            min_samples_leaf: 1,
            test_fraction: 0.2,
            seed: 42,
            max_features: None,
        }
    }
}

impl ForestConfig {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..1.0).contains(&self.test_fraction) {
            return Err(XDateError::InvalidConfig(format!(
                "forest.test_fraction must be in [0, 1), got {}",
                self.test_fraction
            )));
        }
        if self.n_trees == 0 {
            return Err(XDateError::InvalidConfig(
                "forest.n_trees must be at least one".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ForecastConfig {
    #[schemars(description = "Which forecasters to fit. Each one fails independently.")]
    pub models: Vec<ModelKind>,

    pub arima: ArimaConfig,
    pub seasonal: SeasonalConfig,
    pub forest: ForestConfig,

    #[schemars(description = "Seed for the historical-average fallback draw")]
    pub fallback_seed: u64,

    #[schemars(description = "Multiplier applied to the historical standard deviation in the fallback draw")]
    pub fallback_std_scale: f64,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            models: ModelKind::ALL.to_vec(),
            arima: ArimaConfig::default(),
            seasonal: SeasonalConfig::default(),
            forest: ForestConfig::default(),
            fallback_seed: 42,
            fallback_std_scale: 0.5,
        }
    }
}

impl ForecastConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.fallback_std_scale.is_finite() && self.fallback_std_scale >= 0.0) {
            return Err(XDateError::InvalidConfig(format!(
                "fallback_std_scale must be finite and non-negative, got {}",
                self.fallback_std_scale
            )));
        }
        self.seasonal.validate()?;
        self.forest.validate()
    }
}

/// Fixed constants of one simulation. Amounts are in millions of USD.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct SimulationConfig {
    #[schemars(description = "Statutory borrowing ceiling")]
    pub debt_ceiling: f64,

    #[schemars(description = "Total extraordinary measures available at the start of the run")]
    pub extraordinary_measures_capacity: f64,

    #[schemars(description = "Cash floor below which measures are drawn or new debt issued")]
    pub minimum_operating_cash: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            debt_ceiling: 36_100_000.0,
            extraordinary_measures_capacity: 820_000.0,
            minimum_operating_cash: 50_000.0,
        }
    }
}

impl SimulationConfig {
    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("debt_ceiling", self.debt_ceiling),
            (
                "extraordinary_measures_capacity",
                self.extraordinary_measures_capacity,
            ),
            ("minimum_operating_cash", self.minimum_operating_cash),
        ];
        for (name, value) in fields {
            if !value.is_finite() || value < 0.0 {
                return Err(XDateError::InvalidConfig(format!(
                    "{} must be a finite non-negative amount, got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct PipelineConfig {
    #[schemars(description = "Number of future days to forecast and simulate")]
    pub horizon_days: usize,

    #[schemars(description = "Restrict history to this inclusive range before fitting")]
    pub date_range: Option<DateRange>,

    pub forecast: ForecastConfig,
    pub simulation: SimulationConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            horizon_days: 120,
            date_range: None,
            forecast: ForecastConfig::default(),
            simulation: SimulationConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: PipelineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    pub fn validate(&self) -> Result<()> {
        if self.horizon_days == 0 {
            return Err(XDateError::InvalidConfig(
                "horizon_days must be greater than zero".to_string(),
            ));
        }
        if let Some(range) = &self.date_range {
            if range.end < range.start {
                return Err(XDateError::InvalidConfig(format!(
                    "date_range ends ({}) before it starts ({})",
                    range.end, range.start
                )));
            }
        }
        self.forecast.validate()?;
        self.simulation.validate()
    }

    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(PipelineConfig)
    }

    pub fn schema_as_json() -> std::result::Result<String, serde_json::Error> {
        let schema = Self::generate_json_schema();
        serde_json::to_string_pretty(&schema)
    }
}
