use thiserror::Error;

#[derive(Error, Debug)]
pub enum XDateError {
    #[error("Missing required column: {0}")]
    MissingColumn(String),

    #[error("No valid rows remain after numeric coercion")]
    EmptySeries,

    #[error("Insufficient data: need at least {required} observations, got {actual}")]
    InsufficientData { required: usize, actual: usize },

    #[error("Model {model} failed to fit: {reason}")]
    ModelFit { model: String, reason: String },

    #[error("Model {model} produced non-finite forecast values")]
    ForecastDegenerate { model: String },

    #[error("Simulation error: {0}")]
    Simulation(String),

    #[error("No forecaster could be fitted and the historical average fallback is unavailable")]
    EngineExhausted,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Date calculation error: {0}")]
    DateError(String),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl XDateError {
    /// True for the data-shape failures raised by loading and feature building.
    pub fn is_data_error(&self) -> bool {
        matches!(
            self,
            XDateError::MissingColumn(_)
                | XDateError::EmptySeries
                | XDateError::InsufficientData { .. }
        )
    }

    pub(crate) fn model_fit(model: impl Into<String>, reason: impl Into<String>) -> Self {
        XDateError::ModelFit {
            model: model.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, XDateError>;
