use thiserror::Error;

/// Fatal input defects detected before any estimation or matching runs.
///
/// These abort the current batch; they are never coerced to defaults.
#[derive(Debug, Error)]
pub enum PreconditionViolation {
    #[error("missing column '{column}' in {table} table")]
    MissingColumn {
        table: &'static str,
        column: String,
    },
    #[error("covariate '{column}' has a non-numeric or missing value at row {row}")]
    NonNumericCovariate { column: String, row: usize },
    #[error("covariate '{column}' has zero variance")]
    ZeroVarianceCovariate { column: String },
    #[error("pooled table contains a single origin class; need both target and donor rows")]
    SingleOriginClass,
    #[error("donor pool has {available} rows but {required} neighbors were requested")]
    DonorPoolTooSmall { available: usize, required: usize },
}

#[derive(Debug, Error)]
pub enum EnrichError {
    #[error(transparent)]
    Precondition(#[from] PreconditionViolation),
    #[error("propensity model failed to converge after {iterations} iterations (last step {last_step:e})")]
    EstimationFailure { iterations: usize, last_step: f64 },
    #[error("propensity model produced a singular system: {reason}")]
    SingularSystem { reason: String },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required field: {field}")]
    MissingField { field: &'static str },
    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}
