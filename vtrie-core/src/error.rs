//! Error taxonomy for the pipeline. Each failure kind gets its own variant so
//! callers can distinguish abort-worthy errors (`InputMissing`,
//! `CatalogInvalid`) from per-row/per-task errors that are recorded and
//! skipped (`Geometric`, `DataIntegrity`, `NumericAnomaly`, `TaskFailure`).

#[derive(thiserror::Error, Debug, Clone)]
pub enum PipelineError {
    #[error("input missing: {0}")]
    InputMissing(String),

    #[error("catalog invalid for route {route_id} direction {direction}: {reason}")]
    CatalogInvalid {
        route_id: String,
        direction: u8,
        reason: String,
    },

    #[error("geometric error: {0}")]
    Geometric(String),

    #[error("data integrity error: {0}")]
    DataIntegrity(String),

    #[error("numeric anomaly: {0}")]
    NumericAnomaly(String),

    #[error("task failure for route {route_id} direction {direction}: {reason}")]
    TaskFailure {
        route_id: String,
        direction: u8,
        reason: String,
    },
}

impl PipelineError {
    /// the error-kind label used in manifest rows, stable across variants'
    /// message text so downstream tooling can group by kind.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::InputMissing(_) => "InputMissing",
            PipelineError::CatalogInvalid { .. } => "CatalogInvalid",
            PipelineError::Geometric(_) => "Geometric",
            PipelineError::DataIntegrity(_) => "DataIntegrity",
            PipelineError::NumericAnomaly(_) => "NumericAnomaly",
            PipelineError::TaskFailure { .. } => "TaskFailure",
        }
    }

    /// true for errors that should abort the job before workers start.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            PipelineError::InputMissing(_) | PipelineError::CatalogInvalid { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
