//! Error definitions for metric accumulation.

use thiserror::Error;

pub type MetricResult<T> = Result<T, MetricError>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MetricError {
    #[error("`labels` and `{operand}` have mismatched shapes: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        operand: &'static str,
        expected: Vec<usize>,
        found: Vec<usize>,
    },
    #[error("metric {name} has no device phase; nothing to finalize on the host")]
    NoDevicePhase { name: String },
    #[error("metric {name} received host outputs without a value")]
    MissingDeviceOutput { name: String },
    #[error("num_classes must be at least 1")]
    InvalidNumClasses,
    #[error("device-to-host transfer failed: {0}")]
    Transfer(String),
}
