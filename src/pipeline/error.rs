//! Fatal pipeline errors

use super::config::ConfigError;
use crate::model::{RunId, SlotId};
use crate::storage::StorageError;
use thiserror::Error;

/// Errors that abort a synthesis call.
///
/// Recoverable conditions are not errors; see [`super::Diagnostics`].
#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error("run not found: {0}")]
    RunNotFound(RunId),

    #[error("no research notes recorded for run {0}")]
    NoNotes(RunId),

    #[error(
        "missing required input: core slots [{}] absent, coverage {coverage:.2} (threshold {threshold:.2})",
        .missing_core.iter().map(|s| s.to_string()).collect::<Vec<_>>().join(", ")
    )]
    MissingRequiredInput {
        missing_core: Vec<SlotId>,
        coverage: f64,
        threshold: f64,
    },

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for pipeline operations
pub type SynthesisResult<T> = Result<T, SynthesisError>;
