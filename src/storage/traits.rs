//! Storage trait definitions

use crate::model::{ResearchNote, Run, RunId};
use chrono::{DateTime, Utc};
use std::path::Path;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Date parsing error: {0}")]
    DateParse(String),

    #[error("Invalid stored value: {0}")]
    InvalidValue(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Row id of a persisted artifact
pub type ArtifactId = i64;

/// One persisted artifact row, exactly as written.
///
/// `payload` is kept as text: a row whose payload no longer parses is a
/// cache miss for the reader, not a storage failure.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredArtifact {
    pub id: ArtifactId,
    pub run_id: RunId,
    pub phase: String,
    pub artifact_type: String,
    pub payload: String,
    pub created_at: DateTime<Utc>,
}

/// Read interface onto the external note producer's output.
pub trait NoteStore: Send + Sync {
    /// All raw notes recorded for a run, in no particular order.
    fn get_notes(&self, run_id: &RunId) -> StorageResult<Vec<ResearchNote>>;
}

/// Run bookkeeping.
pub trait RunStore: Send + Sync {
    /// Create or update a run
    fn save_run(&self, run: &Run) -> StorageResult<()>;

    /// Load a run by ID
    fn load_run(&self, id: &RunId) -> StorageResult<Option<Run>>;
}

/// Append-only artifact persistence.
///
/// Implementations must never update or delete a row once written. Readers
/// always observe either no row or one complete row.
pub trait ArtifactStore: Send + Sync {
    /// Append a new artifact row and return its id.
    fn save_artifact(
        &self,
        run_id: &RunId,
        phase: &str,
        artifact_type: &str,
        payload: &str,
    ) -> StorageResult<ArtifactId>;

    /// The most recently created artifact for `(run, phase)` whose type is any
    /// of `artifact_types`. Ties on `created_at` go to the higher row id.
    fn load_latest(
        &self,
        run_id: &RunId,
        phase: &str,
        artifact_types: &[&str],
    ) -> StorageResult<Option<StoredArtifact>>;

    /// Number of rows for `(run, phase, type)`.
    fn count_artifacts(&self, run_id: &RunId, phase: &str, artifact_type: &str) -> StorageResult<usize>;
}

/// Extension trait for opening stores from paths
pub trait OpenStore: Sized {
    /// Open or create a store at the given path
    fn open(path: impl AsRef<Path>) -> StorageResult<Self>;

    /// Create an in-memory store (useful for testing)
    fn open_in_memory() -> StorageResult<Self>;
}

/// Decode a raw JSON text column, keeping unparseable text as a JSON string
/// so callers can treat it as malformed instead of failing the read.
pub(crate) fn decode_lenient(raw: Option<String>) -> serde_json::Value {
    match raw {
        None => serde_json::Value::Null,
        Some(text) => serde_json::from_str(&text).unwrap_or(serde_json::Value::String(text)),
    }
}
