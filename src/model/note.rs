//! Research notes as produced by the external note producer

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Lifecycle state of a research note.
///
/// Note producers have used several spellings over time; all are accepted on read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoteStatus {
    #[serde(alias = "complete", alias = "success", alias = "done")]
    Completed,
    #[serde(alias = "error")]
    Failed,
    #[serde(alias = "queued", alias = "running")]
    Pending,
}

impl NoteStatus {
    /// Lenient parse used by storage backends. Unknown values are `Pending`.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "completed" | "complete" | "success" | "done" => Self::Completed,
            "failed" | "error" => Self::Failed,
            _ => Self::Pending,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Pending => "pending",
        }
    }
}

/// One raw research note for a (run, slot).
///
/// `slot_id` is stored exactly as the producer wrote it; use
/// [`crate::SlotId::parse`] before comparing. `fields` and `citations` are raw
/// JSON: either may be a JSON-encoded string, or malformed, and the normalizer
/// decides how to recover.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchNote {
    pub slot_id: String,
    pub status: NoteStatus,
    #[serde(default)]
    pub fields: Value,
    #[serde(default)]
    pub citations: Value,
    #[serde(default)]
    pub tokens_used: u64,
    #[serde(default)]
    pub duration_ms: u64,
}

impl ResearchNote {
    /// A completed note with an object payload and no dedicated citations.
    pub fn new(slot_id: impl Into<String>, fields: Value) -> Self {
        Self {
            slot_id: slot_id.into(),
            status: NoteStatus::Completed,
            fields,
            citations: Value::Null,
            tokens_used: 0,
            duration_ms: 0,
        }
    }

    pub fn with_status(mut self, status: NoteStatus) -> Self {
        self.status = status;
        self
    }

    /// Set the dedicated (out-of-payload) citation field.
    pub fn with_citations(mut self, citations: Value) -> Self {
        self.citations = citations;
        self
    }

    pub fn with_telemetry(mut self, tokens_used: u64, duration_ms: u64) -> Self {
        self.tokens_used = tokens_used;
        self.duration_ms = duration_ms;
        self
    }
}
