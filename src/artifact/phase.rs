//! Pipeline phases and logical artifact type names

use serde::{Deserialize, Serialize};
use std::fmt;

/// A pipeline phase. Every artifact is filed under the phase that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Normalization,
    Canonicalization,
    PatternDetection,
    Drafting,
    Synthesis,
}

impl Phase {
    /// All phases in pipeline order.
    pub const ALL: [Phase; 5] = [
        Phase::Normalization,
        Phase::Canonicalization,
        Phase::PatternDetection,
        Phase::Drafting,
        Phase::Synthesis,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normalization => "normalization",
            Self::Canonicalization => "canonicalization",
            Self::PatternDetection => "pattern_detection",
            Self::Drafting => "drafting",
            Self::Synthesis => "synthesis",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Logical artifact type names as consumers request them.
///
/// Older physical spellings are resolved through [`super::AliasTable`].
pub mod artifact_type {
    pub const NORMALIZED_NOTES: &str = "normalized_notes";
    pub const CANONICAL_DATASET: &str = "canonical_dataset";
    pub const PATTERN_SUMMARY: &str = "pattern_summary";
    pub const DRAFTED_SECTIONS: &str = "drafted_sections";
    pub const FINAL_BUNDLE: &str = "final_bundle";
}
