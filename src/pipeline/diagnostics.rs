//! Recovered-condition signals
//!
//! Conditions that degrade a report without failing it are collected here so
//! operators can tell a thin report caused by schema drift or bad input from
//! one that genuinely had little evidence. Each entry is also logged at WARN
//! where it is raised.

use super::patterns::PatternKind;
use crate::artifact::Phase;
use crate::compose::SectionCode;
use crate::model::SlotId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    /// A note's payload or citation field could not be decoded; treated as empty
    MalformedRecord {
        slot: String,
        location: String,
        detail: String,
    },
    /// A raw slot identifier could not be canonicalized; the note was skipped
    UnrecognizedSlot { raw: String },
    /// Two raw notes canonicalized to the same slot; one was kept
    DuplicateSlot { slot: SlotId, dropped: String },
    /// None of a pattern's candidate fields exist in a slot that is present
    SchemaMismatch {
        pattern: PatternKind,
        slot: SlotId,
        candidate_fields: Vec<String>,
    },
    /// Drafted markup used tags, attributes or classes outside the allow-list
    ValidationRejection {
        section: SectionCode,
        tags: Vec<String>,
        attributes: Vec<String>,
        classes: Vec<String>,
    },
    /// A cached artifact existed but could not be used
    ArtifactCorruption {
        phase: Phase,
        artifact_type: String,
        reason: String,
    },
}

/// Ordered collection of diagnostics for one synthesis call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.entries.push(diagnostic);
    }

    pub fn extend(&mut self, other: impl IntoIterator<Item = Diagnostic>) {
        self.entries.extend(other);
    }

    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn malformed_records(&self) -> usize {
        self.count(|d| matches!(d, Diagnostic::MalformedRecord { .. }))
    }

    pub fn schema_mismatches(&self) -> usize {
        self.count(|d| matches!(d, Diagnostic::SchemaMismatch { .. }))
    }

    pub fn validation_rejections(&self) -> usize {
        self.count(|d| matches!(d, Diagnostic::ValidationRejection { .. }))
    }

    pub fn artifact_corruptions(&self) -> usize {
        self.count(|d| matches!(d, Diagnostic::ArtifactCorruption { .. }))
    }

    /// Schema mismatches raised for one pattern kind.
    pub fn schema_mismatches_for(&self, pattern: PatternKind) -> Vec<&SlotId> {
        self.entries
            .iter()
            .filter_map(|d| match d {
                Diagnostic::SchemaMismatch { pattern: p, slot, .. } if *p == pattern => Some(slot),
                _ => None,
            })
            .collect()
    }

    fn count(&self, pred: impl Fn(&Diagnostic) -> bool) -> usize {
        self.entries.iter().filter(|d| pred(d)).count()
    }
}

impl IntoIterator for Diagnostics {
    type Item = Diagnostic;
    type IntoIter = std::vec::IntoIter<Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}
