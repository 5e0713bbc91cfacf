//! Canonical dataset: merged slots, deduplicated citations, diversity
//!
//! All slot matching here goes through [`SlotId`]; a raw-string comparison
//! between the normalizer's keys and the expected keys would silently drop
//! every citation of a slot spelled the other way.

use super::diversity::DiversityMetrics;
use super::normalize::NormalizedNotes;
use crate::model::{identity_key, Citation, RunId, SlotId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use tracing::{info, trace, warn};

/// One slot's content as seen by pattern detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalSlot {
    pub fields: Map<String, Value>,
    /// The slot's own citation list; note-local `[n]` markers index into it
    pub citations: Vec<Citation>,
}

/// A deduplicated citation with its 1-based canonical id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedCitation {
    pub id: u32,
    pub title: String,
    pub url: String,
    pub source: String,
    #[serde(default)]
    pub domain: Option<String>,
    /// Slots that cited this URL, in slot order
    #[serde(default)]
    pub slots: Vec<SlotId>,
}

/// Builder output, persisted as `canonicalization/canonical_dataset`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalDataset {
    pub run_id: RunId,
    pub slots: BTreeMap<SlotId, CanonicalSlot>,
    #[serde(default)]
    pub missing_slots: Vec<SlotId>,
    #[serde(default)]
    pub citations: Vec<AggregatedCitation>,
    #[serde(default)]
    pub diversity: DiversityMetrics,
}

impl CanonicalDataset {
    /// Look up a slot by any spelling.
    pub fn slot(&self, raw_slot: &str) -> Option<&CanonicalSlot> {
        SlotId::parse(raw_slot).ok().and_then(|id| self.slots.get(&id))
    }

    pub fn present_slots(&self) -> Vec<SlotId> {
        self.slots.keys().cloned().collect()
    }

    /// Index from URL identity key to canonical id.
    pub fn citation_index(&self) -> CitationIndex {
        CitationIndex {
            by_key: self
                .citations
                .iter()
                .map(|c| (identity_key(&c.url), c.id))
                .collect(),
        }
    }
}

/// Maps note-local citation references onto canonical ids.
#[derive(Debug, Clone, Default)]
pub struct CitationIndex {
    by_key: HashMap<String, u32>,
}

impl CitationIndex {
    pub fn by_url(&self, url: &str) -> Option<u32> {
        self.by_key.get(&identity_key(url)).copied()
    }

    /// Resolve a 1-based marker into `slot_citations`.
    pub fn by_local(&self, slot_citations: &[Citation], local: u32) -> Option<u32> {
        let index = usize::try_from(local).ok()?.checked_sub(1)?;
        slot_citations.get(index).and_then(|c| self.by_url(&c.url))
    }
}

pub struct CanonicalBuilder;

impl CanonicalBuilder {
    /// Merge completed notes into one dataset.
    ///
    /// `expected` lists every slot the run should have; any without a
    /// completed note is recorded in `missing_slots`. Citations are
    /// deduplicated by URL identity across slots, first occurrence in slot
    /// order winning.
    pub fn build(normalized: &NormalizedNotes, expected: &[SlotId]) -> CanonicalDataset {
        let mut slots = BTreeMap::new();
        for (slot, note) in &normalized.slots {
            if !note.is_present() {
                trace!(run_id = %normalized.run_id, slot = %slot, status = note.status.as_str(), "slot not completed");
                continue;
            }
            slots.insert(
                slot.clone(),
                CanonicalSlot {
                    fields: note.fields.clone(),
                    citations: note.citations.clone(),
                },
            );
        }

        let mut missing_slots: Vec<SlotId> = expected
            .iter()
            .filter(|slot| !slots.contains_key(*slot))
            .cloned()
            .collect();
        missing_slots.sort();
        missing_slots.dedup();

        let mut citations: Vec<AggregatedCitation> = Vec::new();
        let mut seen: HashMap<String, usize> = HashMap::new();
        let mut total_before_dedup = 0usize;
        for (slot, content) in &slots {
            for citation in &content.citations {
                total_before_dedup += 1;
                let key = citation.identity_key();
                match seen.get(&key) {
                    Some(&index) => {
                        let entry = &mut citations[index];
                        if !entry.slots.contains(slot) {
                            entry.slots.push(slot.clone());
                        }
                    }
                    None => {
                        seen.insert(key, citations.len());
                        citations.push(AggregatedCitation {
                            id: citations.len() as u32 + 1,
                            title: citation.title.clone(),
                            url: citation.url.clone(),
                            source: citation.source.clone(),
                            domain: citation.domain(),
                            slots: vec![slot.clone()],
                        });
                    }
                }
            }
        }

        let diversity = DiversityMetrics::from_domains(
            citations.iter().filter_map(|c| c.domain.clone()),
            total_before_dedup,
            citations.len(),
        );

        info!(
            run_id = %normalized.run_id,
            slots = slots.len(),
            missing = missing_slots.len(),
            citations = citations.len(),
            duplicates_removed = diversity.duplicates_removed,
            unique_domains = diversity.unique_domains,
            diversity = diversity.score,
            "canonical dataset built"
        );

        CanonicalDataset {
            run_id: normalized.run_id.clone(),
            slots,
            missing_slots,
            citations,
            diversity,
        }
    }

    /// As [`Self::build`], with expected keys in any historical spelling.
    /// Keys that cannot be canonicalized are ignored with a warning.
    pub fn build_from_keys<S: AsRef<str>>(normalized: &NormalizedNotes, expected: &[S]) -> CanonicalDataset {
        let expected: Vec<SlotId> = expected
            .iter()
            .filter_map(|raw| match SlotId::parse(raw.as_ref()) {
                Ok(slot) => Some(slot),
                Err(e) => {
                    warn!(error = %e, "expected slot key ignored");
                    None
                }
            })
            .collect();
        Self::build(normalized, &expected)
    }
}
