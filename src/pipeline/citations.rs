//! Citation resolver: in-text markers against the canonical list

use crate::compose::Section;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{info, warn};

static MARKER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[(\d+)\]").expect("valid marker pattern"));

/// Marker audit across all sections.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CitationCoverage {
    /// Every marker occurrence, valid or not
    pub total_markers: usize,
    /// Distinct ids referenced that are outside `1..=citation_count`
    pub phantom: Vec<u32>,
    /// Valid ids never referenced
    pub unused: Vec<u32>,
    /// Share of canonical citations referenced at least once
    pub coverage_ratio: f64,
}

/// Bracketed numeric markers in `text`, in order of appearance.
pub fn extract_markers(text: &str) -> Vec<u32> {
    MARKER
        .captures_iter(text)
        .filter_map(|c| c[1].parse::<u32>().ok())
        .collect()
}

pub struct CitationResolver;

impl CitationResolver {
    /// Record each section's referenced ids in `citations_used` and audit
    /// them against a canonical list of `citation_count` entries. Never fails;
    /// phantom markers are reported, not removed.
    pub fn resolve(sections: &mut [Section], citation_count: usize) -> CitationCoverage {
        let valid = 1..=citation_count as u32;
        let mut referenced = BTreeSet::new();
        let mut phantom = BTreeSet::new();
        let mut total_markers = 0usize;

        for section in sections.iter_mut() {
            let markers = extract_markers(&section.content);
            total_markers += markers.len();
            let used: BTreeSet<u32> = markers.into_iter().collect();
            for id in &used {
                if valid.contains(id) {
                    referenced.insert(*id);
                } else {
                    phantom.insert(*id);
                }
            }
            section.citations_used = used.into_iter().collect();
        }

        let unused: Vec<u32> = valid.clone().filter(|id| !referenced.contains(id)).collect();
        let coverage_ratio = if citation_count == 0 {
            0.0
        } else {
            referenced.len() as f64 / citation_count as f64
        };

        if !phantom.is_empty() {
            warn!(phantom = ?phantom, citation_count, "phantom citation markers in drafted sections");
        }
        info!(
            total_markers,
            referenced = referenced.len(),
            unused = unused.len(),
            coverage_ratio,
            "citations resolved"
        );

        CitationCoverage {
            total_markers,
            phantom: phantom.into_iter().collect(),
            unused,
            coverage_ratio,
        }
    }
}
