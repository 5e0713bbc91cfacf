//! Completeness policy: core/optional slot partition and coverage threshold

use super::config::SynthesisConfig;
use crate::model::SlotId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletenessReport {
    pub present: Vec<SlotId>,
    pub missing_core: Vec<SlotId>,
    pub missing_optional: Vec<SlotId>,
    /// Share of expected slots present
    pub coverage: f64,
    pub threshold: f64,
}

impl CompletenessReport {
    /// Every core slot present and coverage at or above the threshold.
    pub fn is_satisfied(&self) -> bool {
        self.missing_core.is_empty() && self.coverage + f64::EPSILON >= self.threshold
    }
}

#[derive(Debug, Clone)]
pub struct CompletenessPolicy {
    expected: BTreeSet<SlotId>,
    core: BTreeSet<SlotId>,
    threshold: f64,
}

impl CompletenessPolicy {
    pub fn new(expected: impl IntoIterator<Item = SlotId>, core: impl IntoIterator<Item = SlotId>, threshold: f64) -> Self {
        let mut expected: BTreeSet<SlotId> = expected.into_iter().collect();
        let core: BTreeSet<SlotId> = core.into_iter().collect();
        // A core slot is always expected.
        expected.extend(core.iter().cloned());
        Self {
            expected,
            core,
            threshold,
        }
    }

    pub fn from_config(config: &SynthesisConfig) -> Self {
        Self::new(config.expected_slots(), config.core_slots(), config.completeness_threshold)
    }

    /// Classify expected slots against the slots actually present.
    /// Present slots outside the expected set do not count toward coverage.
    pub fn evaluate<'a>(&self, present: impl IntoIterator<Item = &'a SlotId>) -> CompletenessReport {
        let present: BTreeSet<&SlotId> = present.into_iter().collect();
        let mut report = CompletenessReport {
            present: Vec::new(),
            missing_core: Vec::new(),
            missing_optional: Vec::new(),
            coverage: 1.0,
            threshold: self.threshold,
        };
        for slot in &self.expected {
            if present.contains(slot) {
                report.present.push(slot.clone());
            } else if self.core.contains(slot) {
                report.missing_core.push(slot.clone());
            } else {
                report.missing_optional.push(slot.clone());
            }
        }
        if !self.expected.is_empty() {
            report.coverage = report.present.len() as f64 / self.expected.len() as f64;
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nb(n: u32) -> SlotId {
        SlotId::new("NB", n)
    }

    fn default_policy() -> CompletenessPolicy {
        CompletenessPolicy::from_config(&SynthesisConfig::default())
    }

    #[test]
    fn all_present_is_satisfied() {
        let present: Vec<SlotId> = (1..=15).map(nb).collect();
        let report = default_policy().evaluate(&present);
        assert!(report.is_satisfied());
        assert_eq!(report.coverage, 1.0);
    }

    #[test]
    fn one_optional_missing_is_satisfied() {
        let present: Vec<SlotId> = (1..=15).filter(|n| *n != 11).map(nb).collect();
        let report = default_policy().evaluate(&present);
        assert!(report.is_satisfied());
        assert_eq!(report.missing_optional, vec![nb(11)]);
    }

    #[test]
    fn missing_core_fails_and_is_named() {
        let present: Vec<SlotId> = (1..=15).filter(|n| *n != 3).map(nb).collect();
        let report = default_policy().evaluate(&present);
        assert!(!report.is_satisfied());
        assert_eq!(report.missing_core, vec![nb(3)]);
    }

    #[test]
    fn coverage_below_threshold_fails_with_all_core_present() {
        // 12 of 15 is exactly 0.8; 11 of 15 is below.
        let at: Vec<SlotId> = [1, 2, 3, 4, 6, 5, 7, 8, 9, 10, 12, 13].into_iter().map(nb).collect();
        assert!(default_policy().evaluate(&at).is_satisfied());
        let below: Vec<SlotId> = [1, 2, 3, 4, 6, 5, 7, 8, 9, 10, 12].into_iter().map(nb).collect();
        let report = default_policy().evaluate(&below);
        assert!(report.missing_core.is_empty());
        assert!(!report.is_satisfied());
    }

    #[test]
    fn unexpected_present_slots_do_not_inflate_coverage() {
        let policy = CompletenessPolicy::new([nb(1), nb(2)], [nb(1)], 1.0);
        let report = policy.evaluate(&[nb(1), nb(99)]);
        assert_eq!(report.coverage, 0.5);
        assert!(!report.is_satisfied());
    }

    #[test]
    fn empty_expectation_is_trivially_covered() {
        let policy = CompletenessPolicy::new(Vec::new(), Vec::new(), 0.8);
        assert!(policy.evaluate(std::iter::empty()).is_satisfied());
    }
}
