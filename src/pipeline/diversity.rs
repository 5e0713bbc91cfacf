//! Source-diversity scoring over aggregated citations

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Domain spread of a run's deduplicated citations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiversityMetrics {
    pub unique_domains: usize,
    /// Simpson index `1 - Σ pᵢ²` over domain shares, within `[0, 1]`
    pub score: f64,
    #[serde(default)]
    pub total_before_dedup: usize,
    #[serde(default)]
    pub duplicates_removed: usize,
    /// Share of the most cited domain
    #[serde(default)]
    pub top_domain_share: f64,
    #[serde(default)]
    pub domain_counts: BTreeMap<String, usize>,
}

impl DiversityMetrics {
    /// Tally domains of the deduplicated citation list. Citations without a
    /// recognizable host are not counted.
    pub fn from_domains<I, S>(domains: I, total_before_dedup: usize, total_after_dedup: usize) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut domain_counts: BTreeMap<String, usize> = BTreeMap::new();
        for domain in domains {
            *domain_counts.entry(domain.into()).or_default() += 1;
        }
        let total: usize = domain_counts.values().sum();
        let (score, top_domain_share) = if total == 0 {
            (0.0, 0.0)
        } else {
            let total = total as f64;
            let concentration: f64 = domain_counts
                .values()
                .map(|&c| {
                    let p = c as f64 / total;
                    p * p
                })
                .sum();
            let top = domain_counts.values().copied().max().unwrap_or(0) as f64 / total;
            ((1.0 - concentration).clamp(0.0, 1.0), top)
        };

        Self {
            unique_domains: domain_counts.len(),
            score,
            total_before_dedup,
            duplicates_removed: total_before_dedup.saturating_sub(total_after_dedup),
            top_domain_share,
            domain_counts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};

    #[test]
    fn no_citations_scores_zero() {
        let metrics = DiversityMetrics::from_domains(Vec::<String>::new(), 0, 0);
        assert_eq!(metrics.score, 0.0);
        assert_eq!(metrics.unique_domains, 0);
    }

    #[test]
    fn single_dominant_domain_scores_zero() {
        let metrics = DiversityMetrics::from_domains(std::iter::repeat("a.com").take(100), 100, 100);
        assert_eq!(metrics.score, 0.0);
        assert_eq!(metrics.top_domain_share, 1.0);
    }

    #[test]
    fn even_spread_scores_one_minus_one_over_k() {
        for k in [2usize, 5, 40] {
            let domains: Vec<String> = (0..k * 3).map(|i| format!("d{}.com", i % k)).collect();
            let metrics = DiversityMetrics::from_domains(domains, k * 3, k * 3);
            let expected = 1.0 - 1.0 / k as f64;
            assert!((metrics.score - expected).abs() < 1e-9, "k={k} score={}", metrics.score);
            assert_eq!(metrics.unique_domains, k);
        }
    }

    #[test]
    fn duplicates_removed_is_reported() {
        let metrics = DiversityMetrics::from_domains(["a.com", "b.com"], 5, 2);
        assert_eq!(metrics.duplicates_removed, 3);
        assert_eq!(metrics.total_before_dedup, 5);
    }

    #[test]
    fn score_stays_in_unit_interval_for_random_tallies() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let n = rng.gen_range(0..300);
            let k = rng.gen_range(1..60);
            let domains: Vec<String> = (0..n).map(|_| format!("d{}.org", rng.gen_range(0..k))).collect();
            let metrics = DiversityMetrics::from_domains(domains, n, n);
            assert!((0.0..=1.0).contains(&metrics.score));
            assert!(metrics.unique_domains <= k);
            if n > 0 {
                assert!(metrics.score <= 1.0 - 1.0 / metrics.unique_domains as f64 + 1e-9);
            }
        }
    }
}
