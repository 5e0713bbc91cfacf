//! Final bundle: the terminal artifact read by the presentation layer

use super::canonical::CanonicalDataset;
use super::citations::CitationCoverage;
use crate::compose::Section;
use crate::model::{Run, RunId};
use chrono::{DateTime, Utc};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleMetadata {
    pub run_id: RunId,
    pub source_id: String,
    pub target_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleSection {
    pub content: String,
    #[serde(default)]
    pub citations_used: Vec<u32>,
}

/// Sections keyed by section code, serialized as a JSON object in report order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BundleSections(Vec<(String, BundleSection)>);

impl BundleSections {
    pub fn get(&self, code: &str) -> Option<&BundleSection> {
        self.0.iter().find(|(k, _)| k == code).map(|(_, s)| s)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn codes(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &BundleSection)> {
        self.0.iter().map(|(k, s)| (k.as_str(), s))
    }
}

impl From<&[Section]> for BundleSections {
    fn from(sections: &[Section]) -> Self {
        Self(
            sections
                .iter()
                .map(|s| {
                    (
                        s.code.as_str().to_string(),
                        BundleSection {
                            content: s.content.clone(),
                            citations_used: s.citations_used.clone(),
                        },
                    )
                })
                .collect(),
        )
    }
}

impl Serialize for BundleSections {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (code, section) in &self.0 {
            map.serialize_entry(code, section)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for BundleSections {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct SectionsVisitor;

        impl<'de> Visitor<'de> for SectionsVisitor {
            type Value = BundleSections;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of section code to section")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((code, section)) = access.next_entry::<String, BundleSection>()? {
                    entries.push((code, section));
                }
                Ok(BundleSections(entries))
            }
        }

        deserializer.deserialize_map(SectionsVisitor)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleCitation {
    pub id: u32,
    pub title: String,
    pub url: String,
    pub source: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BundleDiversity {
    pub unique_domains: usize,
    pub score: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BundleQa {
    pub phantom_citations: Vec<u32>,
    pub unused_citations: Vec<u32>,
    #[serde(default)]
    pub total_markers: usize,
    #[serde(default)]
    pub coverage_ratio: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalBundle {
    pub metadata: BundleMetadata,
    pub sections: BundleSections,
    pub aggregated_citations: Vec<BundleCitation>,
    #[serde(default)]
    pub diversity_metrics: BundleDiversity,
    #[serde(default)]
    pub qa: BundleQa,
}

impl FinalBundle {
    pub fn assemble(
        run: &Run,
        dataset: &CanonicalDataset,
        sections: &[Section],
        coverage: &CitationCoverage,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            metadata: BundleMetadata {
                run_id: run.id.clone(),
                source_id: run.source_id.clone(),
                target_id: run.target_id.clone(),
                created_at,
            },
            sections: BundleSections::from(sections),
            aggregated_citations: dataset
                .citations
                .iter()
                .map(|c| BundleCitation {
                    id: c.id,
                    title: c.title.clone(),
                    url: c.url.clone(),
                    source: c.source.clone(),
                })
                .collect(),
            diversity_metrics: BundleDiversity {
                unique_domains: dataset.diversity.unique_domains,
                score: dataset.diversity.score,
            },
            qa: BundleQa {
                phantom_citations: coverage.phantom.clone(),
                unused_citations: coverage.unused.clone(),
                total_markers: coverage.total_markers,
                coverage_ratio: coverage.coverage_ratio,
            },
        }
    }
}
