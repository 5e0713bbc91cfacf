//! Pattern detection over the canonical dataset
//!
//! Which fields feed which pattern is data, not code: a [`PatternTable`]
//! lists, per pattern kind, the home slots and an ordered set of candidate
//! field names. The first candidate holding a non-empty value wins, so a new
//! field-name variant from a note producer is absorbed by adding it to the
//! table.
//!
//! ```yaml
//! version: 3
//! rules:
//!   - kind: pressure
//!     slots: [NB1, NB-3]
//!     fields: [financial_pressures, pressures, challenges]
//! ```

use super::canonical::{CanonicalDataset, CanonicalSlot, CitationIndex};
use super::diagnostics::{Diagnostic, Diagnostics};
use super::markdown;
use crate::model::{Citation, SlotId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, info, trace, warn};

/// Current version of the built-in table.
pub const PATTERN_TABLE_VERSION: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    Pressure,
    Capability,
    TimingSignal,
    Executive,
    NumericProof,
}

impl PatternKind {
    pub const ALL: [PatternKind; 5] = [
        PatternKind::Pressure,
        PatternKind::Capability,
        PatternKind::TimingSignal,
        PatternKind::Executive,
        PatternKind::NumericProof,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pressure => "pressure",
            Self::Capability => "capability",
            Self::TimingSignal => "timing_signal",
            Self::Executive => "executive",
            Self::NumericProof => "numeric_proof",
        }
    }
}

impl fmt::Display for PatternKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One `(pattern kind, slots, [candidate fields])` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternRule {
    pub kind: PatternKind,
    pub slots: Vec<SlotId>,
    /// Probed in order; the first non-empty value wins
    pub fields: Vec<String>,
}

impl PatternRule {
    pub fn new(kind: PatternKind, slots: &[u32], fields: &[&str]) -> Self {
        Self {
            kind,
            slots: slots.iter().map(|n| SlotId::new("NB", *n)).collect(),
            fields: fields.iter().map(|f| f.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternTable {
    pub version: u32,
    pub rules: Vec<PatternRule>,
}

impl Default for PatternTable {
    fn default() -> Self {
        Self::standard()
    }
}

impl PatternTable {
    /// The production table.
    pub fn standard() -> Self {
        use PatternKind::*;
        Self {
            version: PATTERN_TABLE_VERSION,
            rules: vec![
                PatternRule::new(
                    Pressure,
                    &[1, 3, 5],
                    &["financial_pressures", "pressures", "challenges", "key_pressures"],
                ),
                PatternRule::new(
                    Capability,
                    &[6, 9],
                    &["capabilities", "capability_levers", "strengths", "levers"],
                ),
                PatternRule::new(
                    TimingSignal,
                    &[14],
                    &["timing_signals", "timing", "catalysts", "upcoming_events"],
                ),
                PatternRule::new(Executive, &[11], &["executives", "leadership", "key_people", "people"]),
                PatternRule::new(NumericProof, &[3, 7], &["metrics", "key_metrics", "numeric_proof", "kpis"]),
            ],
        }
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    /// Rules for one kind, in table order.
    pub fn rules_for(&self, kind: PatternKind) -> impl Iterator<Item = &PatternRule> {
        self.rules.iter().filter(move |r| r.kind == kind)
    }
}

/// One extracted finding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    pub kind: PatternKind,
    pub slot: SlotId,
    /// The candidate field it was read from
    pub field: String,
    /// Short heading such as a person's name or a metric name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub text: String,
    /// Canonical citation ids
    #[serde(default)]
    pub citations: Vec<u32>,
}

/// Detector output: every kind is present as a key, possibly empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternSet {
    pub patterns: BTreeMap<PatternKind, Vec<Pattern>>,
    /// Slots that were present but had none of a rule's candidate fields
    #[serde(default)]
    pub schema_mismatches: usize,
}

impl Default for PatternSet {
    fn default() -> Self {
        Self {
            patterns: PatternKind::ALL.iter().map(|k| (*k, Vec::new())).collect(),
            schema_mismatches: 0,
        }
    }
}

impl PatternSet {
    pub fn get(&self, kind: PatternKind) -> &[Pattern] {
        self.patterns.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_empty(&self, kind: PatternKind) -> bool {
        self.get(kind).is_empty()
    }

    pub fn counts(&self) -> BTreeMap<PatternKind, usize> {
        self.patterns.iter().map(|(k, v)| (*k, v.len())).collect()
    }

    pub fn total(&self) -> usize {
        self.patterns.values().map(Vec::len).sum()
    }
}

#[derive(Debug, Clone, Default)]
pub struct PatternDetector {
    table: PatternTable,
}

impl PatternDetector {
    pub fn new(table: PatternTable) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &PatternTable {
        &self.table
    }

    /// Scan the dataset with every rule.
    ///
    /// A present slot holding none of a rule's candidate fields yields no
    /// patterns and a [`Diagnostic::SchemaMismatch`]; an absent slot is a
    /// genuine gap and only logged.
    pub fn detect(&self, dataset: &CanonicalDataset, diagnostics: &mut Diagnostics) -> PatternSet {
        let index = dataset.citation_index();
        let mut set = PatternSet::default();

        for rule in &self.table.rules {
            for slot in &rule.slots {
                let Some(content) = dataset.slots.get(slot) else {
                    debug!(run_id = %dataset.run_id, pattern = %rule.kind, slot = %slot, "home slot absent");
                    continue;
                };

                let Some((field, value)) = first_non_empty(&content.fields, &rule.fields) else {
                    if rule.fields.iter().any(|f| content.fields.contains_key(f)) {
                        debug!(run_id = %dataset.run_id, pattern = %rule.kind, slot = %slot, "candidate fields empty");
                    } else {
                        warn!(
                            run_id = %dataset.run_id,
                            pattern = %rule.kind,
                            slot = %slot,
                            candidates = ?rule.fields,
                            "no candidate field present, pattern collection reduced"
                        );
                        set.schema_mismatches += 1;
                        diagnostics.push(Diagnostic::SchemaMismatch {
                            pattern: rule.kind,
                            slot: slot.clone(),
                            candidate_fields: rule.fields.clone(),
                        });
                    }
                    continue;
                };
                debug!(run_id = %dataset.run_id, pattern = %rule.kind, slot = %slot, field, "candidate field selected");

                let extracted = extract(rule.kind, slot, field, value, content, &index);
                let entry = set.patterns.entry(rule.kind).or_default();
                for pattern in extracted {
                    let duplicate = entry
                        .iter()
                        .any(|p| p.label == pattern.label && p.text.eq_ignore_ascii_case(&pattern.text));
                    if duplicate {
                        trace!(pattern = %rule.kind, text = %pattern.text, "duplicate pattern skipped");
                        continue;
                    }
                    entry.push(pattern);
                }
            }
        }

        info!(
            run_id = %dataset.run_id,
            total = set.total(),
            schema_mismatches = set.schema_mismatches,
            counts = ?set.counts(),
            "patterns detected"
        );
        set
    }
}

fn first_non_empty<'a>(fields: &'a Map<String, Value>, candidates: &'a [String]) -> Option<(&'a str, &'a Value)> {
    candidates.iter().find_map(|name| {
        let value = fields.get(name)?;
        (!is_empty_value(value)).then_some((name.as_str(), value))
    })
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

const TEXT_KEYS: [&str; 10] = [
    "text",
    "description",
    "summary",
    "statement",
    "signal",
    "theme",
    "name",
    "title",
    "label",
    "value",
];

/// A raw item before marker resolution.
struct RawItem {
    label: Option<String>,
    text: String,
    explicit: Vec<Value>,
}

fn extract(
    kind: PatternKind,
    slot: &SlotId,
    field: &str,
    value: &Value,
    content: &CanonicalSlot,
    index: &CitationIndex,
) -> Vec<Pattern> {
    let mut raw = Vec::new();
    collect_items(kind, value, &mut raw);

    raw.into_iter()
        .filter_map(|item| {
            let (text, mut local) = markdown::take_local_markers(&markdown::flatten(&item.text));
            let label = match item.label {
                Some(raw_label) => {
                    let (label, label_markers) = markdown::take_local_markers(&markdown::flatten(&raw_label));
                    local.extend(label_markers);
                    Some(label).filter(|l| !l.is_empty())
                }
                None => None,
            };
            if text.is_empty() && label.is_none() {
                return None;
            }
            if kind == PatternKind::NumericProof {
                let carries_digit = text.chars().any(|c| c.is_ascii_digit())
                    || label.as_deref().is_some_and(|l| l.chars().any(|c| c.is_ascii_digit()));
                if !carries_digit {
                    trace!(slot = %slot, text = %text, "numeric proof without a figure dropped");
                    return None;
                }
            }

            let mut citations: Vec<u32> = local
                .iter()
                .filter_map(|n| index.by_local(&content.citations, *n))
                .collect();
            for reference in &item.explicit {
                let resolved = match reference {
                    Value::Number(n) => n
                        .as_u64()
                        .and_then(|n| u32::try_from(n).ok())
                        .and_then(|n| index.by_local(&content.citations, n)),
                    Value::String(s) => match s.trim().parse::<u32>() {
                        Ok(n) => index.by_local(&content.citations, n),
                        Err(_) => index.by_url(s),
                    },
                    Value::Object(_) => Citation::from_value(reference)
                        .and_then(|c| index.by_url(&c.url)),
                    _ => None,
                };
                citations.extend(resolved);
            }
            if citations.len() < local.len() {
                trace!(slot = %slot, "unmappable local citation markers dropped");
            }
            citations.sort_unstable();
            citations.dedup();

            Some(Pattern {
                kind,
                slot: slot.clone(),
                field: field.to_string(),
                label,
                text,
                citations,
            })
        })
        .collect()
}

fn collect_items(kind: PatternKind, value: &Value, out: &mut Vec<RawItem>) {
    match value {
        Value::String(text) => out.extend(markdown::blocks(text).into_iter().map(|text| RawItem {
            label: None,
            text,
            explicit: Vec::new(),
        })),
        Value::Number(n) => out.push(RawItem {
            label: None,
            text: n.to_string(),
            explicit: Vec::new(),
        }),
        Value::Array(items) => {
            for item in items {
                match item {
                    // A nested list is flattened one level; deeper nesting is kept as text.
                    Value::Array(_) => collect_items(kind, item, out),
                    _ => collect_one(kind, item, out),
                }
            }
        }
        Value::Object(map) => {
            if looks_like_item(kind, map) {
                collect_one(kind, value, out);
            } else {
                // A keyed collection such as {"name": "...", ...} per entry
                for (key, entry) in map {
                    match entry {
                        Value::Object(_) => collect_one(kind, entry, out),
                        Value::String(_) | Value::Number(_) => out.push(RawItem {
                            label: Some(key.replace('_', " ")),
                            text: scalar_text(entry),
                            explicit: Vec::new(),
                        }),
                        _ => {}
                    }
                }
            }
        }
        Value::Null | Value::Bool(_) => {}
    }
}

fn collect_one(kind: PatternKind, item: &Value, out: &mut Vec<RawItem>) {
    match item {
        Value::String(text) => {
            let text = text.trim();
            if !text.is_empty() {
                out.push(RawItem {
                    label: None,
                    text: text.to_string(),
                    explicit: Vec::new(),
                });
            }
        }
        Value::Number(n) => out.push(RawItem {
            label: None,
            text: n.to_string(),
            explicit: Vec::new(),
        }),
        Value::Object(map) => {
            let explicit = match map.get("citations").or_else(|| map.get("sources")) {
                Some(Value::Array(refs)) => refs.clone(),
                Some(single @ (Value::Number(_) | Value::String(_))) => vec![single.clone()],
                _ => Vec::new(),
            };
            let (label, text) = match kind {
                PatternKind::Executive => (
                    pick(map, &["name", "person", "executive"]),
                    pick(map, &["title", "role", "position", "focus", "description", "summary"]),
                ),
                PatternKind::NumericProof => (
                    pick(map, &["metric", "label", "name", "kpi"]),
                    join_value(map),
                ),
                _ => (pick(map, &["title", "label"]).filter(|_| has_body(map)), body_text(map)),
            };
            let text = text.unwrap_or_default();
            if text.is_empty() && label.is_none() {
                return;
            }
            out.push(RawItem { label, text, explicit });
        }
        _ => {}
    }
}

/// True if the object is itself one finding rather than a keyed collection.
fn looks_like_item(kind: PatternKind, map: &Map<String, Value>) -> bool {
    let keys: &[&str] = match kind {
        PatternKind::Executive => &["name", "person", "executive", "title", "role"],
        PatternKind::NumericProof => &["metric", "value", "kpi", "label"],
        _ => &TEXT_KEYS,
    };
    keys.iter().any(|k| map.contains_key(*k))
}

fn has_body(map: &Map<String, Value>) -> bool {
    ["text", "description", "summary", "statement", "signal", "theme"]
        .iter()
        .any(|k| map.get(*k).is_some_and(|v| !is_empty_value(v)))
}

/// Main text of a generic item: the first body key, else the first heading key.
fn body_text(map: &Map<String, Value>) -> Option<String> {
    if has_body(map) {
        pick(map, &["text", "description", "summary", "statement", "signal", "theme"])
    } else {
        pick(map, &TEXT_KEYS)
    }
}

/// Metric value with its period or context, e.g. `18% (FY2024)`.
fn join_value(map: &Map<String, Value>) -> Option<String> {
    let value = pick(map, &["value", "figure", "amount"]);
    let context = pick(map, &["period", "context", "description", "text"]);
    match (value, context) {
        (Some(v), Some(c)) => Some(format!("{} ({})", v, c)),
        (Some(v), None) => Some(v),
        (None, c) => c,
    }
}

fn pick(map: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| map.get(*k))
        .map(scalar_text)
        .map(|s| s.trim().to_string())
        .find(|s| !s.is_empty())
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ResearchNote, RunId};
    use crate::pipeline::canonical::CanonicalBuilder;
    use crate::pipeline::normalize::normalize_notes;
    use serde_json::json;

    fn dataset(notes: Vec<ResearchNote>) -> CanonicalDataset {
        let normalized = normalize_notes(&RunId::from_string("r"), notes, &mut Diagnostics::new());
        let expected: Vec<SlotId> = (1..=15).map(|n| SlotId::new("NB", n)).collect();
        CanonicalBuilder::build(&normalized, &expected)
    }

    fn detect(notes: Vec<ResearchNote>) -> (PatternSet, Diagnostics) {
        let mut diags = Diagnostics::new();
        let set = PatternDetector::default().detect(&dataset(notes), &mut diags);
        (set, diags)
    }

    #[test]
    fn every_kind_is_keyed_even_when_empty() {
        let (set, _) = detect(vec![]);
        assert_eq!(set.patterns.len(), PatternKind::ALL.len());
        assert_eq!(set.total(), 0);
    }

    #[test]
    fn fallback_field_name_still_yields_pressures() {
        let (set, diags) = detect(vec![ResearchNote::new(
            "NB-1",
            json!({"pressures": ["Margin compression", "Rising input costs"]}),
        )]);
        let pressures = set.get(PatternKind::Pressure);
        assert_eq!(pressures.len(), 2);
        assert_eq!(pressures[0].field, "pressures");
        assert_eq!(diags.schema_mismatches(), 0);
    }

    #[test]
    fn first_non_empty_candidate_wins() {
        let (set, _) = detect(vec![ResearchNote::new(
            "NB1",
            json!({"financial_pressures": [], "pressures": ["from pressures"], "challenges": ["from challenges"]}),
        )]);
        let pressures = set.get(PatternKind::Pressure);
        assert_eq!(pressures.len(), 1);
        assert_eq!(pressures[0].text, "from pressures");
    }

    #[test]
    fn present_slot_without_candidates_is_a_schema_mismatch() {
        let (set, diags) = detect(vec![ResearchNote::new("NB11", json!({"org_chart": "..."}))]);
        assert!(set.is_empty(PatternKind::Executive));
        assert_eq!(set.schema_mismatches, 1);
        assert_eq!(diags.schema_mismatches_for(PatternKind::Executive), vec![&SlotId::new("NB", 11)]);
    }

    #[test]
    fn absent_slot_is_not_a_mismatch() {
        let (_, diags) = detect(vec![ResearchNote::new("NB2", json!({}))]);
        assert_eq!(diags.schema_mismatches(), 0);
    }

    #[test]
    fn markdown_bullets_split_into_items_and_markers_resolve() {
        let note = ResearchNote::new(
            "NB14",
            json!({
                "timing": "- **Q3 earnings** call in October [1]\n- Contract renewal window [2] [9]",
                "citations": [
                    {"title": "a", "url": "https://a.com/q3", "source": "a"},
                    {"title": "b", "url": "https://b.com/renewal", "source": "b"}
                ]
            }),
        );
        let (set, _) = detect(vec![note]);
        let signals = set.get(PatternKind::TimingSignal);
        assert_eq!(signals.len(), 2);
        assert_eq!(signals[0].text, "Q3 earnings call in October");
        assert_eq!(signals[0].citations, vec![1]);
        // [9] has no local citation and is dropped.
        assert_eq!(signals[1].citations, vec![2]);
    }

    #[test]
    fn item_citation_arrays_map_by_index_or_url() {
        let note = ResearchNote::new(
            "NB6",
            json!({
                "capabilities": [
                    {"title": "Data platform", "description": "Unified lakehouse", "citations": [2]},
                    {"text": "Field sales reach", "citations": ["https://www.a.com/x"]}
                ],
                "citations": [
                    {"title": "a", "url": "https://a.com/x", "source": "a"},
                    {"title": "b", "url": "https://b.com/y", "source": "b"}
                ]
            }),
        );
        let (set, _) = detect(vec![note]);
        let caps = set.get(PatternKind::Capability);
        assert_eq!(caps[0].label.as_deref(), Some("Data platform"));
        assert_eq!(caps[0].text, "Unified lakehouse");
        assert_eq!(caps[0].citations, vec![2]);
        assert_eq!(caps[1].citations, vec![1]);
    }

    #[test]
    fn executives_keep_name_and_role() {
        let (set, _) = detect(vec![ResearchNote::new(
            "NB11",
            json!({"leadership": [{"name": "Dana Reyes", "title": "CFO"}, "Sam Ortiz, COO"]}),
        )]);
        let people = set.get(PatternKind::Executive);
        assert_eq!(people[0].label.as_deref(), Some("Dana Reyes"));
        assert_eq!(people[0].text, "CFO");
        assert_eq!(people[1].label, None);
        assert_eq!(people[1].text, "Sam Ortiz, COO");
    }

    #[test]
    fn numeric_proof_requires_a_figure() {
        let (set, _) = detect(vec![ResearchNote::new(
            "NB7",
            json!({"kpis": [
                {"metric": "Gross margin", "value": "31%", "period": "FY2024"},
                "Strong execution culture",
                "Headcount grew 12% year over year"
            ]}),
        )]);
        let proof = set.get(PatternKind::NumericProof);
        assert_eq!(proof.len(), 2);
        assert_eq!(proof[0].label.as_deref(), Some("Gross margin"));
        assert_eq!(proof[0].text, "31% (FY2024)");
        assert_eq!(proof[1].text, "Headcount grew 12% year over year");
    }

    #[test]
    fn keyed_object_collections_are_items() {
        let (set, _) = detect(vec![ResearchNote::new(
            "NB7",
            json!({"metrics": {"revenue_growth": "8.5%", "churn": "2%"}}),
        )]);
        let proof = set.get(PatternKind::NumericProof);
        assert_eq!(proof.len(), 2);
        assert_eq!(proof[0].label.as_deref(), Some("revenue growth"));
    }

    #[test]
    fn markers_in_labels_map_to_the_slots_own_citations() {
        let (set, _) = detect(vec![
            ResearchNote::new(
                "NB1",
                json!({"pressures": ["Margin compression [1]"], "citations": [{"title": "a", "url": "https://a.com/x", "source": "a"}]}),
            ),
            ResearchNote::new(
                "NB6",
                json!({
                    "capabilities": [{"title": "Data platform [1]", "description": "Unified lakehouse"}],
                    "citations": [{"title": "z", "url": "https://zzz.com/y", "source": "z"}]
                }),
            ),
        ]);
        let capability = &set.get(PatternKind::Capability)[0];
        assert_eq!(capability.label.as_deref(), Some("Data platform"));
        assert_eq!(capability.text, "Unified lakehouse");
        assert_eq!(capability.citations, vec![2]);
    }

    #[test]
    fn duplicates_across_home_slots_collapse() {
        let (set, _) = detect(vec![
            ResearchNote::new("NB1", json!({"pressures": ["Margin compression"]})),
            ResearchNote::new("NB3", json!({"challenges": ["margin compression"]})),
        ]);
        assert_eq!(set.get(PatternKind::Pressure).len(), 1);
    }

    #[test]
    fn table_loads_from_yaml_with_either_slot_spelling() {
        let table = PatternTable::from_yaml(
            r#"
version: 4
rules:
  - kind: pressure
    slots: [NB-1]
    fields: [headwinds]
"#,
        )
        .unwrap();
        assert_eq!(table.version, 4);
        let detector = PatternDetector::new(table);
        let mut diags = Diagnostics::new();
        let set = detector.detect(
            &dataset(vec![ResearchNote::new("NB1", json!({"headwinds": "Tariff exposure"}))]),
            &mut diags,
        );
        assert_eq!(set.get(PatternKind::Pressure)[0].text, "Tariff exposure");
    }
}
