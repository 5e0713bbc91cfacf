//! Normalizer: raw notes to a per-slot view
//!
//! Reconciles the two historical slot spellings and recovers citations from
//! whichever of the two storage locations holds them. Malformed payloads
//! degrade to empty values with a diagnostic; they never fail the run.

use super::diagnostics::{Diagnostic, Diagnostics};
use super::error::{SynthesisError, SynthesisResult};
use crate::model::{Citation, NoteStatus, ResearchNote, RunId, SlotId};
use crate::storage::NoteStore;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Where a note's citation list was recovered from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CitationOrigin {
    /// The `citations` key inside the field payload
    Embedded,
    /// The note's dedicated citation column
    Dedicated,
    #[default]
    None,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedNote {
    /// The identifier exactly as the producer wrote it
    pub raw_slot_id: String,
    pub status: NoteStatus,
    /// Field payload with the embedded `citations` key removed
    pub fields: Map<String, Value>,
    pub citations: Vec<Citation>,
    #[serde(default)]
    pub citation_origin: CitationOrigin,
    #[serde(default)]
    pub tokens_used: u64,
    #[serde(default)]
    pub duration_ms: u64,
}

impl NormalizedNote {
    pub fn is_present(&self) -> bool {
        self.status == NoteStatus::Completed
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NoteTelemetry {
    pub notes_loaded: usize,
    pub tokens_used: u64,
    pub duration_ms: u64,
}

/// Normalizer output, persisted as `normalization/normalized_notes`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedNotes {
    pub run_id: RunId,
    pub slots: BTreeMap<SlotId, NormalizedNote>,
    #[serde(default)]
    pub unrecognized_slots: Vec<String>,
    #[serde(default)]
    pub malformed_records: usize,
    #[serde(default)]
    pub telemetry: NoteTelemetry,
}

impl NormalizedNotes {
    /// Look up a slot by any spelling.
    pub fn get(&self, raw_slot: &str) -> Option<&NormalizedNote> {
        SlotId::parse(raw_slot).ok().and_then(|id| self.slots.get(&id))
    }

    /// Slots whose note completed.
    pub fn present_slots(&self) -> Vec<SlotId> {
        self.slots
            .iter()
            .filter(|(_, note)| note.is_present())
            .map(|(id, _)| id.clone())
            .collect()
    }
}

/// Loads and normalizes a run's notes.
pub struct Normalizer<'a> {
    notes: &'a dyn NoteStore,
}

impl<'a> Normalizer<'a> {
    pub fn new(notes: &'a dyn NoteStore) -> Self {
        Self { notes }
    }

    /// Load every note for the run and normalize it. Zero notes is fatal.
    pub fn normalize(&self, run_id: &RunId, diagnostics: &mut Diagnostics) -> SynthesisResult<NormalizedNotes> {
        let raw = self.notes.get_notes(run_id)?;
        if raw.is_empty() {
            return Err(SynthesisError::NoNotes(run_id.clone()));
        }
        Ok(normalize_notes(run_id, raw, diagnostics))
    }
}

/// Normalize already-loaded notes.
pub fn normalize_notes(run_id: &RunId, raw: Vec<ResearchNote>, diagnostics: &mut Diagnostics) -> NormalizedNotes {
    let mut out = NormalizedNotes {
        run_id: run_id.clone(),
        slots: BTreeMap::new(),
        unrecognized_slots: Vec::new(),
        malformed_records: 0,
        telemetry: NoteTelemetry::default(),
    };

    for note in raw {
        out.telemetry.notes_loaded += 1;
        out.telemetry.tokens_used += note.tokens_used;
        out.telemetry.duration_ms += note.duration_ms;

        let slot = match SlotId::parse(&note.slot_id) {
            Ok(slot) => slot,
            Err(_) => {
                warn!(run_id = %run_id, slot = %note.slot_id, "unrecognized slot identifier, note skipped");
                diagnostics.push(Diagnostic::UnrecognizedSlot {
                    raw: note.slot_id.clone(),
                });
                out.unrecognized_slots.push(note.slot_id);
                continue;
            }
        };

        let before = diagnostics.malformed_records();
        let normalized = normalize_note(run_id, &slot, note, diagnostics);
        out.malformed_records += diagnostics.malformed_records() - before;

        match out.slots.entry(slot) {
            Entry::Vacant(entry) => {
                entry.insert(normalized);
            }
            Entry::Occupied(mut entry) => {
                let slot = entry.key().clone();
                let (kept, dropped) = if prefer(&normalized, entry.get()) {
                    let previous = entry.insert(normalized);
                    (entry.get().raw_slot_id.clone(), previous.raw_slot_id)
                } else {
                    (entry.get().raw_slot_id.clone(), normalized.raw_slot_id)
                };
                warn!(run_id = %run_id, slot = %slot, kept = %kept, dropped = %dropped, "duplicate notes for slot");
                diagnostics.push(Diagnostic::DuplicateSlot { slot, dropped });
            }
        }
    }

    info!(
        run_id = %run_id,
        notes = out.telemetry.notes_loaded,
        slots = out.slots.len(),
        present = out.present_slots().len(),
        malformed = out.malformed_records,
        "notes normalized"
    );
    out
}

/// True if `candidate` should replace `current`: completed beats not
/// completed, then more citations wins.
fn prefer(candidate: &NormalizedNote, current: &NormalizedNote) -> bool {
    match (candidate.is_present(), current.is_present()) {
        (true, false) => true,
        (false, true) => false,
        _ => candidate.citations.len() > current.citations.len(),
    }
}

fn normalize_note(
    run_id: &RunId,
    slot: &SlotId,
    note: ResearchNote,
    diagnostics: &mut Diagnostics,
) -> NormalizedNote {
    let mut fields = match decode_fields(&note.fields) {
        Ok(fields) => fields,
        Err(detail) => {
            malformed(run_id, slot, "fields", detail, diagnostics);
            Map::new()
        }
    };

    // Embedded list first; the dedicated column only when it yields nothing.
    let embedded = fields
        .remove("citations")
        .map(|value| recover_citations(run_id, slot, "fields.citations", &value, diagnostics))
        .unwrap_or_default();

    let (citations, citation_origin) = if !embedded.is_empty() {
        (embedded, CitationOrigin::Embedded)
    } else {
        let dedicated = recover_citations(run_id, slot, "citations", &note.citations, diagnostics);
        if dedicated.is_empty() {
            (dedicated, CitationOrigin::None)
        } else {
            (dedicated, CitationOrigin::Dedicated)
        }
    };

    debug!(
        run_id = %run_id,
        slot = %slot,
        raw_slot = %note.slot_id,
        citations = citations.len(),
        origin = ?citation_origin,
        "note normalized"
    );

    NormalizedNote {
        raw_slot_id: note.slot_id,
        status: note.status,
        fields,
        citations,
        citation_origin,
        tokens_used: note.tokens_used,
        duration_ms: note.duration_ms,
    }
}

fn malformed(run_id: &RunId, slot: &SlotId, location: &str, detail: String, diagnostics: &mut Diagnostics) {
    warn!(run_id = %run_id, slot = %slot, location, detail = %detail, "malformed note record treated as empty");
    diagnostics.push(Diagnostic::MalformedRecord {
        slot: slot.to_string(),
        location: location.to_string(),
        detail,
    });
}

fn recover_citations(
    run_id: &RunId,
    slot: &SlotId,
    location: &str,
    value: &Value,
    diagnostics: &mut Diagnostics,
) -> Vec<Citation> {
    match decode_list(value) {
        Ok(items) => {
            let citations: Vec<Citation> = items.iter().filter_map(Citation::from_value).collect();
            if citations.len() < items.len() {
                debug!(
                    run_id = %run_id,
                    slot = %slot,
                    location,
                    dropped = items.len() - citations.len(),
                    "citation items without a url dropped"
                );
            }
            citations
        }
        Err(detail) => {
            malformed(run_id, slot, location, detail, diagnostics);
            Vec::new()
        }
    }
}

/// A field payload is an object, or a JSON string holding one. Null is empty.
fn decode_fields(value: &Value) -> Result<Map<String, Value>, String> {
    match value {
        Value::Object(map) => Ok(map.clone()),
        Value::Null => Ok(Map::new()),
        Value::String(text) if text.trim().is_empty() => Ok(Map::new()),
        Value::String(text) => match serde_json::from_str::<Value>(text) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(other) => Err(format!("expected an object, found {}", kind_of(&other))),
            Err(e) => Err(format!("unparseable payload: {}", e)),
        },
        other => Err(format!("expected an object, found {}", kind_of(other))),
    }
}

/// A citation list is an array, or a JSON string holding one. Null and the
/// empty string are empty lists.
fn decode_list(value: &Value) -> Result<Vec<Value>, String> {
    match value {
        Value::Array(items) => Ok(items.clone()),
        Value::Null => Ok(Vec::new()),
        Value::String(text) if text.trim().is_empty() => Ok(Vec::new()),
        Value::String(text) => match serde_json::from_str::<Value>(text) {
            Ok(Value::Array(items)) => Ok(items),
            Ok(other) => Err(format!("expected a list, found {}", kind_of(&other))),
            Err(e) => Err(format!("unparseable list: {}", e)),
        },
        other => Err(format!("expected a list, found {}", kind_of(other))),
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use serde_json::json;

    fn run() -> RunId {
        RunId::from_string("run-1")
    }

    fn cite(url: &str) -> Value {
        json!({"title": "t", "url": url, "source": "s"})
    }

    #[test]
    fn zero_notes_is_fatal() {
        let store = MemoryStore::new();
        let err = Normalizer::new(&store)
            .normalize(&run(), &mut Diagnostics::new())
            .unwrap_err();
        assert!(matches!(err, SynthesisError::NoNotes(_)));
    }

    #[test]
    fn both_spellings_land_on_the_same_key() {
        let mut diags = Diagnostics::new();
        let hyphen = normalize_notes(&run(), vec![ResearchNote::new("NB-7", json!({"a": 1}))], &mut diags);
        let compact = normalize_notes(&run(), vec![ResearchNote::new("NB7", json!({"a": 1}))], &mut diags);
        assert_eq!(hyphen.slots.keys().collect::<Vec<_>>(), compact.slots.keys().collect::<Vec<_>>());
        assert!(hyphen.get("NB7").is_some());
        assert!(compact.get("nb-7").is_some());
    }

    #[test]
    fn embedded_citations_take_precedence() {
        let note = ResearchNote::new("NB1", json!({"summary": "x", "citations": [cite("https://a.com")]}))
            .with_citations(json!([cite("https://b.com"), cite("https://c.com")]));
        let out = normalize_notes(&run(), vec![note], &mut Diagnostics::new());
        let nb1 = out.get("NB1").unwrap();
        assert_eq!(nb1.citation_origin, CitationOrigin::Embedded);
        assert_eq!(nb1.citations.len(), 1);
        assert!(!nb1.fields.contains_key("citations"));
    }

    #[test]
    fn empty_embedded_falls_back_to_dedicated() {
        let note = ResearchNote::new("NB1", json!({"citations": []}))
            .with_citations(json!([cite("https://b.com")]));
        let out = normalize_notes(&run(), vec![note], &mut Diagnostics::new());
        assert_eq!(out.get("NB1").unwrap().citation_origin, CitationOrigin::Dedicated);
    }

    #[test]
    fn dedicated_column_may_be_json_text() {
        let note = ResearchNote::new("NB2", json!({}))
            .with_citations(Value::String(json!([cite("https://b.com")]).to_string()));
        let out = normalize_notes(&run(), vec![note], &mut Diagnostics::new());
        assert_eq!(out.get("NB2").unwrap().citations[0].url, "https://b.com");
    }

    #[test]
    fn malformed_citations_are_empty_with_diagnostic() {
        let mut diags = Diagnostics::new();
        let note = ResearchNote::new("NB3", json!({"citations": "not json ["}))
            .with_citations(json!({"oops": true}));
        let out = normalize_notes(&run(), vec![note], &mut diags);
        assert!(out.get("NB3").unwrap().citations.is_empty());
        assert_eq!(diags.malformed_records(), 2);
        assert_eq!(out.malformed_records, 2);
    }

    #[test]
    fn string_payload_is_decoded_and_garbage_is_empty() {
        let mut diags = Diagnostics::new();
        let notes = vec![
            ResearchNote::new("NB1", Value::String(r#"{"pressures": ["a"]}"#.into())),
            ResearchNote::new("NB2", Value::String("<html>".into())),
        ];
        let out = normalize_notes(&run(), notes, &mut diags);
        assert_eq!(out.get("NB1").unwrap().fields["pressures"], json!(["a"]));
        assert!(out.get("NB2").unwrap().fields.is_empty());
        assert_eq!(diags.malformed_records(), 1);
    }

    #[test]
    fn unrecognized_slot_is_reported_not_fatal() {
        let mut diags = Diagnostics::new();
        let notes = vec![ResearchNote::new("summary", json!({})), ResearchNote::new("NB1", json!({}))];
        let out = normalize_notes(&run(), notes, &mut diags);
        assert_eq!(out.unrecognized_slots, vec!["summary"]);
        assert_eq!(out.slots.len(), 1);
        assert_eq!(out.telemetry.notes_loaded, 2);
    }

    #[test]
    fn duplicate_slot_prefers_completed_then_more_citations() {
        let mut diags = Diagnostics::new();
        let failed = ResearchNote::new("NB-4", json!({}))
            .with_status(NoteStatus::Failed)
            .with_citations(json!([cite("https://a.com"), cite("https://b.com")]));
        let thin = ResearchNote::new("NB4", json!({}));
        let rich = ResearchNote::new("nb_04", json!({})).with_citations(json!([cite("https://a.com")]));

        let out = normalize_notes(&run(), vec![failed, thin, rich], &mut diags);
        assert_eq!(out.get("NB4").unwrap().raw_slot_id, "nb_04");
        assert_eq!(
            diags
                .entries()
                .iter()
                .filter(|d| matches!(d, Diagnostic::DuplicateSlot { .. }))
                .count(),
            2
        );
    }

    #[test]
    fn telemetry_is_totalled() {
        let notes = vec![
            ResearchNote::new("NB1", json!({})).with_telemetry(100, 2000),
            ResearchNote::new("NB2", json!({})).with_telemetry(50, 500),
        ];
        let out = normalize_notes(&run(), notes, &mut Diagnostics::new());
        assert_eq!(out.telemetry.tokens_used, 150);
        assert_eq!(out.telemetry.duration_ms, 2500);
    }

    #[test]
    fn round_trips_through_json() {
        let note = ResearchNote::new("NB-1", json!({"x": 1, "citations": [cite("https://a.com")]}));
        let out = normalize_notes(&run(), vec![note], &mut Diagnostics::new());
        let value = serde_json::to_value(&out).unwrap();
        assert!(value["slots"].get("NB1").is_some());
        let back: NormalizedNotes = serde_json::from_value(value).unwrap();
        assert_eq!(back, out);
    }
}
