//! Read-side schema normalization
//!
//! Older artifacts predate fields that current readers expect. Instead of
//! migrating stored rows, every payload is normalized on read: renamed
//! top-level fields are moved to their current name, then missing nested keys
//! are filled from a per-type template of empty defaults. Keys whose value is
//! known from the row itself (run id, creation time) are filled from the row
//! when the payload leaves them empty.

use super::phase::artifact_type;
use crate::model::RunId;
use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};
use std::collections::HashMap;

/// A top-level field that was renamed.
#[derive(Debug, Clone)]
pub struct FieldAlias {
    pub from: String,
    pub to: String,
}

/// A column of the artifact row that can stand in for a payload value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowField {
    RunId,
    CreatedAt,
}

#[derive(Debug, Clone, Default)]
struct TypeSchema {
    template: Option<Value>,
    field_aliases: Vec<FieldAlias>,
    required: Vec<String>,
    /// JSON pointer into the payload, and the row column that fills it
    row_fields: Vec<(String, RowField)>,
}

/// Per-logical-type defaults, renames, and required keys.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    types: HashMap<String, TypeSchema>,
}

impl SchemaRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Schemas for the artifact types the pipeline writes.
    pub fn standard() -> Self {
        Self::empty()
            .with_template(
                artifact_type::FINAL_BUNDLE,
                json!({
                    "metadata": {
                        "run_id": null,
                        "source_id": "",
                        "target_id": null,
                        "created_at": null
                    },
                    "sections": {},
                    "aggregated_citations": [],
                    "diversity_metrics": {"unique_domains": 0, "score": 0.0},
                    "qa": {"phantom_citations": [], "unused_citations": []}
                }),
            )
            .with_row_field(artifact_type::FINAL_BUNDLE, "/metadata/run_id", RowField::RunId)
            .with_row_field(artifact_type::FINAL_BUNDLE, "/metadata/created_at", RowField::CreatedAt)
            .with_field_alias(artifact_type::FINAL_BUNDLE, "citations", "aggregated_citations")
            .with_field_alias(artifact_type::FINAL_BUNDLE, "diversity", "diversity_metrics")
            .with_required(
                artifact_type::FINAL_BUNDLE,
                &["metadata", "sections", "aggregated_citations"],
            )
            .with_template(
                artifact_type::NORMALIZED_NOTES,
                json!({
                    "slots": {},
                    "unrecognized_slots": [],
                    "malformed_records": 0,
                    "telemetry": {"notes_loaded": 0, "tokens_used": 0, "duration_ms": 0}
                }),
            )
            .with_required(artifact_type::NORMALIZED_NOTES, &["run_id", "slots"])
            .with_template(
                artifact_type::CANONICAL_DATASET,
                json!({
                    "slots": {},
                    "missing_slots": [],
                    "citations": [],
                    "diversity": {
                        "unique_domains": 0,
                        "score": 0.0,
                        "total_before_dedup": 0,
                        "duplicates_removed": 0,
                        "top_domain_share": 0.0,
                        "domain_counts": {}
                    }
                }),
            )
            .with_field_alias(artifact_type::CANONICAL_DATASET, "aggregated_citations", "citations")
            .with_required(artifact_type::CANONICAL_DATASET, &["run_id", "slots"])
            .with_template(
                artifact_type::DRAFTED_SECTIONS,
                json!({"sections": [], "pattern_counts": {}, "diagnostics": []}),
            )
            .with_required(artifact_type::DRAFTED_SECTIONS, &["sections"])
    }

    pub fn with_template(mut self, logical: &str, template: Value) -> Self {
        self.types.entry(logical.to_string()).or_default().template = Some(template);
        self
    }

    pub fn with_field_alias(mut self, logical: &str, from: &str, to: &str) -> Self {
        self.types
            .entry(logical.to_string())
            .or_default()
            .field_aliases
            .push(FieldAlias {
                from: from.to_string(),
                to: to.to_string(),
            });
        self
    }

    pub fn with_required(mut self, logical: &str, keys: &[&str]) -> Self {
        self.types
            .entry(logical.to_string())
            .or_default()
            .required
            .extend(keys.iter().map(|k| k.to_string()));
        self
    }

    /// Fill the value at `pointer` from the row's `field` when the payload
    /// leaves it absent or null.
    pub fn with_row_field(mut self, logical: &str, pointer: &str, field: RowField) -> Self {
        self.types
            .entry(logical.to_string())
            .or_default()
            .row_fields
            .push((pointer.to_string(), field));
        self
    }

    /// Apply field renames for `logical` to a payload in place.
    pub fn rename_fields(&self, logical: &str, payload: &mut Value) {
        let (Some(schema), Some(obj)) = (self.types.get(logical), payload.as_object_mut()) else {
            return;
        };
        for alias in &schema.field_aliases {
            if obj.contains_key(&alias.to) {
                continue;
            }
            if let Some(value) = obj.remove(&alias.from) {
                obj.insert(alias.to.clone(), value);
            }
        }
    }

    /// Required top-level keys missing from `payload`. A non-object payload
    /// reports every required key as missing.
    pub fn missing_required(&self, logical: &str, payload: &Value) -> Vec<String> {
        let Some(schema) = self.types.get(logical) else {
            return Vec::new();
        };
        match payload.as_object() {
            Some(obj) => schema
                .required
                .iter()
                .filter(|k| !obj.contains_key(k.as_str()))
                .cloned()
                .collect(),
            None => schema.required.clone(),
        }
    }

    /// Fill missing keys from the type's template.
    pub fn inject_defaults(&self, logical: &str, payload: &mut Value) {
        if let Some(template) = self.types.get(logical).and_then(|s| s.template.as_ref()) {
            merge_defaults(payload, template);
        }
    }

    /// Fill empty row-backed values. Runs after [`Self::inject_defaults`] so
    /// the template has created the parent objects.
    pub fn fill_row_context(
        &self,
        logical: &str,
        payload: &mut Value,
        run_id: &RunId,
        created_at: DateTime<Utc>,
    ) {
        let Some(schema) = self.types.get(logical) else {
            return;
        };
        for (pointer, field) in &schema.row_fields {
            let Some(slot) = payload.pointer_mut(pointer) else {
                continue;
            };
            if !slot.is_null() {
                continue;
            }
            *slot = match field {
                RowField::RunId => json!(run_id.as_str()),
                RowField::CreatedAt => json!(created_at),
            };
        }
    }

    /// Rename fields, then inject defaults.
    pub fn normalize(&self, logical: &str, payload: &mut Value) {
        self.rename_fields(logical, payload);
        self.inject_defaults(logical, payload);
    }
}

/// Recursively insert keys present in `template` but absent from `target`.
/// Existing values are never overwritten, and type mismatches are left alone.
fn merge_defaults(target: &mut Value, template: &Value) {
    let (Some(target_obj), Some(template_obj)) = (target.as_object_mut(), template.as_object()) else {
        return;
    };
    merge_objects(target_obj, template_obj);
}

fn merge_objects(target: &mut Map<String, Value>, template: &Map<String, Value>) {
    for (key, default) in template {
        match target.get_mut(key) {
            Some(existing) => merge_defaults(existing, default),
            None => {
                target.insert(key.clone(), default.clone());
            }
        }
    }
}
