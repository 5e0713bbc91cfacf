//! Artifact repository: alias-aware, schema-normalizing reads over an
//! append-only [`ArtifactStore`].

use super::alias::AliasTable;
use super::phase::{artifact_type, Phase};
use super::schema::SchemaRegistry;
use crate::model::RunId;
use crate::storage::{ArtifactId, ArtifactStore, StorageResult};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// A successfully read and normalized artifact.
#[derive(Debug, Clone)]
pub struct LoadedArtifact {
    pub id: ArtifactId,
    /// The physical type name the row was stored under
    pub stored_type: String,
    pub created_at: DateTime<Utc>,
    pub payload: Value,
}

/// Outcome of reading the current artifact for a (run, phase, type).
#[derive(Debug, Clone)]
pub enum ArtifactLoad {
    /// No row exists under any alias
    Missing,
    /// A row exists but its payload is unusable; callers treat this as a miss
    Corrupt {
        artifact_id: ArtifactId,
        stored_type: String,
        reason: String,
    },
    Found(LoadedArtifact),
}

impl ArtifactLoad {
    pub fn found(self) -> Option<LoadedArtifact> {
        match self {
            Self::Found(loaded) => Some(loaded),
            _ => None,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }
}

/// Reads and writes artifacts by logical (run, phase, type).
#[derive(Clone)]
pub struct ArtifactRepository {
    store: Arc<dyn ArtifactStore>,
    aliases: AliasTable,
    schemas: SchemaRegistry,
}

impl ArtifactRepository {
    /// Repository with the standard alias table and schemas.
    pub fn new(store: Arc<dyn ArtifactStore>) -> Self {
        Self {
            store,
            aliases: AliasTable::standard(),
            schemas: SchemaRegistry::standard(),
        }
    }

    pub fn with_aliases(mut self, aliases: AliasTable) -> Self {
        self.aliases = aliases;
        self
    }

    pub fn with_schemas(mut self, schemas: SchemaRegistry) -> Self {
        self.schemas = schemas;
        self
    }

    pub fn aliases(&self) -> &AliasTable {
        &self.aliases
    }

    /// Append a new artifact. Always written under the logical name.
    pub fn save(
        &self,
        run_id: &RunId,
        phase: Phase,
        artifact_type: &str,
        payload: &Value,
    ) -> StorageResult<ArtifactId> {
        let logical = self.aliases.logical_name(artifact_type);
        let text = serde_json::to_string(payload)?;
        let id = self.store.save_artifact(run_id, phase.as_str(), logical, &text)?;
        debug!(run_id = %run_id, phase = %phase, artifact_type = logical, artifact_id = id, "artifact saved");
        Ok(id)
    }

    /// Serialize and save a typed payload.
    pub fn save_typed<T: Serialize>(
        &self,
        run_id: &RunId,
        phase: Phase,
        artifact_type: &str,
        payload: &T,
    ) -> StorageResult<ArtifactId> {
        let value = serde_json::to_value(payload)?;
        self.save(run_id, phase, artifact_type, &value)
    }

    /// Load the authoritative artifact, classifying corruption.
    ///
    /// Searches every alias of `artifact_type`; the most recently created row
    /// wins. The payload must parse as JSON and carry the type's required
    /// top-level keys (after field renames); defaults are then injected and
    /// empty row-backed values filled from the row.
    pub fn load_artifact(
        &self,
        run_id: &RunId,
        phase: Phase,
        artifact_type: &str,
    ) -> StorageResult<ArtifactLoad> {
        let logical = self.aliases.logical_name(artifact_type);
        let candidates = self.aliases.candidates(artifact_type);

        let Some(row) = self.store.load_latest(run_id, phase.as_str(), &candidates)? else {
            return Ok(ArtifactLoad::Missing);
        };

        let mut payload: Value = match serde_json::from_str(&row.payload) {
            Ok(value) => value,
            Err(e) => {
                return Ok(self.corrupt(run_id, phase, row.id, row.artifact_type, e.to_string()));
            }
        };

        self.schemas.rename_fields(logical, &mut payload);
        let missing = self.schemas.missing_required(logical, &payload);
        if !missing.is_empty() {
            let reason = format!("missing required keys: {}", missing.join(", "));
            return Ok(self.corrupt(run_id, phase, row.id, row.artifact_type, reason));
        }
        self.schemas.inject_defaults(logical, &mut payload);
        self.schemas
            .fill_row_context(logical, &mut payload, run_id, row.created_at);

        if row.artifact_type != logical {
            debug!(
                run_id = %run_id,
                phase = %phase,
                stored_type = %row.artifact_type,
                artifact_type = logical,
                "artifact resolved through alias"
            );
        }

        Ok(ArtifactLoad::Found(LoadedArtifact {
            id: row.id,
            stored_type: row.artifact_type,
            created_at: row.created_at,
            payload,
        }))
    }

    /// `load(run, phase, type) -> payload | absent`. Corrupt rows read as absent.
    pub fn load(&self, run_id: &RunId, phase: Phase, artifact_type: &str) -> StorageResult<Option<Value>> {
        Ok(self
            .load_artifact(run_id, phase, artifact_type)?
            .found()
            .map(|loaded| loaded.payload))
    }

    /// Load and deserialize into `T`. A payload that does not fit `T` is
    /// reported as corrupt rather than as an error.
    pub fn load_typed<T: DeserializeOwned>(
        &self,
        run_id: &RunId,
        phase: Phase,
        artifact_type: &str,
    ) -> StorageResult<(ArtifactLoad, Option<T>)> {
        let load = self.load_artifact(run_id, phase, artifact_type)?;
        let ArtifactLoad::Found(loaded) = load else {
            return Ok((load, None));
        };
        match serde_json::from_value::<T>(loaded.payload.clone()) {
            Ok(typed) => Ok((ArtifactLoad::Found(loaded), Some(typed))),
            Err(e) => Ok((
                self.corrupt(run_id, phase, loaded.id, loaded.stored_type, e.to_string()),
                None,
            )),
        }
    }

    /// The cache-hit path: the current `synthesis/final_bundle`, if structurally valid.
    pub fn load_final_bundle(&self, run_id: &RunId) -> StorageResult<ArtifactLoad> {
        self.load_artifact(run_id, Phase::Synthesis, artifact_type::FINAL_BUNDLE)
    }

    /// Number of rows stored under exactly this (phase, type) name.
    pub fn count(&self, run_id: &RunId, phase: Phase, artifact_type: &str) -> StorageResult<usize> {
        self.store.count_artifacts(run_id, phase.as_str(), artifact_type)
    }

    fn corrupt(
        &self,
        run_id: &RunId,
        phase: Phase,
        artifact_id: ArtifactId,
        stored_type: String,
        reason: String,
    ) -> ArtifactLoad {
        warn!(
            run_id = %run_id,
            phase = %phase,
            artifact_id,
            stored_type = %stored_type,
            reason = %reason,
            "cached artifact unusable, treating as cache miss"
        );
        ArtifactLoad::Corrupt {
            artifact_id,
            stored_type,
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use serde_json::json;

    fn repo() -> (Arc<MemoryStore>, ArtifactRepository) {
        let store = Arc::new(MemoryStore::new());
        let repo = ArtifactRepository::new(store.clone());
        (store, repo)
    }

    fn valid_bundle() -> Value {
        json!({
            "metadata": {"run_id": "r", "source_id": "s", "target_id": null, "created_at": "2026-01-01T00:00:00Z"},
            "sections": {},
            "aggregated_citations": [],
            "diversity_metrics": {"unique_domains": 0, "score": 0.0},
            "qa": {"phantom_citations": [], "unused_citations": []}
        })
    }

    #[test]
    fn save_then_load_round_trips() {
        let (_, repo) = repo();
        let run = RunId::from_string("r");
        repo.save(&run, Phase::Synthesis, "final_bundle", &valid_bundle()).unwrap();
        assert_eq!(repo.load(&run, Phase::Synthesis, "final_bundle").unwrap(), Some(valid_bundle()));
    }

    #[test]
    fn legacy_physical_name_is_found_by_logical_name() {
        let (store, repo) = repo();
        let run = RunId::from_string("r");
        store
            .save_artifact(&run, "synthesis", "report_bundle", &valid_bundle().to_string())
            .unwrap();

        let loaded = repo.load_final_bundle(&run).unwrap().found().unwrap();
        assert_eq!(loaded.stored_type, "report_bundle");
    }

    #[test]
    fn logical_save_is_found_by_legacy_name() {
        let (_, repo) = repo();
        let run = RunId::from_string("r");
        repo.save(&run, Phase::Drafting, "drafted_sections", &json!({"sections": []}))
            .unwrap();
        assert!(repo.load(&run, Phase::Drafting, "section_drafts").unwrap().is_some());
        // Saved under the logical name even when asked with an alias.
        repo.save(&run, Phase::Drafting, "section_drafts", &json!({"sections": []}))
            .unwrap();
        assert_eq!(repo.count(&run, Phase::Drafting, "drafted_sections").unwrap(), 2);
    }

    #[test]
    fn unparseable_payload_is_corrupt_not_error() {
        let (store, repo) = repo();
        let run = RunId::from_string("r");
        store.save_artifact(&run, "synthesis", "final_bundle", "{truncated").unwrap();

        let load = repo.load_final_bundle(&run).unwrap();
        assert!(matches!(load, ArtifactLoad::Corrupt { .. }));
        assert!(repo.load(&run, Phase::Synthesis, "final_bundle").unwrap().is_none());
    }

    #[test]
    fn bundle_missing_required_keys_is_corrupt() {
        let (store, repo) = repo();
        let run = RunId::from_string("r");
        store
            .save_artifact(&run, "synthesis", "final_bundle", "{\"metadata\": {}}")
            .unwrap();
        match repo.load_final_bundle(&run).unwrap() {
            ArtifactLoad::Corrupt { reason, .. } => assert!(reason.contains("sections")),
            other => panic!("expected corrupt, got {:?}", other),
        }
    }

    #[test]
    fn older_bundle_without_qa_gets_defaults() {
        let (store, repo) = repo();
        let run = RunId::from_string("r");
        let legacy = json!({
            "metadata": {"run_id": "r"},
            "sections": {},
            "citations": [{"id": 1, "title": "t", "url": "https://a.com", "source": "a"}]
        });
        store
            .save_artifact(&run, "synthesis", "synthesis_bundle", &legacy.to_string())
            .unwrap();

        let payload = repo.load_final_bundle(&run).unwrap().found().unwrap().payload;
        assert_eq!(payload["aggregated_citations"][0]["id"], 1);
        assert_eq!(payload["qa"]["unused_citations"], json!([]));
        assert_eq!(payload["diversity_metrics"]["score"], 0.0);
    }

    #[test]
    fn bundle_with_partial_metadata_loads_typed() {
        let (store, repo) = repo();
        let run = RunId::from_string("r");
        let legacy = json!({
            "metadata": {"run_id": "r"},
            "sections": {"executive_summary": {"content": "x"}},
            "citations": [{"id": 1, "title": "t", "url": "https://a.com", "source": "a"}]
        });
        store
            .save_artifact(&run, "synthesis", "report_bundle", &legacy.to_string())
            .unwrap();

        let (load, bundle) = repo
            .load_typed::<crate::pipeline::FinalBundle>(&run, Phase::Synthesis, "final_bundle")
            .unwrap();
        let loaded = load.found().unwrap();
        let bundle = bundle.unwrap();
        assert_eq!(bundle.metadata.source_id, "");
        assert_eq!(bundle.metadata.created_at, loaded.created_at);
        assert_eq!(bundle.aggregated_citations.len(), 1);
    }

    #[test]
    fn newest_row_is_authoritative() {
        let (_, repo) = repo();
        let run = RunId::from_string("r");
        let mut first = valid_bundle();
        first["metadata"]["source_id"] = json!("first");
        let mut second = valid_bundle();
        second["metadata"]["source_id"] = json!("second");
        repo.save(&run, Phase::Synthesis, "final_bundle", &first).unwrap();
        repo.save(&run, Phase::Synthesis, "final_bundle", &second).unwrap();

        let payload = repo.load(&run, Phase::Synthesis, "final_bundle").unwrap().unwrap();
        assert_eq!(payload["metadata"]["source_id"], "second");
    }

    #[test]
    fn typed_load_mismatch_is_corrupt() {
        #[derive(serde::Deserialize)]
        #[allow(dead_code)]
        struct Expect {
            sections: Vec<String>,
        }
        let (_, repo) = repo();
        let run = RunId::from_string("r");
        repo.save(&run, Phase::Drafting, "drafted_sections", &json!({"sections": {"not": "a list"}}))
            .unwrap();
        let (load, typed) = repo
            .load_typed::<Expect>(&run, Phase::Drafting, "drafted_sections")
            .unwrap();
        assert!(typed.is_none());
        assert!(matches!(load, ArtifactLoad::Corrupt { .. }));
    }
}
