//! In-memory storage backend
//!
//! Same append-only semantics as [`super::SqliteStore`], backed by `DashMap`.
//! Used by tests and by embedders that persist elsewhere.

use super::traits::{
    ArtifactId, ArtifactStore, NoteStore, RunStore, StorageResult, StoredArtifact,
};
use crate::model::{ResearchNote, Run, RunId};
use chrono::{SubsecRound, Utc};
use dashmap::DashMap;
use std::sync::atomic::{AtomicI64, Ordering};

#[derive(Debug, Default)]
pub struct MemoryStore {
    runs: DashMap<RunId, Run>,
    notes: DashMap<RunId, Vec<ResearchNote>>,
    artifacts: DashMap<RunId, Vec<StoredArtifact>>,
    next_id: AtomicI64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a raw note for a run. Notes are kept verbatim, including
    /// duplicate slots under different spellings.
    pub fn insert_note(&self, run_id: &RunId, note: ResearchNote) {
        self.notes.entry(run_id.clone()).or_default().push(note);
    }

    /// Drop every note recorded for a slot (matched by canonical slot id).
    pub fn remove_slot(&self, run_id: &RunId, slot: &str) {
        if let Some(mut notes) = self.notes.get_mut(run_id) {
            notes.retain(|n| !crate::model::SlotId::equivalent(&n.slot_id, slot));
        }
    }
}

impl NoteStore for MemoryStore {
    fn get_notes(&self, run_id: &RunId) -> StorageResult<Vec<ResearchNote>> {
        Ok(self
            .notes
            .get(run_id)
            .map(|notes| notes.clone())
            .unwrap_or_default())
    }
}

impl RunStore for MemoryStore {
    fn save_run(&self, run: &Run) -> StorageResult<()> {
        self.runs.insert(run.id.clone(), run.clone());
        Ok(())
    }

    fn load_run(&self, id: &RunId) -> StorageResult<Option<Run>> {
        Ok(self.runs.get(id).map(|r| r.clone()))
    }
}

impl ArtifactStore for MemoryStore {
    fn save_artifact(
        &self,
        run_id: &RunId,
        phase: &str,
        artifact_type: &str,
        payload: &str,
    ) -> StorageResult<ArtifactId> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let artifact = StoredArtifact {
            id,
            run_id: run_id.clone(),
            phase: phase.to_string(),
            artifact_type: artifact_type.to_string(),
            payload: payload.to_string(),
            // Matches the microsecond precision of the SQLite store.
            created_at: Utc::now().trunc_subsecs(6),
        };
        self.artifacts.entry(run_id.clone()).or_default().push(artifact);
        Ok(id)
    }

    fn load_latest(
        &self,
        run_id: &RunId,
        phase: &str,
        artifact_types: &[&str],
    ) -> StorageResult<Option<StoredArtifact>> {
        let Some(rows) = self.artifacts.get(run_id) else {
            return Ok(None);
        };
        Ok(rows
            .iter()
            .filter(|a| a.phase == phase && artifact_types.contains(&a.artifact_type.as_str()))
            .max_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)))
            .cloned())
    }

    fn count_artifacts(&self, run_id: &RunId, phase: &str, artifact_type: &str) -> StorageResult<usize> {
        Ok(self
            .artifacts
            .get(run_id)
            .map(|rows| {
                rows.iter()
                    .filter(|a| a.phase == phase && a.artifact_type == artifact_type)
                    .count()
            })
            .unwrap_or(0))
    }
}
