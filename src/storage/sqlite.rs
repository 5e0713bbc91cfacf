//! SQLite storage backend for Dossier

use super::traits::{
    decode_lenient, ArtifactId, ArtifactStore, NoteStore, OpenStore, RunStore, StorageError,
    StorageResult, StoredArtifact,
};
use crate::model::{NoteStatus, ResearchNote, Run, RunId, RunStatus};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;

/// SQLite-backed store for runs, raw notes, and artifacts
///
/// Uses a single SQLite database file. Thread-safe via internal mutex on the
/// connection. The `artifacts` table is append-only: rows are inserted and
/// never updated, so a reader sees either nothing or a complete payload.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Initialize the database schema
    ///
    /// Base tables first, then migrations for columns added after the first
    /// release, then indexes that depend on migrated columns.
    fn init_schema(conn: &Connection) -> StorageResult<()> {
        conn.execute_batch(
            r#"
            -- Runs table
            CREATE TABLE IF NOT EXISTS runs (
                id TEXT PRIMARY KEY,
                source_id TEXT NOT NULL,
                target_id TEXT,
                status TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            -- Raw research notes (base schema - telemetry added via migration)
            CREATE TABLE IF NOT EXISTS notes (
                run_id TEXT NOT NULL,
                slot_id TEXT NOT NULL,
                status TEXT NOT NULL,
                fields_json TEXT,
                citations_json TEXT,
                PRIMARY KEY (run_id, slot_id)
            );

            -- Artifacts (append-only)
            CREATE TABLE IF NOT EXISTS artifacts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                run_id TEXT NOT NULL,
                phase TEXT NOT NULL,
                artifact_type TEXT NOT NULL,
                payload TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_artifacts_lookup
                ON artifacts(run_id, phase, artifact_type);

            -- Enable WAL mode for concurrent reads during writes
            PRAGMA journal_mode = WAL;
            "#,
        )?;

        Self::migrate_add_note_telemetry(conn)?;

        Ok(())
    }

    /// Migration: add token/latency telemetry columns to notes
    ///
    /// SQLite doesn't support ALTER TABLE ADD COLUMN IF NOT EXISTS,
    /// so we check if columns exist first using table_info pragma.
    fn migrate_add_note_telemetry(conn: &Connection) -> StorageResult<()> {
        let has_tokens: bool = conn
            .query_row(
                "SELECT COUNT(*) > 0 FROM pragma_table_info('notes') WHERE name = 'tokens_used'",
                [],
                |row| row.get(0),
            )
            .unwrap_or(false);

        if !has_tokens {
            conn.execute(
                "ALTER TABLE notes ADD COLUMN tokens_used INTEGER NOT NULL DEFAULT 0",
                [],
            )?;
            conn.execute(
                "ALTER TABLE notes ADD COLUMN duration_ms INTEGER NOT NULL DEFAULT 0",
                [],
            )?;
        }

        Ok(())
    }

    fn format_time(ts: &DateTime<Utc>) -> String {
        // Fixed-width UTC form so created_at sorts lexicographically.
        ts.to_rfc3339_opts(SecondsFormat::Micros, true)
    }

    fn parse_time(raw: &str) -> StorageResult<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| StorageError::DateParse(e.to_string()))
    }

    /// Insert or replace one raw note, as the note producer would.
    ///
    /// `fields` and `citations` are written as JSON text; callers that need to
    /// reproduce historical malformed rows can use [`Self::insert_raw_note`].
    pub fn insert_note(&self, run_id: &RunId, note: &ResearchNote) -> StorageResult<()> {
        let fields = serde_json::to_string(&note.fields)?;
        let citations = if note.citations.is_null() {
            None
        } else {
            Some(serde_json::to_string(&note.citations)?)
        };
        self.insert_raw_note(
            run_id,
            &note.slot_id,
            note.status.as_str(),
            Some(&fields),
            citations.as_deref(),
            note.tokens_used,
            note.duration_ms,
        )
    }

    /// Insert a note with verbatim column text.
    #[allow(clippy::too_many_arguments)]
    pub fn insert_raw_note(
        &self,
        run_id: &RunId,
        slot_id: &str,
        status: &str,
        fields_json: Option<&str>,
        citations_json: Option<&str>,
        tokens_used: u64,
        duration_ms: u64,
    ) -> StorageResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO notes (run_id, slot_id, status, fields_json, citations_json, tokens_used, duration_ms)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(run_id, slot_id) DO UPDATE SET
                status = excluded.status,
                fields_json = excluded.fields_json,
                citations_json = excluded.citations_json,
                tokens_used = excluded.tokens_used,
                duration_ms = excluded.duration_ms
            "#,
            params![
                run_id.as_str(),
                slot_id,
                status,
                fields_json,
                citations_json,
                tokens_used as i64,
                duration_ms as i64,
            ],
        )?;
        Ok(())
    }

    fn row_to_artifact(
        id: i64,
        run_id: String,
        phase: String,
        artifact_type: String,
        payload: String,
        created_at: String,
    ) -> StorageResult<StoredArtifact> {
        Ok(StoredArtifact {
            id,
            run_id: RunId::from_string(run_id),
            phase,
            artifact_type,
            payload,
            created_at: Self::parse_time(&created_at)?,
        })
    }
}

impl OpenStore for SqliteStore {
    fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl NoteStore for SqliteStore {
    fn get_notes(&self, run_id: &RunId) -> StorageResult<Vec<ResearchNote>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT slot_id, status, fields_json, citations_json, tokens_used, duration_ms
             FROM notes WHERE run_id = ?1",
        )?;
        let rows = stmt.query_map(params![run_id.as_str()], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, i64>(4)?,
                row.get::<_, i64>(5)?,
            ))
        })?;

        let mut notes = Vec::new();
        for row in rows {
            let (slot_id, status, fields, citations, tokens, duration) = row?;
            notes.push(ResearchNote {
                slot_id,
                status: NoteStatus::parse(&status),
                fields: decode_lenient(fields),
                citations: decode_lenient(citations),
                tokens_used: tokens.max(0) as u64,
                duration_ms: duration.max(0) as u64,
            });
        }

        Ok(notes)
    }
}

impl RunStore for SqliteStore {
    fn save_run(&self, run: &Run) -> StorageResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO runs (id, source_id, target_id, status, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(id) DO UPDATE SET
                source_id = excluded.source_id,
                target_id = excluded.target_id,
                status = excluded.status,
                updated_at = excluded.updated_at
            "#,
            params![
                run.id.as_str(),
                run.source_id,
                run.target_id,
                run.status.as_str(),
                Self::format_time(&run.created_at),
                Self::format_time(&run.updated_at),
            ],
        )?;
        Ok(())
    }

    fn load_run(&self, id: &RunId) -> StorageResult<Option<Run>> {
        let conn = self.conn.lock().unwrap();
        let row: Option<(String, Option<String>, String, String, String)> = conn
            .query_row(
                "SELECT source_id, target_id, status, created_at, updated_at FROM runs WHERE id = ?1",
                params![id.as_str()],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)),
            )
            .optional()?;

        let Some((source_id, target_id, status, created_at, updated_at)) = row else {
            return Ok(None);
        };

        let status = RunStatus::parse(&status)
            .ok_or_else(|| StorageError::InvalidValue(format!("run status {:?}", status)))?;

        Ok(Some(Run {
            id: id.clone(),
            source_id,
            target_id,
            status,
            created_at: Self::parse_time(&created_at)?,
            updated_at: Self::parse_time(&updated_at)?,
        }))
    }
}

impl ArtifactStore for SqliteStore {
    fn save_artifact(
        &self,
        run_id: &RunId,
        phase: &str,
        artifact_type: &str,
        payload: &str,
    ) -> StorageResult<ArtifactId> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO artifacts (run_id, phase, artifact_type, payload, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                run_id.as_str(),
                phase,
                artifact_type,
                payload,
                Self::format_time(&Utc::now()),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn load_latest(
        &self,
        run_id: &RunId,
        phase: &str,
        artifact_types: &[&str],
    ) -> StorageResult<Option<StoredArtifact>> {
        if artifact_types.is_empty() {
            return Ok(None);
        }

        let conn = self.conn.lock().unwrap();

        let placeholders: Vec<String> = (0..artifact_types.len())
            .map(|i| format!("?{}", i + 3))
            .collect();
        let sql = format!(
            "SELECT id, run_id, phase, artifact_type, payload, created_at FROM artifacts
             WHERE run_id = ?1 AND phase = ?2 AND artifact_type IN ({})
             ORDER BY created_at DESC, id DESC LIMIT 1",
            placeholders.join(", ")
        );

        let mut params_vec: Vec<&dyn rusqlite::ToSql> = Vec::with_capacity(artifact_types.len() + 2);
        let run = run_id.as_str();
        params_vec.push(&run);
        params_vec.push(&phase);
        for t in artifact_types {
            params_vec.push(t);
        }

        let row = conn
            .query_row(&sql, params_vec.as_slice(), |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                ))
            })
            .optional()?;

        match row {
            Some((id, run_id, phase, artifact_type, payload, created_at)) => Ok(Some(
                Self::row_to_artifact(id, run_id, phase, artifact_type, payload, created_at)?,
            )),
            None => Ok(None),
        }
    }

    fn count_artifacts(&self, run_id: &RunId, phase: &str, artifact_type: &str) -> StorageResult<usize> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM artifacts WHERE run_id = ?1 AND phase = ?2 AND artifact_type = ?3",
            params![run_id.as_str(), phase, artifact_type],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn create_test_store() -> SqliteStore {
        SqliteStore::open_in_memory().unwrap()
    }

    fn run_id() -> RunId {
        RunId::from_string("run-1")
    }

    #[test]
    fn test_open_in_memory() {
        let store = create_test_store();
        assert!(store.get_notes(&run_id()).unwrap().is_empty());
    }

    #[test]
    fn test_save_and_load_run() {
        let store = create_test_store();
        let mut run = Run::new(run_id(), "acme").with_target("globex");
        store.save_run(&run).unwrap();

        run.transition(RunStatus::Running);
        store.save_run(&run).unwrap();

        let loaded = store.load_run(&run_id()).unwrap().unwrap();
        assert_eq!(loaded.source_id, "acme");
        assert_eq!(loaded.target_id.as_deref(), Some("globex"));
        assert_eq!(loaded.status, RunStatus::Running);
    }

    #[test]
    fn test_load_missing_run() {
        let store = create_test_store();
        assert!(store.load_run(&RunId::from_string("nope")).unwrap().is_none());
    }

    #[test]
    fn test_insert_and_read_notes() {
        let store = create_test_store();
        let note = ResearchNote::new("NB-1", json!({"pressures": ["a"]}))
            .with_citations(json!([{"url": "https://a.com"}]))
            .with_telemetry(100, 2000);
        store.insert_note(&run_id(), &note).unwrap();

        let notes = store.get_notes(&run_id()).unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0], note);
    }

    #[test]
    fn test_malformed_note_columns_surface_as_strings() {
        let store = create_test_store();
        store
            .insert_raw_note(&run_id(), "NB2", "completed", Some("{not json"), Some("[{broken"), 0, 0)
            .unwrap();

        let notes = store.get_notes(&run_id()).unwrap();
        assert_eq!(notes[0].fields, json!("{not json"));
        assert_eq!(notes[0].citations, json!("[{broken"));
    }

    #[test]
    fn test_artifacts_are_append_only_and_latest_wins() {
        let store = create_test_store();
        let first = store.save_artifact(&run_id(), "synthesis", "final_bundle", "{\"v\":1}").unwrap();
        let second = store.save_artifact(&run_id(), "synthesis", "final_bundle", "{\"v\":2}").unwrap();
        assert!(second > first);

        let latest = store
            .load_latest(&run_id(), "synthesis", &["final_bundle"])
            .unwrap()
            .unwrap();
        assert_eq!(latest.id, second);
        assert_eq!(latest.payload, "{\"v\":2}");
        assert_eq!(store.count_artifacts(&run_id(), "synthesis", "final_bundle").unwrap(), 2);
    }

    #[test]
    fn test_load_latest_spans_alias_names() {
        let store = create_test_store();
        store.save_artifact(&run_id(), "synthesis", "report_bundle", "{\"old\":true}").unwrap();
        let newest = store.save_artifact(&run_id(), "synthesis", "final_bundle", "{}").unwrap();

        let latest = store
            .load_latest(&run_id(), "synthesis", &["final_bundle", "report_bundle"])
            .unwrap()
            .unwrap();
        assert_eq!(latest.id, newest);
        assert!(store
            .load_latest(&run_id(), "synthesis", &[])
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_artifacts_isolated_per_run_and_phase() {
        let store = create_test_store();
        store.save_artifact(&run_id(), "drafting", "drafted_sections", "{}").unwrap();
        assert!(store
            .load_latest(&RunId::from_string("other"), "drafting", &["drafted_sections"])
            .unwrap()
            .is_none());
        assert!(store
            .load_latest(&run_id(), "synthesis", &["drafted_sections"])
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_migration_adds_telemetry_to_legacy_notes_table() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE notes (
                run_id TEXT NOT NULL,
                slot_id TEXT NOT NULL,
                status TEXT NOT NULL,
                fields_json TEXT,
                citations_json TEXT,
                PRIMARY KEY (run_id, slot_id)
            );
            INSERT INTO notes VALUES ('run-1', 'NB1', 'completed', '{}', NULL);",
        )
        .unwrap();

        SqliteStore::init_schema(&conn).unwrap();
        let store = SqliteStore { conn: Mutex::new(conn) };

        let notes = store.get_notes(&run_id()).unwrap();
        assert_eq!(notes[0].tokens_used, 0);
        assert!(notes[0].citations.is_null());
    }

    #[test]
    fn test_wal_mode_enabled_at_connection() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test-wal.db");
        let store = SqliteStore::open(&db_path).unwrap();

        let journal_mode: String = store
            .conn
            .lock()
            .unwrap()
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap();

        assert_eq!(journal_mode, "wal");
    }

    #[test]
    fn test_artifacts_persist_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("nested").join("dossier.db");

        {
            let store = SqliteStore::open(&db_path).unwrap();
            store.save_artifact(&run_id(), "synthesis", "final_bundle", "{}").unwrap();
        }

        let store = SqliteStore::open(&db_path).unwrap();
        assert_eq!(store.count_artifacts(&run_id(), "synthesis", "final_bundle").unwrap(), 1);
    }
}
