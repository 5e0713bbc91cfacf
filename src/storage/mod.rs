//! Storage backends for Dossier
//!
//! Runs, raw notes, and artifacts are reached through the `NoteStore`,
//! `RunStore`, and `ArtifactStore` traits. `SqliteStore` is the persistent
//! implementation; `MemoryStore` serves tests and embedders.

mod memory;
mod sqlite;
mod traits;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{
    ArtifactId, ArtifactStore, NoteStore, OpenStore, RunStore, StorageError, StorageResult,
    StoredArtifact,
};
