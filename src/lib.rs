//! Dossier: Evidence-Grounded Synthesis Pipeline
//!
//! Turns the per-slot research notes produced for a run into a
//! presentation-ready report bundle: fixed sections of validated HTML, every
//! factual claim traceable to a deduplicated citation list.
//!
//! # Core Concepts
//!
//! - **Slots**: fixed research dimensions (`NB1`..`NB15`), each answered by one note
//! - **Canonical dataset**: the run's notes keyed by canonical slot id, with one
//!   globally numbered citation list
//! - **Artifacts**: immutable per-phase outputs; the newest valid one is reused
//! - **Final bundle**: sections, aggregated citations, diversity metrics and QA
//!
//! # Example
//!
//! ```
//! use dossier::{MemoryStore, SynthesisConfig, SynthesisPipeline};
//! use std::sync::Arc;
//!
//! let store = Arc::new(MemoryStore::new());
//! let pipeline = SynthesisPipeline::new(store, SynthesisConfig::default()).unwrap();
//! assert_eq!(pipeline.config().expected_slots().len(), 15);
//! ```

pub mod artifact;
pub mod compose;
pub mod model;
pub mod pipeline;
pub mod storage;

pub use artifact::{ArtifactLoad, ArtifactRepository, Phase};
pub use compose::{Section, SectionCode};
pub use model::{Citation, NoteStatus, ResearchNote, Run, RunId, RunStatus, SlotId};
pub use pipeline::{
    Diagnostic, Diagnostics, FinalBundle, SynthesisConfig, SynthesisError, SynthesisOptions,
    SynthesisOutcome, SynthesisPipeline, SynthesisResult,
};
pub use storage::{
    ArtifactStore, MemoryStore, NoteStore, OpenStore, RunStore, SqliteStore, StorageError,
    StorageResult,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
