//! Artifact persistence with backward/forward compatible reads
//!
//! Every intermediate and final pipeline output is an artifact keyed by
//! (run, phase, type). Rows are immutable; the newest row for a key is
//! authoritative. Consumers ask by logical type name and get payloads
//! normalized to the current schema, whatever name or shape they were
//! stored under.

mod alias;
mod phase;
mod repository;
mod schema;

pub use alias::AliasTable;
pub use phase::{artifact_type, Phase};
pub use repository::{ArtifactLoad, ArtifactRepository, LoadedArtifact};
pub use schema::{FieldAlias, RowField, SchemaRegistry};
