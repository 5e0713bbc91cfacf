//! The synthesis pipeline
//!
//! Raw research notes flow through normalization, canonicalization,
//! completeness checking, pattern detection, drafting and citation resolution
//! into a [`FinalBundle`]. [`SynthesisPipeline`] drives the phases and owns
//! caching and resumption; the phase modules are plain functions over data.

mod bundle;
mod canonical;
mod citations;
mod config;
mod diagnostics;
mod diversity;
mod engine;
mod error;
mod markdown;
mod normalize;
mod patterns;
mod policy;

pub use bundle::{
    BundleCitation, BundleDiversity, BundleMetadata, BundleQa, BundleSection, BundleSections,
    FinalBundle,
};
pub use canonical::{AggregatedCitation, CanonicalBuilder, CanonicalDataset, CanonicalSlot, CitationIndex};
pub use citations::{extract_markers, CitationCoverage, CitationResolver};
pub use config::{
    ConfigError, SlotDefinition, SynthesisConfig, SynthesisOptions, DEFAULT_COMPLETENESS_THRESHOLD,
};
pub use diagnostics::{Diagnostic, Diagnostics};
pub use diversity::DiversityMetrics;
pub use engine::{DraftedSections, PatternSummary, SynthesisOutcome, SynthesisPipeline};
pub use error::{SynthesisError, SynthesisResult};
pub use normalize::{
    normalize_notes, CitationOrigin, NormalizedNote, NormalizedNotes, Normalizer, NoteTelemetry,
};
pub use patterns::{
    Pattern, PatternDetector, PatternKind, PatternRule, PatternSet, PatternTable,
    PATTERN_TABLE_VERSION,
};
pub use policy::{CompletenessPolicy, CompletenessReport};
