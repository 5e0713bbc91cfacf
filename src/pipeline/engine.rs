//! SynthesisPipeline: the main entry point
//!
//! Runs normalization, canonicalization, pattern detection, drafting and
//! citation resolution for one run, persisting each stage as an artifact so a
//! later call can resume from the latest valid one. A valid final bundle
//! short-circuits everything.

use super::bundle::FinalBundle;
use super::canonical::{CanonicalBuilder, CanonicalDataset};
use super::citations::CitationResolver;
use super::config::{SynthesisConfig, SynthesisOptions};
use super::diagnostics::{Diagnostic, Diagnostics};
use super::error::{SynthesisError, SynthesisResult};
use super::normalize::{NormalizedNotes, Normalizer};
use super::patterns::{PatternDetector, PatternKind, PatternSet};
use super::policy::{CompletenessPolicy, CompletenessReport};
use crate::artifact::{artifact_type, ArtifactLoad, ArtifactRepository, Phase};
use crate::compose::{MarkupPolicy, Section, SectionComposer, SectionDrafter};
use crate::model::{Run, RunId, RunStatus};
use crate::storage::{ArtifactId, ArtifactStore, NoteStore, RunStore};
use chrono::{DateTime, SubsecRound, Utc};
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};

/// Drafting-phase artifact: composed sections plus the pattern set they were
/// drafted from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftedSections {
    pub sections: Vec<Section>,
    #[serde(default)]
    pub pattern_counts: BTreeMap<PatternKind, usize>,
    #[serde(default)]
    pub diagnostics: Diagnostics,
    #[serde(default)]
    pub patterns: PatternSet,
}

/// Pattern-detection telemetry. The patterns themselves live in
/// [`DraftedSections`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternSummary {
    pub table_version: u32,
    pub counts: BTreeMap<PatternKind, usize>,
    pub schema_mismatches: usize,
}

/// Result of one synthesis call.
#[derive(Debug, Clone)]
pub struct SynthesisOutcome {
    pub bundle: FinalBundle,
    /// The bundle was read from the repository, no phase ran
    pub cache_hit: bool,
    /// Row id of the final bundle artifact
    pub artifact_id: ArtifactId,
    /// Latest cached phase the build resumed from, if any
    pub resumed_from: Option<Phase>,
    pub completeness: Option<CompletenessReport>,
    pub diagnostics: Diagnostics,
}

/// The synthesis pipeline
///
/// Builds for the same run are serialized through a per-run lock; a caller
/// that waited on the lock re-checks the cache and reuses a bundle created
/// after its own request began. Different runs proceed independently. A
/// lock entry is dropped once no caller holds it.
pub struct SynthesisPipeline {
    notes: Arc<dyn NoteStore>,
    runs: Arc<dyn RunStore>,
    artifacts: ArtifactRepository,
    config: SynthesisConfig,
    detector: PatternDetector,
    composer: SectionComposer,
    run_locks: DashMap<RunId, Arc<Mutex<()>>>,
}

impl SynthesisPipeline {
    /// Pipeline over one store that holds notes, runs and artifacts.
    pub fn new<S>(store: Arc<S>, config: SynthesisConfig) -> SynthesisResult<Self>
    where
        S: NoteStore + RunStore + ArtifactStore + 'static,
    {
        Self::with_stores(store.clone(), store.clone(), store, config)
    }

    pub fn with_stores(
        notes: Arc<dyn NoteStore>,
        runs: Arc<dyn RunStore>,
        artifacts: Arc<dyn ArtifactStore>,
        config: SynthesisConfig,
    ) -> SynthesisResult<Self> {
        config.validate()?;
        let detector = PatternDetector::new(config.pattern_table.clone().unwrap_or_default());
        let composer = SectionComposer::new(
            SectionDrafter::default(),
            MarkupPolicy::standard().with_overrides(&config.markup),
        );
        Ok(Self {
            notes,
            runs,
            artifacts: ArtifactRepository::new(artifacts),
            config,
            detector,
            composer,
            run_locks: DashMap::new(),
        })
    }

    /// Replace the section composer.
    pub fn with_composer(mut self, composer: SectionComposer) -> Self {
        self.composer = composer;
        self
    }

    pub fn config(&self) -> &SynthesisConfig {
        &self.config
    }

    pub fn artifacts(&self) -> &ArtifactRepository {
        &self.artifacts
    }

    /// Build or load the final bundle for a run.
    pub fn synthesize(&self, run_id: &RunId, options: SynthesisOptions) -> SynthesisResult<SynthesisOutcome> {
        // Row timestamps are stored at microsecond precision.
        let requested_at = Utc::now().trunc_subsecs(6);
        let lock = self.run_lock(run_id);
        let result = {
            let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
            self.synthesize_locked(run_id, options, requested_at)
        };
        drop(lock);
        self.run_locks.remove_if(run_id, |_, lock| Arc::strong_count(lock) == 1);
        result
    }

    fn synthesize_locked(
        &self,
        run_id: &RunId,
        options: SynthesisOptions,
        requested_at: DateTime<Utc>,
    ) -> SynthesisResult<SynthesisOutcome> {
        let mut diagnostics = Diagnostics::new();
        if let Some(outcome) = self.cached_bundle(run_id, options, requested_at, &mut diagnostics)? {
            return Ok(outcome);
        }

        let mut run = self
            .runs
            .load_run(run_id)?
            .ok_or_else(|| SynthesisError::RunNotFound(run_id.clone()))?;
        // A finished run only changes status through a forced re-run.
        let track_status = options.force || !run.status.is_terminal();
        if track_status {
            run.transition(RunStatus::Running);
            self.runs.save_run(&run)?;
        } else {
            debug!(run_id = %run_id, status = run.status.as_str(), "rebuilding without touching run status");
        }
        info!(run_id = %run_id, force = options.force, persist_intermediate = options.persist_intermediate, "synthesis started");

        match self.build(&run, options, &mut diagnostics) {
            Ok(mut outcome) => {
                if track_status {
                    run.transition(RunStatus::Completed);
                    self.runs.save_run(&run)?;
                }
                info!(
                    run_id = %run_id,
                    artifact_id = outcome.artifact_id,
                    resumed_from = ?outcome.resumed_from,
                    diagnostics = diagnostics.len(),
                    "synthesis completed"
                );
                outcome.diagnostics = diagnostics;
                Ok(outcome)
            }
            Err(e) => {
                if track_status {
                    run.transition(RunStatus::Failed);
                    if let Err(save_err) = self.runs.save_run(&run) {
                        warn!(run_id = %run_id, error = %save_err, "failed to record run failure");
                    }
                }
                warn!(run_id = %run_id, error = %e, "synthesis failed");
                Err(e)
            }
        }
    }

    /// The current final bundle for a run, if one is stored and valid.
    pub fn load_final_bundle(&self, run_id: &RunId) -> SynthesisResult<Option<FinalBundle>> {
        let (_, bundle) =
            self.artifacts
                .load_typed::<FinalBundle>(run_id, Phase::Synthesis, artifact_type::FINAL_BUNDLE)?;
        Ok(bundle)
    }

    fn run_lock(&self, run_id: &RunId) -> Arc<Mutex<()>> {
        self.run_locks.entry(run_id.clone()).or_default().value().clone()
    }

    fn cached_bundle(
        &self,
        run_id: &RunId,
        options: SynthesisOptions,
        requested_at: DateTime<Utc>,
        diagnostics: &mut Diagnostics,
    ) -> SynthesisResult<Option<SynthesisOutcome>> {
        let Some((loaded_id, created_at, bundle)) =
            self.load_cached::<FinalBundle>(run_id, Phase::Synthesis, artifact_type::FINAL_BUNDLE, diagnostics)?
        else {
            debug!(run_id = %run_id, "no usable final bundle");
            return Ok(None);
        };

        // A forced rebuild still reuses a bundle some other caller finished
        // while this one waited for the run lock.
        if options.force && created_at <= requested_at {
            debug!(run_id = %run_id, artifact_id = loaded_id, "forced rebuild ignores cached bundle");
            return Ok(None);
        }

        info!(run_id = %run_id, artifact_id = loaded_id, "final bundle served from cache");
        Ok(Some(SynthesisOutcome {
            bundle,
            cache_hit: true,
            artifact_id: loaded_id,
            resumed_from: None,
            completeness: None,
            diagnostics: std::mem::take(diagnostics),
        }))
    }

    /// Typed load that records corruption as a diagnostic and reads it as a miss.
    fn load_cached<T: DeserializeOwned>(
        &self,
        run_id: &RunId,
        phase: Phase,
        artifact_type: &str,
        diagnostics: &mut Diagnostics,
    ) -> SynthesisResult<Option<(ArtifactId, DateTime<Utc>, T)>> {
        let (load, typed) = self.artifacts.load_typed::<T>(run_id, phase, artifact_type)?;
        match (load, typed) {
            (ArtifactLoad::Found(loaded), Some(value)) => Ok(Some((loaded.id, loaded.created_at, value))),
            (ArtifactLoad::Corrupt { reason, .. }, _) => {
                diagnostics.push(Diagnostic::ArtifactCorruption {
                    phase,
                    artifact_type: artifact_type.to_string(),
                    reason,
                });
                Ok(None)
            }
            _ => Ok(None),
        }
    }

    fn build(
        &self,
        run: &Run,
        options: SynthesisOptions,
        diagnostics: &mut Diagnostics,
    ) -> SynthesisResult<SynthesisOutcome> {
        let run_id = &run.id;
        let persist = options.persist_intermediate;
        let mut resumed_from = None;

        let cached_canonical = if options.force {
            None
        } else {
            self.load_cached::<CanonicalDataset>(
                run_id,
                Phase::Canonicalization,
                artifact_type::CANONICAL_DATASET,
                diagnostics,
            )?
        };

        let mut canonical_from_cache = cached_canonical.is_some();
        let mut canonical = match cached_canonical {
            Some((id, _, dataset)) => {
                debug!(run_id = %run_id, artifact_id = id, "resuming from cached canonical dataset");
                resumed_from = Some(Phase::Canonicalization);
                dataset
            }
            None => {
                let normalized = self.normalized(run_id, options.force, persist, diagnostics, &mut resumed_from)?;
                CanonicalBuilder::build(&normalized, &self.config.expected_slots())
            }
        };

        let policy = CompletenessPolicy::from_config(&self.config);
        let mut completeness = policy.evaluate(canonical.slots.keys());
        if !completeness.is_satisfied() && resumed_from.is_some() {
            // Notes may have arrived since the cached phases were written.
            debug!(run_id = %run_id, resumed_from = ?resumed_from, "cached input incomplete, renormalizing from notes");
            resumed_from = None;
            let normalized = self.normalized(run_id, true, persist, diagnostics, &mut resumed_from)?;
            canonical = CanonicalBuilder::build(&normalized, &self.config.expected_slots());
            canonical_from_cache = false;
            completeness = policy.evaluate(canonical.slots.keys());
        }
        if !completeness.is_satisfied() {
            warn!(
                run_id = %run_id,
                missing_core = ?completeness.missing_core,
                coverage = completeness.coverage,
                threshold = completeness.threshold,
                "required input missing"
            );
            return Err(SynthesisError::MissingRequiredInput {
                missing_core: completeness.missing_core,
                coverage: completeness.coverage,
                threshold: completeness.threshold,
            });
        }
        if persist && !canonical_from_cache {
            self.artifacts.save_typed(
                run_id,
                Phase::Canonicalization,
                artifact_type::CANONICAL_DATASET,
                &canonical,
            )?;
        }
        if !completeness.missing_optional.is_empty() {
            info!(run_id = %run_id, missing_optional = ?completeness.missing_optional, "optional slots missing, affected sections degrade");
        }

        let cached_drafts = if canonical_from_cache {
            self.load_cached::<DraftedSections>(run_id, Phase::Drafting, artifact_type::DRAFTED_SECTIONS, diagnostics)?
        } else {
            None
        };

        let mut sections = match cached_drafts {
            Some((id, _, drafts)) => {
                debug!(run_id = %run_id, artifact_id = id, "resuming from cached section drafts");
                resumed_from = Some(Phase::Drafting);
                diagnostics.extend(drafts.diagnostics);
                drafts.sections
            }
            None => self.draft(run_id, &canonical, persist, diagnostics)?,
        };

        let coverage = CitationResolver::resolve(&mut sections, canonical.citations.len());
        let bundle = FinalBundle::assemble(run, &canonical, &sections, &coverage, Utc::now());
        let artifact_id =
            self.artifacts
                .save_typed(run_id, Phase::Synthesis, artifact_type::FINAL_BUNDLE, &bundle)?;

        Ok(SynthesisOutcome {
            bundle,
            cache_hit: false,
            artifact_id,
            resumed_from,
            completeness: Some(completeness),
            diagnostics: Diagnostics::new(),
        })
    }

    /// Normalized notes, from cache unless `fresh`.
    fn normalized(
        &self,
        run_id: &RunId,
        fresh: bool,
        persist: bool,
        diagnostics: &mut Diagnostics,
        resumed_from: &mut Option<Phase>,
    ) -> SynthesisResult<NormalizedNotes> {
        if !fresh {
            if let Some((id, _, normalized)) = self.load_cached::<NormalizedNotes>(
                run_id,
                Phase::Normalization,
                artifact_type::NORMALIZED_NOTES,
                diagnostics,
            )? {
                debug!(run_id = %run_id, artifact_id = id, "resuming from cached normalized notes");
                *resumed_from = Some(Phase::Normalization);
                return Ok(normalized);
            }
        }

        let normalized = Normalizer::new(self.notes.as_ref()).normalize(run_id, diagnostics)?;
        if persist {
            self.artifacts.save_typed(
                run_id,
                Phase::Normalization,
                artifact_type::NORMALIZED_NOTES,
                &normalized,
            )?;
        }
        Ok(normalized)
    }

    fn draft(
        &self,
        run_id: &RunId,
        canonical: &CanonicalDataset,
        persist: bool,
        diagnostics: &mut Diagnostics,
    ) -> SynthesisResult<Vec<Section>> {
        let patterns = self.detector.detect(canonical, diagnostics);
        if persist {
            let summary = PatternSummary {
                table_version: self.detector.table().version,
                counts: patterns.counts(),
                schema_mismatches: patterns.schema_mismatches,
            };
            self.artifacts.save_typed(
                run_id,
                Phase::PatternDetection,
                artifact_type::PATTERN_SUMMARY,
                &summary,
            )?;
        }

        let mut drafting_diagnostics = Diagnostics::new();
        let sections = self.composer.compose(&patterns, &mut drafting_diagnostics);
        if persist {
            let drafts = DraftedSections {
                sections: sections.clone(),
                pattern_counts: patterns.counts(),
                diagnostics: drafting_diagnostics.clone(),
                patterns,
            };
            self.artifacts
                .save_typed(run_id, Phase::Drafting, artifact_type::DRAFTED_SECTIONS, &drafts)?;
        }
        diagnostics.extend(drafting_diagnostics);
        Ok(sections)
    }
}
