//! Pipeline configuration
//!
//! Policy values (slot partition, completeness threshold, pattern table) are
//! configuration, not constants. `SynthesisConfig::default()` reproduces the
//! production values.

use super::patterns::PatternTable;
use crate::compose::MarkupOverrides;
use crate::model::SlotId;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

/// Default share of expected slots that must be present.
pub const DEFAULT_COMPLETENESS_THRESHOLD: f64 = 0.8;

/// (number, topic, core) for the fifteen production `NB` slots.
const DEFAULT_SLOTS: [(u32, &str, bool); 15] = [
    (1, "Executive pressure profile", true),
    (2, "Operating environment", true),
    (3, "Financial health and margin pressure", true),
    (4, "Strategic priorities", true),
    (5, "Cost and efficiency programs", false),
    (6, "Technology and capability stack", true),
    (7, "Operational performance metrics", false),
    (8, "Competitive landscape", false),
    (9, "Growth levers", false),
    (10, "Risk signals", false),
    (11, "Leadership and decision makers", false),
    (12, "Partnerships and ecosystem", false),
    (13, "Customer and market signals", false),
    (14, "Timing and catalysts", false),
    (15, "Target alignment", false),
];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// One topic slot a research note can occupy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotDefinition {
    pub id: SlotId,
    #[serde(default)]
    pub topic: String,
    /// Core slots must be present for synthesis to proceed
    #[serde(default)]
    pub core: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisConfig {
    pub slots: Vec<SlotDefinition>,
    pub completeness_threshold: f64,
    /// Default for [`SynthesisOptions::persist_intermediate`]
    pub persist_intermediate: bool,
    /// Replaces the built-in pattern table when set
    pub pattern_table: Option<PatternTable>,
    /// Classes added to or removed from the markup allow-list
    pub markup: MarkupOverrides,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            slots: DEFAULT_SLOTS
                .iter()
                .map(|(number, topic, core)| SlotDefinition {
                    id: SlotId::new("NB", *number),
                    topic: topic.to_string(),
                    core: *core,
                })
                .collect(),
            completeness_threshold: DEFAULT_COMPLETENESS_THRESHOLD,
            persist_intermediate: true,
            pattern_table: None,
            markup: MarkupOverrides::default(),
        }
    }
}

impl SynthesisConfig {
    /// Parse and validate a YAML config. Missing keys take their defaults.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.completeness_threshold) {
            return Err(ConfigError::Invalid(format!(
                "completeness_threshold must be within [0, 1], got {}",
                self.completeness_threshold
            )));
        }
        if self.slots.is_empty() {
            return Err(ConfigError::Invalid("at least one slot is required".into()));
        }
        let mut seen = HashSet::new();
        for slot in &self.slots {
            if !seen.insert(&slot.id) {
                return Err(ConfigError::Invalid(format!("duplicate slot {}", slot.id)));
            }
        }
        Ok(())
    }

    /// Every expected slot, in slot order.
    pub fn expected_slots(&self) -> Vec<SlotId> {
        let mut slots: Vec<SlotId> = self.slots.iter().map(|s| s.id.clone()).collect();
        slots.sort();
        slots
    }

    pub fn core_slots(&self) -> Vec<SlotId> {
        let mut slots: Vec<SlotId> = self
            .slots
            .iter()
            .filter(|s| s.core)
            .map(|s| s.id.clone())
            .collect();
        slots.sort();
        slots
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.completeness_threshold = threshold;
        self
    }

    pub fn with_pattern_table(mut self, table: PatternTable) -> Self {
        self.pattern_table = Some(table);
        self
    }

    /// Mark a slot as core or optional. Unknown slots are ignored.
    pub fn with_core(mut self, slot: &SlotId, core: bool) -> Self {
        if let Some(def) = self.slots.iter_mut().find(|s| &s.id == slot) {
            def.core = core;
        }
        self
    }
}

/// Per-call options for [`super::SynthesisPipeline::synthesize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SynthesisOptions {
    /// Ignore every cached artifact and rebuild from the note store
    pub force: bool,
    /// Persist normalization, canonicalization, pattern and drafting artifacts.
    /// The final bundle is always persisted.
    pub persist_intermediate: bool,
}

impl SynthesisOptions {
    pub fn from_config(config: &SynthesisConfig) -> Self {
        Self {
            force: false,
            persist_intermediate: config.persist_intermediate,
        }
    }

    pub fn forced(mut self) -> Self {
        self.force = true;
        self
    }

    pub fn with_persist_intermediate(mut self, persist: bool) -> Self {
        self.persist_intermediate = persist;
        self
    }
}

impl Default for SynthesisOptions {
    fn default() -> Self {
        Self {
            force: false,
            persist_intermediate: true,
        }
    }
}
