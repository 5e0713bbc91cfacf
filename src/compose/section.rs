//! Report sections

use crate::pipeline::PatternKind;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable section codes, in report order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionCode {
    ExecutiveSummary,
    PressureProfile,
    CapabilityLevers,
    TimingWindows,
    LeadershipMap,
    ProofPoints,
    ConvergenceInsight,
}

impl SectionCode {
    pub const ALL: [SectionCode; 7] = [
        SectionCode::ExecutiveSummary,
        SectionCode::PressureProfile,
        SectionCode::CapabilityLevers,
        SectionCode::TimingWindows,
        SectionCode::LeadershipMap,
        SectionCode::ProofPoints,
        SectionCode::ConvergenceInsight,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ExecutiveSummary => "executive_summary",
            Self::PressureProfile => "pressure_profile",
            Self::CapabilityLevers => "capability_levers",
            Self::TimingWindows => "timing_windows",
            Self::LeadershipMap => "leadership_map",
            Self::ProofPoints => "proof_points",
            Self::ConvergenceInsight => "convergence_insight",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Self::ExecutiveSummary => "Executive Summary",
            Self::PressureProfile => "Pressure Profile",
            Self::CapabilityLevers => "Capability Levers",
            Self::TimingWindows => "Timing Windows",
            Self::LeadershipMap => "Leadership Map",
            Self::ProofPoints => "Proof Points",
            Self::ConvergenceInsight => "Convergence Insight",
        }
    }

    /// Pattern kinds the section is drafted from.
    pub fn sources(&self) -> &'static [PatternKind] {
        use PatternKind::*;
        match self {
            Self::ExecutiveSummary => &[Pressure, Capability, NumericProof],
            Self::PressureProfile => &[Pressure],
            Self::CapabilityLevers => &[Capability],
            Self::TimingWindows => &[TimingSignal],
            Self::LeadershipMap => &[Executive],
            Self::ProofPoints => &[NumericProof],
            Self::ConvergenceInsight => &[Pressure, Capability],
        }
    }

    /// True if every source must be non-empty for real content.
    pub fn needs_all_sources(&self) -> bool {
        matches!(self, Self::ConvergenceInsight)
    }

    /// Subject phrase used in placeholder text.
    pub(crate) fn subject(&self) -> &'static str {
        match self {
            Self::ExecutiveSummary => "headline findings",
            Self::PressureProfile => "pressure themes",
            Self::CapabilityLevers => "capability levers",
            Self::TimingWindows => "timing signals",
            Self::LeadershipMap => "leadership profiles",
            Self::ProofPoints => "quantified proof points",
            Self::ConvergenceInsight => "pressure and capability pairings",
        }
    }
}

impl fmt::Display for SectionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One drafted report section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub code: SectionCode,
    pub title: String,
    /// Section HTML, or plain text when `fallback` is set
    pub content: String,
    /// Canonical citation ids referenced by `content`
    #[serde(default)]
    pub citations_used: Vec<u32>,
    /// Drafted with no source patterns
    #[serde(default)]
    pub placeholder: bool,
    /// Markup was rejected and replaced with plain text
    #[serde(default)]
    pub fallback: bool,
}

impl Section {
    pub fn new(code: SectionCode, content: impl Into<String>) -> Self {
        Self {
            code,
            title: code.title().to_string(),
            content: content.into(),
            citations_used: Vec::new(),
            placeholder: false,
            fallback: false,
        }
    }
}
