//! Section drafting and composition
//!
//! Sections are rendered from Handlebars templates. Every tag and class a
//! template can produce is listed in [`EMITTED_TAGS`] and [`EMITTED_CLASSES`];
//! the markup allow-list is built from the same constants.

use super::markup::MarkupPolicy;
use super::section::{Section, SectionCode};
use super::voice::Voice;
use crate::pipeline::{Diagnostics, Pattern, PatternKind, PatternSet};
use handlebars::{Handlebars, RenderError};
use once_cell::sync::Lazy;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, warn};

/// Tags the templates below can emit.
pub const EMITTED_TAGS: [&str; 8] = ["div", "p", "h4", "ul", "li", "sup", "strong", "span"];

/// Classes the templates below can emit.
pub const EMITTED_CLASSES: [&str; 11] = [
    "section-body",
    "section-lead",
    "subsection-header",
    "pattern-list",
    "pattern-item",
    "citation-ref",
    "metric-value",
    "executive-name",
    "timing-signal",
    "convergence-pair",
    "placeholder",
];

/// Items rendered per list section.
const MAX_LIST_ITEMS: usize = 8;
/// Items per source kind in the executive summary.
const SUMMARY_ITEMS_PER_KIND: usize = 2;
/// Pressure/capability pairs in the convergence insight.
const MAX_PAIRS: usize = 3;

const ITEM_PARTIAL: &str = concat!(
    r#"<li class="pattern-item">"#,
    r#"{{#if label}}<strong{{#if label_class}} class="{{label_class}}"{{/if}}>{{label}}</strong> {{/if}}"#,
    r#"{{#if text_class}}<span class="{{text_class}}">{{text}}</span>{{else}}{{text}}{{/if}}"#,
    r#"{{#each citations}}<sup class="citation-ref">[{{this}}]</sup>{{/each}}"#,
    r#"</li>"#,
);

const LIST_TEMPLATE: &str = concat!(
    r#"<div class="section-body"><p class="section-lead">{{lead}}</p>"#,
    r#"<ul class="pattern-list">{{#each items}}{{> item}}{{/each}}</ul></div>"#,
);

const SUMMARY_TEMPLATE: &str = concat!(
    r#"<div class="section-body"><p class="section-lead">{{lead}}</p>"#,
    r#"{{#each groups}}<h4 class="subsection-header">{{heading}}</h4>"#,
    r#"<ul class="pattern-list">{{#each items}}{{> item}}{{/each}}</ul>{{/each}}</div>"#,
);

const CONVERGENCE_TEMPLATE: &str = concat!(
    r#"<div class="section-body"><p class="section-lead">{{lead}}</p>"#,
    r#"{{#each pairs}}<div class="convergence-pair"><h4 class="subsection-header">{{heading}}</h4>"#,
    r#"<ul class="pattern-list">{{#each items}}{{> item}}{{/each}}</ul></div>{{/each}}</div>"#,
);

const PLACEHOLDER_TEMPLATE: &str = r#"<div class="section-body"><p class="placeholder">{{text}}</p></div>"#;

static TEMPLATES: Lazy<Handlebars<'static>> = Lazy::new(|| {
    let mut registry = Handlebars::new();
    registry
        .register_partial("item", ITEM_PARTIAL)
        .expect("item partial parses");
    for (name, template) in [
        ("list", LIST_TEMPLATE),
        ("summary", SUMMARY_TEMPLATE),
        ("convergence", CONVERGENCE_TEMPLATE),
        ("placeholder", PLACEHOLDER_TEMPLATE),
    ] {
        registry
            .register_template_string(name, template)
            .expect("built-in section template parses");
    }
    registry
});

#[derive(Debug, Serialize)]
struct ItemView {
    label: Option<String>,
    label_class: Option<&'static str>,
    text: String,
    text_class: Option<&'static str>,
    citations: Vec<u32>,
}

/// Drafted markup before validation.
#[derive(Debug, Clone, PartialEq)]
pub struct Draft {
    pub html: String,
    pub placeholder: bool,
}

/// Renders one section from the pattern set.
#[derive(Debug, Clone, Default)]
pub struct SectionDrafter {
    voice: Voice,
}

impl SectionDrafter {
    pub fn new(voice: Voice) -> Self {
        Self { voice }
    }

    pub fn draft(&self, code: SectionCode, patterns: &PatternSet) -> Result<Draft, RenderError> {
        let sources = code.sources();
        let has_content = if code.needs_all_sources() {
            sources.iter().all(|k| !patterns.is_empty(*k))
        } else {
            sources.iter().any(|k| !patterns.is_empty(*k))
        };
        if !has_content {
            let text = format!("No {} surfaced in the available research.", code.subject());
            let html = TEMPLATES.render("placeholder", &json!({ "text": text }))?;
            return Ok(Draft {
                html,
                placeholder: true,
            });
        }

        let html = match code {
            SectionCode::ExecutiveSummary => self.summary(patterns)?,
            SectionCode::ConvergenceInsight => self.convergence(patterns)?,
            _ => {
                let kind = sources[0];
                let items: Vec<ItemView> = patterns
                    .get(kind)
                    .iter()
                    .take(MAX_LIST_ITEMS)
                    .map(|p| self.item(p))
                    .collect();
                let lead = self.voice.apply(&list_lead(code, patterns.get(kind).len()));
                TEMPLATES.render("list", &json!({ "lead": lead, "items": items }))?
            }
        };
        Ok(Draft {
            html,
            placeholder: false,
        })
    }

    fn summary(&self, patterns: &PatternSet) -> Result<String, RenderError> {
        let groups: Vec<_> = SectionCode::ExecutiveSummary
            .sources()
            .iter()
            .filter(|k| !patterns.is_empty(**k))
            .map(|kind| {
                let items: Vec<ItemView> = patterns
                    .get(*kind)
                    .iter()
                    .take(SUMMARY_ITEMS_PER_KIND)
                    .map(|p| self.item(p))
                    .collect();
                json!({ "heading": summary_heading(*kind), "items": items })
            })
            .collect();

        let counts: Vec<String> = SectionCode::ExecutiveSummary
            .sources()
            .iter()
            .filter(|k| !patterns.is_empty(**k))
            .map(|k| plural(patterns.get(*k).len(), noun(*k)))
            .collect();
        let lead = self
            .voice
            .apply(&format!("The research surfaces {}.", join_counts(&counts)));
        TEMPLATES.render("summary", &json!({ "lead": lead, "groups": groups }))
    }

    fn convergence(&self, patterns: &PatternSet) -> Result<String, RenderError> {
        let pressures = patterns.get(PatternKind::Pressure);
        let levers = patterns.get(PatternKind::Capability);
        let pairs: Vec<_> = pressures
            .iter()
            .zip(levers.iter())
            .take(MAX_PAIRS)
            .enumerate()
            .map(|(i, (pressure, lever))| {
                json!({
                    "heading": format!("Opening {}", i + 1),
                    "items": [self.item(pressure), self.item(lever)],
                })
            })
            .collect();
        let lead = self.voice.apply(&format!(
            "Where current pressures meet available capabilities, {} point to an opening.",
            plural(pairs.len(), "pairing")
        ));
        TEMPLATES.render("convergence", &json!({ "lead": lead, "pairs": pairs }))
    }

    fn item(&self, pattern: &Pattern) -> ItemView {
        let (label_class, text_class) = match pattern.kind {
            PatternKind::Executive => (Some("executive-name"), None),
            PatternKind::NumericProof => (None, Some("metric-value")),
            PatternKind::TimingSignal => (None, Some("timing-signal")),
            PatternKind::Pressure | PatternKind::Capability => (None, None),
        };
        ItemView {
            label: pattern.label.clone(),
            label_class,
            text: self.voice.apply(&pattern.text),
            text_class,
            citations: pattern.citations.clone(),
        }
    }
}

fn list_lead(code: SectionCode, count: usize) -> String {
    let verb = |one: &'static str, many: &'static str| if count == 1 { one } else { many };
    match code {
        SectionCode::PressureProfile => format!(
            "{} {} current priorities.",
            plural(count, "pressure theme"),
            verb("shapes", "shape")
        ),
        SectionCode::CapabilityLevers => format!(
            "{} {} out.",
            plural(count, "capability lever"),
            verb("stands", "stand")
        ),
        SectionCode::TimingWindows => format!(
            "{} {} the engagement window.",
            plural(count, "timing signal"),
            verb("defines", "define")
        ),
        SectionCode::LeadershipMap => format!("{} {} profiled.", plural(count, "decision maker"), verb("is", "are")),
        SectionCode::ProofPoints => format!(
            "{} {} the narrative.",
            plural(count, "quantified proof point"),
            verb("anchors", "anchor")
        ),
        SectionCode::ExecutiveSummary | SectionCode::ConvergenceInsight => String::new(),
    }
}

fn summary_heading(kind: PatternKind) -> &'static str {
    match kind {
        PatternKind::Pressure => "Pressures",
        PatternKind::Capability => "Capabilities",
        PatternKind::TimingSignal => "Timing",
        PatternKind::Executive => "Leadership",
        PatternKind::NumericProof => "Proof",
    }
}

fn noun(kind: PatternKind) -> &'static str {
    match kind {
        PatternKind::Pressure => "pressure theme",
        PatternKind::Capability => "capability lever",
        PatternKind::TimingSignal => "timing signal",
        PatternKind::Executive => "decision maker",
        PatternKind::NumericProof => "quantified proof point",
    }
}

fn plural(count: usize, noun: &str) -> String {
    if count == 1 {
        format!("1 {}", noun)
    } else {
        format!("{} {}s", count, noun)
    }
}

fn join_counts(parts: &[String]) -> String {
    match parts {
        [] => String::new(),
        [only] => only.clone(),
        [init @ .., last] => format!("{} and {}", init.join(", "), last),
    }
}

/// Drafts, validates, and falls back, section by section.
#[derive(Debug, Clone, Default)]
pub struct SectionComposer {
    drafter: SectionDrafter,
    markup: MarkupPolicy,
}

impl SectionComposer {
    pub fn new(drafter: SectionDrafter, markup: MarkupPolicy) -> Self {
        Self { drafter, markup }
    }

    pub fn markup(&self) -> &MarkupPolicy {
        &self.markup
    }

    /// Every section in report order. A section whose markup fails the
    /// allow-list is replaced with its plain text and a
    /// [`crate::pipeline::Diagnostic::ValidationRejection`] is recorded.
    pub fn compose(&self, patterns: &PatternSet, diagnostics: &mut Diagnostics) -> Vec<Section> {
        let sections: Vec<Section> = SectionCode::ALL
            .iter()
            .map(|code| self.compose_one(*code, patterns, diagnostics))
            .collect();
        info!(
            sections = sections.len(),
            placeholders = sections.iter().filter(|s| s.placeholder).count(),
            fallbacks = sections.iter().filter(|s| s.fallback).count(),
            "sections composed"
        );
        sections
    }

    fn compose_one(&self, code: SectionCode, patterns: &PatternSet, diagnostics: &mut Diagnostics) -> Section {
        let draft = match self.drafter.draft(code, patterns) {
            Ok(draft) => draft,
            Err(e) => {
                warn!(section = %code, error = %e, "section render failed, using plain text");
                let mut section = Section::new(code, plain_text(code, patterns));
                section.fallback = true;
                return section;
            }
        };

        let mut section = Section::new(code, draft.html);
        section.placeholder = draft.placeholder;
        if let Err(violation) = self.markup.validate(&section.content) {
            warn!(
                section = %code,
                tags = ?violation.tags,
                attributes = ?violation.attributes,
                classes = ?violation.classes,
                "section markup rejected, using plain-text fallback"
            );
            section.content = self.markup.fallback(&section.content);
            section.fallback = true;
            diagnostics.push(violation.into_diagnostic(code));
        } else {
            debug!(section = %code, placeholder = section.placeholder, "section drafted");
        }
        section
    }
}

fn plain_text(code: SectionCode, patterns: &PatternSet) -> String {
    code.sources()
        .iter()
        .flat_map(|k| patterns.get(*k))
        .map(|p| match &p.label {
            Some(label) => format!("{}: {}", label, p.text),
            None => p.text.clone(),
        })
        .collect::<Vec<_>>()
        .join(" ")
}
