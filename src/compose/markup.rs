//! Markup allow-list validation
//!
//! Drafted section HTML may only use allow-listed tags, the `class`
//! attribute, and allow-listed class names. The standard allow-list is the
//! drafter's emission set; the two are compared for equality in tests.

use super::drafting::{EMITTED_CLASSES, EMITTED_TAGS};
use super::section::SectionCode;
use crate::pipeline::Diagnostic;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

static TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<\s*/?\s*([A-Za-z][A-Za-z0-9-]*)([^>]*)>").expect("valid tag pattern"));

static ATTRIBUTE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"([A-Za-z_:][-A-Za-z0-9_:.]*)\s*(?:=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>/]+)))?"#)
        .expect("valid attribute pattern")
});

static ANY_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("valid strip pattern"));

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid whitespace pattern"));

/// Configured additions to and removals from the standard class allow-list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarkupOverrides {
    pub extra_classes: Vec<String>,
    pub removed_classes: Vec<String>,
}

/// Everything a draft used that the allow-list does not permit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MarkupViolation {
    pub tags: Vec<String>,
    pub attributes: Vec<String>,
    pub classes: Vec<String>,
}

impl MarkupViolation {
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty() && self.attributes.is_empty() && self.classes.is_empty()
    }

    pub fn into_diagnostic(self, section: SectionCode) -> Diagnostic {
        Diagnostic::ValidationRejection {
            section,
            tags: self.tags,
            attributes: self.attributes,
            classes: self.classes,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MarkupPolicy {
    tags: BTreeSet<String>,
    classes: BTreeSet<String>,
}

impl Default for MarkupPolicy {
    fn default() -> Self {
        Self::standard()
    }
}

impl MarkupPolicy {
    /// Exactly what the drafter can emit.
    pub fn standard() -> Self {
        Self {
            tags: EMITTED_TAGS.iter().map(|t| t.to_string()).collect(),
            classes: EMITTED_CLASSES.iter().map(|c| c.to_string()).collect(),
        }
    }

    pub fn with_class(mut self, class: impl Into<String>) -> Self {
        self.classes.insert(class.into());
        self
    }

    pub fn without_class(mut self, class: &str) -> Self {
        self.classes.remove(class);
        self
    }

    pub fn with_overrides(self, overrides: &MarkupOverrides) -> Self {
        let policy = overrides
            .extra_classes
            .iter()
            .fold(self, |policy, class| policy.with_class(class.as_str()));
        overrides
            .removed_classes
            .iter()
            .fold(policy, |policy, class| policy.without_class(class))
    }

    pub fn tags(&self) -> &BTreeSet<String> {
        &self.tags
    }

    pub fn classes(&self) -> &BTreeSet<String> {
        &self.classes
    }

    /// Check every tag, attribute, and class in `html`.
    pub fn validate(&self, html: &str) -> Result<(), MarkupViolation> {
        let mut tags = BTreeSet::new();
        let mut attributes = BTreeSet::new();
        let mut classes = BTreeSet::new();

        for tag in TAG.captures_iter(html) {
            let name = tag[1].to_ascii_lowercase();
            if !self.tags.contains(&name) {
                tags.insert(name);
            }
            let attrs = tag.get(2).map(|m| m.as_str()).unwrap_or_default();
            for attr in ATTRIBUTE.captures_iter(attrs) {
                let attr_name = attr[1].to_ascii_lowercase();
                if attr_name != "class" {
                    attributes.insert(attr_name);
                    continue;
                }
                let value = attr
                    .get(2)
                    .or_else(|| attr.get(3))
                    .or_else(|| attr.get(4))
                    .map(|m| m.as_str())
                    .unwrap_or_default();
                for class in value.split_whitespace() {
                    if !self.classes.contains(class) {
                        classes.insert(class.to_string());
                    }
                }
            }
        }

        let violation = MarkupViolation {
            tags: tags.into_iter().collect(),
            attributes: attributes.into_iter().collect(),
            classes: classes.into_iter().collect(),
        };
        if violation.is_empty() {
            Ok(())
        } else {
            Err(violation)
        }
    }

    /// Safe replacement for rejected markup: the draft's text without tags.
    pub fn fallback(&self, html: &str) -> String {
        let stripped = ANY_TAG.replace_all(html, " ");
        let text = WHITESPACE.replace_all(stripped.trim(), " ");
        text.replace(" .", ".").replace(" ,", ",")
    }
}

/// Every tag name used in `html`, lowercased.
pub fn tags_in(html: &str) -> BTreeSet<String> {
    TAG.captures_iter(html)
        .map(|tag| tag[1].to_ascii_lowercase())
        .collect()
}

/// Every class attribute value used in `html`.
pub fn classes_in(html: &str) -> BTreeSet<String> {
    let mut found = BTreeSet::new();
    for tag in TAG.captures_iter(html) {
        let attrs = tag.get(2).map(|m| m.as_str()).unwrap_or_default();
        for attr in ATTRIBUTE.captures_iter(attrs) {
            if attr[1].eq_ignore_ascii_case("class") {
                if let Some(value) = attr.get(2).or_else(|| attr.get(3)).or_else(|| attr.get(4)) {
                    found.extend(value.as_str().split_whitespace().map(str::to_string));
                }
            }
        }
    }
    found
}
