//! Artifact type aliases
//!
//! Artifact types were renamed over the system's history. An alias group ties
//! one logical name to every physical name it has been stored under, and the
//! lookup is symmetric: asking for any member finds rows saved under any other.

use super::phase::artifact_type;

#[derive(Debug, Clone)]
struct AliasGroup {
    logical: String,
    physical: Vec<String>,
}

/// Logical ↔ physical artifact type names.
#[derive(Debug, Clone, Default)]
pub struct AliasTable {
    groups: Vec<AliasGroup>,
}

impl AliasTable {
    /// An empty table: every name resolves only to itself.
    pub fn empty() -> Self {
        Self::default()
    }

    /// The names in use across released versions.
    pub fn standard() -> Self {
        Self::empty()
            .with_alias(artifact_type::FINAL_BUNDLE, &["synthesis_bundle", "report_bundle"])
            .with_alias(artifact_type::NORMALIZED_NOTES, &["normalized_inputs"])
            .with_alias(artifact_type::CANONICAL_DATASET, &["canonical_nb_dataset"])
            .with_alias(artifact_type::DRAFTED_SECTIONS, &["section_drafts"])
    }

    /// Register older physical names for a logical type.
    pub fn with_alias(mut self, logical: &str, physical: &[&str]) -> Self {
        let names = physical.iter().map(|s| s.to_string());
        match self.groups.iter_mut().find(|g| g.logical == logical) {
            Some(group) => group.physical.extend(names),
            None => self.groups.push(AliasGroup {
                logical: logical.to_string(),
                physical: names.collect(),
            }),
        }
        self
    }

    /// The logical name for any member of a group; unknown names map to themselves.
    pub fn logical_name<'a>(&'a self, name: &'a str) -> &'a str {
        self.group_of(name).map(|g| g.logical.as_str()).unwrap_or(name)
    }

    /// Every name that should be searched for `name`, logical name first.
    pub fn candidates<'a>(&'a self, name: &'a str) -> Vec<&'a str> {
        match self.group_of(name) {
            Some(group) => std::iter::once(group.logical.as_str())
                .chain(group.physical.iter().map(String::as_str))
                .collect(),
            None => vec![name],
        }
    }

    fn group_of(&self, name: &str) -> Option<&AliasGroup> {
        self.groups
            .iter()
            .find(|g| g.logical == name || g.physical.iter().any(|p| p == name))
    }
}
