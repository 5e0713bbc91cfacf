//! Slot identifiers
//!
//! Research notes were historically keyed two ways (`NB1` and `NB-1`). Every
//! place that reads or compares a slot identifier goes through
//! [`SlotId::parse`], so the two spellings can never diverge.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A slot identifier that could not be canonicalized.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid slot identifier: {0:?}")]
pub struct InvalidSlotId(pub String);

/// Canonical slot identifier: uppercase prefix followed by a number, with no
/// separator and no leading zeros (`NB1`, `NB15`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SlotId {
    prefix: String,
    number: u32,
}

impl SlotId {
    /// Build a slot id from its parts.
    pub fn new(prefix: impl Into<String>, number: u32) -> Self {
        Self {
            prefix: prefix.into().to_ascii_uppercase(),
            number,
        }
    }

    /// Canonicalize a raw identifier.
    ///
    /// Case is ignored, `-`, `_`, `.` and whitespace separators are removed,
    /// and leading zeros in the number are dropped.
    pub fn parse(raw: &str) -> Result<Self, InvalidSlotId> {
        let compact: String = raw
            .trim()
            .chars()
            .filter(|c| !matches!(c, '-' | '_' | '.') && !c.is_whitespace())
            .collect::<String>()
            .to_ascii_uppercase();

        let split = compact
            .find(|c: char| c.is_ascii_digit())
            .ok_or_else(|| InvalidSlotId(raw.to_string()))?;
        let (prefix, digits) = compact.split_at(split);

        if prefix.is_empty()
            || !prefix.chars().all(|c| c.is_ascii_alphabetic())
            || !digits.chars().all(|c| c.is_ascii_digit())
        {
            return Err(InvalidSlotId(raw.to_string()));
        }

        let number = digits
            .parse::<u32>()
            .map_err(|_| InvalidSlotId(raw.to_string()))?;

        Ok(Self {
            prefix: prefix.to_string(),
            number,
        })
    }

    /// True if `a` and `b` name the same slot. Unparseable identifiers never match.
    pub fn equivalent(a: &str, b: &str) -> bool {
        match (Self::parse(a), Self::parse(b)) {
            (Ok(a), Ok(b)) => a == b,
            _ => false,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    /// The hyphenated legacy spelling (`NB-1`).
    pub fn legacy_spelling(&self) -> String {
        format!("{}-{}", self.prefix, self.number)
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.prefix, self.number)
    }
}

impl FromStr for SlotId {
    type Err = InvalidSlotId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for SlotId {
    type Error = InvalidSlotId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<SlotId> for String {
    fn from(id: SlotId) -> Self {
        id.to_string()
    }
}

impl Ord for SlotId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.prefix
            .cmp(&other.prefix)
            .then(self.number.cmp(&other.number))
    }
}

impl PartialOrd for SlotId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn both_historical_spellings_canonicalize_identically() {
        for n in 1..=15 {
            let compact = SlotId::parse(&format!("NB{}", n)).unwrap();
            let hyphen = SlotId::parse(&format!("NB-{}", n)).unwrap();
            assert_eq!(compact, hyphen);
            assert_eq!(compact.to_string(), format!("NB{}", n));
            assert_eq!(hyphen.legacy_spelling(), format!("NB-{}", n));
        }
    }

    #[test]
    fn case_separators_and_leading_zeros_are_ignored() {
        let expected = SlotId::new("NB", 7);
        for raw in ["nb7", "NB_7", "nb-07", " NB 7 ", "Nb.7"] {
            assert_eq!(SlotId::parse(raw).unwrap(), expected, "{raw}");
        }
    }

    #[test]
    fn rejects_identifiers_without_prefix_or_number() {
        assert!(SlotId::parse("NB").is_err());
        assert!(SlotId::parse("15").is_err());
        assert!(SlotId::parse("").is_err());
        assert!(SlotId::parse("NB1a").is_err());
    }

    #[test]
    fn equivalence_never_matches_garbage() {
        assert!(SlotId::equivalent("NB1", "NB-1"));
        assert!(!SlotId::equivalent("NB1", "NB-10"));
        assert!(!SlotId::equivalent("???", "???"));
    }

    #[test]
    fn ordering_is_numeric() {
        let mut ids: Vec<SlotId> = ["NB10", "NB2", "NB-1"]
            .iter()
            .map(|s| SlotId::parse(s).unwrap())
            .collect();
        ids.sort();
        let rendered: Vec<String> = ids.iter().map(|s| s.to_string()).collect();
        assert_eq!(rendered, vec!["NB1", "NB2", "NB10"]);
    }

    #[test]
    fn serializes_as_canonical_string_and_accepts_legacy_on_read() {
        let id: SlotId = serde_json::from_str("\"NB-3\"").unwrap();
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"NB3\"");
    }
}
