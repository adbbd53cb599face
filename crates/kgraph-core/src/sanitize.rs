//! Relation-type sanitizing.
//!
//! Cypher cannot parameterize a relationship type, so the structural type is
//! spliced into query text. [`RelationType`] can only be built through
//! [`RelationType::sanitize`], which guarantees the token matches
//! `^[A-Z0-9_]+$`, is non-empty, and does not start with a digit.

use std::fmt;

use serde::Serialize;

/// Recognized domain phrases and their canonical tokens.
const KNOWN_PHRASES: &[(&str, &str)] = &[
    ("来自", "FROM"),
    ("包含", "CONTAIN"),
    ("属于", "BELONG_TO"),
    ("位于", "LOCATED_IN"),
    ("同现", "CO_OCCURRENCE"),
];

/// Prefix applied to tokens that would otherwise start with a digit.
const DIGIT_PREFIX: &str = "REL_";

/// A relation label that could not be reduced to a structural token.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid relation type: {input:?}")]
pub struct InvalidRelationType {
    pub input: String,
}

/// A sanitized structural relation type, safe to splice into a query.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct RelationType(String);

impl RelationType {
    /// Map a free-form label to a structural token.
    ///
    /// Exact known phrases translate directly. Anything else has hyphens
    /// turned into underscores, every character outside `[A-Za-z0-9_]`
    /// dropped, a `REL_` prefix added when it starts with a digit, and is
    /// uppercased. Fails closed when nothing survives cleaning.
    pub fn sanitize(label: &str) -> Result<Self, InvalidRelationType> {
        if let Some((_, token)) = KNOWN_PHRASES.iter().find(|(phrase, _)| *phrase == label) {
            return Ok(Self((*token).to_string()));
        }

        let cleaned: String = label
            .chars()
            .map(|c| if c == '-' { '_' } else { c })
            .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
            .collect();

        if cleaned.is_empty() {
            return Err(InvalidRelationType {
                input: label.to_string(),
            });
        }

        let token = if cleaned.starts_with(|c: char| c.is_ascii_digit()) {
            format!("{DIGIT_PREFIX}{cleaned}")
        } else {
            cleaned
        };

        Ok(Self(token.to_ascii_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RelationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RelationType {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
