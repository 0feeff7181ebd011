//! Subject and resource identifiers
//!
//! Both are opaque strings handed over by upstream collaborators. They are
//! validated once at the boundary so the rest of the engine can trust them.

use serde::{Deserialize, Serialize};

use crate::error::{QuotaError, Result};

/// Maximum identifier length in bytes
pub const MAX_ID_LEN: usize = 128;

fn validate_identifier(field: &'static str, raw: &str) -> Result<()> {
    if raw.is_empty() {
        return Err(QuotaError::invalid(field, "must not be empty"));
    }
    if raw.len() > MAX_ID_LEN {
        return Err(QuotaError::invalid(
            field,
            format!("must be at most {} characters", MAX_ID_LEN),
        ));
    }
    if let Some(bad) = raw
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | ':' | '@')))
    {
        return Err(QuotaError::invalid(
            field,
            format!("contains unsupported character {:?}", bad),
        ));
    }
    Ok(())
}

/// Identifier of a quota-holding subject
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SubjectId(String);

impl SubjectId {
    /// Parse and validate a raw subject identifier
    pub fn parse(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();
        validate_identifier("subject_id", &raw)?;
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for SubjectId {
    type Error = QuotaError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(value)
    }
}

impl From<SubjectId> for String {
    fn from(id: SubjectId) -> Self {
        id.0
    }
}

impl std::fmt::Display for SubjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a consumable resource
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ResourceId(String);

impl ResourceId {
    /// Parse and validate a raw resource identifier
    pub fn parse(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();
        validate_identifier("resource_id", &raw)?;
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ResourceId {
    type Error = QuotaError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(value)
    }
}

impl From<ResourceId> for String {
    fn from(id: ResourceId) -> Self {
        id.0
    }
}

impl std::fmt::Display for ResourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
