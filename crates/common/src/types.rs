//! Common data types for Fieldstone gateway components.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Provider-issued subject identifier.
///
/// Subjects are opaque, stable strings minted by the external identity
/// provider. The gateway never parses or generates them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubjectId(pub String);

impl SubjectId {
    /// Borrow the raw identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SubjectId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for SubjectId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_subject_id_serde_is_transparent() {
        let id = SubjectId::from("u-12345");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"u-12345\"");

        let parsed: SubjectId = serde_json::from_str("\"u-12345\"").unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn test_subject_id_display() {
        let id = SubjectId::from("u-1");
        assert_eq!(id.to_string(), "u-1");
        assert_eq!(id.as_str(), "u-1");
    }
}
