use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::Error;

/// Identifier of the character a conversation is held with.
///
/// Identifiers are trimmed and lowercased on construction, matching how the
/// remote service normalizes the `character` field, so `" Tocqueville"` and
/// `"tocqueville"` name the same conversation.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PersonaId(String);

impl PersonaId {
    /// Create a new `PersonaId`, rejecting identifiers that are blank.
    pub fn new(id: impl AsRef<str>) -> Result<Self, Error> {
        let normalized = id.as_ref().trim().to_lowercase();
        if normalized.is_empty() {
            return Err(Error::validation(
                "persona id must not be empty",
                Some("character".to_string()),
            ));
        }
        Ok(Self(normalized))
    }

    /// Wrap an identifier literal that is already trimmed and lowercase.
    pub(crate) fn from_static(id: &'static str) -> Self {
        debug_assert!(!id.is_empty() && id == id.trim().to_lowercase());
        Self(id.to_string())
    }

    /// The normalized identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PersonaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for PersonaId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for PersonaId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<PersonaId> for String {
    fn from(id: PersonaId) -> Self {
        id.0
    }
}

impl AsRef<str> for PersonaId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_case_and_whitespace() {
        let id = PersonaId::new("  Tocqueville \n").unwrap();
        assert_eq!(id.as_str(), "tocqueville");
        assert_eq!(id, "TOCQUEVILLE".parse().unwrap());
    }

    #[test]
    fn rejects_blank() {
        assert!(PersonaId::new("   ").unwrap_err().is_validation());
        assert!(serde_json::from_str::<PersonaId>(r#""""#).is_err());
    }

    #[test]
    fn serializes_as_plain_string() {
        let id = PersonaId::new("common").unwrap();
        assert_eq!(serde_json::to_string(&id).unwrap(), r#""common""#);
    }
}
