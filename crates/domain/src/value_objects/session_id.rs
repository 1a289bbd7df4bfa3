//! Session identifier value object

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::DomainError;

/// Maximum length of a session identifier
pub const MAX_SESSION_ID_LEN: usize = 128;

/// Identifies one test execution
///
/// Session ids travel in transport headers, so they are restricted to
/// visible ASCII without whitespace or commas.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionId(String);

impl SessionId {
    /// Parse a session id supplied by a harness or a peer
    pub fn parse(s: impl Into<String>) -> Result<Self, DomainError> {
        let s = s.into();
        if s.is_empty() || s.len() > MAX_SESSION_ID_LEN {
            return Err(DomainError::InvalidSessionId(format!(
                "length {} not in 1..={MAX_SESSION_ID_LEN}",
                s.len()
            )));
        }
        if !s.bytes().all(|b| b.is_ascii_graphic() && b != b',') {
            return Err(DomainError::InvalidSessionId(s));
        }
        Ok(Self(s))
    }

    /// Generate a fresh random session id
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Get the identifier as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for SessionId {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<SessionId> for String {
    fn from(id: SessionId) -> Self {
        id.0
    }
}
