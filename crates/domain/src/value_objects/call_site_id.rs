//! Call site identifier value object

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

/// Maximum length of a call site identifier in bytes
pub const MAX_CALL_SITE_LEN: usize = 512;

/// Identifies *where* an outbound call is issued from
///
/// Occurrence counters are kept per (parent index, call site), so two code
/// locations invoking the same remote method only share a counter when they
/// share a call site id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CallSiteId(String);

impl CallSiteId {
    /// Create a call site id, validating its length
    pub fn new(id: impl Into<String>) -> Result<Self, DomainError> {
        let id = id.into();
        if id.is_empty() {
            return Err(DomainError::InvalidCallSite("empty".to_string()));
        }
        if id.len() > MAX_CALL_SITE_LEN {
            return Err(DomainError::InvalidCallSite(format!(
                "{} bytes exceeds maximum {MAX_CALL_SITE_LEN}",
                id.len()
            )));
        }
        Ok(Self(id))
    }

    /// Default call site for a remote method: `"{service}.{method}"`
    pub fn for_method(service_name: &str, method_name: &str) -> Result<Self, DomainError> {
        Self::new(format!("{service_name}.{method_name}"))
    }

    /// Get the identifier as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CallSiteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for CallSiteId {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<CallSiteId> for String {
    fn from(id: CallSiteId) -> Self {
        id.0
    }
}
