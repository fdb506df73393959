use serde::{Serialize, Serializer};
use std::fmt;

use super::AgentError;

/// Opaque collector credential.
///
/// `Debug` and `Display` are redacted; the raw value only leaves the process
/// inside the serialized batch envelope.
#[derive(Clone, PartialEq, Eq)]
pub struct ServiceToken(String);

impl ServiceToken {
    /// Wraps a token, rejecting empty or whitespace-only input.
    pub fn new(token: impl Into<String>) -> Result<Self, AgentError> {
        let token = token.into();
        if token.trim().is_empty() {
            return Err(AgentError::MissingServiceToken);
        }
        Ok(Self(token))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ServiceToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ServiceToken(<redacted>)")
    }
}

impl fmt::Display for ServiceToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<redacted>")
    }
}

impl Serialize for ServiceToken {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}
