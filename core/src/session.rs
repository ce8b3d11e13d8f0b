use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque token the backend uses to correlate the turns of one conversation.
///
/// Generated once per client instance; never validated or expired locally.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Reuses an existing id, or generates a fresh one when none is given.
    pub fn from_option(id: Option<String>) -> Self {
        match id.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()) {
            Some(id) => Self(id),
            None => Self::generate(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
