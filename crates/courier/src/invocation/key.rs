//! Service keys

use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable identifier for a registered remote procedure
///
/// Paths conventionally read `context@method`. Two keys are equal iff their
/// paths match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServiceKey(String);

impl ServiceKey {
    /// Create a key from a path
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    /// Create a `context@method` key
    pub fn for_method(context: &str, method: &str) -> Self {
        Self(format!("{context}@{method}"))
    }

    /// Get the path
    pub fn path(&self) -> &str {
        &self.0
    }

    /// Part before `@`, if any
    pub fn context(&self) -> Option<&str> {
        self.0.split_once('@').map(|(context, _)| context)
    }

    /// Part after `@`, or the whole path
    pub fn method(&self) -> &str {
        self.0
            .split_once('@')
            .map(|(_, method)| method)
            .unwrap_or(&self.0)
    }
}

impl fmt::Display for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ServiceKey {
    fn from(path: &str) -> Self {
        Self::new(path)
    }
}

impl From<String> for ServiceKey {
    fn from(path: String) -> Self {
        Self(path)
    }
}

impl AsRef<str> for ServiceKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
