//! Identifiers for entities held by the calculation engine
//!
//! The engine addresses processes by UUID strings. Wrapping them keeps
//! process ids from being confused with flow names or sheet names.

use std::fmt;

use serde::{Deserialize, Serialize};

/// UUID of a process in the engine's model library
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProcessId(pub String);

impl ProcessId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProcessId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}
