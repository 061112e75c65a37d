//! Tier identifiers.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Name of a membership tier (e.g. "Basic", "Premium", "Pro").
///
/// Unique within a catalog. Comparison is exact; "pro" and "Pro" are
/// different tiers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct TierId(pub String);

impl TierId {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TierId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TierId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for TierId {
    fn from(name: String) -> Self {
        Self(name)
    }
}
