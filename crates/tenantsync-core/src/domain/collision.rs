//! Restore collision policy and collision keys

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::errors::DomainError;

/// What to do when a restore target name already exists
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollisionPolicy {
    /// Leave the existing item alone and do not restore
    #[default]
    Skip,
    /// Restore alongside the existing item under a disambiguated name
    Copy,
    /// Delete the existing item, then restore
    Replace,
}

impl Display for CollisionPolicy {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Skip => "skip",
            Self::Copy => "copy",
            Self::Replace => "replace",
        };
        write!(f, "{s}")
    }
}

impl FromStr for CollisionPolicy {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "skip" => Ok(Self::Skip),
            "copy" => Ok(Self::Copy),
            "replace" => Ok(Self::Replace),
            _ => Err(DomainError::InvalidCollisionPolicy(s.to_string())),
        }
    }
}

/// Case-normalized `(parent container, item name)` composite.
///
/// Two items collide when they would land in the same parent with names that
/// differ only by case.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CollisionKey(String);

impl CollisionKey {
    /// Builds a key from a parent container ID and an item name
    pub fn new(parent_id: &str, name: &str) -> Self {
        Self(format!("{}/{}", parent_id.to_lowercase(), name.to_lowercase()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for CollisionKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
