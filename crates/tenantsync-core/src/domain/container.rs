//! Remote containers as reported by the enumerator

use serde::{Deserialize, Serialize};

use super::newtypes::ContainerId;

/// A folder, channel, library, or drive in the remote tenant
///
/// Containers are ephemeral: they are read fresh from the enumerator on
/// every run and never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Container {
    /// Remote identifier
    pub id: ContainerId,
    /// Display name shown to users
    pub display_name: String,
    /// Parent container, `None` for a category root
    pub parent_id: Option<ContainerId>,
    /// Whether the container carries what delta queries need
    pub supports_delta: bool,
}

impl Container {
    /// Creates a container with no parent that supports delta queries
    pub fn new(id: ContainerId, display_name: impl Into<String>) -> Self {
        Self {
            id,
            display_name: display_name.into(),
            parent_id: None,
            supports_delta: true,
        }
    }

    /// Sets the parent reference
    #[must_use]
    pub fn with_parent(mut self, parent_id: ContainerId) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    /// Sets the delta capability
    #[must_use]
    pub fn with_delta_support(mut self, supports_delta: bool) -> Self {
        self.supports_delta = supports_delta;
        self
    }
}
