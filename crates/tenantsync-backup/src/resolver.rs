//! Container path resolution
//!
//! Built once per category from the enumeration result. Resolves a container
//! to its storage path (IDs, or drive-relative names for libraries) and its
//! location path (display names) by walking parent references up to a root.

use std::collections::{HashMap, HashSet};

use tenantsync_core::domain::{
    CanonicalPath, Container, ContainerId, DomainError, PathBuilder,
};
use thiserror::Error;

use crate::handler::CategoryHandler;

/// Errors resolving a container's position in its hierarchy
#[derive(Debug, Error)]
pub enum PathError {
    /// The container ID is not part of the enumeration
    #[error("unknown container: {0}")]
    UnknownContainer(ContainerId),

    /// A parent reference points at a container that was not enumerated
    #[error("container {container} references missing parent {parent}")]
    DanglingParent {
        container: ContainerId,
        parent: ContainerId,
    },

    /// Following parent references loops back onto the chain
    #[error("parent cycle detected at container {0}")]
    Cycle(ContainerId),

    /// The resolved elements do not form a valid canonical path
    #[error("invalid path: {0}")]
    Domain(#[from] DomainError),
}

/// Both paths resolved for one container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPaths {
    /// Full canonical storage path
    pub full_path: CanonicalPath,
    /// Display-name path, used for scope matching and restore locations
    pub location: PathBuilder,
}

/// Resolves containers from one enumeration pass
#[derive(Debug, Clone)]
pub struct ContainerResolver {
    handler: CategoryHandler,
    containers: HashMap<ContainerId, Container>,
}

impl ContainerResolver {
    pub fn new<'a>(handler: CategoryHandler, containers: impl IntoIterator<Item = &'a Container>) -> Self {
        Self {
            handler,
            containers: containers
                .into_iter()
                .map(|c| (c.id.clone(), c.clone()))
                .collect(),
        }
    }

    /// Returns the chain from the root down to `id`.
    fn chain(&self, id: &ContainerId) -> Result<Vec<&Container>, PathError> {
        let mut chain = Vec::new();
        let mut seen = HashSet::new();

        let mut current = self
            .containers
            .get(id)
            .ok_or_else(|| PathError::UnknownContainer(id.clone()))?;

        loop {
            if !seen.insert(&current.id) {
                return Err(PathError::Cycle(current.id.clone()));
            }
            chain.push(current);

            let Some(parent_id) = &current.parent_id else {
                break;
            };

            current = self
                .containers
                .get(parent_id)
                .ok_or_else(|| PathError::DanglingParent {
                    container: current.id.clone(),
                    parent: parent_id.clone(),
                })?;
        }

        chain.reverse();
        Ok(chain)
    }

    /// Storage-path elements and location for `id`
    pub fn resolve_elements(&self, id: &ContainerId) -> Result<(PathBuilder, PathBuilder), PathError> {
        let chain = self.chain(id)?;

        let mut storage = PathBuilder::new();
        let mut location = PathBuilder::new();
        for (i, container) in chain.iter().enumerate() {
            storage = storage.append_all(self.handler.storage_elements(container, i == 0));
            location = location.append(container.display_name.clone());
        }

        Ok((storage, location))
    }

    /// Resolves the canonical data path and location for `id`
    pub fn resolve(
        &self,
        tenant: &str,
        owner: &str,
        id: &ContainerId,
    ) -> Result<ResolvedPaths, PathError> {
        let (storage, location) = self.resolve_elements(id)?;
        let full_path = storage.to_data_layer_path(
            tenant,
            owner,
            self.handler.service(),
            self.handler.category(),
            false,
        )?;

        Ok(ResolvedPaths {
            full_path,
            location,
        })
    }
}
