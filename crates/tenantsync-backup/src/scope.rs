//! Scope matching for backup selection
//!
//! Decides which enumerated containers produce collections. Rules are glob
//! patterns matched against the container's location (display-name path),
//! e.g. `Inbox/**` or `General`. Excluded containers are still considered
//! "seen" by the reconciliation engine, so they are never tombstoned.

use glob::Pattern;
use tenantsync_core::config::BackupConfig;
use tenantsync_core::domain::{Category, PathBuilder};
use tracing::{debug, trace};

use crate::ReconcileError;

/// Decides whether a container is selected for backup
pub trait ScopeMatcher: Send + Sync {
    /// Returns true if the container at `location` should be backed up
    fn matches(&self, category: Category, location: &PathBuilder) -> bool;
}

/// Include/exclude glob rules
///
/// A container matches when it matches any include pattern (or there are
/// none) and no exclude pattern.
#[derive(Debug, Clone, Default)]
pub struct GlobScope {
    include: Vec<Pattern>,
    exclude: Vec<Pattern>,
}

fn compile(patterns: &[String]) -> Result<Vec<Pattern>, ReconcileError> {
    patterns
        .iter()
        .map(|p| {
            Pattern::new(p).map_err(|e| ReconcileError::InvalidScope {
                pattern: p.clone(),
                reason: e.to_string(),
            })
        })
        .collect()
}

impl GlobScope {
    /// Selects every container
    pub fn all() -> Self {
        Self::default()
    }

    /// Compiles include and exclude patterns
    pub fn new(include: &[String], exclude: &[String]) -> Result<Self, ReconcileError> {
        let scope = Self {
            include: compile(include)?,
            exclude: compile(exclude)?,
        };

        debug!(
            include = scope.include.len(),
            exclude = scope.exclude.len(),
            "GlobScope initialized"
        );

        Ok(scope)
    }

    /// Builds the scope from the `backup` configuration section
    pub fn from_config(config: &BackupConfig) -> Result<Self, ReconcileError> {
        Self::new(&config.include, &config.exclude)
    }
}

impl ScopeMatcher for GlobScope {
    fn matches(&self, category: Category, location: &PathBuilder) -> bool {
        let loc = location.as_elements().join("/");

        let included =
            self.include.is_empty() || self.include.iter().any(|p| p.matches(&loc));
        let excluded = self.exclude.iter().any(|p| p.matches(&loc));

        trace!(
            category = %category,
            location = %loc,
            included,
            excluded,
            "Scope evaluated"
        );

        included && !excluded
    }
}
