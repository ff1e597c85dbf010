//! Fault bus: per-run error accumulation with a configurable failure policy
//!
//! Every backup or restore run owns one [`FaultBus`]. Work that can fail
//! without invalidating the whole run reports through
//! [`FaultBus::add_recoverable`]; work that must stop the run reports
//! through [`FaultBus::fail`]. Loops hand a [`FaultBus::local`] child to
//! each unit of work so they can check for a local hard failure while every
//! error still reaches the run-level bus.
//!
//! Whether recoverable errors end up failing the run is decided by
//! [`FailurePolicy`] when the caller asks for [`FaultBus::finalize`].

use std::collections::BTreeSet;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info};

use crate::domain::DomainError;

/// Label attached to enumeration errors that must prevent the store from
/// committing a snapshot built from partial data.
pub const LABEL_FORCE_NO_BACKUP_CREATION: &str = "force_no_backup_creation";

// ============================================================================
// FailurePolicy
// ============================================================================

/// How recoverable errors affect the outcome of a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// The first recoverable error becomes the run failure and work stops
    FailFast,
    /// Work continues, but the run fails if any recoverable error occurred
    #[default]
    FailAfterRecovery,
    /// Recoverable errors never fail the run
    BestEffort,
}

impl Display for FailurePolicy {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::FailFast => "fail_fast",
            Self::FailAfterRecovery => "fail_after_recovery",
            Self::BestEffort => "best_effort",
        };
        write!(f, "{s}")
    }
}

impl FromStr for FailurePolicy {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "fail_fast" => Ok(Self::FailFast),
            "fail_after_recovery" => Ok(Self::FailAfterRecovery),
            "best_effort" => Ok(Self::BestEffort),
            _ => Err(DomainError::ValidationFailed(format!(
                "unknown failure policy: {s}"
            ))),
        }
    }
}

// ============================================================================
// LabeledError
// ============================================================================

/// An error message plus classification labels
///
/// Labels let callers (and tests) tell error kinds apart after the original
/// error value has been flattened into the bus.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct LabeledError {
    message: String,
    labels: BTreeSet<String>,
}

impl LabeledError {
    /// Creates an unlabeled error from a message
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            labels: BTreeSet::new(),
        }
    }

    /// Flattens any error, including its source chain, into a message.
    pub fn from_error(err: &(dyn std::error::Error + 'static)) -> Self {
        let mut message = err.to_string();
        let mut source = err.source();
        while let Some(s) = source {
            message.push_str(": ");
            message.push_str(&s.to_string());
            source = s.source();
        }
        Self::new(message)
    }

    /// Flattens an `anyhow::Error` using its alternate (chained) display.
    pub fn from_anyhow(err: &anyhow::Error) -> Self {
        Self::new(format!("{err:#}"))
    }

    /// Adds a label
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.labels.insert(label.into());
        self
    }

    /// Returns true if the label is present
    #[must_use]
    pub fn has_label(&self, label: &str) -> bool {
        self.labels.contains(label)
    }

    #[must_use]
    pub fn labels(&self) -> &BTreeSet<String> {
        &self.labels
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

// ============================================================================
// RunStatus
// ============================================================================

/// Overall outcome reported for a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// No errors of any kind
    Completed,
    /// Recoverable errors occurred but the policy tolerated them
    Partial,
    /// The run failed
    Failed,
}

impl Display for RunStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Completed => "completed",
            Self::Partial => "partial",
            Self::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

// ============================================================================
// FaultBus
// ============================================================================

#[derive(Debug, Default)]
struct BusState {
    failure: Option<LabeledError>,
    recoverable: Vec<LabeledError>,
}

/// Thread-safe error accumulator for one run
#[derive(Debug)]
pub struct FaultBus {
    policy: FailurePolicy,
    state: Mutex<BusState>,
    parent: Option<Arc<FaultBus>>,
}

impl FaultBus {
    /// Creates a run-level bus
    pub fn new(policy: FailurePolicy) -> Arc<Self> {
        Arc::new(Self {
            policy,
            state: Mutex::new(BusState::default()),
            parent: None,
        })
    }

    /// Creates a child bus.
    ///
    /// Errors added to the child are forwarded to this bus. A hard failure
    /// recorded on the child (directly, or through fail-fast) is visible
    /// from the child's [`failure`](Self::failure), which lets a loop stop
    /// without inspecting errors produced by sibling loops.
    pub fn local(self: &Arc<Self>) -> Arc<Self> {
        Arc::new(Self {
            policy: self.policy,
            state: Mutex::new(BusState::default()),
            parent: Some(Arc::clone(self)),
        })
    }

    fn lock(&self) -> MutexGuard<'_, BusState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    #[must_use]
    pub fn fail_fast(&self) -> bool {
        self.policy == FailurePolicy::FailFast
    }

    /// Records a hard failure.
    ///
    /// The first failure wins; later ones are kept as recoverable errors so
    /// nothing is lost.
    pub fn fail(&self, err: LabeledError) {
        error!(error = %err, "Run failure recorded");
        self.set_failure(err);
    }

    fn set_failure(&self, err: LabeledError) {
        {
            let mut state = self.lock();
            if state.failure.is_none() {
                state.failure = Some(err.clone());
            } else {
                state.recoverable.push(err.clone());
            }
        }

        if let Some(parent) = &self.parent {
            parent.set_failure(err);
        }
    }

    /// Records a recoverable error.
    ///
    /// Under [`FailurePolicy::FailFast`] the first recoverable error is also
    /// promoted to the failure on this bus and every ancestor.
    pub fn add_recoverable(&self, err: LabeledError) {
        if self.add_recoverable_inner(err.clone()) {
            error!(error = %err, "Failed on recoverable error");
        } else {
            info!(error = %err, "Recoverable error");
        }
    }

    fn add_recoverable_inner(&self, err: LabeledError) -> bool {
        let mut is_fail = false;

        {
            let mut state = self.lock();
            if state.failure.is_none() && self.fail_fast() {
                state.failure = Some(err.clone());
                is_fail = true;
            }
            state.recoverable.push(err.clone());
        }

        if let Some(parent) = &self.parent {
            if is_fail {
                parent.promote_failure(err.clone());
            }
            parent.add_recoverable_inner(err);
        }

        is_fail
    }

    fn promote_failure(&self, err: LabeledError) {
        {
            let mut state = self.lock();
            if state.failure.is_none() {
                state.failure = Some(err.clone());
            }
        }
        if let Some(parent) = &self.parent {
            parent.promote_failure(err);
        }
    }

    /// The hard failure, if any
    #[must_use]
    pub fn failure(&self) -> Option<LabeledError> {
        self.lock().failure.clone()
    }

    /// True once a hard failure has been recorded
    #[must_use]
    pub fn has_failure(&self) -> bool {
        self.lock().failure.is_some()
    }

    /// Snapshot of all recoverable errors
    #[must_use]
    pub fn recovered(&self) -> Vec<LabeledError> {
        self.lock().recoverable.clone()
    }

    /// Recoverable errors carrying `label`
    #[must_use]
    pub fn recovered_with_label(&self, label: &str) -> Vec<LabeledError> {
        self.lock()
            .recoverable
            .iter()
            .filter(|e| e.has_label(label))
            .cloned()
            .collect()
    }

    /// Applies the failure policy and returns the error that fails the run.
    #[must_use]
    pub fn finalize(&self) -> Option<LabeledError> {
        let state = self.lock();
        if let Some(failure) = &state.failure {
            return Some(failure.clone());
        }

        match self.policy {
            FailurePolicy::FailAfterRecovery => state.recoverable.first().cloned(),
            FailurePolicy::FailFast | FailurePolicy::BestEffort => None,
        }
    }

    /// Pass/fail/partial outcome under the configured policy
    #[must_use]
    pub fn status(&self) -> RunStatus {
        if self.finalize().is_some() {
            RunStatus::Failed
        } else if self.lock().recoverable.is_empty() {
            RunStatus::Completed
        } else {
            RunStatus::Partial
        }
    }
}
