//! Domain error types
//!
//! This module defines error types specific to domain operations,
//! including identifier validation and canonical path failures.

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Invalid remote ID format
    #[error("Invalid remote ID: {0}")]
    InvalidRemoteId(String),

    /// Invalid delta token
    #[error("Invalid delta token: {0}")]
    InvalidDeltaToken(String),

    /// ID parsing error
    #[error("Invalid ID format: {0}")]
    InvalidId(String),

    /// Canonical path could not be built or parsed
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Unknown service or category name, or a mismatched pair
    #[error("Invalid service/category: {0}")]
    InvalidServiceCategory(String),

    /// Unknown collision policy name
    #[error("Invalid collision policy: {0}")]
    InvalidCollisionPolicy(String),

    /// Generic validation failure
    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}
