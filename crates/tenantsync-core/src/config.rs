//! Configuration module for TenantSync.
//!
//! Provides typed configuration structs that map to the YAML configuration file,
//! with loading, validation, defaults, and a builder pattern for programmatic use.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::domain::{Category, CollisionPolicy};
use crate::fault::FailurePolicy;

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for TenantSync.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub backup: BackupConfig,
    pub rate_limiting: RateLimitingConfig,
    pub restore: RestoreConfig,
    pub logging: LoggingConfig,
}

/// Backup run settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupConfig {
    /// Maximum concurrent item-ID queries and item fetches.
    pub item_fetch_parallelism: usize,
    /// Capacity of each collection's item channel.
    pub collection_buffer_size: usize,
    /// How recoverable errors affect the run outcome.
    pub failure_policy: FailurePolicy,
    /// Run-wide switch for delta queries. When off every container is fully enumerated.
    pub delta_enabled: bool,
    /// Glob patterns over container locations to include. Empty means everything.
    pub include: Vec<String>,
    /// Glob patterns over container locations to exclude. Applied after `include`.
    pub exclude: Vec<String>,
}

/// Which limiter implementation throttles a category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimiterKind {
    /// Fixed-rate token bucket with a burst capacity
    TokenBucket,
    /// Request budget over a sliding time window that shrinks on throttling
    SlidingWindow,
}

/// Settings for a single limiter instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimiterSettings {
    pub kind: LimiterKind,
    /// Token bucket: sustained rate.
    pub requests_per_minute: u32,
    /// Token bucket: burst capacity.
    pub burst: u32,
    /// Sliding window: window length in seconds.
    pub window_seconds: u64,
    /// Sliding window: requests allowed per window.
    pub window_requests: u32,
}

/// Remote-call rate limiting, selectable per category.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitingConfig {
    /// Disable to let enumerator calls through unthrottled.
    pub enabled: bool,
    /// Settings for categories without an override.
    pub default: LimiterSettings,
    /// Per-category overrides.
    pub categories: BTreeMap<Category, LimiterSettings>,
}

/// Restore settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RestoreConfig {
    /// Behavior when a restore target already exists.
    pub on_collision: CollisionPolicy,
    /// Destination folder. Empty restores in place at the original path.
    pub location: String,
    /// Resource owner to restore into. Empty restores to the original owner.
    pub protected_resource: String,
    /// Destination drive name for drive-backed data. Empty keeps the original drive.
    pub drive: String,
    /// Restore the permissions and sharing links recorded for items and folders.
    pub include_permissions: bool,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
    /// Output format: `text` or `json`.
    pub format: String,
    /// Include the module target in each line.
    pub with_target: bool,
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/tenantsync/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("tenantsync")
            .join("config.yaml")
    }
}

impl RateLimitingConfig {
    /// Effective limiter settings for a category
    #[must_use]
    pub fn for_category(&self, category: Category) -> &LimiterSettings {
        self.categories.get(&category).unwrap_or(&self.default)
    }
}

impl RestoreConfig {
    /// True when items go back to their original location.
    #[must_use]
    pub fn is_in_place(&self) -> bool {
        self.location.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            item_fetch_parallelism: 4,
            collection_buffer_size: 1000,
            failure_policy: FailurePolicy::FailAfterRecovery,
            delta_enabled: true,
            include: Vec::new(),
            exclude: Vec::new(),
        }
    }
}

impl Default for LimiterSettings {
    fn default() -> Self {
        Self {
            kind: LimiterKind::TokenBucket,
            requests_per_minute: 960,
            burst: 200,
            window_seconds: 600,
            window_requests: 10_000,
        }
    }
}

impl LimiterSettings {
    /// Sliding-window settings sized for mailbox APIs.
    #[must_use]
    pub fn sliding_window() -> Self {
        Self {
            kind: LimiterKind::SlidingWindow,
            ..Self::default()
        }
    }
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        let categories = [Category::Email, Category::Contacts, Category::Events]
            .into_iter()
            .map(|c| (c, LimiterSettings::sliding_window()))
            .collect();

        Self {
            enabled: true,
            default: LimiterSettings::default(),
            categories,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
            with_target: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"backup.item_fetch_parallelism"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Valid values for `logging.level`.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Valid values for `logging.format`.
const VALID_LOG_FORMATS: &[&str] = &["text", "json"];

fn validate_limiter(field: &str, settings: &LimiterSettings, errors: &mut Vec<ValidationError>) {
    match settings.kind {
        LimiterKind::TokenBucket => {
            if settings.requests_per_minute == 0 {
                errors.push(ValidationError {
                    field: format!("{field}.requests_per_minute"),
                    message: "must be greater than 0".into(),
                });
            }
            if settings.burst == 0 {
                errors.push(ValidationError {
                    field: format!("{field}.burst"),
                    message: "must be greater than 0".into(),
                });
            }
        }
        LimiterKind::SlidingWindow => {
            if settings.window_seconds == 0 {
                errors.push(ValidationError {
                    field: format!("{field}.window_seconds"),
                    message: "must be greater than 0".into(),
                });
            }
            if settings.window_requests == 0 {
                errors.push(ValidationError {
                    field: format!("{field}.window_requests"),
                    message: "must be greater than 0".into(),
                });
            }
        }
    }
}

impl RestoreConfig {
    /// Validate the restore section on its own.
    ///
    /// An empty `location` is valid and means in-place restore.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.drive.contains('/') {
            errors.push(ValidationError {
                field: "restore.drive".into(),
                message: "drive name must not contain '/'".into(),
            });
        }
        if self.protected_resource.contains('/') {
            errors.push(ValidationError {
                field: "restore.protected_resource".into(),
                message: "resource ID must not contain '/'".into(),
            });
        }
        if self.location.split('/').any(|e| e.trim().is_empty()) && !self.location.is_empty() {
            errors.push(ValidationError {
                field: "restore.location".into(),
                message: format!("location '{}' contains an empty folder name", self.location),
            });
        }

        errors
    }
}

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        // --- backup ---
        if self.backup.item_fetch_parallelism == 0 {
            errors.push(ValidationError {
                field: "backup.item_fetch_parallelism".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.backup.collection_buffer_size == 0 {
            errors.push(ValidationError {
                field: "backup.collection_buffer_size".into(),
                message: "must be greater than 0".into(),
            });
        }

        // --- rate_limiting ---
        if self.rate_limiting.enabled {
            validate_limiter("rate_limiting.default", &self.rate_limiting.default, &mut errors);
            for (category, settings) in &self.rate_limiting.categories {
                validate_limiter(
                    &format!("rate_limiting.categories.{category}"),
                    settings,
                    &mut errors,
                );
            }
        }

        // --- restore ---
        errors.extend(self.restore.validate());

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            errors.push(ValidationError {
                field: "logging.level".into(),
                message: format!(
                    "invalid level '{}'; valid options: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            });
        }
        if !VALID_LOG_FORMATS.contains(&self.logging.format.as_str()) {
            errors.push(ValidationError {
                field: "logging.format".into(),
                message: format!(
                    "invalid format '{}'; valid options: {}",
                    self.logging.format,
                    VALID_LOG_FORMATS.join(", ")
                ),
            });
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// ConfigBuilder
// ---------------------------------------------------------------------------

/// Builder for constructing a [`Config`] programmatically.
///
/// Starts from [`Config::default`] and allows selective overrides.
///
/// # Example
///
/// ```rust,no_run
/// use tenantsync_core::config::ConfigBuilder;
/// use tenantsync_core::domain::CollisionPolicy;
///
/// let config = ConfigBuilder::new()
///     .backup_item_fetch_parallelism(8)
///     .restore_on_collision(CollisionPolicy::Replace)
///     .logging_level("debug")
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder pre-filled with default values.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    // --- backup ---

    pub fn backup_item_fetch_parallelism(mut self, n: usize) -> Self {
        self.config.backup.item_fetch_parallelism = n;
        self
    }

    pub fn backup_collection_buffer_size(mut self, n: usize) -> Self {
        self.config.backup.collection_buffer_size = n;
        self
    }

    pub fn backup_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.config.backup.failure_policy = policy;
        self
    }

    pub fn backup_delta_enabled(mut self, enabled: bool) -> Self {
        self.config.backup.delta_enabled = enabled;
        self
    }

    pub fn backup_include(mut self, pattern: impl Into<String>) -> Self {
        self.config.backup.include.push(pattern.into());
        self
    }

    pub fn backup_exclude(mut self, pattern: impl Into<String>) -> Self {
        self.config.backup.exclude.push(pattern.into());
        self
    }

    // --- rate_limiting ---

    pub fn rate_limiting_enabled(mut self, enabled: bool) -> Self {
        self.config.rate_limiting.enabled = enabled;
        self
    }

    pub fn rate_limiting_default(mut self, settings: LimiterSettings) -> Self {
        self.config.rate_limiting.default = settings;
        self
    }

    pub fn rate_limiting_category(mut self, category: Category, settings: LimiterSettings) -> Self {
        self.config.rate_limiting.categories.insert(category, settings);
        self
    }

    // --- restore ---

    pub fn restore_on_collision(mut self, policy: CollisionPolicy) -> Self {
        self.config.restore.on_collision = policy;
        self
    }

    pub fn restore_location(mut self, location: impl Into<String>) -> Self {
        self.config.restore.location = location.into();
        self
    }

    pub fn restore_protected_resource(mut self, resource: impl Into<String>) -> Self {
        self.config.restore.protected_resource = resource.into();
        self
    }

    pub fn restore_drive(mut self, drive: impl Into<String>) -> Self {
        self.config.restore.drive = drive.into();
        self
    }

    // --- logging ---

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    pub fn logging_format(mut self, format: impl Into<String>) -> Self {
        self.config.logging.format = format.into();
        self
    }

    pub fn logging_with_target(mut self, with_target: bool) -> Self {
        self.config.logging.with_target = with_target;
        self
    }

    // --- build ---

    /// Consume the builder and return the finished [`Config`].
    pub fn build(self) -> Config {
        self.config
    }

    /// Build and validate in one step. Returns `Err` with the list of
    /// validation errors if the configuration is invalid.
    pub fn build_validated(self) -> Result<Config, Vec<ValidationError>> {
        let config = self.build();
        let errors = config.validate();
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(errors)
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
