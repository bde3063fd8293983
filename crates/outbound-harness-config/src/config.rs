// crates/outbound-harness-config/src/config.rs
// ============================================================================
// Module: Outbound Harness Configuration
// Description: Configuration loading and validation for the harness.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: outbound-harness-core, serde, toml
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file with strict size and path limits.
//! An explicitly named file must exist; the default `outbound-harness.toml`
//! may be absent, in which case every section takes its defaults. Invalid
//! values fail closed.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::env;
use std::fs;
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use outbound_harness_core::InterceptionOptions;
use outbound_harness_core::RunnerOptions;
use outbound_harness_core::UnmetPolicy;
use outbound_harness_core::runner::DEFAULT_DUMMY_ENV_VALUE;
use outbound_harness_core::runner::DEFAULT_FIXTURES_DIR;
use outbound_harness_core::runner::DEFAULT_MISSING_CREDENTIALS_MESSAGE;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
pub const DEFAULT_CONFIG_NAME: &str = "outbound-harness.toml";
/// Environment variable used to override the config path.
pub const CONFIG_ENV_VAR: &str = "OUTBOUND_HARNESS_CONFIG";
/// Maximum configuration file size in bytes.
pub(crate) const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum length of a single path component.
pub(crate) const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
pub(crate) const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Lower bound for the handle timeout in milliseconds.
pub const MIN_HANDLE_TIMEOUT_MS: u64 = 10;
/// Upper bound for the handle timeout in milliseconds.
pub const MAX_HANDLE_TIMEOUT_MS: u64 = 600_000;
/// Default handle timeout in milliseconds.
pub const DEFAULT_HANDLE_TIMEOUT_MS: u64 = 2_000;
/// Default replay server bind address.
pub const DEFAULT_BIND: &str = "127.0.0.1:3000";
/// Level names accepted in logging filters.
const LOG_LEVELS: [&str; 6] = ["trace", "debug", "info", "warn", "error", "off"];

// ============================================================================
// SECTION: Configuration Model
// ============================================================================

/// Top-level harness configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HarnessConfig {
    /// Fixture resource settings.
    #[serde(default)]
    pub fixtures: FixturesConfig,
    /// Batch runner settings.
    #[serde(default)]
    pub runner: RunnerConfig,
    /// Replay server settings.
    #[serde(default)]
    pub server: ServerConfig,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl HarnessConfig {
    /// Loads configuration from disk using the default resolution rules.
    ///
    /// Resolution order: `path`, then `OUTBOUND_HARNESS_CONFIG`, then
    /// `outbound-harness.toml` in the working directory. Only the last may be
    /// missing.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let (resolved, source) = resolve_path(path)?;
        Self::load_resolved(&resolved, source == ConfigSource::Default)
    }

    /// Loads a resolved path; `optional` maps a missing file to defaults.
    fn load_resolved(path: &Path, optional: bool) -> Result<Self, ConfigError> {
        validate_path(path)?;
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(err) if optional && err.kind() == ErrorKind::NotFound => return Ok(Self::default()),
            Err(err) => return Err(ConfigError::Io(err.to_string())),
        };
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        Self::from_toml(content)
    }

    /// Parses and validates configuration text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when parsing or validation fails.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.fixtures.validate()?;
        self.runner.validate()?;
        self.server.validate()?;
        self.logging.validate()
    }

    /// Builds batch runner options from the fixture and runner sections.
    #[must_use]
    pub fn runner_options(&self) -> RunnerOptions {
        RunnerOptions {
            fixtures_dir: PathBuf::from(&self.fixtures.dir),
            generate_fixtures: self.runner.generate_fixtures,
            dummy_env_value: self.runner.dummy_env_value.clone(),
            missing_credentials_message: self.runner.missing_credentials_message.clone(),
            unmet_policy: self.runner.unmet_network_policy,
            interception: InterceptionOptions {
                timeout: Duration::from_millis(self.runner.handle_timeout_ms),
            },
        }
    }
}

/// Fixture resource configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixturesConfig {
    /// Directory holding `<integration>.yaml` files.
    #[serde(default = "default_fixtures_dir")]
    pub dir: String,
}

impl Default for FixturesConfig {
    fn default() -> Self {
        Self {
            dir: default_fixtures_dir(),
        }
    }
}

impl FixturesConfig {
    /// Validates fixture settings.
    fn validate(&self) -> Result<(), ConfigError> {
        validate_path_string("fixtures.dir", &self.dir)
    }
}

/// Batch runner configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Upper bound on one `handle` invocation in milliseconds.
    #[serde(default = "default_handle_timeout_ms")]
    pub handle_timeout_ms: u64,
    /// Unmet network expectation policy.
    #[serde(default)]
    pub unmet_network_policy: UnmetPolicy,
    /// Placeholder value for injected credentials.
    #[serde(default = "default_dummy_env_value")]
    pub dummy_env_value: String,
    /// Message `validate` must raise without credentials.
    #[serde(default = "default_missing_credentials_message")]
    pub missing_credentials_message: String,
    /// Synthesize fixtures for absent categories.
    #[serde(default = "default_true")]
    pub generate_fixtures: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            handle_timeout_ms: default_handle_timeout_ms(),
            unmet_network_policy: UnmetPolicy::default(),
            dummy_env_value: default_dummy_env_value(),
            missing_credentials_message: default_missing_credentials_message(),
            generate_fixtures: true,
        }
    }
}

impl RunnerConfig {
    /// Validates runner settings.
    fn validate(&self) -> Result<(), ConfigError> {
        if !(MIN_HANDLE_TIMEOUT_MS ..= MAX_HANDLE_TIMEOUT_MS).contains(&self.handle_timeout_ms) {
            return Err(ConfigError::Invalid(format!(
                "runner.handle_timeout_ms must be between {MIN_HANDLE_TIMEOUT_MS} and \
                 {MAX_HANDLE_TIMEOUT_MS}"
            )));
        }
        if self.dummy_env_value.trim().is_empty() {
            return Err(ConfigError::Invalid("runner.dummy_env_value must be non-empty".to_string()));
        }
        if self.missing_credentials_message.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "runner.missing_credentials_message must be non-empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Replay server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Socket address the replay server binds.
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

impl ServerConfig {
    /// Validates server settings.
    fn validate(&self) -> Result<(), ConfigError> {
        self.bind_addr().map(|_| ())
    }

    /// Parses the bind address.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the address does not parse.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.bind.trim().parse().map_err(|_| ConfigError::Invalid("invalid server.bind address".to_string()))
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directives (`info`, `outbound_harness_core=debug,warn`).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Output format.
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

impl LoggingConfig {
    /// Validates logging settings.
    fn validate(&self) -> Result<(), ConfigError> {
        let level = self.level.trim();
        if level.is_empty() {
            return Err(ConfigError::Invalid("logging.level must be non-empty".to_string()));
        }
        for directive in level.split(',').map(str::trim) {
            let (target, name) = directive.rsplit_once('=').unwrap_or(("", directive));
            let known = LOG_LEVELS.iter().any(|known| known.eq_ignore_ascii_case(name.trim()));
            if !known || (directive.contains('=') && target.trim().is_empty()) {
                return Err(ConfigError::Invalid(format!("logging.level directive '{directive}' is invalid")));
            }
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Where a resolved config path came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConfigSource {
    /// Passed by the caller.
    Explicit,
    /// Read from `OUTBOUND_HARNESS_CONFIG`.
    Environment,
    /// The default filename.
    Default,
}

/// Resolves the config path from CLI or environment defaults.
fn resolve_path(path: Option<&Path>) -> Result<(PathBuf, ConfigSource), ConfigError> {
    if let Some(path) = path {
        return Ok((path.to_path_buf(), ConfigSource::Explicit));
    }
    if let Ok(env_path) = env::var(CONFIG_ENV_VAR) {
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
        }
        return Ok((PathBuf::from(env_path), ConfigSource::Environment));
    }
    Ok((PathBuf::from(DEFAULT_CONFIG_NAME), ConfigSource::Default))
}

/// Validates the resolved path against security limits.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
    }
    for component in path.components() {
        let value = component.as_os_str().to_string_lossy();
        if value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("config path component too long".to_string()));
        }
    }
    Ok(())
}

/// Validates a path string against length constraints.
fn validate_path_string(field: &str, value: &str) -> Result<(), ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must be non-empty")));
    }
    if trimmed.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid(format!("{field} exceeds max length")));
    }
    for component in Path::new(trimmed).components() {
        if component.as_os_str().to_string_lossy().len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid(format!("{field} path component too long")));
        }
    }
    Ok(())
}

/// Default fixture directory.
fn default_fixtures_dir() -> String {
    DEFAULT_FIXTURES_DIR.to_string()
}

/// Default handle timeout.
const fn default_handle_timeout_ms() -> u64 {
    DEFAULT_HANDLE_TIMEOUT_MS
}

/// Default dummy credential value.
fn default_dummy_env_value() -> String {
    DEFAULT_DUMMY_ENV_VALUE.to_string()
}

/// Default missing-credentials message.
fn default_missing_credentials_message() -> String {
    DEFAULT_MISSING_CREDENTIALS_MESSAGE.to_string()
}

/// Default bind address.
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}

/// Default logging filter.
fn default_log_level() -> String {
    "info".to_string()
}

/// Serde default for enabled flags.
const fn default_true() -> bool {
    true
}

// ============================================================================
// SECTION: Tests
// ============================================================================
