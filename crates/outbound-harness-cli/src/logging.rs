// crates/outbound-harness-cli/src/logging.rs
// ============================================================================
// Module: Logging Bootstrap
// Description: Installs the process-wide tracing subscriber.
// Purpose: Route harness events to stderr using the configured filter and format.
// Dependencies: outbound-harness-config, tracing-subscriber
// ============================================================================

//! ## Overview
//! Logs always go to stderr so that stdout carries only the suite report.

// ============================================================================
// SECTION: Imports
// ============================================================================

use outbound_harness_config::LogFormat;
use outbound_harness_config::LoggingConfig;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

// ============================================================================
// SECTION: Subscriber
// ============================================================================

/// Installs the global subscriber for `config`.
///
/// # Errors
///
/// Returns [`LoggingError`] when the filter does not parse or a subscriber is
/// already installed.
pub fn init(config: &LoggingConfig) -> Result<(), LoggingError> {
    let filter = EnvFilter::try_new(config.level.trim()).map_err(|err| LoggingError::Filter(err.to_string()))?;
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr);
    let installed = match config.format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    installed.map_err(|err| LoggingError::Install(err.to_string()))
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Logging bootstrap errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoggingError {
    /// The filter directives were rejected.
    #[error("invalid log filter: {0}")]
    Filter(String),
    /// A subscriber could not be installed.
    #[error("log subscriber install failed: {0}")]
    Install(String),
}
