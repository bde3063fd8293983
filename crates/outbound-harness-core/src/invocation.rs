// crates/outbound-harness-core/src/invocation.rs
// ============================================================================
// Module: Invocation Adapter
// Description: Uniform call protocol over the four integration function shapes.
// Purpose: Turn every call, error, or panic into one comparable result.
// Dependencies: serde_json, thiserror, tracing
// ============================================================================

//! ## Overview
//! [`invoke`] runs `validate`, `request`, `response`, or `handle` for an
//! integration and returns an [`InvocationResult`]. Errors and panics raised
//! by integration code become [`Outcome::Error`] so that an error message can
//! be matched against a fixture exactly like a return value.
//! Invariants:
//! - Integration failures never propagate as harness errors.
//! - [`InvocationError`] is reserved for calls the integration cannot accept.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::panic::catch_unwind;

use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;
use tracing::instrument;
use tracing::warn;

use crate::fixture::FunctionCategory;
use crate::interception::InterceptionOptions;
use crate::interception::NetworkExpectation;
use crate::interception::invoke_handle;
use crate::model::Contract;
use crate::model::Environment;
use crate::model::Integration;
use crate::model::IntegrationError;
use crate::model::RawResponse;
use crate::model::RequestSpec;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Key of the diagnostic object returned for harness-level usage errors.
pub const HARNESS_ERROR_KEY: &str = "harness_error";

/// Key listing unmet network expectations on a `handle` value.
pub const NOCKS_UNMET_KEY: &str = "nocks_unmet";

/// Key holding the installed expectation count when some went unmet.
pub const NOCKS_TOTAL_KEY: &str = "nocks_total";

// ============================================================================
// SECTION: Results
// ============================================================================

/// What an invocation produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Outcome {
    /// A returned value.
    Value(Value),
    /// No value (`validate` accepted the input).
    Absent,
    /// Integration code raised, panicked, or timed out.
    Error(String),
    /// The harness could not run the invocation as declared by the fixture.
    HarnessError(String),
}

/// Uniform result of any of the four function calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvocationResult {
    /// Invocation outcome.
    pub outcome: Outcome,
    /// Keys of network expectations that were never satisfied.
    pub nocks_unmet: Vec<String>,
    /// Installed expectation count, set only when some went unmet.
    pub nocks_total: Option<usize>,
}

impl InvocationResult {
    /// Result carrying a value.
    #[must_use]
    pub const fn value(value: Value) -> Self {
        Self::from_outcome(Outcome::Value(value))
    }

    /// Result carrying no value.
    #[must_use]
    pub const fn absent() -> Self {
        Self::from_outcome(Outcome::Absent)
    }

    /// Result carrying an integration error message.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self::from_outcome(Outcome::Error(message.into()))
    }

    /// Result carrying a harness usage diagnostic.
    #[must_use]
    pub fn harness_error(message: impl Into<String>) -> Self {
        Self::from_outcome(Outcome::HarnessError(message.into()))
    }

    /// Wraps an outcome with no network accounting.
    const fn from_outcome(outcome: Outcome) -> Self {
        Self {
            outcome,
            nocks_unmet: Vec::new(),
            nocks_total: None,
        }
    }

    /// Returns true when integration code failed.
    #[must_use]
    pub const fn is_error(&self) -> bool {
        matches!(self.outcome, Outcome::Error(_))
    }

    /// Returns the value compared against fixture expectations.
    ///
    /// Errors compare as their message text. Unmet network keys are merged
    /// into the value as `nocks_unmet` and `nocks_total`.
    #[must_use]
    pub fn actual(&self) -> Option<Value> {
        let base = match &self.outcome {
            Outcome::Value(value) => Some(value.clone()),
            Outcome::Absent => None,
            Outcome::Error(message) => return Some(Value::String(message.clone())),
            Outcome::HarnessError(message) => {
                let mut map = Map::new();
                map.insert(HARNESS_ERROR_KEY.to_string(), Value::String(message.clone()));
                return Some(Value::Object(map));
            }
        };
        if self.nocks_unmet.is_empty() {
            return base;
        }
        let mut value = match base {
            Some(Value::Object(map)) => map,
            None | Some(Value::Null) => Map::new(),
            Some(other) => {
                let mut map = Map::new();
                map.insert("value".to_string(), other);
                map
            }
        };
        value.insert(
            NOCKS_UNMET_KEY.to_string(),
            Value::Array(self.nocks_unmet.iter().cloned().map(Value::String).collect()),
        );
        if let Some(total) = self.nocks_total {
            value.insert(NOCKS_TOTAL_KEY.to_string(), Value::from(total));
        }
        Some(Value::Object(value))
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Calls the integration cannot accept.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvocationError {
    /// The integration declares no validate function.
    #[error("integration '{0}' has no validate function")]
    NoValidate(String),
    /// The category does not exist for the integration's contract shape.
    #[error("integration '{integration}' has no {category} function ({contract} contract)")]
    WrongContract {
        /// Integration name.
        integration: String,
        /// Requested category.
        category: FunctionCategory,
        /// Declared contract label.
        contract: &'static str,
    },
}

// ============================================================================
// SECTION: Invocation
// ============================================================================

/// Inputs for one invocation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Call {
    /// Input variable bag.
    pub vars: Value,
    /// Credential environment.
    pub env: Environment,
    /// Request description passed to `response`.
    pub request: RequestSpec,
    /// Raw response passed to `response`.
    pub res: Option<RawResponse>,
    /// Network expectations for `handle`.
    pub network: Vec<NetworkExpectation>,
}

impl Call {
    /// Creates a call with the given variables and environment.
    #[must_use]
    pub fn new(vars: Value, env: Environment) -> Self {
        Self {
            vars,
            env,
            ..Self::default()
        }
    }
}

/// Invokes one function of an integration.
///
/// # Errors
///
/// Returns [`InvocationError`] when the integration does not expose the category.
#[instrument(skip_all, fields(integration = integration.name(), category = %category))]
pub async fn invoke(
    integration: &Integration,
    category: FunctionCategory,
    call: Call,
    options: &InterceptionOptions,
) -> Result<InvocationResult, InvocationError> {
    let result = match category {
        FunctionCategory::Validate => invoke_validate(integration, &call.vars, &call.env)?,
        FunctionCategory::Request => invoke_request(integration, &call.vars, &call.env)?,
        FunctionCategory::Response => {
            let res = call.res.unwrap_or_else(RawResponse::canned_json);
            invoke_response(integration, &call.vars, &call.request, &res)?
        }
        FunctionCategory::Handle => {
            let Contract::Combined {
                handle,
            } = integration.contract()
            else {
                return Err(wrong_contract(integration, category));
            };
            invoke_handle(handle.clone(), call.vars, call.env, &call.network, options).await
        }
    };
    debug!(error = result.is_error(), unmet = result.nocks_unmet.len(), "invocation finished");
    Ok(result)
}

/// Runs `validate`.
///
/// # Errors
///
/// Returns [`InvocationError::NoValidate`] when no validate function is declared.
pub fn invoke_validate(
    integration: &Integration,
    vars: &Value,
    env: &Environment,
) -> Result<InvocationResult, InvocationError> {
    let validator =
        integration.validator().ok_or_else(|| InvocationError::NoValidate(integration.name().to_string()))?;
    Ok(guarded(|| validator.validate(vars, env), |message| match message {
        Some(message) => Outcome::Value(Value::String(message)),
        None => Outcome::Absent,
    }))
}

/// Runs two-phase `request`; the request description is the value.
///
/// # Errors
///
/// Returns [`InvocationError::WrongContract`] for combined integrations.
pub fn invoke_request(
    integration: &Integration,
    vars: &Value,
    env: &Environment,
) -> Result<InvocationResult, InvocationError> {
    let Contract::TwoPhase {
        request,
        ..
    } = integration.contract()
    else {
        return Err(wrong_contract(integration, FunctionCategory::Request));
    };
    Ok(guarded(|| request.request(vars, env), |spec| match serde_json::to_value(spec) {
        Ok(value) => Outcome::Value(value),
        Err(err) => Outcome::Error(err.to_string()),
    }))
}

/// Runs two-phase `response`.
///
/// # Errors
///
/// Returns [`InvocationError::WrongContract`] for combined integrations.
pub fn invoke_response(
    integration: &Integration,
    vars: &Value,
    request: &RequestSpec,
    res: &RawResponse,
) -> Result<InvocationResult, InvocationError> {
    let Contract::TwoPhase {
        response,
        ..
    } = integration.contract()
    else {
        return Err(wrong_contract(integration, FunctionCategory::Response));
    };
    Ok(guarded(|| response.response(vars, request, res), Outcome::Value))
}

/// Builds the wrong-contract error.
fn wrong_contract(integration: &Integration, category: FunctionCategory) -> InvocationError {
    InvocationError::WrongContract {
        integration: integration.name().to_string(),
        category,
        contract: integration.contract().label(),
    }
}

/// Runs synchronous integration code, turning errors and panics into outcomes.
fn guarded<T>(
    call: impl FnOnce() -> Result<T, IntegrationError>,
    on_ok: impl FnOnce(T) -> Outcome,
) -> InvocationResult {
    match catch_unwind(AssertUnwindSafe(call)) {
        Ok(Ok(value)) => InvocationResult::from_outcome(on_ok(value)),
        Ok(Err(err)) => InvocationResult::error(err.message()),
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            warn!(panic = %message, "integration code panicked");
            InvocationResult::error(message)
        }
    }
}

/// Extracts a readable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|text| (*text).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "integration panicked".to_string())
}

// ============================================================================
// SECTION: Tests
// ============================================================================
