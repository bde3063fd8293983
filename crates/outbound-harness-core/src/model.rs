// crates/outbound-harness-core/src/model.rs
// ============================================================================
// Module: Integration Model
// Description: Integration modules, variable descriptors, and function shapes.
// Purpose: Define the fixed contract that outbound integrations implement.
// Dependencies: async-trait, serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! An [`IntegrationModule`] groups named [`Integration`]s. Every integration
//! exposes an optional `validate` function plus exactly one [`Contract`]:
//! two-phase (`request` + `response`) or combined (`handle`). The contract is
//! resolved once by [`IntegrationBuilder::build`] and never re-detected.
//! Invariants:
//! - Integration names are unique within a module.
//! - Credentials reach integration code only through [`Environment`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::transport::HandleContext;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Type name that accepts any value and does not require a description.
pub const WILDCARD_TYPE: &str = "wildcard";

// ============================================================================
// SECTION: Variable Descriptors
// ============================================================================

/// Typed metadata for one named field in an input or output bag.
///
/// # Invariants
/// - `name` is a lowercase dot-path (checked by [`crate::descriptor`]).
/// - `description` is required unless `var_type` is [`WILDCARD_TYPE`].
/// - `required` is always `Some` for request variables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableDescriptor {
    /// Dot-path name within the variable bag.
    pub name: String,
    /// Type name resolved through the type catalog.
    #[serde(rename = "type")]
    pub var_type: String,
    /// Whether the variable must be present (request variables only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<bool>,
    /// Human-readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl VariableDescriptor {
    /// Declares a required request variable.
    #[must_use]
    pub fn required(name: &str, var_type: &str, description: &str) -> Self {
        Self::request(name, var_type, true, description)
    }

    /// Declares an optional request variable.
    #[must_use]
    pub fn optional(name: &str, var_type: &str, description: &str) -> Self {
        Self::request(name, var_type, false, description)
    }

    /// Declares a response variable (no `required` flag).
    #[must_use]
    pub fn output(name: &str, var_type: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            var_type: var_type.to_string(),
            required: None,
            description: Some(description.to_string()),
        }
    }

    /// Builds a request variable with an explicit `required` flag.
    fn request(name: &str, var_type: &str, required: bool, description: &str) -> Self {
        Self {
            name: name.to_string(),
            var_type: var_type.to_string(),
            required: Some(required),
            description: Some(description.to_string()),
        }
    }

    /// Returns true when the descriptor is marked required.
    #[must_use]
    pub fn is_required(&self) -> bool {
        self.required == Some(true)
    }
}

// ============================================================================
// SECTION: Environment
// ============================================================================

/// Credential context handed to integration functions for one invocation.
///
/// # Invariants
/// - Never backed by the process environment; built fresh per invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Environment {
    /// Credential values keyed by variable name.
    values: BTreeMap<String, String>,
}

impl Environment {
    /// Creates an empty environment.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds an environment where every name maps to the same placeholder.
    #[must_use]
    pub fn dummy<S: AsRef<str>>(names: &[S], value: &str) -> Self {
        let values =
            names.iter().map(|name| (name.as_ref().to_string(), value.to_string())).collect();
        Self {
            values,
        }
    }

    /// Returns a copy with one additional value.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    /// Sets a value, replacing any previous one.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }

    /// Returns the value for `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// Returns true when `name` is present with a non-empty value.
    #[must_use]
    pub fn is_set(&self, name: &str) -> bool {
        self.get(name).is_some_and(|value| !value.is_empty())
    }

    /// Iterates over all name/value pairs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(name, value)| (name.as_str(), value.as_str()))
    }

    /// Returns true when no values are set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

// ============================================================================
// SECTION: Wire Shapes
// ============================================================================

/// Outbound request description returned by a two-phase `request` function.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestSpec {
    /// HTTP method.
    pub method: String,
    /// Absolute target URL.
    pub url: String,
    /// Request headers.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    /// Optional request body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

/// Raw network response handed to a two-phase `response` function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawResponse {
    /// HTTP status code.
    #[serde(default = "default_status")]
    pub status: u16,
    /// Response headers.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Response body text.
    #[serde(default)]
    pub body: String,
}

impl RawResponse {
    /// Canned JSON response used for synthesized fixtures.
    #[must_use]
    pub fn canned_json() -> Self {
        let mut headers = BTreeMap::new();
        headers.insert("Content-Type".to_string(), "application/json".to_string());
        Self {
            status: 200,
            headers,
            body: "{}".to_string(),
        }
    }

    /// Returns a header value, matching the name case-insensitively.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Default HTTP status for raw responses.
const fn default_status() -> u16 {
    200
}

// ============================================================================
// SECTION: Integration Errors
// ============================================================================

/// Error raised by integration code.
///
/// The harness treats the message as the invocation's value for matching.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct IntegrationError {
    /// User-facing error message.
    message: String,
}

impl IntegrationError {
    /// Creates an integration error with the given message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Returns the error message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

// ============================================================================
// SECTION: Function Shapes
// ============================================================================

/// `validate(vars) -> message?`: `Some` is the user-facing reason for rejection.
pub trait Validator: Send + Sync {
    /// Validates the variable bag.
    ///
    /// # Errors
    ///
    /// Returns [`IntegrationError`] when validation cannot run (e.g. missing credentials).
    fn validate(&self, vars: &Value, env: &Environment) -> Result<Option<String>, IntegrationError>;
}

impl<F> Validator for F
where
    F: Fn(&Value, &Environment) -> Result<Option<String>, IntegrationError> + Send + Sync,
{
    fn validate(&self, vars: &Value, env: &Environment) -> Result<Option<String>, IntegrationError> {
        self(vars, env)
    }
}

/// `request(vars) -> RequestSpec`: pure, no network side effects.
pub trait RequestBuilder: Send + Sync {
    /// Builds the outbound request description.
    ///
    /// # Errors
    ///
    /// Returns [`IntegrationError`] when the request cannot be built.
    fn request(&self, vars: &Value, env: &Environment) -> Result<RequestSpec, IntegrationError>;
}

impl<F> RequestBuilder for F
where
    F: Fn(&Value, &Environment) -> Result<RequestSpec, IntegrationError> + Send + Sync,
{
    fn request(&self, vars: &Value, env: &Environment) -> Result<RequestSpec, IntegrationError> {
        self(vars, env)
    }
}

/// `response(vars, request, raw) -> value`: pure, no network side effects.
pub trait ResponseParser: Send + Sync {
    /// Parses a raw network response into response variables.
    ///
    /// # Errors
    ///
    /// Returns [`IntegrationError`] when the response cannot be interpreted.
    fn response(
        &self,
        vars: &Value,
        request: &RequestSpec,
        response: &RawResponse,
    ) -> Result<Value, IntegrationError>;
}

impl<F> ResponseParser for F
where
    F: Fn(&Value, &RequestSpec, &RawResponse) -> Result<Value, IntegrationError> + Send + Sync,
{
    fn response(
        &self,
        vars: &Value,
        request: &RequestSpec,
        response: &RawResponse,
    ) -> Result<Value, IntegrationError> {
        self(vars, request, response)
    }
}

/// `handle(vars, callback)`: asynchronous, performs outbound calls via the context transport.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Handles one event. Returning is the single completion signal.
    ///
    /// # Errors
    ///
    /// Returns [`IntegrationError`] when the integration reports a failure.
    async fn handle(&self, vars: Value, ctx: HandleContext) -> Result<Value, IntegrationError>;
}

/// Function shape resolved once at build time.
#[derive(Clone)]
pub enum Contract {
    /// Separate pure `request` and `response` functions.
    TwoPhase {
        /// Request builder.
        request: Arc<dyn RequestBuilder>,
        /// Response parser.
        response: Arc<dyn ResponseParser>,
    },
    /// Single asynchronous `handle` function.
    Combined {
        /// Handler implementation.
        handle: Arc<dyn Handler>,
    },
}

impl Contract {
    /// Returns a stable label for the contract shape.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::TwoPhase {
                ..
            } => "request/response",
            Self::Combined {
                ..
            } => "handle",
        }
    }
}

impl fmt::Debug for Contract {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ============================================================================
// SECTION: Metadata
// ============================================================================

/// Module-level metadata (normally extracted from module docs).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleMetadata {
    /// Provider name.
    pub provider: Option<String>,
    /// Display name.
    pub name: Option<String>,
    /// Provider link.
    pub link: Option<String>,
    /// Module description.
    pub description: Option<String>,
    /// Icon reference.
    pub icon: Option<String>,
}

/// Integration-level metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrationMetadata {
    /// Display name.
    pub name: Option<String>,
    /// Tag used for grouping.
    pub tag: Option<String>,
    /// Integration type label.
    pub integration_type: Option<String>,
    /// Integration description.
    pub description: Option<String>,
}

// ============================================================================
// SECTION: Integration
// ============================================================================

/// A pluggable unit under test.
#[derive(Debug, Clone)]
pub struct Integration {
    /// Integration name (unique within the module).
    name: String,
    /// Declared request variables.
    request_variables: Vec<VariableDescriptor>,
    /// Declared response variables.
    response_variables: Vec<VariableDescriptor>,
    /// Credential variable names read from the environment.
    env_variables: Vec<String>,
    /// Optional validate function.
    validate: Option<ValidatorRef>,
    /// Resolved function shape.
    contract: Contract,
    /// Optional integration metadata.
    metadata: Option<IntegrationMetadata>,
}

/// Shared validator reference with a debug impl.
#[derive(Clone)]
struct ValidatorRef(Arc<dyn Validator>);

impl fmt::Debug for ValidatorRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("validate")
    }
}

impl Integration {
    /// Starts building an integration.
    #[must_use]
    pub fn builder(name: impl Into<String>) -> IntegrationBuilder {
        IntegrationBuilder::new(name)
    }

    /// Returns the integration name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the declared request variables.
    #[must_use]
    pub fn request_variables(&self) -> &[VariableDescriptor] {
        &self.request_variables
    }

    /// Returns the declared response variables.
    #[must_use]
    pub fn response_variables(&self) -> &[VariableDescriptor] {
        &self.response_variables
    }

    /// Returns the credential variable names.
    #[must_use]
    pub fn env_variables(&self) -> &[String] {
        &self.env_variables
    }

    /// Returns the validate function, if declared.
    #[must_use]
    pub fn validator(&self) -> Option<&dyn Validator> {
        self.validate.as_ref().map(|validator| validator.0.as_ref())
    }

    /// Returns the resolved function shape.
    #[must_use]
    pub const fn contract(&self) -> &Contract {
        &self.contract
    }

    /// Returns the integration metadata, if declared.
    #[must_use]
    pub const fn metadata(&self) -> Option<&IntegrationMetadata> {
        self.metadata.as_ref()
    }
}

/// Builder enforcing the one-contract invariant.
pub struct IntegrationBuilder {
    /// Integration name.
    name: String,
    /// Declared request variables.
    request_variables: Vec<VariableDescriptor>,
    /// Declared response variables.
    response_variables: Vec<VariableDescriptor>,
    /// Credential variable names.
    env_variables: Vec<String>,
    /// Optional validate function.
    validate: Option<Arc<dyn Validator>>,
    /// Optional request builder.
    request: Option<Arc<dyn RequestBuilder>>,
    /// Optional response parser.
    response: Option<Arc<dyn ResponseParser>>,
    /// Optional handler.
    handle: Option<Arc<dyn Handler>>,
    /// Optional metadata.
    metadata: Option<IntegrationMetadata>,
}

impl IntegrationBuilder {
    /// Creates an empty builder for `name`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            request_variables: Vec::new(),
            response_variables: Vec::new(),
            env_variables: Vec::new(),
            validate: None,
            request: None,
            response: None,
            handle: None,
            metadata: None,
        }
    }

    /// Declares request variables.
    #[must_use]
    pub fn request_variables(mut self, variables: Vec<VariableDescriptor>) -> Self {
        self.request_variables = variables;
        self
    }

    /// Declares response variables.
    #[must_use]
    pub fn response_variables(mut self, variables: Vec<VariableDescriptor>) -> Self {
        self.response_variables = variables;
        self
    }

    /// Declares credential variable names.
    #[must_use]
    pub fn env_variables<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.env_variables = names.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the validate function.
    #[must_use]
    pub fn validate(mut self, validator: impl Validator + 'static) -> Self {
        self.validate = Some(Arc::new(validator));
        self
    }

    /// Sets the two-phase request builder.
    #[must_use]
    pub fn request(mut self, request: impl RequestBuilder + 'static) -> Self {
        self.request = Some(Arc::new(request));
        self
    }

    /// Sets the two-phase response parser.
    #[must_use]
    pub fn response(mut self, response: impl ResponseParser + 'static) -> Self {
        self.response = Some(Arc::new(response));
        self
    }

    /// Sets the combined handler.
    #[must_use]
    pub fn handle(mut self, handle: impl Handler + 'static) -> Self {
        self.handle = Some(Arc::new(handle));
        self
    }

    /// Sets integration metadata.
    #[must_use]
    pub fn metadata(mut self, metadata: IntegrationMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Resolves the contract shape and builds the integration.
    ///
    /// # Errors
    ///
    /// Returns [`ModuleError`] unless exactly one of (`request` and `response`)
    /// or `handle` is present.
    pub fn build(self) -> Result<Integration, ModuleError> {
        let contract = match (self.request, self.response, self.handle) {
            (Some(request), Some(response), None) => Contract::TwoPhase {
                request,
                response,
            },
            (None, None, Some(handle)) => Contract::Combined {
                handle,
            },
            (None, None, None) => return Err(ModuleError::MissingContract(self.name)),
            (Some(_), None, None) | (None, Some(_), None) => {
                return Err(ModuleError::IncompleteTwoPhase(self.name));
            }
            _ => return Err(ModuleError::ConflictingContract(self.name)),
        };
        Ok(Integration {
            name: self.name,
            request_variables: self.request_variables,
            response_variables: self.response_variables,
            env_variables: self.env_variables,
            validate: self.validate.map(ValidatorRef),
            contract,
            metadata: self.metadata,
        })
    }
}

// ============================================================================
// SECTION: Integration Module
// ============================================================================

/// A collection of integrations shipped together.
#[derive(Debug, Clone)]
pub struct IntegrationModule {
    /// Module name.
    name: String,
    /// Optional module metadata.
    metadata: Option<ModuleMetadata>,
    /// Integrations keyed by name.
    integrations: BTreeMap<String, Integration>,
}

impl IntegrationModule {
    /// Creates an empty module.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            metadata: None,
            integrations: BTreeMap::new(),
        }
    }

    /// Sets module metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: ModuleMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Registers an integration.
    ///
    /// # Errors
    ///
    /// Returns [`ModuleError::DuplicateIntegration`] when the name is taken.
    pub fn register(&mut self, integration: Integration) -> Result<(), ModuleError> {
        if self.integrations.contains_key(integration.name()) {
            return Err(ModuleError::DuplicateIntegration(integration.name().to_string()));
        }
        self.integrations.insert(integration.name().to_string(), integration);
        Ok(())
    }

    /// Builder-style variant of [`Self::register`].
    ///
    /// # Errors
    ///
    /// Returns [`ModuleError::DuplicateIntegration`] when the name is taken.
    pub fn with_integration(mut self, integration: Integration) -> Result<Self, ModuleError> {
        self.register(integration)?;
        Ok(self)
    }

    /// Returns the module name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns module metadata, if declared.
    #[must_use]
    pub const fn metadata(&self) -> Option<&ModuleMetadata> {
        self.metadata.as_ref()
    }

    /// Looks up an integration by name.
    #[must_use]
    pub fn integration(&self, name: &str) -> Option<&Integration> {
        self.integrations.get(name)
    }

    /// Iterates over integrations in name order.
    pub fn integrations(&self) -> impl Iterator<Item = &Integration> {
        self.integrations.values()
    }

    /// Checks the module-level shape.
    ///
    /// # Errors
    ///
    /// Returns [`ModuleError::NoIntegrations`] when the module is empty.
    pub fn check_shape(&self) -> Result<(), ModuleError> {
        if self.integrations.is_empty() {
            return Err(ModuleError::NoIntegrations(self.name.clone()));
        }
        Ok(())
    }
}

/// Module-shape errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModuleError {
    /// The module declares no integrations.
    #[error("no outbound integrations found in module '{0}'")]
    NoIntegrations(String),
    /// Neither request/response nor handle was supplied.
    #[error("integration '{0}' must declare request()/response() or handle()")]
    MissingContract(String),
    /// Only one half of the two-phase contract was supplied.
    #[error("integration '{0}' must declare both request() and response()")]
    IncompleteTwoPhase(String),
    /// Both contract shapes were supplied.
    #[error("integration '{0}' declares both request()/response() and handle()")]
    ConflictingContract(String),
    /// The integration name is already registered.
    #[error("integration '{0}' is already registered")]
    DuplicateIntegration(String),
}
