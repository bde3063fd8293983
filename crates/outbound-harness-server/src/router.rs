// crates/outbound-harness-server/src/router.rs
// ============================================================================
// Module: Replay Router
// Description: Maps replay routes to invocations and render contexts.
// Purpose: Re-run any fixture, or live-submitted values, through the engine.
// Dependencies: outbound-harness-core, serde, serde_json, tokio, tracing
// ============================================================================

//! ## Overview
//! Every request derives its state from `{category, integration, fixture?}`:
//! a GET shows a fixture (or an empty or templated form), a POST invokes the
//! integration with the submitted form fields and, when a fixture is named,
//! judges the result against its `expected`. Fixture files are read fresh on
//! every request and never synthesized here. Invocations are serialized
//! through one lock so that only one runs at a time.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;

use outbound_harness_core::Call;
use outbound_harness_core::Contract;
use outbound_harness_core::Environment;
use outbound_harness_core::Fixture;
use outbound_harness_core::FixtureSet;
use outbound_harness_core::FixtureStore;
use outbound_harness_core::FunctionCategory;
use outbound_harness_core::Integration;
use outbound_harness_core::IntegrationModule;
use outbound_harness_core::InvocationError;
use outbound_harness_core::InvocationResult;
use outbound_harness_core::NetworkExpectation;
use outbound_harness_core::RawResponse;
use outbound_harness_core::RequestSpec;
use outbound_harness_core::RunnerOptions;
use outbound_harness_core::TypeCatalog;
use outbound_harness_core::invoke;
use outbound_harness_core::judge;
use outbound_harness_core::vars::flatten;
use outbound_harness_core::vars::merge;
use outbound_harness_core::vars::parse_vars;
use outbound_harness_core::vars::path_segments;
use outbound_harness_core::vars::unflatten;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;
use tracing::info;
use tracing::instrument;
use tracing::warn;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Body of the response form template.
pub const RESPONSE_TEMPLATE_BODY: &str = "{  \"sample\": true }";

/// Form field holding caller-supplied network expectations as JSON.
pub const NOCK_OPTIONS_FIELD: &str = "nockOptions";

/// Form-field root for credential values.
const ENV_FIELD: &str = "env";

// ============================================================================
// SECTION: Routes
// ============================================================================

/// A parsed `/{category}/{integration}[/{fixture}]` route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteTarget {
    /// Function category.
    pub category: FunctionCategory,
    /// Integration name.
    pub integration: String,
    /// Fixture index, when addressed.
    pub fixture: Option<usize>,
}

impl RouteTarget {
    /// Parses route segments; returns `None` for anything unroutable.
    #[must_use]
    pub fn from_segments(category: &str, integration: &str, fixture: Option<&str>) -> Option<Self> {
        let category = FunctionCategory::from_str(category).ok()?;
        if integration.is_empty() {
            return None;
        }
        let fixture = match fixture {
            Some(text) => Some(text.parse::<usize>().ok()?),
            None => None,
        };
        Some(Self {
            category,
            integration: integration.to_string(),
            fixture,
        })
    }

    /// Parses a request path.
    #[must_use]
    pub fn parse(path: &str) -> Option<Self> {
        let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
        match segments.as_slice() {
            [category, integration] => Self::from_segments(category, integration, None),
            [category, integration, fixture] => Self::from_segments(category, integration, Some(fixture)),
            _ => None,
        }
    }
}

// ============================================================================
// SECTION: Render Context
// ============================================================================

/// Summary of one integration for the index page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IntegrationSummary {
    /// Integration name.
    pub name: String,
    /// Display name from metadata.
    pub title: Option<String>,
    /// Contract label.
    pub contract: &'static str,
    /// Categories with routes.
    pub categories: Vec<FunctionCategory>,
}

/// One entry of a category's fixture list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FixtureLink {
    /// Positional index.
    pub index: usize,
    /// `should` label, possibly empty.
    pub label: String,
}

/// Outcome of a POST.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReplayOutcome {
    /// Actual value (`None` when validate returned nothing).
    pub actual: Option<Value>,
    /// Fixture expectation for display.
    pub expected: Option<Value>,
    /// Verdict, only when a fixture was addressed.
    pub matched: Option<bool>,
    /// Mismatch lines.
    pub diff: Vec<String>,
    /// Unmet network expectation keys.
    pub nocks_unmet: Vec<String>,
}

/// Everything a page renderer needs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderContext {
    /// Module name.
    pub module: String,
    /// Integrations in the module.
    pub integrations: Vec<IntegrationSummary>,
    /// Selected integration.
    pub integration: Option<String>,
    /// Selected category.
    pub category: Option<FunctionCategory>,
    /// Selected fixture index.
    pub fixture_id: Option<usize>,
    /// Fixtures of the selected category.
    pub fixtures: Vec<FixtureLink>,
    /// Credential names declared by the integration.
    pub env_variables: Vec<String>,
    /// Form values, flattened.
    pub values: BTreeMap<String, String>,
    /// Flattened `extra_vars`.
    pub extra_vars: BTreeMap<String, String>,
    /// Network expectations in play.
    pub network: Vec<NetworkExpectation>,
    /// Invocation outcome for POSTs.
    pub result: Option<ReplayOutcome>,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Replay routing errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReplayError {
    /// Unknown integration, category, or fixture.
    #[error("not found: {0}")]
    NotFound(String),
    /// The fixture resource failed to load.
    #[error("fixture error: {0}")]
    Fixture(String),
    /// A submitted form field could not be used.
    #[error("invalid form: {0}")]
    InvalidForm(String),
}

// ============================================================================
// SECTION: Router
// ============================================================================

/// Replay router over one module.
pub struct ReplayRouter {
    /// Module under test.
    module: Arc<IntegrationModule>,
    /// Type catalog.
    catalog: Arc<dyn TypeCatalog>,
    /// Fixture store, read fresh per request.
    store: FixtureStore,
    /// Dummy credential value, unmet policy, and handle timeout.
    options: RunnerOptions,
    /// Serializes invocations.
    in_flight: Mutex<()>,
}

impl ReplayRouter {
    /// Creates a router.
    #[must_use]
    pub fn new(module: Arc<IntegrationModule>, catalog: Arc<dyn TypeCatalog>, options: RunnerOptions) -> Self {
        Self {
            store: FixtureStore::new(&options.fixtures_dir),
            module,
            catalog,
            options,
            in_flight: Mutex::new(()),
        }
    }

    /// Returns the module name.
    #[must_use]
    pub fn module_name(&self) -> &str {
        self.module.name()
    }

    /// Builds the index page context.
    #[must_use]
    pub fn summary(&self) -> RenderContext {
        self.context(None, None)
    }

    /// Builds the context for a GET.
    ///
    /// # Errors
    ///
    /// Returns [`ReplayError`] for unknown targets or unreadable fixtures.
    #[instrument(skip_all, fields(category = %target.category, integration = %target.integration))]
    pub fn show(&self, target: &RouteTarget) -> Result<RenderContext, ReplayError> {
        let integration = self.resolve(target)?;
        let fixtures = self.load(integration)?;
        let mut context = self.context(Some(integration), Some(target.category));
        context.fixture_id = target.fixture;
        context.fixtures = fixture_links(&fixtures, target.category);
        context.extra_vars = fixtures.extra_vars().map(flatten).unwrap_or_default();

        match fixture_at(&fixtures, target)? {
            Some(fixture) => {
                context.values = match &fixture.res {
                    Some(res) => response_fields(res),
                    None => fixture.vars.as_ref().map(flatten).unwrap_or_default(),
                };
                for name in &fixture.env_variables {
                    context.values.insert(format!("{ENV_FIELD}.{name}"), self.options.dummy_env_value.clone());
                }
                context.network.clone_from(&fixture.nock_options);
            }
            None if target.category == FunctionCategory::Response => {
                context.values = response_fields(&RawResponse {
                    body: RESPONSE_TEMPLATE_BODY.to_string(),
                    ..RawResponse::canned_json()
                });
            }
            None => {}
        }
        Ok(context)
    }

    /// Invokes the target with submitted form fields.
    ///
    /// # Errors
    ///
    /// Returns [`ReplayError`] for unknown targets, unreadable fixtures, or
    /// unusable form fields.
    #[instrument(skip_all, fields(category = %target.category, integration = %target.integration))]
    pub async fn submit(&self, target: &RouteTarget, form: Vec<(String, String)>) -> Result<RenderContext, ReplayError> {
        let integration = self.resolve(target)?;
        let fixtures = self.load(integration)?;
        let fixture = fixture_at(&fixtures, target)?;
        let mut context = self.context(Some(integration), Some(target.category));
        context.fixture_id = target.fixture;
        context.fixtures = fixture_links(&fixtures, target.category);
        context.extra_vars = fixtures.extra_vars().map(flatten).unwrap_or_default();

        let submitted = SubmittedForm::split(form);
        let call = match target.category {
            FunctionCategory::Response => Call {
                vars: Value::Object(Map::new()),
                request: RequestSpec::default(),
                res: Some(submitted.raw_response()?),
                ..Call::default()
            },
            FunctionCategory::Validate | FunctionCategory::Request => {
                Call::new(self.typed_vars(integration, submitted.vars(), None), submitted.env.clone())
            }
            FunctionCategory::Handle => {
                let network = match fixture {
                    Some(fixture) => fixture.nock_options.clone(),
                    None => submitted.network()?,
                };
                context.network.clone_from(&network);
                Call {
                    network,
                    ..Call::new(
                        self.typed_vars(integration, submitted.vars(), fixtures.extra_vars()),
                        submitted.env.clone(),
                    )
                }
            }
        };
        context.values = submitted.echo();

        let result = {
            let _guard = self.in_flight.lock().await;
            invoke(integration, target.category, call, &self.options.interception).await
        }
        .map_err(not_found)?;
        context.result = Some(self.outcome(target.category, &result, fixture));
        Ok(context)
    }

    /// Resolves the integration and checks the category exists for it.
    fn resolve(&self, target: &RouteTarget) -> Result<&Integration, ReplayError> {
        let integration = self
            .module
            .integration(&target.integration)
            .ok_or_else(|| ReplayError::NotFound(format!("integration '{}'", target.integration)))?;
        if !categories_for(integration).contains(&target.category) {
            return Err(ReplayError::NotFound(format!(
                "{} for integration '{}'",
                target.category, target.integration
            )));
        }
        Ok(integration)
    }

    /// Reads the fixture file without synthesis.
    fn load(&self, integration: &Integration) -> Result<FixtureSet, ReplayError> {
        self.store.load(integration.name()).map_err(|err| {
            warn!(error = %err, "fixture load failed");
            ReplayError::Fixture(err.to_string())
        })
    }

    /// Base context shared by every page.
    fn context(&self, integration: Option<&Integration>, category: Option<FunctionCategory>) -> RenderContext {
        RenderContext {
            module: self.module.name().to_string(),
            integrations: self.module.integrations().map(summarize).collect(),
            integration: integration.map(|integration| integration.name().to_string()),
            category,
            fixture_id: None,
            fixtures: Vec::new(),
            env_variables: integration.map(|integration| integration.env_variables().to_vec()).unwrap_or_default(),
            values: BTreeMap::new(),
            extra_vars: BTreeMap::new(),
            network: Vec::new(),
            result: None,
        }
    }

    /// Parses submitted vars, merging `extra` when given.
    fn typed_vars(&self, integration: &Integration, vars: Value, extra: Option<&Value>) -> Value {
        let mut vars = parse_vars(self.catalog.as_ref(), integration.request_variables(), vars);
        if let Some(extra) = extra {
            merge(&mut vars, extra);
        }
        vars
    }

    /// Builds the outcome, judging it when a fixture was addressed.
    fn outcome(&self, category: FunctionCategory, result: &InvocationResult, fixture: Option<&Fixture>) -> ReplayOutcome {
        let mut outcome = ReplayOutcome {
            actual: result.actual(),
            expected: None,
            matched: None,
            diff: Vec::new(),
            nocks_unmet: result.nocks_unmet.clone(),
        };
        if let Some(fixture) = fixture {
            let verdict = judge(category, result, fixture.expected.as_ref(), self.options.unmet_policy);
            info!(passed = verdict.passed, "replayed fixture");
            outcome.expected = fixture.expected.as_ref().map(|expected| expected.to_display());
            outcome.matched = Some(verdict.passed);
            outcome.diff = verdict.diff;
        }
        outcome
    }
}

// ============================================================================
// SECTION: Form Handling
// ============================================================================

/// Submitted form fields with credentials separated out.
struct SubmittedForm {
    /// Non-credential fields in submission order.
    fields: Vec<(String, String)>,
    /// Credential fields.
    env: Environment,
    /// Raw credential fields for echoing.
    env_fields: Vec<(String, String)>,
}

impl SubmittedForm {
    /// Splits `env.*` fields from the rest; blank credentials are dropped.
    fn split(form: Vec<(String, String)>) -> Self {
        let mut fields = Vec::new();
        let mut env = Environment::new();
        let mut env_fields = Vec::new();
        for (name, value) in form {
            let segments = path_segments(&name);
            match segments.as_slice() {
                [root, key] if root == ENV_FIELD => {
                    if !value.trim().is_empty() {
                        env.insert(key.clone(), value.clone());
                    }
                    env_fields.push((name, value));
                }
                _ => fields.push((name, value)),
            }
        }
        debug!(fields = fields.len(), credentials = env_fields.len(), "split form submission");
        Self {
            fields,
            env,
            env_fields,
        }
    }

    /// Rebuilds the variable bag, excluding expectation fields.
    fn vars(&self) -> Value {
        unflatten(
            self.fields
                .iter()
                .filter(|(name, _)| name != NOCK_OPTIONS_FIELD)
                .map(|(name, value)| (name.as_str(), value.clone())),
        )
    }

    /// Builds the raw response from `status`, `header[...]`, and `body`.
    fn raw_response(&self) -> Result<RawResponse, ReplayError> {
        let mut response = RawResponse {
            headers: BTreeMap::new(),
            body: String::new(),
            ..RawResponse::canned_json()
        };
        for (name, value) in &self.fields {
            let segments = path_segments(name);
            match segments.as_slice() {
                [field] if field == "status" && !value.trim().is_empty() => {
                    response.status = value
                        .trim()
                        .parse()
                        .map_err(|_| ReplayError::InvalidForm(format!("status '{value}' is not a status code")))?;
                }
                [field] if field == "body" => response.body.clone_from(value),
                [field, header] if field == "header" || field == "headers" => {
                    if !value.trim().is_empty() {
                        response.headers.insert(header.clone(), value.clone());
                    }
                }
                _ => {}
            }
        }
        Ok(response)
    }

    /// Parses caller-supplied network expectations (one object or a list).
    fn network(&self) -> Result<Vec<NetworkExpectation>, ReplayError> {
        let Some((_, text)) = self.fields.iter().find(|(name, value)| name == NOCK_OPTIONS_FIELD && !value.trim().is_empty())
        else {
            return Ok(Vec::new());
        };
        let value: Value = serde_json::from_str(text)
            .map_err(|err| ReplayError::InvalidForm(format!("{NOCK_OPTIONS_FIELD}: {err}")))?;
        let items = match value {
            Value::Array(items) => items,
            other => vec![other],
        };
        items
            .into_iter()
            .map(|item| {
                let expectation: NetworkExpectation = serde_json::from_value(item)
                    .map_err(|err| ReplayError::InvalidForm(format!("{NOCK_OPTIONS_FIELD}: {err}")))?;
                expectation.check().map_err(|reason| ReplayError::InvalidForm(format!("{NOCK_OPTIONS_FIELD}: {reason}")))?;
                Ok(expectation)
            })
            .collect()
    }

    /// Echoes every submitted field back into the form.
    fn echo(&self) -> BTreeMap<String, String> {
        self.fields.iter().chain(&self.env_fields).cloned().collect()
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Categories routable for an integration.
fn categories_for(integration: &Integration) -> Vec<FunctionCategory> {
    let mut categories = Vec::new();
    if integration.validator().is_some() {
        categories.push(FunctionCategory::Validate);
    }
    match integration.contract() {
        Contract::TwoPhase {
            ..
        } => categories.extend([FunctionCategory::Request, FunctionCategory::Response]),
        Contract::Combined {
            ..
        } => categories.push(FunctionCategory::Handle),
    }
    categories
}

/// Summarizes an integration.
fn summarize(integration: &Integration) -> IntegrationSummary {
    IntegrationSummary {
        name: integration.name().to_string(),
        title: integration.metadata().and_then(|metadata| metadata.name.clone()),
        contract: integration.contract().label(),
        categories: categories_for(integration),
    }
}

/// Lists the fixtures of a category.
fn fixture_links(fixtures: &FixtureSet, category: FunctionCategory) -> Vec<FixtureLink> {
    fixtures
        .get(category)
        .iter()
        .enumerate()
        .map(|(index, fixture)| FixtureLink {
            index,
            label: fixture.label(),
        })
        .collect()
}

/// Looks up the addressed fixture.
fn fixture_at<'f>(fixtures: &'f FixtureSet, target: &RouteTarget) -> Result<Option<&'f Fixture>, ReplayError> {
    match target.fixture {
        None => Ok(None),
        Some(index) => fixtures.fixture(target.category, index).map(Some).ok_or_else(|| {
            ReplayError::NotFound(format!("{} fixture {index} for '{}'", target.category, target.integration))
        }),
    }
}

/// Form fields for a raw response.
fn response_fields(res: &RawResponse) -> BTreeMap<String, String> {
    let mut fields = BTreeMap::new();
    fields.insert("status".to_string(), res.status.to_string());
    for (name, value) in &res.headers {
        fields.insert(format!("header[{name}]"), value.clone());
    }
    fields.insert("body".to_string(), res.body.clone());
    fields
}

/// Maps an invocation error to a not-found replay error.
fn not_found(err: InvocationError) -> ReplayError {
    ReplayError::NotFound(err.to_string())
}

// ============================================================================
// SECTION: Tests
// ============================================================================
