// crates/outbound-harness-core/src/runner.rs
// ============================================================================
// Module: Batch Runner
// Description: Fixture-driven test suite for every integration in a module.
// Purpose: Produce a pass/fail report whose failure count is the exit code.
// Dependencies: serde, serde_json, tracing
// ============================================================================

//! ## Overview
//! [`BatchRunner::run`] walks a module the way a contract test suite would:
//! module shape and metadata first, then per integration the basics, the
//! validate function, variable descriptors, and every declared or
//! synthesized fixture. Invocations run one at a time.
//! Invariants:
//! - A module-shape error is reported once and skips every other case.
//! - A fixture file that fails to parse fails one case and skips that
//!   integration's fixture cases.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::PathBuf;

use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use tracing::debug;
use tracing::info;
use tracing::instrument;
use tracing::warn;

use crate::catalog::TypeCatalog;
use crate::catalog::valid_type_names;
use crate::descriptor::DescriptorRole;
use crate::descriptor::validate_descriptors;
use crate::expectation::UnmetPolicy;
use crate::expectation::Verdict;
use crate::expectation::judge;
use crate::fixture::Fixture;
use crate::fixture::FixtureSet;
use crate::fixture::FixtureStore;
use crate::fixture::FunctionCategory;
use crate::interception::InterceptionOptions;
use crate::invocation::Call;
use crate::invocation::InvocationResult;
use crate::invocation::Outcome;
use crate::invocation::invoke;
use crate::invocation::invoke_validate;
use crate::model::Contract;
use crate::model::Environment;
use crate::model::Integration;
use crate::model::IntegrationModule;
use crate::model::RequestSpec;
use crate::model::VariableDescriptor;
use crate::vars::merge;
use crate::vars::parse_vars;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default placeholder value for injected credentials.
pub const DEFAULT_DUMMY_ENV_VALUE: &str = "dummy.value";

/// Default message `validate` must raise when credentials are missing.
pub const DEFAULT_MISSING_CREDENTIALS_MESSAGE: &str =
    "Missing credentials, contact ActiveProspect Support";

/// Default fixture directory.
pub const DEFAULT_FIXTURES_DIR: &str = "harness";

// ============================================================================
// SECTION: Options
// ============================================================================

/// Batch runner options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerOptions {
    /// Directory holding fixture files.
    pub fixtures_dir: PathBuf,
    /// Synthesize fixtures for absent categories.
    pub generate_fixtures: bool,
    /// Placeholder value for injected credentials.
    pub dummy_env_value: String,
    /// Message `validate` must raise without credentials.
    pub missing_credentials_message: String,
    /// Unmet network expectation policy.
    pub unmet_policy: UnmetPolicy,
    /// `handle` invocation options.
    pub interception: InterceptionOptions,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self {
            fixtures_dir: PathBuf::from(DEFAULT_FIXTURES_DIR),
            generate_fixtures: true,
            dummy_env_value: DEFAULT_DUMMY_ENV_VALUE.to_string(),
            missing_credentials_message: DEFAULT_MISSING_CREDENTIALS_MESSAGE.to_string(),
            unmet_policy: UnmetPolicy::default(),
            interception: InterceptionOptions::default(),
        }
    }
}

// ============================================================================
// SECTION: Reports
// ============================================================================

/// Status of one case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
    /// Assertion held.
    Passed,
    /// Assertion failed.
    Failed,
    /// Case did not run.
    Skipped,
}

/// One reported case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaseReport {
    /// Group path, e.g. `outbound / Validate function`.
    pub suite: String,
    /// Case name.
    pub name: String,
    /// Case status.
    pub status: CaseStatus,
    /// Failure or skip details.
    pub detail: Vec<String>,
}

/// Result of a full run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SuiteReport {
    /// Module name.
    pub module: String,
    /// Cases in execution order.
    pub cases: Vec<CaseReport>,
}

impl SuiteReport {
    /// Counts passed cases.
    #[must_use]
    pub fn passed(&self) -> usize {
        self.count(CaseStatus::Passed)
    }

    /// Counts failed cases.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.count(CaseStatus::Failed)
    }

    /// Counts skipped cases.
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.count(CaseStatus::Skipped)
    }

    /// Process exit code: the failure count, capped at 255.
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        u8::try_from(self.failed()).unwrap_or(u8::MAX)
    }

    /// Returns the failed cases.
    pub fn failures(&self) -> impl Iterator<Item = &CaseReport> {
        self.cases.iter().filter(|case| case.status == CaseStatus::Failed)
    }

    /// Counts cases with a status.
    fn count(&self, status: CaseStatus) -> usize {
        self.cases.iter().filter(|case| case.status == status).count()
    }
}

/// Case collector for one suite group.
struct Recorder<'r> {
    /// Report being built.
    report: &'r mut SuiteReport,
    /// Current group path.
    suite: String,
}

impl Recorder<'_> {
    /// Records a case.
    fn record(&mut self, name: impl Into<String>, status: CaseStatus, detail: Vec<String>) {
        let name = name.into();
        match status {
            CaseStatus::Passed => debug!(suite = %self.suite, case = %name, "case passed"),
            CaseStatus::Failed => warn!(suite = %self.suite, case = %name, ?detail, "case failed"),
            CaseStatus::Skipped => debug!(suite = %self.suite, case = %name, "case skipped"),
        }
        self.report.cases.push(CaseReport {
            suite: self.suite.clone(),
            name,
            status,
            detail,
        });
    }

    /// Records a boolean assertion.
    fn check(&mut self, name: impl Into<String>, ok: bool, failure: impl FnOnce() -> Vec<String>) {
        if ok {
            self.record(name, CaseStatus::Passed, Vec::new());
        } else {
            self.record(name, CaseStatus::Failed, failure());
        }
    }

    /// Records a verdict.
    fn verdict(&mut self, name: impl Into<String>, verdict: Verdict) {
        let mut detail = verdict.diff;
        if !verdict.nocks_unmet.is_empty() {
            detail.push(format!("unmet: {}", verdict.nocks_unmet.join(", ")));
        }
        let status = if verdict.passed { CaseStatus::Passed } else { CaseStatus::Failed };
        self.record(name, status, if verdict.passed { Vec::new() } else { detail });
    }
}

// ============================================================================
// SECTION: Runner
// ============================================================================

/// Runs the contract suite for a module.
pub struct BatchRunner<'a> {
    /// Module under test.
    module: &'a IntegrationModule,
    /// Type catalog.
    catalog: &'a dyn TypeCatalog,
    /// Runner options.
    options: RunnerOptions,
}

impl<'a> BatchRunner<'a> {
    /// Creates a runner.
    #[must_use]
    pub fn new(module: &'a IntegrationModule, catalog: &'a dyn TypeCatalog, options: RunnerOptions) -> Self {
        Self {
            module,
            catalog,
            options,
        }
    }

    /// Runs every case and returns the report.
    #[instrument(skip_all, fields(module = self.module.name()))]
    pub async fn run(&self) -> SuiteReport {
        let mut report = SuiteReport {
            module: self.module.name().to_string(),
            cases: Vec::new(),
        };
        if !self.harness_initialization(&mut report) {
            return report;
        }
        let store = FixtureStore::new(&self.options.fixtures_dir);
        for integration in self.module.integrations() {
            self.run_integration(integration, &store, &mut report).await;
        }
        info!(
            passed = report.passed(),
            failed = report.failed(),
            skipped = report.skipped(),
            "suite finished"
        );
        report
    }

    /// Module-level cases. Returns false when the module shape is unusable.
    fn harness_initialization(&self, report: &mut SuiteReport) -> bool {
        let mut group = Recorder {
            report,
            suite: "Harness initialization".to_string(),
        };
        if let Err(err) = self.module.check_shape() {
            group.record("should be able to load", CaseStatus::Failed, vec![err.to_string()]);
            return false;
        }
        group.record("should be able to load", CaseStatus::Passed, Vec::new());
        let missing = match self.module.metadata() {
            None => vec!["missing module metadata".to_string()],
            Some(metadata) => [
                ("provider", &metadata.provider),
                ("name", &metadata.name),
                ("link", &metadata.link),
                ("description", &metadata.description),
                ("icon", &metadata.icon),
            ]
            .into_iter()
            .filter(|(_, value)| value.is_none())
            .map(|(field, _)| format!("missing module {field}"))
            .collect(),
        };
        let ok = missing.is_empty();
        group.check("should have module metadata", ok, || missing);
        true
    }

    /// Runs every case for one integration.
    #[instrument(skip_all, fields(integration = integration.name()))]
    async fn run_integration(&self, integration: &Integration, store: &FixtureStore, report: &mut SuiteReport) {
        let name = integration.name();
        self.module_basics(integration, report);

        let fixtures = {
            let mut group = Recorder {
                report: &mut *report,
                suite: format!("{name} / Fixtures"),
            };
            match store.load_for(integration, self.catalog, self.options.generate_fixtures) {
                Ok(set) => {
                    group.record("should load fixtures", CaseStatus::Passed, Vec::new());
                    Some(set)
                }
                Err(err) => {
                    group.record("should load fixtures", CaseStatus::Failed, vec![err.to_string()]);
                    None
                }
            }
        };

        self.validate_function(integration, fixtures.as_ref(), report);
        self.descriptor_cases(name, "Request variables", DescriptorRole::Request, integration.request_variables(), report);
        self.descriptor_cases(
            name,
            "Response variables",
            DescriptorRole::Response,
            integration.response_variables(),
            report,
        );

        let Some(fixtures) = fixtures else {
            let mut group = Recorder {
                report,
                suite: format!("{name} / Fixtures"),
            };
            group.record("fixture cases", CaseStatus::Skipped, vec!["fixture file failed to load".to_string()]);
            return;
        };
        match integration.contract() {
            Contract::TwoPhase {
                ..
            } => {
                self.request_function(integration, &fixtures, report).await;
                self.response_function(integration, &fixtures, report).await;
            }
            Contract::Combined {
                ..
            } => self.handle_function(integration, &fixtures, report).await,
        }
    }

    /// "Module basics" cases.
    fn module_basics(&self, integration: &Integration, report: &mut SuiteReport) {
        let mut group = Recorder {
            report,
            suite: format!("{} / Module basics", integration.name()),
        };
        group.check("should have a validate function", integration.validator().is_some(), || {
            vec!["validate is not declared".to_string()]
        });
        group.record("should have request()/response() or handle()", CaseStatus::Passed, Vec::new());
        let missing = match integration.metadata() {
            None => vec![format!("missing integration metadata for '{}'", integration.name())],
            Some(metadata) => [
                ("name", &metadata.name),
                ("tag", &metadata.tag),
                ("integration_type", &metadata.integration_type),
                ("description", &metadata.description),
            ]
            .into_iter()
            .filter(|(_, value)| value.is_none())
            .map(|(field, _)| format!("missing integration {field}"))
            .collect(),
        };
        let ok = missing.is_empty();
        group.check("should have integration metadata", ok, || missing);
    }

    /// "Validate function" cases.
    fn validate_function(&self, integration: &Integration, fixtures: Option<&FixtureSet>, report: &mut SuiteReport) {
        let mut group = Recorder {
            report,
            suite: format!("{} / Validate function", integration.name()),
        };
        if integration.validator().is_none() {
            group.record("validate cases", CaseStatus::Skipped, vec!["no validate function".to_string()]);
            return;
        }
        let dummy = self.dummy_env(integration);
        let bare_lead = Value::Object(Map::from_iter([("lead".to_string(), Value::Object(Map::new()))]));

        if !integration.env_variables().is_empty() {
            let result = invoke_validate(integration, &bare_lead, &Environment::new());
            let expected = &self.options.missing_credentials_message;
            let ok = matches!(&result.map(|result| result.outcome), Ok(Outcome::Error(message)) if message == expected);
            group.check("should throw if it has undefined envVariables", ok, || {
                vec![format!("expected validate to raise '{expected}'")]
            });
        }

        let result = invoke_validate(integration, &bare_lead, &dummy);
        let ok = matches!(
            result.as_ref().map(|result| &result.outcome),
            Ok(Outcome::Value(Value::String(message))) if !message.is_empty()
        );
        group.check("should return a string", ok, || {
            let returned = match result {
                Ok(result) => result.actual().map_or_else(|| "nothing".to_string(), |value| value.to_string()),
                Err(err) => err.to_string(),
            };
            vec![format!("validate({{lead: {{}}}}) returned {returned}")]
        });

        let Some(fixtures) = fixtures else {
            return;
        };
        for (index, fixture) in fixtures.get(FunctionCategory::Validate).iter().enumerate() {
            let vars = self.fixture_vars(integration, fixture, None);
            let name = case_name("should correctly handle test fixtures", index, fixture);
            match invoke_validate(integration, &vars, &dummy) {
                Ok(result) => group.verdict(name, self.judge(FunctionCategory::Validate, &result, fixture)),
                Err(err) => group.record(name, CaseStatus::Failed, vec![err.to_string()]),
            }
        }
    }

    /// "Request variables" / "Response variables" cases.
    fn descriptor_cases(
        &self,
        integration: &str,
        title: &str,
        role: DescriptorRole,
        descriptors: &[VariableDescriptor],
        report: &mut SuiteReport,
    ) {
        let mut group = Recorder {
            report,
            suite: format!("{integration} / {title}"),
        };
        group.check("should be declared", !descriptors.is_empty(), || vec!["no variables declared".to_string()]);
        let violations = validate_descriptors(role, descriptors, &valid_type_names(self.catalog));
        if violations.is_empty() {
            group.record("should have valid descriptors", CaseStatus::Passed, Vec::new());
        }
        for violation in violations {
            let name = format!("should have valid values for '{}'", violation.name);
            group.record(name, CaseStatus::Failed, vec![violation.to_string()]);
        }
    }

    /// "Request function" cases.
    async fn request_function(&self, integration: &Integration, fixtures: &FixtureSet, report: &mut SuiteReport) {
        let mut group = Recorder {
            report,
            suite: format!("{} / Request function", integration.name()),
        };
        for (index, fixture) in fixtures.get(FunctionCategory::Request).iter().enumerate() {
            let vars = self.fixture_vars(integration, fixture, fixtures.extra_vars());
            let call = Call::new(vars, self.dummy_env(integration));
            let name = case_name("should correctly handle request fixtures", index, fixture);
            let result = invoke(integration, FunctionCategory::Request, call, &self.options.interception).await;
            self.record_result(&mut group, name, FunctionCategory::Request, result, fixture);
        }
    }

    /// "Response function" cases: `response({}, {}, res)`.
    async fn response_function(&self, integration: &Integration, fixtures: &FixtureSet, report: &mut SuiteReport) {
        let mut group = Recorder {
            report,
            suite: format!("{} / Response function", integration.name()),
        };
        for (index, fixture) in fixtures.get(FunctionCategory::Response).iter().enumerate() {
            let name = case_name("should correctly handle response fixtures", index, fixture);
            let Some(res) = fixture.res.clone() else {
                group.record(name, CaseStatus::Failed, vec!["response fixture declares no res".to_string()]);
                continue;
            };
            let call = Call {
                vars: Value::Object(Map::new()),
                request: RequestSpec::default(),
                res: Some(res),
                ..Call::default()
            };
            let result = invoke(integration, FunctionCategory::Response, call, &self.options.interception).await;
            self.record_result(&mut group, name, FunctionCategory::Response, result, fixture);
        }
    }

    /// "Handle function" cases, one per fixture.
    async fn handle_function(&self, integration: &Integration, fixtures: &FixtureSet, report: &mut SuiteReport) {
        let mut group = Recorder {
            report,
            suite: format!("{} / Handle function", integration.name()),
        };
        for (index, fixture) in fixtures.get(FunctionCategory::Handle).iter().enumerate() {
            let vars = self.fixture_vars(integration, fixture, fixtures.extra_vars());
            let call = Call {
                network: fixture.nock_options.clone(),
                ..Call::new(vars, self.dummy_env(integration))
            };
            let name = if fixture.should.is_some() { fixture.label() } else { format!("fixture {index}") };
            let result = invoke(integration, FunctionCategory::Handle, call, &self.options.interception).await;
            self.record_result(&mut group, name, FunctionCategory::Handle, result, fixture);
        }
    }

    /// Records an invocation outcome as a verdict case.
    fn record_result(
        &self,
        group: &mut Recorder<'_>,
        name: String,
        category: FunctionCategory,
        result: Result<InvocationResult, crate::invocation::InvocationError>,
        fixture: &Fixture,
    ) {
        match result {
            Ok(result) => group.verdict(name, self.judge(category, &result, fixture)),
            Err(err) => group.record(name, CaseStatus::Failed, vec![err.to_string()]),
        }
    }

    /// Judges a result under the configured policy.
    fn judge(&self, category: FunctionCategory, result: &InvocationResult, fixture: &Fixture) -> Verdict {
        judge(category, result, fixture.expected.as_ref(), self.options.unmet_policy)
    }

    /// Builds typed invocation vars: fixture vars, merged extras, parsed, `lead` ensured.
    fn fixture_vars(&self, integration: &Integration, fixture: &Fixture, extra: Option<&Value>) -> Value {
        let mut vars = fixture.vars.clone().unwrap_or_else(|| Value::Object(Map::new()));
        if let Some(extra) = extra {
            merge(&mut vars, extra);
        }
        parse_vars(self.catalog, integration.request_variables(), vars)
    }

    /// Builds the dummy credential environment.
    fn dummy_env(&self, integration: &Integration) -> Environment {
        Environment::dummy(integration.env_variables(), &self.options.dummy_env_value)
    }
}

/// Names a fixture case, appending the index and `should` text.
fn case_name(base: &str, index: usize, fixture: &Fixture) -> String {
    let generated = if fixture.generated { " (generated)" } else { "" };
    match &fixture.should {
        Some(_) => format!("{base} [{index}]{generated}: {}", fixture.label()),
        None => format!("{base} [{index}]{generated}"),
    }
}
