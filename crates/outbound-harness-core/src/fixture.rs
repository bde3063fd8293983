// crates/outbound-harness-core/src/fixture.rs
// ============================================================================
// Module: Fixture Store
// Description: Per-integration fixture loading and placeholder synthesis.
// Purpose: Provide ordered fixtures per function category for each invocation.
// Dependencies: serde_json, serde_yaml, thiserror, tracing
// ============================================================================

//! ## Overview
//! Fixtures live in `<dir>/<integration>.yaml`, keyed by function category.
//! A missing file is an empty set; a malformed file is a [`FixtureError`].
//! Files are read on every call so edits show up without a restart.
//! [`synthesize_missing`] fills absent categories with generated
//! placeholders built from the integration's required request variables.
//! Invariants:
//! - Fixture order is preserved; fixtures are addressed by index.
//! - `handle` is never synthesized.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::Path;
use std::path::PathBuf;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Number;
use serde_json::Value;
use serde_yaml::Mapping;
use serde_yaml::Value as YamlValue;
use thiserror::Error;
use tracing::debug;
use tracing::info;
use tracing::instrument;

use crate::catalog::TypeCatalog;
use crate::catalog::first_example;
use crate::expectation::Expectation;
use crate::expectation::Pattern;
use crate::interception::NetworkExpectation;
use crate::model::Integration;
use crate::model::RawResponse;
use crate::model::VariableDescriptor;
use crate::vars::set_path;

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Maximum fixture file size in bytes.
pub const MAX_FIXTURE_FILE_BYTES: usize = 4 * 1024 * 1024;

/// Fixture file extension.
const FIXTURE_EXTENSION: &str = "yaml";

/// Top-level key holding variables merged into every invocation.
const EXTRA_VARS_KEY: &str = "extra_vars";

// ============================================================================
// SECTION: Function Categories
// ============================================================================

/// The four function categories a fixture can drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FunctionCategory {
    /// `validate(vars)`.
    Validate,
    /// `request(vars)`.
    Request,
    /// `response(vars, req, res)`.
    Response,
    /// `handle(vars, callback)`.
    Handle,
}

impl FunctionCategory {
    /// All categories in canonical order.
    pub const ALL: [Self; 4] = [Self::Validate, Self::Request, Self::Response, Self::Handle];

    /// Returns the category name used in fixture files and routes.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Validate => "validate",
            Self::Request => "request",
            Self::Response => "response",
            Self::Handle => "handle",
        }
    }
}

impl fmt::Display for FunctionCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FunctionCategory {
    type Err = FixtureError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|category| category.as_str() == value)
            .ok_or_else(|| FixtureError::UnknownCategory(value.to_string()))
    }
}

// ============================================================================
// SECTION: Fixture Records
// ============================================================================

/// One example input/output pair.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fixture {
    /// Input variable bag.
    pub vars: Option<Value>,
    /// Expected output.
    pub expected: Option<Expectation>,
    /// Simulated raw response (response fixtures).
    pub res: Option<RawResponse>,
    /// Declared outbound calls (handle fixtures).
    pub nock_options: Vec<NetworkExpectation>,
    /// Short behavior description.
    pub should: Option<String>,
    /// Credential names the interactive server pre-fills.
    pub env_variables: Vec<String>,
    /// True for synthesized placeholders.
    pub generated: bool,
}

impl Fixture {
    /// Returns the `should` text formatted for case names.
    #[must_use]
    pub fn label(&self) -> String {
        self.should.as_ref().map_or_else(String::new, |should| format!("should {should}"))
    }
}

/// Fixtures for one integration, keyed by category.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FixtureSet {
    /// Ordered fixtures per category; absent key means not declared.
    categories: BTreeMap<FunctionCategory, Vec<Fixture>>,
    /// Variables merged into every invocation.
    extra_vars: Option<Value>,
}

impl FixtureSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the fixtures for a category (empty when not declared).
    #[must_use]
    pub fn get(&self, category: FunctionCategory) -> &[Fixture] {
        self.categories.get(&category).map_or(&[], Vec::as_slice)
    }

    /// Returns one fixture by position.
    #[must_use]
    pub fn fixture(&self, category: FunctionCategory, index: usize) -> Option<&Fixture> {
        self.get(category).get(index)
    }

    /// Returns true when the category was declared (even if empty).
    #[must_use]
    pub fn contains(&self, category: FunctionCategory) -> bool {
        self.categories.contains_key(&category)
    }

    /// Replaces the fixtures of a category.
    pub fn insert(&mut self, category: FunctionCategory, fixtures: Vec<Fixture>) {
        self.categories.insert(category, fixtures);
    }

    /// Returns the shared extra variables.
    #[must_use]
    pub const fn extra_vars(&self) -> Option<&Value> {
        self.extra_vars.as_ref()
    }

    /// Sets the shared extra variables.
    pub fn set_extra_vars(&mut self, extra_vars: Option<Value>) {
        self.extra_vars = extra_vars;
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Fixture loading errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FixtureError {
    /// The fixture file exists but cannot be read.
    #[error("fixture file {path} could not be read: {reason}")]
    Read {
        /// File path.
        path: String,
        /// Underlying error text.
        reason: String,
    },
    /// The fixture file is larger than allowed.
    #[error("fixture file {path} exceeds size limit ({size} > {max} bytes)")]
    TooLarge {
        /// File path.
        path: String,
        /// Actual size.
        size: usize,
        /// Allowed size.
        max: usize,
    },
    /// The fixture file is not valid YAML.
    #[error("fixture file {path} is not valid YAML: {reason}")]
    Parse {
        /// File path.
        path: String,
        /// Parser error text.
        reason: String,
    },
    /// The YAML is valid but its structure is not a fixture set.
    #[error("fixture file {path} is malformed: {reason}")]
    Malformed {
        /// File path.
        path: String,
        /// Structural problem.
        reason: String,
    },
    /// A category name is not one of the four function categories.
    #[error("unknown function category: {0}")]
    UnknownCategory(String),
}

// ============================================================================
// SECTION: Fixture Store
// ============================================================================

/// Reads fixture files from a directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixtureStore {
    /// Directory holding `<integration>.yaml` files.
    dir: PathBuf,
}

impl FixtureStore {
    /// Creates a store rooted at `dir`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
        }
    }

    /// Returns the fixture directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the fixture file path for an integration.
    #[must_use]
    pub fn path_for(&self, integration: &str) -> PathBuf {
        self.dir.join(format!("{integration}.{FIXTURE_EXTENSION}"))
    }

    /// Loads the declared fixtures for an integration.
    ///
    /// # Errors
    ///
    /// Returns [`FixtureError`] when the file exists but is unreadable or malformed.
    #[instrument(skip(self), fields(dir = %self.dir.display()))]
    pub fn load(&self, integration: &str) -> Result<FixtureSet, FixtureError> {
        let path = self.path_for(integration);
        let shown = path.display().to_string();
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!(path = %shown, "no fixture file, using empty set");
                return Ok(FixtureSet::new());
            }
            Err(err) => {
                return Err(FixtureError::Read {
                    path: shown,
                    reason: err.to_string(),
                });
            }
        };
        if bytes.len() > MAX_FIXTURE_FILE_BYTES {
            return Err(FixtureError::TooLarge {
                path: shown,
                size: bytes.len(),
                max: MAX_FIXTURE_FILE_BYTES,
            });
        }
        let text = String::from_utf8(bytes).map_err(|err| FixtureError::Read {
            path: shown.clone(),
            reason: err.to_string(),
        })?;
        let set = parse_fixture_set(&text).map_err(|err| err.at(&shown))?;
        info!(
            path = %shown,
            categories = set.categories.len(),
            "loaded fixtures"
        );
        Ok(set)
    }

    /// Loads fixtures and, when `generate` is set, synthesizes absent categories.
    ///
    /// # Errors
    ///
    /// Returns [`FixtureError`] when the file exists but is unreadable or malformed.
    pub fn load_for(
        &self,
        integration: &Integration,
        catalog: &dyn TypeCatalog,
        generate: bool,
    ) -> Result<FixtureSet, FixtureError> {
        let mut set = self.load(integration.name())?;
        if generate {
            synthesize_missing(&mut set, integration, catalog);
        }
        Ok(set)
    }
}

// ============================================================================
// SECTION: Parsing
// ============================================================================

/// Parse failure before the file path is known.
enum ParseFailure {
    /// YAML syntax error.
    Syntax(String),
    /// Structural error.
    Shape(String),
}

impl ParseFailure {
    /// Attaches the file path.
    fn at(self, path: &str) -> FixtureError {
        match self {
            Self::Syntax(reason) => FixtureError::Parse {
                path: path.to_string(),
                reason,
            },
            Self::Shape(reason) => FixtureError::Malformed {
                path: path.to_string(),
                reason,
            },
        }
    }
}

/// Parses fixture YAML text into a set.
fn parse_fixture_set(text: &str) -> Result<FixtureSet, ParseFailure> {
    let root: YamlValue =
        serde_yaml::from_str(text).map_err(|err| ParseFailure::Syntax(err.to_string()))?;
    let mut set = FixtureSet::new();
    let mapping = match root {
        YamlValue::Null => return Ok(set),
        YamlValue::Mapping(mapping) => mapping,
        _ => return Err(ParseFailure::Shape("top level must be a mapping".to_string())),
    };
    for (key, value) in &mapping {
        let Some(key) = key.as_str() else {
            return Err(ParseFailure::Shape("top-level keys must be strings".to_string()));
        };
        if key == EXTRA_VARS_KEY {
            let extra = yaml_to_json(value).map_err(ParseFailure::Shape)?;
            set.set_extra_vars((!extra.is_null()).then_some(extra));
            continue;
        }
        let Ok(category) = key.parse::<FunctionCategory>() else {
            debug!(key, "ignoring unknown fixture key");
            continue;
        };
        let fixtures = match value {
            YamlValue::Null => Vec::new(),
            YamlValue::Sequence(items) => items
                .iter()
                .enumerate()
                .map(|(index, item)| {
                    parse_fixture(category, item)
                        .map_err(|reason| ParseFailure::Shape(format!("{category}[{index}]: {reason}")))
                })
                .collect::<Result<Vec<_>, _>>()?,
            _ => return Err(ParseFailure::Shape(format!("{category} must be a list"))),
        };
        set.insert(category, fixtures);
    }
    Ok(set)
}

/// Parses one fixture mapping.
///
/// A null `expected` on a `validate` fixture means "no message".
fn parse_fixture(category: FunctionCategory, item: &YamlValue) -> Result<Fixture, String> {
    let YamlValue::Mapping(mapping) = item else {
        return Err("fixture must be a mapping".to_string());
    };
    let field = |name: &str| mapping_get(mapping, name);
    let vars = field("vars").map(yaml_to_json).transpose()?.filter(|vars| !vars.is_null());
    let expected = field("expected")
        .filter(|value| !(category == FunctionCategory::Validate && value.is_null()))
        .map(Expectation::from_yaml);
    let res = field("res").map(parse_raw_response).transpose()?;
    let nock_options = match field("nockOptions") {
        None | Some(YamlValue::Null) => Vec::new(),
        Some(YamlValue::Sequence(items)) => {
            items.iter().map(parse_network_expectation).collect::<Result<Vec<_>, _>>()?
        }
        Some(single) => vec![parse_network_expectation(single)?],
    };
    let should = field("should").map(yaml_scalar_text);
    let env_variables = match field("envVariables") {
        None | Some(YamlValue::Null) => Vec::new(),
        Some(YamlValue::Sequence(items)) => items.iter().map(yaml_scalar_text).collect(),
        Some(other) => vec![yaml_scalar_text(other)],
    };
    Ok(Fixture {
        vars,
        expected,
        res,
        nock_options,
        should,
        env_variables,
        generated: false,
    })
}

/// Looks up a string key in a YAML mapping.
fn mapping_get<'a>(mapping: &'a Mapping, name: &str) -> Option<&'a YamlValue> {
    mapping.get(YamlValue::String(name.to_string()))
}

/// Renders a YAML scalar as text.
fn yaml_scalar_text(value: &YamlValue) -> String {
    match value {
        YamlValue::String(text) => text.clone(),
        YamlValue::Bool(flag) => flag.to_string(),
        YamlValue::Number(number) => number.to_string(),
        YamlValue::Null => String::new(),
        other => serde_yaml::to_string(other).unwrap_or_default().trim().to_string(),
    }
}

/// Parses a simulated raw response; structured bodies are serialized to JSON.
fn parse_raw_response(value: &YamlValue) -> Result<RawResponse, String> {
    let mut json = yaml_to_json(value)?;
    if let Some(body) = json.get_mut("body")
        && !body.is_string()
    {
        *body = Value::String(if body.is_null() { String::new() } else { body.to_string() });
    }
    if let Some(Value::Object(headers)) = json.get_mut("headers") {
        for header in headers.values_mut() {
            if !header.is_string() {
                *header = Value::String(header.to_string());
            }
        }
    }
    serde_json::from_value(json).map_err(|err| format!("res: {err}"))
}

/// Parses and checks one network expectation.
fn parse_network_expectation(value: &YamlValue) -> Result<NetworkExpectation, String> {
    let json = yaml_to_json(value)?;
    let expectation: NetworkExpectation =
        serde_json::from_value(json).map_err(|err| format!("nockOptions: {err}"))?;
    expectation.check().map_err(|err| format!("nockOptions: {err}"))?;
    Ok(expectation)
}

/// Converts YAML to JSON. Tagged values other than at the top of `expected`
/// are rejected.
///
/// # Errors
///
/// Returns a description of the first unconvertible node.
pub(crate) fn yaml_to_json(value: &YamlValue) -> Result<Value, String> {
    match value {
        YamlValue::Null => Ok(Value::Null),
        YamlValue::Bool(flag) => Ok(Value::Bool(*flag)),
        YamlValue::Number(number) => yaml_number(number),
        YamlValue::String(text) => Ok(Value::String(text.clone())),
        YamlValue::Sequence(items) => {
            items.iter().map(yaml_to_json).collect::<Result<Vec<_>, _>>().map(Value::Array)
        }
        YamlValue::Mapping(mapping) => {
            let mut map = Map::new();
            for (key, child) in mapping {
                let key = match key {
                    YamlValue::String(text) => text.clone(),
                    YamlValue::Number(_) | YamlValue::Bool(_) => yaml_scalar_text(key),
                    _ => return Err("mapping keys must be scalars".to_string()),
                };
                map.insert(key, yaml_to_json(child)?);
            }
            Ok(Value::Object(map))
        }
        YamlValue::Tagged(tagged) => Err(format!("unexpected tag {}", tagged.tag)),
    }
}

/// Converts a YAML number to a JSON number.
fn yaml_number(number: &serde_yaml::Number) -> Result<Value, String> {
    if let Some(int) = number.as_i64() {
        return Ok(Value::Number(Number::from(int)));
    }
    if let Some(int) = number.as_u64() {
        return Ok(Value::Number(Number::from(int)));
    }
    number
        .as_f64()
        .and_then(Number::from_f64)
        .map(Value::Number)
        .ok_or_else(|| format!("number {number} is not representable"))
}

// ============================================================================
// SECTION: Synthesis
// ============================================================================

/// Builds a bag with type-correct values for every required variable.
///
/// Unknown types synthesize `null`.
#[must_use]
pub fn synthesize_vars(catalog: &dyn TypeCatalog, descriptors: &[VariableDescriptor]) -> Value {
    let mut vars = Value::Object(Map::new());
    for descriptor in descriptors.iter().filter(|descriptor| descriptor.is_required()) {
        let example = first_example(catalog, &descriptor.var_type).map_or(Value::Null, |example| {
            catalog.parse(&descriptor.var_type, &example).unwrap_or(example)
        });
        set_path(&mut vars, &descriptor.name, example);
    }
    vars
}

/// Fills every absent category with a generated placeholder.
///
/// `handle` is set to an empty list when absent.
#[instrument(skip_all, fields(integration = integration.name()))]
pub fn synthesize_missing(set: &mut FixtureSet, integration: &Integration, catalog: &dyn TypeCatalog) {
    for category in FunctionCategory::ALL {
        if set.contains(category) {
            continue;
        }
        let fixtures = match category {
            FunctionCategory::Validate => vec![Fixture {
                vars: Some(synthesize_vars(catalog, integration.request_variables())),
                generated: true,
                ..Fixture::default()
            }],
            FunctionCategory::Request => vec![Fixture {
                vars: Some(synthesize_vars(catalog, integration.request_variables())),
                expected: Some(Expectation::Pattern(Pattern::any_non_empty())),
                generated: true,
                ..Fixture::default()
            }],
            FunctionCategory::Response => vec![Fixture {
                res: Some(RawResponse::canned_json()),
                expected: Some(Expectation::Pattern(Pattern::any_non_empty())),
                generated: true,
                ..Fixture::default()
            }],
            FunctionCategory::Handle => Vec::new(),
        };
        debug!(category = %category, count = fixtures.len(), "synthesized fixtures");
        set.insert(category, fixtures);
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test-only output and panic-based assertions are permitted."
    )]

    use serde_json::json;

    use super::FunctionCategory;
    use super::parse_fixture_set;
    use crate::expectation::Expectation;

    #[test]
    fn category_names_round_trip() {
        for category in FunctionCategory::ALL {
            assert_eq!(category.as_str().parse::<FunctionCategory>().unwrap(), category);
        }
        assert!("lookup".parse::<FunctionCategory>().is_err());
    }

    #[test]
    fn parses_all_fixture_fields() {
        let text = r#"
extra_vars:
  account: { id: "42" }
validate:
  - vars: { lead: { phone_1: "5135552379" } }
    should: accept a phone
response:
  - res: { status: 201, headers: { X-Count: 2 }, body: { ok: true } }
    expected: { outcome: success }
handle:
  - vars: {}
    nockOptions:
      url: https://example.com
      query: /v1
    expected: !regex '^ok'
"#;
        let set = parse_fixture_set(text).ok().unwrap();
        assert_eq!(set.extra_vars(), Some(&json!({"account": {"id": "42"}})));
        let validate = set.fixture(FunctionCategory::Validate, 0).unwrap();
        assert_eq!(validate.label(), "should accept a phone");
        assert!(validate.expected.is_none());
        let response = set.fixture(FunctionCategory::Response, 0).unwrap();
        let res = response.res.as_ref().unwrap();
        assert_eq!(res.status, 201);
        assert_eq!(res.body, r#"{"ok":true}"#);
        assert_eq!(res.header("x-count"), Some("2"));
        let handle = set.fixture(FunctionCategory::Handle, 0).unwrap();
        assert_eq!(handle.nock_options.len(), 1);
        assert!(matches!(handle.expected, Some(Expectation::Pattern(_))));
        assert!(!set.contains(FunctionCategory::Request));
    }

    #[test]
    fn null_expected_on_validate_means_no_message() {
        let text = r#"
validate:
  - vars: {}
    expected: ~
response:
  - expected: ~
"#;
        let set = parse_fixture_set(text).ok().unwrap();
        assert!(set.fixture(FunctionCategory::Validate, 0).unwrap().expected.is_none());
        assert!(matches!(
            set.fixture(FunctionCategory::Response, 0).unwrap().expected,
            Some(Expectation::Unsupported(_))
        ));
    }

    #[test]
    fn empty_text_is_empty_set() {
        let set = parse_fixture_set("").ok().unwrap();
        assert!(set.get(FunctionCategory::Validate).is_empty());
    }

    #[test]
    fn non_list_category_is_malformed() {
        assert!(parse_fixture_set("validate: 3").is_err());
        assert!(parse_fixture_set("- 1").is_err());
    }
}
