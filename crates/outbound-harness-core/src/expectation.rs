// crates/outbound-harness-core/src/expectation.rs
// ============================================================================
// Module: Expectation Matcher
// Description: Tagged expected values, deep comparison, and verdicts.
// Purpose: Compare invocation results against fixture expectations.
// Dependencies: regex, serde, serde_json, serde_yaml
// ============================================================================

//! ## Overview
//! An [`Expectation`] is built once from the fixture's declared `expected`
//! value. A YAML scalar tagged `!regex` becomes a [`Pattern`], a mapping or
//! sequence becomes structural, a plain string becomes exact, and anything
//! else is kept as an authoring defect. [`judge`] turns an invocation result
//! plus an expectation into a [`Verdict`].
//! Invariants:
//! - Structural comparison is order-insensitive for object keys and treats
//!   `1` and `1.0` as equal.
//! - An unsupported expectation never passes.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use regex::Regex;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use serde_yaml::Value as YamlValue;

use crate::fixture::FunctionCategory;
use crate::fixture::yaml_to_json;
use crate::invocation::InvocationResult;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// YAML tag marking a pattern expectation.
pub const REGEX_TAG: &str = "regex";

/// Pattern used by synthesized fixtures: any non-empty text.
pub const ANY_NON_EMPTY: &str = "(?s).+";

// ============================================================================
// SECTION: Pattern
// ============================================================================

/// Compiled regular expression that remembers its source text.
#[derive(Clone)]
pub struct Pattern {
    /// Source text as declared.
    source: String,
    /// Compiled expression.
    regex: Regex,
}

impl Pattern {
    /// Compiles a pattern.
    ///
    /// # Errors
    ///
    /// Returns [`regex::Error`] when the source is not a valid expression.
    pub fn new(source: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            source: source.to_string(),
            regex: Regex::new(source)?,
        })
    }

    /// Pattern matching any non-empty text.
    #[must_use]
    pub fn any_non_empty() -> Self {
        Self {
            source: ANY_NON_EMPTY.to_string(),
            regex: Regex::new(ANY_NON_EMPTY).unwrap_or_else(|_| unreachable!("constant pattern compiles")),
        }
    }

    /// Returns the declared source text.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Matches a string directly, or the JSON text of any other value.
    #[must_use]
    pub fn is_match(&self, actual: &Value) -> bool {
        match actual {
            Value::String(text) => self.regex.is_match(text),
            other => self.regex.is_match(&other.to_string()),
        }
    }

    /// Matches raw text.
    #[must_use]
    pub fn is_match_text(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}/", self.source)
    }
}

// ============================================================================
// SECTION: Expectation
// ============================================================================

/// Expected value of a fixture, tagged by shape.
#[derive(Debug, Clone, PartialEq)]
pub enum Expectation {
    /// Actual value must satisfy the pattern.
    Pattern(Pattern),
    /// Deep, order-insensitive structural equality.
    Structural(Value),
    /// Exact string equality.
    Exact(String),
    /// Declared value has an unsupported shape (authoring defect).
    Unsupported(String),
}

impl Expectation {
    /// Builds an expectation from a YAML value.
    #[must_use]
    pub fn from_yaml(value: &YamlValue) -> Self {
        match value {
            YamlValue::Tagged(tagged) if tagged.tag.to_string().trim_start_matches('!') == REGEX_TAG => {
                match &tagged.value {
                    YamlValue::String(source) => match Pattern::new(source) {
                        Ok(pattern) => Self::Pattern(pattern),
                        Err(err) => Self::Unsupported(format!("invalid regex '{source}': {err}")),
                    },
                    _ => Self::Unsupported("!regex must tag a string".to_string()),
                }
            }
            YamlValue::String(text) => Self::Exact(text.clone()),
            YamlValue::Mapping(_) | YamlValue::Sequence(_) => match yaml_to_json(value) {
                Ok(json) => Self::Structural(json),
                Err(err) => Self::Unsupported(err),
            },
            YamlValue::Null => Self::Unsupported("expected is null".to_string()),
            YamlValue::Bool(_) => Self::Unsupported("expected is a boolean".to_string()),
            YamlValue::Number(_) => Self::Unsupported("expected is a number".to_string()),
            YamlValue::Tagged(tagged) => Self::Unsupported(format!("unsupported tag {}", tagged.tag)),
        }
    }

    /// Builds an expectation from a JSON value (no pattern form).
    #[must_use]
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::String(text) => Self::Exact(text.clone()),
            Value::Object(_) | Value::Array(_) => Self::Structural(value.clone()),
            other => Self::Unsupported(format!("expected is {other}")),
        }
    }

    /// Returns true when `actual` satisfies the expectation.
    #[must_use]
    pub fn matches(&self, actual: &Value) -> bool {
        self.evaluate(actual).is_empty()
    }

    /// Compares `actual` and returns the mismatch lines (empty on success).
    #[must_use]
    pub fn evaluate(&self, actual: &Value) -> Vec<String> {
        match self {
            Self::Pattern(pattern) => {
                if pattern.is_match(actual) {
                    Vec::new()
                } else {
                    vec![format!("$: {actual} does not match {pattern}")]
                }
            }
            Self::Structural(expected) => diff(actual, expected),
            Self::Exact(expected) => match actual {
                Value::String(text) if text == expected => Vec::new(),
                other => vec![format!("$: expected {}, got {other}", Value::String(expected.clone()))],
            },
            Self::Unsupported(reason) => vec![format!("unsupported expectation: {reason}")],
        }
    }

    /// Returns a JSON rendering for display.
    #[must_use]
    pub fn to_display(&self) -> Value {
        match self {
            Self::Pattern(pattern) => Value::String(pattern.to_string()),
            Self::Structural(value) => value.clone(),
            Self::Exact(text) => Value::String(text.clone()),
            Self::Unsupported(reason) => Value::String(format!("<unsupported: {reason}>")),
        }
    }
}

/// Free-function form of [`Expectation::matches`].
#[must_use]
pub fn matches(actual: &Value, expected: &Expectation) -> bool {
    expected.matches(actual)
}

// ============================================================================
// SECTION: Structural Comparison
// ============================================================================

/// Numeric-aware, order-insensitive deep equality.
#[must_use]
pub fn deep_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => numbers_equal(a, b),
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| deep_equal(x, y))
        }
        (Value::Object(a), Value::Object(b)) => {
            a.len() == b.len()
                && a.iter().all(|(key, x)| b.get(key).is_some_and(|y| deep_equal(x, y)))
        }
        (a, b) => a == b,
    }
}

/// Compares numbers by integer value when possible, else by float value.
fn numbers_equal(a: &serde_json::Number, b: &serde_json::Number) -> bool {
    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        return x == y;
    }
    if let (Some(x), Some(y)) = (a.as_u64(), b.as_u64()) {
        return x == y;
    }
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => (x - y).abs() <= f64::EPSILON * x.abs().max(y.abs()).max(1.0),
        _ => false,
    }
}

/// Lists every path at which `actual` departs from `expected`.
#[must_use]
pub fn diff(actual: &Value, expected: &Value) -> Vec<String> {
    let mut lines = Vec::new();
    diff_into(actual, expected, "$", &mut lines);
    lines
}

/// Recursive worker for [`diff`].
fn diff_into(actual: &Value, expected: &Value, path: &str, lines: &mut Vec<String>) {
    match (actual, expected) {
        (Value::Object(a), Value::Object(e)) => {
            for (key, expected_child) in e {
                let child_path = format!("{path}.{key}");
                match a.get(key) {
                    Some(actual_child) => diff_into(actual_child, expected_child, &child_path, lines),
                    None => lines.push(format!("{child_path}: missing, expected {expected_child}")),
                }
            }
            for (key, actual_child) in a {
                if !e.contains_key(key) {
                    lines.push(format!("{path}.{key}: unexpected {actual_child}"));
                }
            }
        }
        (Value::Array(a), Value::Array(e)) if a.len() == e.len() => {
            for (index, (actual_child, expected_child)) in a.iter().zip(e).enumerate() {
                diff_into(actual_child, expected_child, &format!("{path}[{index}]"), lines);
            }
        }
        (a, e) => {
            if !deep_equal(a, e) {
                lines.push(format!("{path}: expected {e}, got {a}"));
            }
        }
    }
}

// ============================================================================
// SECTION: Verdicts
// ============================================================================

/// How unmet network expectations affect a verdict.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnmetPolicy {
    /// Unmet keys are reported as data only.
    #[default]
    SoftReport,
    /// Any unmet key fails the verdict.
    StrictFail,
}

/// Outcome of comparing one invocation to its fixture.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Verdict {
    /// True when the fixture passed.
    pub passed: bool,
    /// Mismatch lines for display.
    pub diff: Vec<String>,
    /// Set when the fixture itself is malformed.
    pub authoring_error: Option<String>,
    /// Unmet network expectation keys.
    pub nocks_unmet: Vec<String>,
}

impl Verdict {
    /// Builds a verdict from mismatch lines.
    fn from_diff(diff: Vec<String>) -> Self {
        Self {
            passed: diff.is_empty(),
            diff,
            ..Self::default()
        }
    }

    /// Builds a failing authoring-error verdict.
    fn authoring(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Self {
            passed: false,
            diff: vec![reason.clone()],
            authoring_error: Some(reason),
            nocks_unmet: Vec::new(),
        }
    }
}

/// Judges an invocation result against its fixture expectation.
#[must_use]
pub fn judge(
    category: FunctionCategory,
    result: &InvocationResult,
    expected: Option<&Expectation>,
    policy: UnmetPolicy,
) -> Verdict {
    let actual = result.actual();
    let mut verdict = match (category, expected, actual) {
        (FunctionCategory::Validate, None, None) => Verdict::from_diff(Vec::new()),
        (FunctionCategory::Validate, None, Some(actual)) => {
            Verdict::from_diff(vec![format!("$: expected no message, got {actual}")])
        }
        (_, None, _) => Verdict::authoring("fixture declares no expected value"),
        (_, Some(Expectation::Unsupported(reason)), _) => {
            Verdict::authoring(format!(
                "\"expected\" in fixture should be a regex, object, or string ({reason})"
            ))
        }
        (_, Some(expectation), None) => Verdict::from_diff(vec![format!(
            "$: expected {}, got nothing",
            expectation.to_display()
        )]),
        (_, Some(expectation), Some(actual)) => Verdict::from_diff(expectation.evaluate(&actual)),
    };
    verdict.nocks_unmet.clone_from(&result.nocks_unmet);
    if policy == UnmetPolicy::StrictFail && !result.nocks_unmet.is_empty() {
        verdict.passed = false;
        verdict.diff.push(format!("unmet network expectations: {}", result.nocks_unmet.join(", ")));
    }
    verdict
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

    use super::Expectation;
    use super::Pattern;
    use super::deep_equal;
    use super::diff;

    #[test]
    fn regex_tag_builds_pattern() {
        let yaml: serde_yaml::Value = serde_yaml::from_str("!regex '^a'").unwrap();
        let expectation = Expectation::from_yaml(&yaml);
        assert_eq!(expectation, Expectation::Pattern(Pattern::new("^a").unwrap()));
        assert!(expectation.matches(&json!("abc")));
        assert!(!expectation.matches(&json!("cab")));
    }

    #[test]
    fn shapes_map_to_variants() {
        let exact: serde_yaml::Value = serde_yaml::from_str("'ok'").unwrap();
        assert_eq!(Expectation::from_yaml(&exact), Expectation::Exact("ok".to_string()));
        let object: serde_yaml::Value = serde_yaml::from_str("{a: 1}").unwrap();
        assert_eq!(Expectation::from_yaml(&object), Expectation::Structural(json!({"a": 1})));
        let number: serde_yaml::Value = serde_yaml::from_str("42").unwrap();
        assert!(matches!(Expectation::from_yaml(&number), Expectation::Unsupported(_)));
        let bad: serde_yaml::Value = serde_yaml::from_str("!regex '('").unwrap();
        assert!(matches!(Expectation::from_yaml(&bad), Expectation::Unsupported(_)));
    }

    #[test]
    fn structural_is_numeric_aware() {
        assert!(deep_equal(&json!({"a": 1, "b": [1.0]}), &json!({"b": [1], "a": 1.0})));
        assert!(!deep_equal(&json!({"a": 1}), &json!({"a": 2})));
    }

    #[test]
    fn diff_lists_each_path() {
        let lines = diff(&json!({"a": 1, "c": 3}), &json!({"a": 2, "b": 2}));
        assert_eq!(lines.len(), 3);
        assert!(lines.iter().any(|line| line.starts_with("$.a:")));
        assert!(lines.iter().any(|line| line.starts_with("$.b: missing")));
        assert!(lines.iter().any(|line| line.starts_with("$.c: unexpected")));
    }

    #[test]
    fn exact_requires_string_actual() {
        let expectation = Expectation::Exact("1".to_string());
        assert!(!expectation.matches(&json!(1)));
        assert!(expectation.matches(&json!("1")));
    }
}
