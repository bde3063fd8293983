// crates/outbound-harness-core/src/interception.rs
// ============================================================================
// Module: Network Interception Harness
// Description: Scoped interception rules for combined `handle` integrations.
// Purpose: Answer declared outbound calls and report the ones never made.
// Dependencies: async-trait, regex, serde, tokio, tracing, url
// ============================================================================

//! ## Overview
//! [`InterceptionScope::install`] turns a fixture's [`NetworkExpectation`]s
//! into rules served by an [`HttpTransport`]. Each rule answers one matching
//! request. After the handler returns, unsatisfied rules are reported by key
//! rather than failing the invocation. Dropping the scope tears every rule
//! down, so a late call from a timed-out handler fails with
//! [`TransportError::Closed`].
//! Invariants:
//! - Rules never outlive the scope that installed them.
//! - At most one scope is used per invocation.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;
use tracing::info;
use tracing::instrument;
use tracing::warn;
use url::Url;

use crate::expectation::deep_equal;
use crate::invocation::InvocationResult;
use crate::invocation::Outcome;
use crate::invocation::panic_message;
use crate::model::Environment;
use crate::model::Handler;
use crate::transport::HandleContext;
use crate::transport::HttpTransport;
use crate::transport::OutboundRequest;
use crate::transport::OutboundResponse;
use crate::transport::TransportError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default bound on a single `handle` invocation.
pub const DEFAULT_HANDLE_TIMEOUT: Duration = Duration::from_millis(2_000);

/// Diagnostic returned when a `handle` fixture declares no network expectations.
pub const NO_NETWORK_EXPECTATIONS: &str = "no nock to catch handle() call";

/// Header naming the reply body format.
const CONTENT_TYPE: &str = "Content-Type";

/// Content type of structured reply data.
const JSON_CONTENT_TYPE: &str = "application/json";

// ============================================================================
// SECTION: Network Expectations
// ============================================================================

/// Matcher for a request path or body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MatchRule {
    /// Exact text.
    Exact(String),
    /// Regular expression.
    Pattern {
        /// Expression source.
        regex: String,
    },
    /// Structured JSON body compared deeply.
    Json(Value),
}

impl MatchRule {
    /// Returns the display form used in expectation keys.
    #[must_use]
    pub fn display(&self) -> String {
        match self {
            Self::Exact(text) => text.clone(),
            Self::Pattern {
                regex,
            } => format!("/{regex}/"),
            Self::Json(value) => value.to_string(),
        }
    }
}

/// A declared outbound call a `handle` invocation is expected to make.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkExpectation {
    /// Target origin (scheme, host, optional port and base path).
    pub url: String,
    /// HTTP verb, compared case-insensitively.
    #[serde(default = "default_verb")]
    pub verb: String,
    /// Path (including query string) matcher, relative to the URL's base path.
    #[serde(default, alias = "path", skip_serializing_if = "Option::is_none")]
    pub query: Option<MatchRule>,
    /// Optional request body matcher.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<MatchRule>,
    /// Reply status code.
    #[serde(default = "default_status_code")]
    pub status_code: u16,
    /// Reply body; non-string values are sent as JSON.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_data: Option<Value>,
    /// Reply headers.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
}

/// Default verb for network expectations.
fn default_verb() -> String {
    "GET".to_string()
}

/// Default reply status for network expectations.
const fn default_status_code() -> u16 {
    200
}

impl NetworkExpectation {
    /// Creates an expectation for `verb url` with a path matcher.
    #[must_use]
    pub fn new(verb: &str, url: impl Into<String>, path: MatchRule) -> Self {
        Self {
            url: url.into(),
            verb: verb.to_ascii_uppercase(),
            query: Some(path),
            body: None,
            status_code: default_status_code(),
            response_data: None,
            headers: BTreeMap::new(),
        }
    }

    /// Sets the body matcher.
    #[must_use]
    pub fn with_body(mut self, body: MatchRule) -> Self {
        self.body = Some(body);
        self
    }

    /// Sets the reply.
    #[must_use]
    pub fn reply(mut self, status_code: u16, response_data: Value) -> Self {
        self.status_code = status_code;
        self.response_data = Some(response_data);
        self
    }

    /// Checks that the URL parses and every pattern compiles.
    ///
    /// # Errors
    ///
    /// Returns a description of the first problem found.
    pub fn check(&self) -> Result<(), String> {
        let url = Url::parse(&self.url).map_err(|err| format!("url '{}': {err}", self.url))?;
        if url.host_str().is_none() {
            return Err(format!("url '{}' has no host", self.url));
        }
        for rule in [&self.query, &self.body].into_iter().flatten() {
            if let MatchRule::Pattern {
                regex,
            } = rule
            {
                Regex::new(regex).map_err(|err| format!("regex '{regex}': {err}"))?;
            }
        }
        Ok(())
    }

    /// Returns the identifying key `"<VERB> <scheme>://<host>:<port><path>"`.
    #[must_use]
    pub fn key(&self) -> String {
        let verb = self.verb.to_ascii_uppercase();
        match Url::parse(&self.url) {
            Ok(url) => format!(
                "{verb} {}://{}:{}{}",
                url.scheme(),
                url.host_str().unwrap_or_default(),
                url.port_or_known_default().unwrap_or_default(),
                self.path_key(&url)
            ),
            Err(_) => format!("{verb} {}", self.url),
        }
    }

    /// Returns the base path prefix and the matcher applied after it.
    ///
    /// A declared matcher sits under the URL's path (trailing `/` trimmed);
    /// without one the whole URL path is matched exactly.
    fn path_rule(&self, url: &Url) -> (String, MatchRule) {
        match &self.query {
            Some(rule) => (base_path(url).to_string(), rule.clone()),
            None => (String::new(), MatchRule::Exact(path_and_query(url))),
        }
    }

    /// Returns the path part of the key.
    fn path_key(&self, url: &Url) -> String {
        let (prefix, rule) = self.path_rule(url);
        format!("{prefix}{}", rule.display())
    }

    /// Builds the reply for a matched request.
    ///
    /// Structured reply data gets `Content-Type: application/json` unless a
    /// content type is declared.
    fn response(&self) -> OutboundResponse {
        let mut headers = self.headers.clone();
        let body = match &self.response_data {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(text)) => text.clone(),
            Some(other) => {
                if !headers.keys().any(|name| name.eq_ignore_ascii_case(CONTENT_TYPE)) {
                    headers.insert(CONTENT_TYPE.to_string(), JSON_CONTENT_TYPE.to_string());
                }
                other.to_string()
            }
        };
        OutboundResponse {
            status: self.status_code,
            headers,
            body,
        }
    }
}

/// Returns the URL path without its trailing `/`.
fn base_path(url: &Url) -> &str {
    url.path().trim_end_matches('/')
}

/// Returns `path[?query]` for a URL.
fn path_and_query(url: &Url) -> String {
    match url.query() {
        Some(query) => format!("{}?{query}", url.path()),
        None => url.path().to_string(),
    }
}

// ============================================================================
// SECTION: Installed Rules
// ============================================================================

/// A matcher ready for use.
enum CompiledMatch {
    /// Exact text.
    Exact(String),
    /// Compiled expression; `None` when the source failed to compile.
    Pattern(Option<Regex>),
    /// Structured body.
    Json(Value),
}

impl CompiledMatch {
    /// Compiles a declared rule.
    fn compile(rule: MatchRule) -> Self {
        match rule {
            MatchRule::Exact(text) => Self::Exact(text),
            MatchRule::Pattern {
                regex,
            } => Self::Pattern(Regex::new(&regex).ok()),
            MatchRule::Json(value) => Self::Json(value),
        }
    }

    /// Tests the candidate text.
    fn is_match(&self, candidate: &str) -> bool {
        match self {
            Self::Exact(text) => text == candidate,
            Self::Pattern(regex) => regex.as_ref().is_some_and(|regex| regex.is_match(candidate)),
            Self::Json(expected) => serde_json::from_str::<Value>(candidate)
                .is_ok_and(|actual| deep_equal(&actual, expected)),
        }
    }
}

/// One installed rule.
struct InstalledRule {
    /// Declared expectation.
    expectation: NetworkExpectation,
    /// Identifying key.
    key: String,
    /// Parsed origin; `None` when the URL did not parse (never matches).
    origin: Option<Url>,
    /// Base path the request path must start with.
    prefix: String,
    /// Matcher for the request path after `prefix`.
    path: CompiledMatch,
    /// Optional body matcher.
    body: Option<CompiledMatch>,
    /// Set once the rule has answered a request.
    satisfied: bool,
}

impl InstalledRule {
    /// Compiles an expectation.
    fn new(expectation: &NetworkExpectation) -> Self {
        let origin = Url::parse(&expectation.url).ok();
        let (prefix, path) = origin.as_ref().map_or_else(
            || (String::new(), CompiledMatch::Pattern(None)),
            |url| {
                let (prefix, rule) = expectation.path_rule(url);
                (prefix, CompiledMatch::compile(rule))
            },
        );
        Self {
            key: expectation.key(),
            prefix,
            path,
            body: expectation.body.clone().map(CompiledMatch::compile),
            origin,
            expectation: expectation.clone(),
            satisfied: false,
        }
    }

    /// Returns true when the rule answers `request` at `target`.
    fn matches(&self, request: &OutboundRequest, target: &Url) -> bool {
        let Some(origin) = &self.origin else {
            return false;
        };
        origin.scheme() == target.scheme()
            && origin.host_str() == target.host_str()
            && origin.port_or_known_default() == target.port_or_known_default()
            && self.expectation.verb.eq_ignore_ascii_case(&request.method)
            && path_and_query(target)
                .strip_prefix(self.prefix.as_str())
                .is_some_and(|rest| self.path.is_match(rest))
            && self
                .body
                .as_ref()
                .is_none_or(|body| body.is_match(request.body.as_deref().unwrap_or_default()))
    }
}

/// Rule table shared between a scope and its transport.
struct ScopeState {
    /// Installed rules in declaration order.
    rules: Vec<InstalledRule>,
    /// Cleared at teardown.
    open: bool,
}

/// Locks the state, recovering from poisoning.
fn lock(state: &Mutex<ScopeState>) -> MutexGuard<'_, ScopeState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

// ============================================================================
// SECTION: Interception Scope
// ============================================================================

/// RAII handle over a set of installed interception rules.
pub struct InterceptionScope {
    /// Shared rule table.
    state: Arc<Mutex<ScopeState>>,
}

impl InterceptionScope {
    /// Installs one rule per expectation.
    #[must_use]
    #[instrument(skip_all, fields(count = expectations.len()))]
    pub fn install(expectations: &[NetworkExpectation]) -> Self {
        let rules: Vec<InstalledRule> = expectations.iter().map(InstalledRule::new).collect();
        for rule in &rules {
            debug!(key = %rule.key, "installed interception rule");
        }
        info!(count = rules.len(), "interception scope installed");
        Self {
            state: Arc::new(Mutex::new(ScopeState {
                rules,
                open: true,
            })),
        }
    }

    /// Returns a transport serving this scope's rules.
    #[must_use]
    pub fn transport(&self) -> Arc<dyn HttpTransport> {
        Arc::new(InterceptingTransport {
            state: Arc::clone(&self.state),
        })
    }

    /// Returns the keys of rules that never answered a request.
    #[must_use]
    pub fn unmet(&self) -> Vec<String> {
        lock(&self.state).rules.iter().filter(|rule| !rule.satisfied).map(|rule| rule.key.clone()).collect()
    }

    /// Returns the number of installed rules.
    #[must_use]
    pub fn total(&self) -> usize {
        lock(&self.state).rules.len()
    }

    /// Removes every rule. Later calls through the transport fail with `Closed`.
    pub fn teardown(&self) {
        let mut state = lock(&self.state);
        if state.open {
            state.open = false;
            state.rules.clear();
            debug!("interception scope torn down");
        }
    }
}

impl Drop for InterceptionScope {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Transport answering from a scope's rule table.
struct InterceptingTransport {
    /// Shared rule table.
    state: Arc<Mutex<ScopeState>>,
}

#[async_trait]
impl HttpTransport for InterceptingTransport {
    async fn send(&self, request: OutboundRequest) -> Result<OutboundResponse, TransportError> {
        let target = Url::parse(&request.url)
            .map_err(|_| TransportError::InvalidRequest(format!("url {}", request.url)))?;
        let mut state = lock(&self.state);
        if !state.open {
            return Err(TransportError::Closed);
        }
        let rule = state
            .rules
            .iter_mut()
            .find(|rule| !rule.satisfied && rule.matches(&request, &target));
        match rule {
            Some(rule) => {
                rule.satisfied = true;
                debug!(key = %rule.key, "interception rule satisfied");
                Ok(rule.expectation.response())
            }
            None => {
                let described = format!("{} {}", request.method.to_ascii_uppercase(), request.url);
                warn!(request = %described, "no interception rule matched");
                Err(TransportError::NoMatch(described))
            }
        }
    }
}

// ============================================================================
// SECTION: Handle Invocation
// ============================================================================

/// Options for running `handle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterceptionOptions {
    /// Upper bound on one `handle` invocation.
    pub timeout: Duration,
}

impl Default for InterceptionOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_HANDLE_TIMEOUT,
        }
    }
}

/// Runs `handle` inside an interception scope and reconciles expectations.
///
/// With no expectations the handler is not run and a harness diagnostic is
/// returned. The scope is torn down on every path, including timeout.
#[instrument(skip_all, fields(expectations = expectations.len()))]
pub async fn invoke_handle(
    handler: Arc<dyn Handler>,
    vars: Value,
    env: Environment,
    expectations: &[NetworkExpectation],
    options: &InterceptionOptions,
) -> InvocationResult {
    if expectations.is_empty() {
        warn!("handle fixture declares no network expectations");
        return InvocationResult::harness_error(NO_NETWORK_EXPECTATIONS);
    }
    let scope = InterceptionScope::install(expectations);
    let ctx = HandleContext::new(env, scope.transport());
    let task = tokio::spawn(async move { handler.handle(vars, ctx).await });
    let abort = task.abort_handle();
    let outcome = match tokio::time::timeout(options.timeout, task).await {
        Ok(Ok(Ok(value))) => Outcome::Value(value),
        Ok(Ok(Err(err))) => Outcome::Error(err.message().to_string()),
        Ok(Err(join_err)) if join_err.is_panic() => {
            let message = panic_message(join_err.into_panic().as_ref());
            warn!(panic = %message, "handle panicked");
            Outcome::Error(message)
        }
        Ok(Err(_)) => Outcome::Error("handle was cancelled".to_string()),
        Err(_) => {
            abort.abort();
            warn!(timeout_ms = options.timeout.as_millis(), "handle timed out");
            Outcome::Error(format!("handle timed out after {} ms", options.timeout.as_millis()))
        }
    };
    let nocks_unmet = scope.unmet();
    let total = scope.total();
    drop(scope);
    if !nocks_unmet.is_empty() {
        info!(unmet = ?nocks_unmet, total, "network expectations unmet");
    }
    InvocationResult {
        outcome,
        nocks_total: (!nocks_unmet.is_empty()).then_some(total),
        nocks_unmet,
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

    use super::InterceptionScope;
    use super::MatchRule;
    use super::NetworkExpectation;
    use crate::transport::OutboundRequest;
    use crate::transport::TransportError;

    fn expectation() -> NetworkExpectation {
        NetworkExpectation::new("post", "https://api.example.com", MatchRule::Exact("/v1/lookup".to_string()))
            .reply(200, json!({"carrier": "acme"}))
    }

    #[test]
    fn key_includes_default_port() {
        assert_eq!(expectation().key(), "POST https://api.example.com:443/v1/lookup");
        let pattern = NetworkExpectation::new(
            "GET",
            "http://localhost:8080",
            MatchRule::Pattern {
                regex: "^/items".to_string(),
            },
        );
        assert_eq!(pattern.key(), "GET http://localhost:8080/^/items/");
    }

    #[test]
    fn key_joins_base_path_and_declared_path() {
        let rule = NetworkExpectation::new(
            "POST",
            "https://api.example.com/leadconduit/",
            MatchRule::Exact("/lookup".to_string()),
        );
        assert_eq!(rule.key(), "POST https://api.example.com:443/leadconduit/lookup");
        let bare = NetworkExpectation {
            query: None,
            ..rule
        };
        assert_eq!(bare.key(), "POST https://api.example.com:443/leadconduit/");
    }

    #[tokio::test]
    async fn structured_reply_is_labelled_json_unless_declared() {
        let scope = InterceptionScope::install(&[expectation()]);
        let response =
            scope.transport().send(OutboundRequest::post("https://api.example.com/v1/lookup")).await.unwrap();
        assert_eq!(response.headers.get("Content-Type").map(String::as_str), Some("application/json"));

        let mut declared = expectation();
        declared.headers.insert("content-type".to_string(), "text/plain".to_string());
        let scope = InterceptionScope::install(&[declared]);
        let response =
            scope.transport().send(OutboundRequest::post("https://api.example.com/v1/lookup")).await.unwrap();
        assert_eq!(response.headers.len(), 1);
        assert_eq!(response.headers.get("content-type").map(String::as_str), Some("text/plain"));

        let text = NetworkExpectation::new("GET", "https://api.example.com", MatchRule::Exact("/t".to_string()))
            .reply(200, json!("plain"));
        let scope = InterceptionScope::install(&[text]);
        let response = scope.transport().send(OutboundRequest::get("https://api.example.com/t")).await.unwrap();
        assert!(response.headers.is_empty());
    }

    #[test]
    fn yaml_forms_deserialize() {
        let parsed: NetworkExpectation = serde_json::from_value(json!({
            "url": "https://api.example.com",
            "path": {"regex": "^/v1"},
            "statusCode": 201
        }))
        .unwrap();
        assert_eq!(parsed.verb, "GET");
        assert_eq!(parsed.status_code, 201);
        assert!(matches!(parsed.query, Some(MatchRule::Pattern { .. })));
        assert!(parsed.check().is_ok());
    }

    #[tokio::test]
    async fn rule_answers_once_then_no_match() {
        let scope = InterceptionScope::install(&[expectation()]);
        let transport = scope.transport();
        let request = OutboundRequest::post("https://api.example.com/v1/lookup");
        let response = transport.send(request.clone()).await.unwrap();
        assert_eq!(response.json().unwrap(), json!({"carrier": "acme"}));
        assert!(scope.unmet().is_empty());
        assert!(matches!(transport.send(request).await, Err(TransportError::NoMatch(_))));
    }

    #[tokio::test]
    async fn dropped_scope_closes_transport() {
        let scope = InterceptionScope::install(&[expectation()]);
        let transport = scope.transport();
        drop(scope);
        let result = transport.send(OutboundRequest::post("https://api.example.com/v1/lookup")).await;
        assert_eq!(result, Err(TransportError::Closed));
    }

    #[tokio::test]
    async fn body_matcher_is_applied() {
        let rule = expectation().with_body(MatchRule::Exact("phone=5135552379".to_string()));
        let scope = InterceptionScope::install(&[rule]);
        let transport = scope.transport();
        let wrong = OutboundRequest::post("https://api.example.com/v1/lookup").body("phone=1");
        assert!(transport.send(wrong).await.is_err());
        assert_eq!(scope.unmet(), vec!["POST https://api.example.com:443/v1/lookup".to_string()]);
    }
}
