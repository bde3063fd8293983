// crates/outbound-harness-server/tests/common/mod.rs
// ============================================================================
// Module: Common Server Test Fixtures
// Description: Sample module and a bound replay server for route tests.
// Purpose: Drive the HTTP surface end to end on an ephemeral port.
// Dependencies: outbound-harness-core, outbound-harness-server, tempfile, tokio
// ============================================================================

//! ## Overview
//! `outbound` is a two-phase integration gated on `SPEC_ENV_VAR`; `lookup`
//! is a combined integration posting the lead phone to a lookup API.

#![allow(dead_code, reason = "Shared test helpers may be unused in some cases.")]

use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use outbound_harness_core::Environment;
use outbound_harness_core::HandleContext;
use outbound_harness_core::Handler;
use outbound_harness_core::Integration;
use outbound_harness_core::IntegrationError;
use outbound_harness_core::IntegrationModule;
use outbound_harness_core::OutboundRequest;
use outbound_harness_core::RawResponse;
use outbound_harness_core::RequestSpec;
use outbound_harness_core::RunnerOptions;
use outbound_harness_core::StandardTypeCatalog;
use outbound_harness_core::VariableDescriptor;
use outbound_harness_server::ReplayRouter;
use outbound_harness_server::ReplayServer;
use serde_json::Value;
use serde_json::json;
use tokio::net::TcpListener;

/// Credential read by the sample integrations.
pub const SPEC_ENV_VAR: &str = "SPEC_ENV_VAR";

/// Message raised without credentials.
pub const MISSING_CREDENTIALS: &str = "Missing credentials, contact ActiveProspect Support";

/// Handle fixture file for `lookup`.
pub const LOOKUP_YAML: &str = r"
extra_vars:
  account:
    id: acct-7
handle:
  - should: return the carrier
    vars:
      lead:
        phone_1: 513-555-2379
    nockOptions:
      url: https://api.example.com
      verb: POST
      path: /v1/lookup
      body: phone=5135552379
      responseData:
        carrier: Acme Wireless
    expected:
      lookup:
        outcome: success
        carrier: Acme Wireless
        account: acct-7
";

/// Fixture file for `outbound`.
pub const OUTBOUND_YAML: &str = r#"
validate:
  - should: reject short phones
    vars:
      lead:
        phone_1: "12"
    envVariables:
      - SPEC_ENV_VAR
    expected: A valid phone number is required
response:
  - res:
      status: 200
      headers:
        Content-Type: application/json
      body: '{"ok": true}'
    expected:
      outcome: success
"#;

/// Shared validate.
fn validate(vars: &Value, env: &Environment) -> Result<Option<String>, IntegrationError> {
    if !env.is_set(SPEC_ENV_VAR) {
        return Err(IntegrationError::new(MISSING_CREDENTIALS));
    }
    if vars.pointer("/lead/phone_1/valid") == Some(&Value::Bool(true)) {
        Ok(None)
    } else {
        Ok(Some("A valid phone number is required".to_string()))
    }
}

/// Normal phone text.
fn normal_phone(vars: &Value) -> String {
    vars.pointer("/lead/phone_1/normal").and_then(Value::as_str).unwrap_or_default().to_string()
}

/// Combined handler.
struct LookupHandler;

#[async_trait]
impl Handler for LookupHandler {
    async fn handle(&self, vars: Value, ctx: HandleContext) -> Result<Value, IntegrationError> {
        let request = OutboundRequest::post("https://api.example.com/v1/lookup")
            .body(format!("phone={}", normal_phone(&vars)));
        let account = vars.pointer("/account/id").cloned().unwrap_or(Value::Null);
        match ctx.send(request).await {
            Ok(response) => {
                let body = response.json().map_err(|err| IntegrationError::new(err.to_string()))?;
                Ok(json!({"lookup": {"outcome": "success", "carrier": body["carrier"], "account": account}}))
            }
            Err(err) => Ok(json!({"lookup": {"outcome": "error", "reason": err.to_string()}})),
        }
    }
}

/// Sample module.
pub fn sample_module() -> IntegrationModule {
    let phone = vec![VariableDescriptor::required("lead.phone_1", "phone", "Lead phone")];
    let outbound = Integration::builder("outbound")
        .request_variables(phone.clone())
        .response_variables(vec![VariableDescriptor::output("outcome", "string", "Outcome")])
        .env_variables([SPEC_ENV_VAR])
        .validate(validate)
        .request(|vars: &Value, _env: &Environment| -> Result<RequestSpec, IntegrationError> {
            Ok(RequestSpec {
                method: "POST".to_string(),
                url: "https://api.example.com/leads".to_string(),
                body: Some(format!("phone={}", normal_phone(vars))),
                ..RequestSpec::default()
            })
        })
        .response(|_vars: &Value, _req: &RequestSpec, res: &RawResponse| -> Result<Value, IntegrationError> {
            let body: Value =
                serde_json::from_str(&res.body).map_err(|err| IntegrationError::new(err.to_string()))?;
            let outcome = if body["ok"] == Value::Bool(true) { "success" } else { "failure" };
            Ok(json!({"outcome": outcome}))
        })
        .build()
        .unwrap();
    let lookup = Integration::builder("lookup")
        .request_variables(phone)
        .response_variables(vec![VariableDescriptor::output("lookup.outcome", "string", "Outcome")])
        .validate(validate)
        .handle(LookupHandler)
        .build()
        .unwrap();
    IntegrationModule::new("spec").with_integration(outbound).unwrap().with_integration(lookup).unwrap()
}

/// Writes a fixture file.
pub fn write_fixture(dir: &Path, integration: &str, yaml: &str) {
    fs::write(dir.join(format!("{integration}.yaml")), yaml).unwrap();
}

/// Starts a replay server over `dir` and returns its address.
pub async fn spawn_server(dir: &Path) -> SocketAddr {
    let options = RunnerOptions {
        fixtures_dir: dir.to_path_buf(),
        ..RunnerOptions::default()
    };
    let router = ReplayRouter::new(Arc::new(sample_module()), Arc::new(StandardTypeCatalog), options);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(ReplayServer::new(router).serve_listener(listener));
    addr
}
