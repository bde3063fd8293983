// crates/outbound-harness-core/tests/common/mod.rs
// ============================================================================
// Module: Common Test Fixtures
// Description: Sample integrations and helpers shared by core tests.
// Purpose: Provide one two-phase and one combined integration to drive the engine.
// Dependencies: outbound-harness-core, tempfile, tracing-subscriber
// ============================================================================

//! ## Overview
//! `outbound` is a two-phase integration gated on the `CRED` credential.
//! `lookup` is a combined integration posting the lead phone to a lookup API
//! through its handle context.

#![allow(dead_code, reason = "Shared test helpers may be unused in some cases.")]

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::path::Path;

use async_trait::async_trait;
use outbound_harness_core::Environment;
use outbound_harness_core::HandleContext;
use outbound_harness_core::Handler;
use outbound_harness_core::Integration;
use outbound_harness_core::IntegrationError;
use outbound_harness_core::IntegrationMetadata;
use outbound_harness_core::IntegrationModule;
use outbound_harness_core::ModuleMetadata;
use outbound_harness_core::OutboundRequest;
use outbound_harness_core::RawResponse;
use outbound_harness_core::RequestSpec;
use outbound_harness_core::VariableDescriptor;
use serde_json::Value;
use serde_json::json;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Credential name read by the sample integrations.
pub const CRED: &str = "CRED";

/// Message raised by `validate` without credentials.
pub const MISSING_CREDENTIALS: &str = "Missing credentials, contact ActiveProspect Support";

/// Lookup endpoint origin.
pub const LOOKUP_ORIGIN: &str = "https://api.example.com";

// ============================================================================
// SECTION: Tracing
// ============================================================================

/// Installs a test-writer subscriber once per test binary.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

// ============================================================================
// SECTION: Sample Integrations
// ============================================================================

/// Request variables shared by both samples.
pub fn phone_variables() -> Vec<VariableDescriptor> {
    vec![
        VariableDescriptor::required("lead.phone_1", "phone", "Lead phone number"),
        VariableDescriptor::optional("lead.email", "email", "Lead email address"),
    ]
}

/// Shared validate: credentials first, then a valid phone.
pub fn validate_phone(vars: &Value, env: &Environment) -> Result<Option<String>, IntegrationError> {
    if !env.is_set(CRED) {
        return Err(IntegrationError::new(MISSING_CREDENTIALS));
    }
    if vars.pointer("/lead/phone_1/valid") == Some(&Value::Bool(true)) {
        Ok(None)
    } else {
        Ok(Some("A valid phone number is required".to_string()))
    }
}

/// Normal phone text from typed vars.
fn normal_phone(vars: &Value) -> String {
    vars.pointer("/lead/phone_1/normal").and_then(Value::as_str).unwrap_or_default().to_string()
}

/// Two-phase sample integration.
pub fn outbound_integration() -> Integration {
    Integration::builder("outbound")
        .request_variables(phone_variables())
        .response_variables(vec![VariableDescriptor::output("outcome", "string", "Outcome")])
        .env_variables([CRED])
        .validate(validate_phone)
        .request(|vars: &Value, env: &Environment| -> Result<RequestSpec, IntegrationError> {
            Ok(RequestSpec {
                method: "POST".to_string(),
                url: "https://api.example.com/leads".to_string(),
                headers: [("Authorization".to_string(), format!("key {}", env.get(CRED).unwrap_or_default()))]
                    .into_iter()
                    .collect(),
                body: Some(format!("phone={}", normal_phone(vars))),
            })
        })
        .response(|_vars: &Value, _req: &RequestSpec, res: &RawResponse| -> Result<Value, IntegrationError> {
            let body: Value = serde_json::from_str(&res.body)
                .map_err(|err| IntegrationError::new(format!("bad body: {err}")))?;
            let outcome = if body.get("ok") == Some(&Value::Bool(true)) { "success" } else { "failure" };
            Ok(json!({"outcome": outcome}))
        })
        .metadata(IntegrationMetadata {
            name: Some("Outbound".to_string()),
            tag: Some("Sample".to_string()),
            integration_type: Some("marketing".to_string()),
            description: Some("Posts leads".to_string()),
        })
        .build()
        .unwrap()
}

/// Combined sample handler.
pub struct LookupHandler;

#[async_trait]
impl Handler for LookupHandler {
    async fn handle(&self, vars: Value, ctx: HandleContext) -> Result<Value, IntegrationError> {
        let request = OutboundRequest::post(format!("{LOOKUP_ORIGIN}/v1/lookup"))
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(format!("phone={}", normal_phone(&vars)));
        match ctx.send(request).await {
            Ok(response) => {
                let body = response.json().map_err(|err| IntegrationError::new(err.to_string()))?;
                Ok(json!({"lookup": {"outcome": "success", "carrier": body["carrier"]}}))
            }
            Err(err) => Ok(json!({"lookup": {"outcome": "error", "reason": err.to_string()}})),
        }
    }
}

/// Combined sample integration.
pub fn lookup_integration() -> Integration {
    Integration::builder("lookup")
        .request_variables(phone_variables())
        .response_variables(vec![VariableDescriptor::output("lookup.outcome", "string", "Outcome")])
        .env_variables([CRED])
        .validate(validate_phone)
        .handle(LookupHandler)
        .metadata(IntegrationMetadata {
            name: Some("Lookup".to_string()),
            tag: Some("Sample".to_string()),
            integration_type: Some("enhancement".to_string()),
            description: Some("Looks up a phone carrier".to_string()),
        })
        .build()
        .unwrap()
}

/// Module with both samples and complete metadata.
pub fn sample_module() -> IntegrationModule {
    IntegrationModule::new("sample")
        .with_metadata(ModuleMetadata {
            provider: Some("Example".to_string()),
            name: Some("Sample".to_string()),
            link: Some("https://example.com".to_string()),
            description: Some("Sample integrations".to_string()),
            icon: Some("icon.png".to_string()),
        })
        .with_integration(outbound_integration())
        .unwrap()
        .with_integration(lookup_integration())
        .unwrap()
}

/// Writes a fixture file for an integration.
pub fn write_fixture(dir: &Path, integration: &str, yaml: &str) {
    fs::write(dir.join(format!("{integration}.yaml")), yaml).unwrap();
}
