// demos/spec-integration/src/lib.rs
// ============================================================================
// Module: Spec Integration
// Description: Reference integration module for the outbound harness.
// Purpose: Show a two-phase and a combined integration with their fixtures.
// Dependencies: outbound-harness-core, async-trait, serde_json
// ============================================================================

//! ## Overview
//! `outbound` posts the lead phone to the delivery endpoint and maps the raw
//! response to `spec.outcome`, `spec.billable` and `spec.reason`. `lookup`
//! does the same call shape through its handle context and reports the
//! returned phone status. Both require the `SPEC_ENV_VAR` credential.

// ============================================================================
// SECTION: Imports
// ============================================================================

use async_trait::async_trait;
use outbound_harness_core::Environment;
use outbound_harness_core::HandleContext;
use outbound_harness_core::Handler;
use outbound_harness_core::Integration;
use outbound_harness_core::IntegrationError;
use outbound_harness_core::IntegrationMetadata;
use outbound_harness_core::IntegrationModule;
use outbound_harness_core::ModuleError;
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

/// Credential both integrations read.
pub const SPEC_ENV_VAR: &str = "SPEC_ENV_VAR";

/// Message `validate` raises without credentials.
pub const MISSING_CREDENTIALS: &str = "Missing credentials, contact ActiveProspect Support";

/// Delivery endpoint for `outbound`.
pub const OUTBOUND_URL: &str = "https://activeprospect.com/leadconduit/";

/// Lookup endpoint for `lookup`.
pub const LOOKUP_URL: &str = "https://activeprospect.com/leadconduit/lookup";

/// Message returned for a missing or invalid phone.
const INVALID_PHONE: &str = "A valid phone number is required";

// ============================================================================
// SECTION: Module
// ============================================================================

/// Builds the module with both integrations.
///
/// # Errors
///
/// Returns [`ModuleError`] when an integration is malformed.
pub fn module() -> Result<IntegrationModule, ModuleError> {
    IntegrationModule::new("spec-integration")
        .with_metadata(ModuleMetadata {
            provider: Some("ActiveProspect".to_string()),
            name: Some("Spec Integration".to_string()),
            link: Some("https://activeprospect.com".to_string()),
            description: Some("Reference integrations exercised by the harness".to_string()),
            icon: Some("icon.png".to_string()),
        })
        .with_integration(outbound()?)?
        .with_integration(lookup()?)
}

/// Two-phase delivery integration.
fn outbound() -> Result<Integration, ModuleError> {
    Integration::builder("outbound")
        .request_variables(phone_variables())
        .response_variables(vec![
            VariableDescriptor::output("spec.outcome", "string", "The outcome of the post"),
            VariableDescriptor::output(
                "spec.reason",
                "string",
                "If the outcome was not success, this is the reason",
            ),
            VariableDescriptor::output(
                "spec.billable",
                "number",
                "The billable count. 1 if the event resulted in a valid outcome, or 0 if an error occured",
            ),
            VariableDescriptor::output("spec.phone_status", "string", "Status of the phone number (Good, Bad, or Ugly)"),
        ])
        .env_variables([SPEC_ENV_VAR])
        .validate(validate)
        .request(request)
        .response(response)
        .metadata(IntegrationMetadata {
            name: Some("Spec Outbound".to_string()),
            tag: Some("Spec".to_string()),
            integration_type: Some("recipient".to_string()),
            description: Some("Delivers the lead phone number".to_string()),
        })
        .build()
}

/// Combined lookup integration.
fn lookup() -> Result<Integration, ModuleError> {
    Integration::builder("lookup")
        .request_variables(phone_variables())
        .response_variables(vec![
            VariableDescriptor::output("spec.outcome", "string", "The outcome of the lookup"),
            VariableDescriptor::output("spec.reason", "string", "If the outcome was not success, this is the reason"),
            VariableDescriptor::output("spec.billable", "number", "1 when the lookup was billable, otherwise 0"),
            VariableDescriptor::output("spec.phone_status", "string", "Status of the phone number (Good, Bad, or Ugly)"),
        ])
        .env_variables([SPEC_ENV_VAR])
        .validate(validate)
        .handle(LookupHandler)
        .metadata(IntegrationMetadata {
            name: Some("Spec Lookup".to_string()),
            tag: Some("Spec".to_string()),
            integration_type: Some("enhancement".to_string()),
            description: Some("Looks up the status of the lead phone number".to_string()),
        })
        .build()
}

/// Request variables shared by both integrations.
fn phone_variables() -> Vec<VariableDescriptor> {
    vec![VariableDescriptor::required(
        "lead.phone_1",
        "phone",
        "Phone number, defaults to the lead's \"Phone 1\" field",
    )]
}

// ============================================================================
// SECTION: Functions
// ============================================================================

/// Requires credentials, then a valid phone.
///
/// # Errors
///
/// Returns [`IntegrationError`] when `SPEC_ENV_VAR` is unset.
pub fn validate(vars: &Value, env: &Environment) -> Result<Option<String>, IntegrationError> {
    if !env.is_set(SPEC_ENV_VAR) {
        return Err(IntegrationError::new(MISSING_CREDENTIALS));
    }
    if vars.pointer("/lead/phone_1/valid") == Some(&Value::Bool(true)) {
        Ok(None)
    } else {
        Ok(Some(INVALID_PHONE.to_string()))
    }
}

/// Builds the delivery request.
///
/// # Errors
///
/// Never fails; the signature matches the request builder contract.
pub fn request(vars: &Value, env: &Environment) -> Result<RequestSpec, IntegrationError> {
    Ok(RequestSpec {
        method: "POST".to_string(),
        url: OUTBOUND_URL.to_string(),
        headers: [
            ("Accept".to_string(), "application/json".to_string()),
            ("Authorization".to_string(), authorization(env)),
        ]
        .into_iter()
        .collect(),
        body: Some(format!("Telefonnummer={}", phone(vars))),
    })
}

/// Maps the delivery response.
///
/// # Errors
///
/// Never fails; the signature matches the response parser contract.
pub fn response(_vars: &Value, _req: &RequestSpec, res: &RawResponse) -> Result<Value, IntegrationError> {
    let spec = if res.status == 500 {
        json!({"outcome": "error", "billable": 0, "reason": "KABLOOEY"})
    } else if res.body.contains("bad") {
        json!({"outcome": "failure", "billable": 1, "reason": "something bad happened"})
    } else {
        json!({"outcome": "success", "billable": 1})
    };
    Ok(json!({ "spec": spec }))
}

/// Lookup handler.
struct LookupHandler;

#[async_trait]
impl Handler for LookupHandler {
    async fn handle(&self, vars: Value, ctx: HandleContext) -> Result<Value, IntegrationError> {
        let request = OutboundRequest::post(LOOKUP_URL)
            .header("Accept", "application/json")
            .header("Authorization", authorization(ctx.env()))
            .body(format!("Telefonnummer={}", phone(&vars)));
        let spec = match ctx.send(request).await {
            Ok(response) if (200 .. 300).contains(&response.status) => {
                let body = response.json().map_err(|err| IntegrationError::new(err.to_string()))?;
                json!({"outcome": "success", "billable": 1, "phone_status": body["phone_status"]})
            }
            Ok(response) => {
                json!({"outcome": "error", "billable": 0, "reason": format!("lookup returned {}", response.status)})
            }
            Err(err) => json!({"outcome": "error", "billable": 0, "reason": err.to_string()}),
        };
        Ok(json!({ "spec": spec }))
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Authorization header value.
fn authorization(env: &Environment) -> String {
    format!("key: {}", env.get(SPEC_ENV_VAR).unwrap_or_default())
}

/// Normalized phone, falling back to the raw text.
fn phone(vars: &Value) -> String {
    let phone = vars.pointer("/lead/phone_1");
    phone
        .and_then(|phone| phone.get("normal"))
        .or_else(|| phone.and_then(|phone| phone.get("raw")))
        .or(phone)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}
