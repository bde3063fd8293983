// crates/outbound-harness-core/tests/invocation.rs
// ============================================================================
// Module: Invocation Tests
// Description: Uniform invocation of validate, request, and response.
// Purpose: Validate outcome capture for values, errors, and panics.
// Dependencies: outbound-harness-core, tokio
// ============================================================================

//! ## Overview
//! Drives the sample two-phase and combined integrations through [`invoke`]
//! and checks that integration errors and panics surface as outcomes.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

mod common;

use outbound_harness_core::Call;
use outbound_harness_core::Environment;
use outbound_harness_core::FunctionCategory;
use outbound_harness_core::Integration;
use outbound_harness_core::IntegrationError;
use outbound_harness_core::InterceptionOptions;
use outbound_harness_core::InvocationError;
use outbound_harness_core::Outcome;
use outbound_harness_core::RawResponse;
use outbound_harness_core::RequestSpec;
use outbound_harness_core::StandardTypeCatalog;
use outbound_harness_core::VariableDescriptor;
use outbound_harness_core::invoke;
use outbound_harness_core::vars::parse_vars;
use serde_json::Value;
use serde_json::json;

use crate::common::CRED;
use crate::common::MISSING_CREDENTIALS;
use crate::common::lookup_integration;
use crate::common::outbound_integration;
use crate::common::phone_variables;

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Typed vars for the sample phone.
fn phone_vars() -> Value {
    parse_vars(&StandardTypeCatalog, &phone_variables(), json!({"lead": {"phone_1": "(513) 555-2379"}}))
}

/// Credential environment.
fn env() -> Environment {
    Environment::new().with(CRED, "secret")
}

// ============================================================================
// SECTION: Validate
// ============================================================================

#[tokio::test]
async fn validate_error_is_an_outcome_not_a_failure() {
    let integration = outbound_integration();
    let call = Call::new(phone_vars(), Environment::new());
    let result = invoke(&integration, FunctionCategory::Validate, call, &InterceptionOptions::default())
        .await
        .unwrap();
    assert_eq!(result.outcome, Outcome::Error(MISSING_CREDENTIALS.to_string()));
    assert_eq!(result.actual(), Some(json!(MISSING_CREDENTIALS)));
}

#[tokio::test]
async fn validate_passes_and_fails_on_phone_validity() {
    let integration = outbound_integration();
    let good = invoke(
        &integration,
        FunctionCategory::Validate,
        Call::new(phone_vars(), env()),
        &InterceptionOptions::default(),
    )
    .await
    .unwrap();
    assert_eq!(good.outcome, Outcome::Absent);

    let bad_vars = parse_vars(&StandardTypeCatalog, &phone_variables(), json!({"lead": {"phone_1": "12"}}));
    let bad = invoke(&integration, FunctionCategory::Validate, Call::new(bad_vars, env()), &InterceptionOptions::default())
        .await
        .unwrap();
    assert_eq!(bad.outcome, Outcome::Value(json!("A valid phone number is required")));
}

#[tokio::test]
async fn panicking_validate_is_captured() {
    let integration = Integration::builder("fragile")
        .request_variables(vec![VariableDescriptor::required("lead.email", "email", "Email")])
        .validate(|_vars: &Value, _env: &Environment| -> Result<Option<String>, IntegrationError> {
            panic!("validator exploded")
        })
        .request(|_vars: &Value, _env: &Environment| -> Result<RequestSpec, IntegrationError> {
            Ok(RequestSpec::default())
        })
        .response(|_vars: &Value, _req: &RequestSpec, _res: &RawResponse| -> Result<Value, IntegrationError> {
            Ok(Value::Null)
        })
        .build()
        .unwrap();
    let result = invoke(&integration, FunctionCategory::Validate, Call::default(), &InterceptionOptions::default())
        .await
        .unwrap();
    assert_eq!(result.outcome, Outcome::Error("validator exploded".to_string()));
}

// ============================================================================
// SECTION: Two-Phase
// ============================================================================

#[tokio::test]
async fn request_value_is_the_serialized_request_description() {
    let integration = outbound_integration();
    let result = invoke(
        &integration,
        FunctionCategory::Request,
        Call::new(phone_vars(), env()),
        &InterceptionOptions::default(),
    )
    .await
    .unwrap();
    assert_eq!(
        result.outcome,
        Outcome::Value(json!({
            "method": "POST",
            "url": "https://api.example.com/leads",
            "headers": {"Authorization": "key secret"},
            "body": "phone=5135552379"
        }))
    );
}

#[tokio::test]
async fn response_parses_supplied_raw_response() {
    let integration = outbound_integration();
    let call = Call {
        res: Some(RawResponse {
            status: 200,
            headers: [("Content-Type".to_string(), "application/json".to_string())].into_iter().collect(),
            body: r#"{"ok": true}"#.to_string(),
        }),
        ..Call::default()
    };
    let result = invoke(&integration, FunctionCategory::Response, call, &InterceptionOptions::default())
        .await
        .unwrap();
    assert_eq!(result.outcome, Outcome::Value(json!({"outcome": "success"})));

    let broken = Call {
        res: Some(RawResponse {
            status: 500,
            headers: Default::default(),
            body: "<html>".to_string(),
        }),
        ..Call::default()
    };
    let result = invoke(&integration, FunctionCategory::Response, broken, &InterceptionOptions::default())
        .await
        .unwrap();
    assert!(result.is_error());
}

// ============================================================================
// SECTION: Contract Mismatch
// ============================================================================

#[tokio::test]
async fn categories_outside_the_contract_are_rejected() {
    let combined = lookup_integration();
    let err = invoke(&combined, FunctionCategory::Request, Call::default(), &InterceptionOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        InvocationError::WrongContract {
            category: FunctionCategory::Request,
            contract: "handle",
            ..
        }
    ));

    let two_phase = outbound_integration();
    let err = invoke(&two_phase, FunctionCategory::Handle, Call::default(), &InterceptionOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "integration 'outbound' has no handle function (request/response contract)");
}
