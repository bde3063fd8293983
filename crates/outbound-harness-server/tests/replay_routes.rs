// crates/outbound-harness-server/tests/replay_routes.rs
// ============================================================================
// Module: Replay Route Tests
// Description: HTTP-level checks of the replay server routes.
// Purpose: Confirm routing, fixture replay verdicts, and error statuses.
// Dependencies: outbound-harness-server, reqwest, tempfile, tokio
// ============================================================================

//! Replay server route tests over an ephemeral listener.

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

use std::net::SocketAddr;

use reqwest::StatusCode;
use serde_json::Value;
use serde_json::json;
use tempfile::TempDir;

use crate::common::LOOKUP_YAML;
use crate::common::MISSING_CREDENTIALS;
use crate::common::OUTBOUND_YAML;
use crate::common::spawn_server;
use crate::common::write_fixture;

/// Fixture directory with both sample files.
fn fixtures() -> TempDir {
    let dir = TempDir::new().unwrap();
    write_fixture(dir.path(), "lookup", LOOKUP_YAML);
    write_fixture(dir.path(), "outbound", OUTBOUND_YAML);
    dir
}

/// Encodes form fields without relying on the client's form feature.
fn encode(fields: &[(&str, &str)]) -> String {
    fields
        .iter()
        .map(|(name, value)| format!("{}={}", encode_component(name), encode_component(value)))
        .collect::<Vec<_>>()
        .join("&")
}

/// Percent-encodes one form component.
fn encode_component(text: &str) -> String {
    let mut encoded = String::new();
    for byte in text.bytes() {
        match byte {
            b'A' ..= b'Z' | b'a' ..= b'z' | b'0' ..= b'9' | b'-' | b'_' | b'.' | b'~' => encoded.push(char::from(byte)),
            other => encoded.push_str(&format!("%{other:02X}")),
        }
    }
    encoded
}

/// GETs a path as JSON.
async fn get_json(addr: SocketAddr, path: &str) -> (StatusCode, Value) {
    let response = reqwest::Client::new()
        .get(format!("http://{addr}{path}"))
        .header("accept", "application/json")
        .send()
        .await
        .unwrap();
    let status = response.status();
    let text = response.text().await.unwrap();
    (status, serde_json::from_str(&text).unwrap_or(Value::String(text)))
}

/// POSTs form fields to a path, asking for JSON.
async fn post_json(addr: SocketAddr, path: &str, fields: &[(&str, &str)]) -> (StatusCode, Value) {
    let response = reqwest::Client::new()
        .post(format!("http://{addr}{path}"))
        .header("accept", "application/json")
        .header("content-type", "application/x-www-form-urlencoded")
        .body(encode(fields))
        .send()
        .await
        .unwrap();
    let status = response.status();
    let text = response.text().await.unwrap();
    (status, serde_json::from_str(&text).unwrap_or(Value::String(text)))
}

#[tokio::test]
async fn index_page_lists_integrations() {
    let dir = fixtures();
    let addr = spawn_server(dir.path()).await;
    let response = reqwest::Client::new().get(format!("http://{addr}/")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let html = response.text().await.unwrap();
    assert!(html.contains("Harness for spec"));
    assert!(html.contains("href=\"/handle/lookup\""));
    assert!(html.contains("href=\"/request/outbound\""));
}

#[tokio::test]
async fn unknown_routes_are_not_found() {
    let dir = fixtures();
    let addr = spawn_server(dir.path()).await;
    for path in ["/foo/bar", "/validate/missing", "/handle/outbound", "/validate/outbound/7", "/a/b/c/d"] {
        let (status, _) = get_json(addr, path).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{path}");
    }
}

#[tokio::test]
async fn live_validate_without_credentials_reports_the_thrown_message() {
    let dir = fixtures();
    let addr = spawn_server(dir.path()).await;
    let (status, context) = post_json(addr, "/validate/outbound", &[("lead.phone_1", "5135552379")]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(context["result"]["actual"], json!(MISSING_CREDENTIALS));
    assert_eq!(context["result"]["matched"], Value::Null);
    assert_eq!(context["values"]["lead.phone_1"], json!("5135552379"));
}

#[tokio::test]
async fn live_validate_with_credentials_returns_nothing() {
    let dir = fixtures();
    let addr = spawn_server(dir.path()).await;
    let (status, context) =
        post_json(addr, "/validate/outbound", &[("lead.phone_1", "5135552379"), ("env.SPEC_ENV_VAR", "secret")]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(context["result"]["actual"], Value::Null);
}

#[tokio::test]
async fn validate_fixture_page_prefills_vars_and_credentials() {
    let dir = fixtures();
    let addr = spawn_server(dir.path()).await;
    let (status, context) = get_json(addr, "/validate/outbound/0").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(context["values"]["lead.phone_1"], json!("12"));
    assert_eq!(context["values"]["env.SPEC_ENV_VAR"], json!("dummy.value"));
    assert_eq!(context["fixtures"][0]["label"], json!("should reject short phones"));
}

#[tokio::test]
async fn validate_fixture_replay_is_judged() {
    let dir = fixtures();
    let addr = spawn_server(dir.path()).await;
    let (_, context) =
        post_json(addr, "/validate/outbound/0", &[("lead.phone_1", "12"), ("env.SPEC_ENV_VAR", "dummy.value")]).await;
    assert_eq!(context["result"]["matched"], json!(true));
    let (_, context) = post_json(addr, "/validate/outbound/0", &[("lead.phone_1", "12")]).await;
    assert_eq!(context["result"]["matched"], json!(false));
}

#[tokio::test]
async fn response_page_without_fixture_shows_the_template() {
    let dir = fixtures();
    let addr = spawn_server(dir.path()).await;
    let (status, context) = get_json(addr, "/response/outbound").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(context["values"]["status"], json!("200"));
    assert_eq!(context["values"]["header[Content-Type]"], json!("application/json"));
    assert_eq!(context["values"]["body"], json!("{  \"sample\": true }"));
}

#[tokio::test]
async fn response_replay_builds_the_raw_response_from_fields() {
    let dir = fixtures();
    let addr = spawn_server(dir.path()).await;
    let fields =
        [("status", "200"), ("header[Content-Type]", "application/json"), ("body", "{\"ok\": true}")];
    let (status, context) = post_json(addr, "/response/outbound/0", &fields).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(context["result"]["actual"], json!({"outcome": "success"}));
    assert_eq!(context["result"]["matched"], json!(true));

    let (status, _) = post_json(addr, "/response/outbound", &[("status", "abc")]).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn handle_fixture_replay_passes_with_the_fixture_phone() {
    let dir = fixtures();
    let addr = spawn_server(dir.path()).await;
    let (status, context) = post_json(addr, "/handle/lookup/0", &[("lead.phone_1", "513-555-2379")]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(context["result"]["matched"], json!(true), "{context}");
    assert_eq!(context["result"]["nocks_unmet"], json!([]));
    assert_eq!(context["extra_vars"]["account.id"], json!("acct-7"));
}

#[tokio::test]
async fn handle_fixture_replay_with_altered_phone_reports_unmet_network() {
    let dir = fixtures();
    let addr = spawn_server(dir.path()).await;
    let (status, context) = post_json(addr, "/handle/lookup/0", &[("lead.phone_1", "513-555-0000")]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(context["result"]["matched"], json!(false));
    let unmet = context["result"]["nocks_unmet"].as_array().unwrap();
    assert_eq!(unmet.len(), 1);
    assert!(unmet[0].as_str().unwrap().starts_with("POST https://api.example.com:443/v1/lookup"));
}

#[tokio::test]
async fn live_handle_uses_caller_supplied_network_expectations() {
    let dir = fixtures();
    let addr = spawn_server(dir.path()).await;
    let nock = json!({
        "url": "https://api.example.com",
        "verb": "POST",
        "path": "/v1/lookup",
        "responseData": {"carrier": "Live Carrier"}
    })
    .to_string();
    let (status, context) =
        post_json(addr, "/handle/lookup", &[("lead.phone_1", "513-555-2379"), ("nockOptions", &nock)]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(context["result"]["actual"]["lookup"]["carrier"], json!("Live Carrier"));
    assert_eq!(context["result"]["matched"], Value::Null);

    let (status, _) =
        post_json(addr, "/handle/lookup", &[("lead.phone_1", "513-555-2379"), ("nockOptions", "{not json")]).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn malformed_fixture_file_is_a_server_error() {
    let dir = fixtures();
    write_fixture(dir.path(), "outbound", "validate: [unclosed");
    let addr = spawn_server(dir.path()).await;
    let (status, _) = get_json(addr, "/validate/outbound").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
}
