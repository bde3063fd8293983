// crates/outbound-harness-core/tests/runner.rs
// ============================================================================
// Module: Batch Runner Tests
// Description: Full suite runs over the sample module.
// Purpose: Validate suite structure, failure accounting, and exit codes.
// Dependencies: outbound-harness-core, tempfile, tokio
// ============================================================================

//! ## Overview
//! Runs [`BatchRunner`] against temporary fixture directories and inspects
//! the resulting [`SuiteReport`].

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

use std::path::Path;

use outbound_harness_core::BatchRunner;
use outbound_harness_core::CaseStatus;
use outbound_harness_core::IntegrationModule;
use outbound_harness_core::RunnerOptions;
use outbound_harness_core::StandardTypeCatalog;
use outbound_harness_core::SuiteReport;
use outbound_harness_core::UnmetPolicy;
use tempfile::TempDir;

use crate::common::init_test_tracing;
use crate::common::outbound_integration;
use crate::common::sample_module;
use crate::common::write_fixture;

// ============================================================================
// SECTION: Fixtures
// ============================================================================

/// Complete fixture file for the two-phase sample.
const OUTBOUND_YAML: &str = r#"
validate:
  - vars:
      lead:
        phone_1: 513-555-2379
  - vars:
      lead:
        phone_1: "12"
    expected: A valid phone number is required
request:
  - vars:
      lead:
        phone_1: (513) 555-2379
    expected:
      method: POST
      url: https://api.example.com/leads
      headers:
        Authorization: key dummy.value
      body: phone=5135552379
response:
  - res:
      status: 200
      headers:
        Content-Type: application/json
      body:
        ok: true
    expected:
      outcome: success
  - res:
      status: 200
      body: '{"ok": false}'
    expected: !regex "fail"
"#;

/// Handle fixture file for the combined sample.
const LOOKUP_YAML: &str = r#"
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
"#;

/// Runs the suite for `module` over `dir`.
async fn run(module: &IntegrationModule, dir: &Path, unmet_policy: UnmetPolicy) -> SuiteReport {
    let options = RunnerOptions {
        fixtures_dir: dir.to_path_buf(),
        unmet_policy,
        ..RunnerOptions::default()
    };
    BatchRunner::new(module, &StandardTypeCatalog, options).run().await
}

/// Renders failures for assertion messages.
fn describe_failures(report: &SuiteReport) -> String {
    report
        .failures()
        .map(|case| format!("{} > {}: {}", case.suite, case.name, case.detail.join("; ")))
        .collect::<Vec<_>>()
        .join("\n")
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[tokio::test]
async fn sample_module_with_fixtures_passes() {
    init_test_tracing();
    let dir = TempDir::new().unwrap();
    write_fixture(dir.path(), "outbound", OUTBOUND_YAML);
    write_fixture(dir.path(), "lookup", LOOKUP_YAML);
    let report = run(&sample_module(), dir.path(), UnmetPolicy::SoftReport).await;
    assert_eq!(report.failed(), 0, "{}", describe_failures(&report));
    assert_eq!(report.exit_code(), 0);

    let suites: Vec<&str> = report.cases.iter().map(|case| case.suite.as_str()).collect();
    assert_eq!(suites.first(), Some(&"Harness initialization"));
    assert!(suites.contains(&"lookup / Handle function"));
    assert!(suites.contains(&"outbound / Response function"));
    assert!(
        report
            .cases
            .iter()
            .any(|case| case.suite == "lookup / Handle function" && case.name == "should return the carrier")
    );
    assert!(
        report
            .cases
            .iter()
            .any(|case| case.suite == "lookup / Validate function" && case.name.contains("(generated)"))
    );
}

#[tokio::test]
async fn handle_fixture_with_altered_phone_fails() {
    let dir = TempDir::new().unwrap();
    write_fixture(dir.path(), "outbound", OUTBOUND_YAML);
    write_fixture(dir.path(), "lookup", &LOOKUP_YAML.replace("513-555-2379", "512-555-1212"));
    let report = run(&sample_module(), dir.path(), UnmetPolicy::SoftReport).await;
    assert_eq!(report.failed(), 1, "{}", describe_failures(&report));
    let failure = report.failures().next().unwrap();
    assert_eq!(failure.suite, "lookup / Handle function");
    assert!(failure.detail.iter().any(|line| line.starts_with("unmet: POST https://api.example.com:443/v1/lookup")));
}

#[tokio::test]
async fn missing_module_metadata_is_one_failure() {
    let dir = TempDir::new().unwrap();
    let module = IntegrationModule::new("bare").with_integration(outbound_integration()).unwrap();
    let report = run(&module, dir.path(), UnmetPolicy::SoftReport).await;
    assert_eq!(report.failed(), 1, "{}", describe_failures(&report));
    let failure = report.failures().next().unwrap();
    assert_eq!(failure.name, "should have module metadata");
    assert_eq!(report.exit_code(), 1);
}

#[tokio::test]
async fn malformed_fixture_fails_loading_and_skips_fixture_cases() {
    let dir = TempDir::new().unwrap();
    write_fixture(dir.path(), "outbound", "validate: [unclosed");
    write_fixture(dir.path(), "lookup", LOOKUP_YAML);
    let report = run(&sample_module(), dir.path(), UnmetPolicy::SoftReport).await;
    assert_eq!(report.failed(), 1, "{}", describe_failures(&report));
    let failure = report.failures().next().unwrap();
    assert_eq!(failure.suite, "outbound / Fixtures");
    assert!(report.skipped() >= 1);
    assert!(!report.cases.iter().any(|case| case.suite == "outbound / Request function"));
}

#[tokio::test]
async fn empty_module_fails_to_load() {
    let dir = TempDir::new().unwrap();
    let report = run(&IntegrationModule::new("empty"), dir.path(), UnmetPolicy::SoftReport).await;
    assert_eq!(report.cases.len(), 1);
    assert_eq!(report.cases[0].status, CaseStatus::Failed);
    assert_eq!(report.cases[0].detail, vec!["no outbound integrations found in module 'empty'".to_string()]);
}

#[tokio::test]
async fn strict_policy_turns_unmet_expectations_into_failures() {
    let dir = TempDir::new().unwrap();
    write_fixture(dir.path(), "outbound", OUTBOUND_YAML);
    let loose = LOOKUP_YAML.replace(
        "    expected:\n      lookup:\n        outcome: success\n        carrier: Acme Wireless\n",
        "    expected: !regex \"lookup\"\n",
    );
    write_fixture(dir.path(), "lookup", &loose.replace("513-555-2379", "512-555-1212"));

    let soft = run(&sample_module(), dir.path(), UnmetPolicy::SoftReport).await;
    assert_eq!(soft.failed(), 0, "{}", describe_failures(&soft));
    let strict = run(&sample_module(), dir.path(), UnmetPolicy::StrictFail).await;
    assert_eq!(strict.failed(), 1, "{}", describe_failures(&strict));
}
