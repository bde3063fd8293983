// crates/outbound-harness-core/src/lib.rs
// ============================================================================
// Module: Outbound Harness Core Library
// Description: Fixture-driven verification engine for outbound integrations.
// Purpose: Load fixtures, invoke integrations, intercept network calls, judge.
// Dependencies: async-trait, regex, reqwest, serde, serde_yaml, tokio, tracing
// ============================================================================

//! ## Overview
//! `outbound-harness-core` is the engine shared by the batch runner and the
//! interactive replay server. Data flows from the [`fixture`] store and the
//! variable contract through the [`invocation`] adapter (and, for `handle`,
//! the [`interception`] harness) into the [`expectation`] matcher.
//!
//! Integration code receives credentials only through
//! [`model::Environment`] and reaches the network only through
//! [`transport::HttpTransport`].

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod catalog;
pub mod descriptor;
pub mod expectation;
pub mod fixture;
pub mod interception;
pub mod invocation;
pub mod model;
pub mod runner;
pub mod transport;
pub mod vars;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use catalog::CatalogError;
pub use catalog::StandardTypeCatalog;
pub use catalog::TypeCatalog;
pub use catalog::valid_type_names;
pub use descriptor::DescriptorRole;
pub use descriptor::DescriptorViolation;
pub use descriptor::validate_descriptors;
pub use expectation::Expectation;
pub use expectation::Pattern;
pub use expectation::UnmetPolicy;
pub use expectation::Verdict;
pub use expectation::judge;
pub use expectation::matches;
pub use fixture::Fixture;
pub use fixture::FixtureError;
pub use fixture::FixtureSet;
pub use fixture::FixtureStore;
pub use fixture::FunctionCategory;
pub use fixture::synthesize_missing;
pub use fixture::synthesize_vars;
pub use interception::InterceptionOptions;
pub use interception::InterceptionScope;
pub use interception::MatchRule;
pub use interception::NetworkExpectation;
pub use interception::invoke_handle;
pub use invocation::Call;
pub use invocation::InvocationError;
pub use invocation::InvocationResult;
pub use invocation::Outcome;
pub use invocation::invoke;
pub use model::Contract;
pub use model::Environment;
pub use model::Handler;
pub use model::Integration;
pub use model::IntegrationBuilder;
pub use model::IntegrationError;
pub use model::IntegrationMetadata;
pub use model::IntegrationModule;
pub use model::ModuleError;
pub use model::ModuleMetadata;
pub use model::RawResponse;
pub use model::RequestBuilder;
pub use model::RequestSpec;
pub use model::ResponseParser;
pub use model::Validator;
pub use model::VariableDescriptor;
pub use runner::BatchRunner;
pub use runner::CaseReport;
pub use runner::CaseStatus;
pub use runner::RunnerOptions;
pub use runner::SuiteReport;
pub use transport::HandleContext;
pub use transport::HttpTransport;
pub use transport::LiveTransport;
pub use transport::LiveTransportConfig;
pub use transport::OutboundRequest;
pub use transport::OutboundResponse;
pub use transport::TransportError;
