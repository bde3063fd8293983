// crates/outbound-harness-config/src/lib.rs
// ============================================================================
// Module: Outbound Harness Config Library
// Description: Canonical config model and validation.
// Purpose: Single source of truth for outbound-harness.toml semantics.
// Dependencies: outbound-harness-core, serde, toml
// ============================================================================

//! ## Overview
//! `outbound-harness-config` defines the configuration shared by the batch
//! runner, the replay server, and the CLI logging bootstrap. Loading applies
//! strict size, encoding, and path limits before validation.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::*;
