// crates/outbound-harness-server/src/lib.rs
// ============================================================================
// Module: Outbound Harness Server Library
// Description: Interactive replay server for integration fixtures.
// Purpose: Re-run fixtures or live form input through the engine in a browser.
// Dependencies: outbound-harness-core, axum, tokio
// ============================================================================

//! ## Overview
//! The [`router`] derives every page from `{category, integration, fixture?}`
//! and owns invocation; the [`render`] module turns contexts into pages; the
//! [`server`] module wires both into axum.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod render;
pub mod router;
pub mod server;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use render::BasicHtmlRenderer;
pub use render::PageRenderer;
pub use router::RenderContext;
pub use router::ReplayError;
pub use router::ReplayOutcome;
pub use router::ReplayRouter;
pub use router::RouteTarget;
pub use server::ReplayServer;
pub use server::ServerError;
