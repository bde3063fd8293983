// demos/spec-integration/src/main.rs
// ============================================================================
// Module: Spec Integration Entry Point
// Description: Runs the harness CLI over the reference module.
// Purpose: `spec-integration test` or `spec-integration serve`.
// Dependencies: outbound-harness-cli, spec-integration
// ============================================================================

//! Binary wrapper around [`outbound_harness_cli::run`].

use std::io::Write;
use std::process::ExitCode;

fn main() -> ExitCode {
    match spec_integration::module() {
        Ok(module) => outbound_harness_cli::run(module),
        Err(err) => {
            let mut stderr = std::io::stderr();
            let _ = writeln!(&mut stderr, "{err}");
            ExitCode::FAILURE
        }
    }
}
