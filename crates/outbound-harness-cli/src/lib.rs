// crates/outbound-harness-cli/src/lib.rs
// ============================================================================
// Module: Outbound Harness CLI
// Description: Command dispatcher for batch runs and the replay server.
// Purpose: Give compiled-in integration modules a ready-made entry point.
// Dependencies: clap, outbound-harness-config, outbound-harness-core, outbound-harness-server, tokio
// ============================================================================

//! ## Overview
//! Integration modules are compiled in, so the CLI is a library: a module
//! crate's `main` hands its [`IntegrationModule`] to [`run`]. `test` (the
//! default) runs the contract suite and exits with the failure count; `serve`
//! starts the interactive replay server. Both run on a current-thread tokio
//! runtime, and both read the harness configuration first.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod logging;
pub mod report;

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::ffi::OsString;
use std::io::Write;
use std::net::IpAddr;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Args;
use clap::Parser;
use clap::Subcommand;
use outbound_harness_config::HarnessConfig;
use outbound_harness_config::ServerConfig;
use outbound_harness_core::BatchRunner;
use outbound_harness_core::IntegrationModule;
use outbound_harness_core::RunnerOptions;
use outbound_harness_core::StandardTypeCatalog;
use outbound_harness_core::TypeCatalog;
use outbound_harness_core::UnmetPolicy;
use outbound_harness_server::ReplayRouter;
use outbound_harness_server::ReplayServer;
use thiserror::Error;
use tracing::info;

use crate::report::ReportFormat;
use crate::report::write_report;

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "outbound-harness", disable_help_subcommand = true)]
struct Cli {
    /// Path to the harness configuration file.
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,
    /// Selected subcommand; `test` when omitted.
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Supported subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the contract suite against every fixture.
    Test(TestCommand),
    /// Start the interactive replay server.
    Serve(ServeCommand),
}

/// Arguments for `test`.
#[derive(Args, Debug, Default)]
struct TestCommand {
    /// Fixture directory (overrides `fixtures.dir`).
    #[arg(long, value_name = "DIR")]
    fixtures: Option<PathBuf>,
    /// Fail verdicts on unmet network expectations.
    #[arg(long)]
    strict: bool,
    /// Report output format.
    #[arg(long, value_enum, default_value_t = ReportFormat::Text)]
    format: ReportFormat,
}

/// Arguments for `serve`.
#[derive(Args, Debug, Default)]
struct ServeCommand {
    /// Fixture directory (overrides `fixtures.dir`).
    #[arg(long, value_name = "DIR")]
    fixtures: Option<PathBuf>,
    /// Listen port (overrides the port of `server.bind`).
    #[arg(short, long)]
    port: Option<u16>,
    /// Listen address (overrides the host of `server.bind`).
    #[arg(long, value_name = "IP")]
    bind: Option<IpAddr>,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// CLI error wrapper.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct CliError {
    /// Human-readable error message.
    message: String,
}

impl CliError {
    /// Constructs a new [`CliError`].
    const fn new(message: String) -> Self {
        Self {
            message,
        }
    }
}

/// CLI result alias for fallible operations.
type CliResult<T> = Result<T, CliError>;

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// Runs the CLI for `module` with the process arguments and the reference
/// type catalog.
#[must_use]
pub fn run(module: IntegrationModule) -> ExitCode {
    run_with(module, Arc::new(StandardTypeCatalog), std::env::args_os())
}

/// Runs the CLI for `module` with a custom catalog and argument list.
#[must_use]
pub fn run_with<I, T>(module: IntegrationModule, catalog: Arc<dyn TypeCatalog>, args: I) -> ExitCode
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            return if err.use_stderr() { ExitCode::from(2) } else { ExitCode::SUCCESS };
        }
    };
    let mut stdout = std::io::stdout().lock();
    match execute(cli, module, catalog, &mut stdout, true) {
        Ok(code) => ExitCode::from(code),
        Err(err) => emit_error(&err.to_string()),
    }
}

/// Dispatches a parsed command and returns the process exit status.
fn execute(
    cli: Cli,
    module: IntegrationModule,
    catalog: Arc<dyn TypeCatalog>,
    out: &mut dyn Write,
    install_logging: bool,
) -> CliResult<u8> {
    let config = HarnessConfig::load(cli.config.as_deref()).map_err(|err| CliError::new(err.to_string()))?;
    if install_logging {
        logging::init(&config.logging).map_err(|err| CliError::new(err.to_string()))?;
    }
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|err| CliError::new(format!("runtime init failed: {err}")))?;

    match cli.command.unwrap_or_else(|| Commands::Test(TestCommand::default())) {
        Commands::Test(command) => {
            let options = test_options(&config, &command);
            let report = runtime.block_on(BatchRunner::new(&module, catalog.as_ref(), options).run());
            write_report(out, &report, command.format)
                .map_err(|err| CliError::new(format!("failed to write report: {err}")))?;
            info!(passed = report.passed(), failed = report.failed(), "suite finished");
            Ok(report.exit_code())
        }
        Commands::Serve(command) => {
            let addr = resolve_bind(&config.server, command.bind, command.port)?;
            let mut options = config.runner_options();
            if let Some(dir) = command.fixtures {
                options.fixtures_dir = dir;
            }
            let router = ReplayRouter::new(Arc::new(module), catalog, options);
            writeln!(out, "Harness running on http://{addr}")
                .map_err(|err| CliError::new(format!("failed to write output: {err}")))?;
            runtime.block_on(ReplayServer::new(router).serve(addr)).map_err(|err| CliError::new(err.to_string()))?;
            Ok(0)
        }
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Applies `test` overrides to the configured runner options.
fn test_options(config: &HarnessConfig, command: &TestCommand) -> RunnerOptions {
    let mut options = config.runner_options();
    if let Some(dir) = &command.fixtures {
        options.fixtures_dir.clone_from(dir);
    }
    if command.strict {
        options.unmet_policy = UnmetPolicy::StrictFail;
    }
    options
}

/// Resolves the server address from config plus `--bind` / `--port`.
fn resolve_bind(server: &ServerConfig, bind: Option<IpAddr>, port: Option<u16>) -> CliResult<SocketAddr> {
    let mut addr = server.bind_addr().map_err(|err| CliError::new(err.to_string()))?;
    if let Some(ip) = bind {
        addr.set_ip(ip);
    }
    if let Some(port) = port {
        addr.set_port(port);
    }
    Ok(addr)
}

/// Emits an error message to stderr and returns a failure exit code.
fn emit_error(message: &str) -> ExitCode {
    let mut stderr = std::io::stderr();
    let _ = writeln!(&mut stderr, "{message}");
    ExitCode::FAILURE
}
