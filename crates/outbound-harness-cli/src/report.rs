// crates/outbound-harness-cli/src/report.rs
// ============================================================================
// Module: Suite Report Output
// Description: Text and JSON renderings of a batch run.
// Purpose: Print suite results for humans and for tooling.
// Dependencies: outbound-harness-core, serde_json
// ============================================================================

//! ## Overview
//! The text rendering groups cases under their suite path in execution order
//! and closes with a `passing / failing / skipped` summary. The JSON rendering
//! is the serialized [`SuiteReport`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io;
use std::io::Write;

use clap::ValueEnum;
use outbound_harness_core::CaseStatus;
use outbound_harness_core::SuiteReport;

// ============================================================================
// SECTION: Formats
// ============================================================================

/// Report output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    /// Indented, human-readable listing.
    #[default]
    Text,
    /// Pretty-printed JSON.
    Json,
}

/// Writes `report` to `out`.
///
/// # Errors
///
/// Returns an I/O error when writing fails.
pub fn write_report(out: &mut dyn Write, report: &SuiteReport, format: ReportFormat) -> io::Result<()> {
    match format {
        ReportFormat::Text => write_text(out, report),
        ReportFormat::Json => {
            serde_json::to_writer_pretty(&mut *out, report).map_err(io::Error::other)?;
            writeln!(out)
        }
    }
}

/// Writes the text rendering.
fn write_text(out: &mut dyn Write, report: &SuiteReport) -> io::Result<()> {
    writeln!(out, "{}", report.module)?;
    let mut current: Option<&str> = None;
    for case in &report.cases {
        if current != Some(case.suite.as_str()) {
            writeln!(out, "  {}", case.suite)?;
            current = Some(case.suite.as_str());
        }
        let marker = match case.status {
            CaseStatus::Passed => "ok  ",
            CaseStatus::Failed => "FAIL",
            CaseStatus::Skipped => "skip",
        };
        writeln!(out, "    {marker} {}", case.name)?;
        for line in &case.detail {
            writeln!(out, "           {line}")?;
        }
    }
    writeln!(out)?;
    writeln!(out, "{} passing, {} failing, {} skipped", report.passed(), report.failed(), report.skipped())
}

// ============================================================================
// SECTION: Tests
// ============================================================================
