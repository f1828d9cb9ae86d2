//! Verify content health without writing output.

use super::{load_options, report};
use crate::BuildOverrides;
use anyhow::{Context, Result};
use pagewright_core::{BuildContext, BuildError, BuildReport, Diagnostic, Orchestrator};
use serde::Serialize;
use std::path::Path;

#[derive(Serialize)]
struct VerificationSummary<'a> {
    /// Absent when the build stopped on violations before producing a page set
    pages: Option<usize>,
    errors: usize,
    warnings: usize,
    ignored: usize,
    diagnostics: Vec<&'a Diagnostic>,
}

impl<'a> VerificationSummary<'a> {
    fn new(pages: Option<usize>, report: &'a BuildReport) -> Self {
        let errors = report.errors().count();
        let warnings = report.warnings().count();
        Self {
            pages,
            errors,
            warnings,
            ignored: report.len() - errors - warnings,
            diagnostics: report.iter().collect(),
        }
    }
}

/// Run the pipeline and surface every diagnostic; fails when any error was found.
pub fn verify_site(config_path: &Path, overrides: &BuildOverrides, json: bool) -> Result<()> {
    let raw = load_options(config_path, overrides)?;
    let context = BuildContext::with_builtins();

    let (pages, build_report) = match Orchestrator::new(&context).run(&raw) {
        Ok(output) => (Some(output.site.pages.len()), output.report),
        Err(BuildError::Violations(violations)) => (None, violations),
        Err(err) => return Err(err).context("Verification failed"),
    };
    let summary = VerificationSummary::new(pages, &build_report);

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        match pages {
            Some(pages) => println!(
                "Verification complete: {} pages, {}",
                pages,
                report::summary_line(&build_report)
            ),
            None => println!("Verification failed: {}", report::summary_line(&build_report)),
        }
        report::print_diagnostics(&build_report);
    }

    if summary.errors > 0 {
        anyhow::bail!("{} error(s) found", summary.errors);
    }
    Ok(())
}
