//! Build command implementation.

use super::{load_options, report};
use crate::BuildOverrides;
use anyhow::{Context, Result};
use pagewright_core::{BuildContext, BuildError, Orchestrator};
use std::path::Path;

/// Run the full pipeline and write every artifact to the output directory.
pub fn build_site(config_path: &Path, overrides: &BuildOverrides) -> Result<()> {
    let raw = load_options(config_path, overrides)?;
    let context = BuildContext::with_builtins();

    let output = match Orchestrator::new(&context).run(&raw) {
        Ok(output) => output,
        Err(BuildError::Violations(violations)) => {
            report::print_diagnostics(&violations);
            anyhow::bail!("Build failed: {}", report::summary_line(&violations));
        }
        Err(err) => return Err(err).context("Build failed"),
    };

    report::print_diagnostics(&output.report);
    let dir = output.write().context("Failed to write artifacts")?;

    println!(
        "Built {} pages ({} artifacts) into {}",
        output.site.pages.len(),
        output.artifacts.len(),
        dir.display()
    );
    if !output.report.is_empty() {
        println!("{}", report::summary_line(&output.report));
    }
    Ok(())
}
