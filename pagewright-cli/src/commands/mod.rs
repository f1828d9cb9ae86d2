//! CLI command implementations.

pub mod build;
pub mod report;
pub mod search;
pub mod verify;

pub use build::build_site;
pub use search::search_site;
pub use verify::verify_site;

use crate::BuildOverrides;
use anyhow::{Context, Result};
use pagewright_core::RawOptions;
use serde_yaml::Value;
use std::path::{Path, PathBuf};

/// Load the config file and apply command-line overrides.
pub fn load_options(config_path: &Path, overrides: &BuildOverrides) -> Result<RawOptions> {
    tracing::info!("Loading config from {:?}", config_path);
    let mut raw = RawOptions::from_file(config_path)
        .with_context(|| format!("Failed to load configuration from {}", config_path.display()))?;

    // Paths given on the command line are relative to the working directory,
    // not to the config file.
    let cwd = std::env::current_dir().context("Failed to read the working directory")?;
    let absolute = |path: &PathBuf| Value::String(cwd.join(path).to_string_lossy().into_owned());

    if !overrides.content_roots.is_empty() {
        let roots: Vec<Value> = overrides.content_roots.iter().map(absolute).collect();
        raw.set_override("content_roots", roots);
    }
    if let Some(out_dir) = &overrides.out_dir {
        raw.set_override("output_dir", absolute(out_dir));
    }
    if let Some(policy) = overrides.on_broken_links {
        raw.set_override("on_broken_links", policy.as_str());
    }
    if overrides.drafts {
        raw.set_override("include_drafts", true);
    }
    Ok(raw)
}
