//! Search command implementation.

use super::load_options;
use crate::BuildOverrides;
use anyhow::{Context, Result};
use pagewright_core::artifacts::SEARCH_INDEX_FILE;
use pagewright_core::search::SearchHit;
use pagewright_core::{BuildContext, BuildReport, Orchestrator, SearchIndex};
use serde::Serialize;
use std::fs;
use std::path::Path;

#[derive(Serialize)]
struct SearchResult<'a> {
    id: &'a str,
    title: &'a str,
    url: &'a str,
    snippet: &'a str,
    score: u32,
}

impl<'a> From<&SearchHit<'a>> for SearchResult<'a> {
    fn from(hit: &SearchHit<'a>) -> Self {
        let document = hit.document;
        Self {
            id: &document.id,
            title: &document.title,
            url: &document.url,
            snippet: &document.snippet,
            score: hit.score,
        }
    }
}

/// Query the serialized search index from the configured output directory.
pub fn search_site(config_path: &Path, query: &str, limit: usize, json: bool) -> Result<()> {
    let raw = load_options(config_path, &BuildOverrides::default())?;
    let context = BuildContext::with_builtins();
    let config = Orchestrator::new(&context)
        .configure(&raw, &mut BuildReport::new())
        .context("Failed to load configuration")?;

    let index_path = config.output_dir().join(SEARCH_INDEX_FILE);
    if !index_path.exists() {
        anyhow::bail!(
            "Search index not found at {}. Run `pagewright build` first.",
            index_path.display()
        );
    }
    let index_json = fs::read_to_string(&index_path).context("Failed to read search index")?;
    let index = SearchIndex::from_json(&index_json).context("Failed to parse search index")?;

    let hits = index.query(query, limit);
    if json {
        let results: Vec<SearchResult<'_>> = hits.iter().map(SearchResult::from).collect();
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }

    if hits.is_empty() {
        println!("No results found for '{}'", query);
        return Ok(());
    }
    println!("Found {} results for '{}':\n", hits.len(), query);
    for hit in &hits {
        println!("{}", hit.document.title);
        println!("  {}", hit.document.url);
        if !hit.document.snippet.is_empty() {
            println!("  {}", hit.document.snippet);
        }
        println!();
    }
    Ok(())
}
