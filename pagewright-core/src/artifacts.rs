//! Build artifacts: the files a build hands to the renderer and the browser.

use crate::config::BuildConfig;
use crate::diagnostics::BuildReport;
use crate::error::BuildError;
use crate::models::{PageRecord, SiteIndex};
use crate::search::SearchIndex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const SEARCH_INDEX_FILE: &str = "search-index.json";
pub const PAGES_FILE: &str = "pages.json";
pub const NAVIGATION_FILE: &str = "navigation.json";
pub const LINK_GRAPH_FILE: &str = "link-graph.json";

/// A file to be written under the output directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// Relative, `/`-separated path
    pub path: String,
    pub contents: String,
}

impl Artifact {
    pub fn new(path: impl Into<String>, contents: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            contents: contents.into(),
        }
    }
}

/// Artifacts keyed by path, in path order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArtifactSet {
    artifacts: BTreeMap<String, String>,
}

impl ArtifactSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an artifact; a later artifact with the same path replaces the earlier one.
    pub fn insert(&mut self, artifact: Artifact) -> Result<(), BuildError> {
        let path = clean_artifact_path(&artifact.path)?;
        if self.artifacts.insert(path.clone(), artifact.contents).is_some() {
            tracing::debug!("Artifact {} replaced", path);
        }
        Ok(())
    }

    pub fn insert_json<T: Serialize>(&mut self, path: &str, value: &T, pretty: bool) -> Result<(), BuildError> {
        let contents = if pretty {
            serde_json::to_string_pretty(value)
        } else {
            serde_json::to_string(value)
        }
        .map_err(|source| BuildError::Serialize {
            path: path.to_string(),
            source,
        })?;
        self.insert(Artifact::new(path, contents))
    }

    pub fn get(&self, path: &str) -> Option<&str> {
        self.artifacts.get(path).map(String::as_str)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.artifacts.contains_key(path)
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.artifacts.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.artifacts.iter().map(|(p, c)| (p.as_str(), c.as_str()))
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    pub fn write_to(&self, dir: &Path) -> Result<(), BuildError> {
        fs::create_dir_all(dir).map_err(|e| BuildError::io(dir, e))?;
        for (rel, contents) in &self.artifacts {
            let target = dir.join(rel);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).map_err(|e| BuildError::io(parent, e))?;
            }
            fs::write(&target, contents).map_err(|e| BuildError::io(&target, e))?;
        }
        tracing::info!("Wrote {} artifacts to {}", self.artifacts.len(), dir.display());
        Ok(())
    }
}

fn clean_artifact_path(path: &str) -> Result<String, BuildError> {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty() && *s != ".").collect();
    let invalid = path.starts_with('/')
        || path.contains('\\')
        || segments.is_empty()
        || segments.iter().any(|s| *s == ".." || s.contains(':'));
    if invalid {
        return Err(BuildError::ArtifactPath(path.to_string()));
    }
    Ok(segments.join("/"))
}

#[derive(Serialize)]
struct PageManifest<'a> {
    /// blake3 over every page identifier and content hash
    fingerprint: String,
    pages: Vec<&'a PageRecord>,
}

/// The artifacts every build emits before post-processing.
pub fn core_artifacts(site: &SiteIndex, search_index: &SearchIndex) -> Result<ArtifactSet, BuildError> {
    let mut artifacts = ArtifactSet::new();

    let json = search_index.to_json().map_err(|source| BuildError::Serialize {
        path: SEARCH_INDEX_FILE.to_string(),
        source,
    })?;
    artifacts.insert(Artifact::new(SEARCH_INDEX_FILE, json))?;

    let mut hasher = blake3::Hasher::new();
    for page in site.pages.iter() {
        hasher.update(page.id.as_bytes());
        hasher.update(&[0]);
        hasher.update(page.content_hash.as_bytes());
        hasher.update(&[0]);
    }
    let manifest = PageManifest {
        fingerprint: hasher.finalize().to_hex().to_string(),
        pages: site.pages.iter().collect(),
    };
    artifacts.insert_json(PAGES_FILE, &manifest, true)?;
    artifacts.insert_json(NAVIGATION_FILE, site.navigation.as_ref(), true)?;
    artifacts.insert_json(LINK_GRAPH_FILE, site.links.as_ref(), true)?;

    Ok(artifacts)
}

/// Everything a successful build produced.
#[derive(Debug, Clone)]
pub struct FinalArtifactSet {
    pub config: Arc<BuildConfig>,
    pub site: SiteIndex,
    pub search_index: Arc<SearchIndex>,
    pub artifacts: ArtifactSet,
    /// Warnings and ignored diagnostics; never contains errors
    pub report: BuildReport,
}

impl FinalArtifactSet {
    /// Write every artifact under the configured output directory.
    pub fn write(&self) -> Result<PathBuf, BuildError> {
        let dir = self.config.output_dir();
        self.artifacts.write_to(&dir)?;
        Ok(dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_artifact_paths_are_cleaned() {
        assert_eq!(clean_artifact_path("blog/rss.xml").unwrap(), "blog/rss.xml");
        assert_eq!(clean_artifact_path("./a//b.json").unwrap(), "a/b.json");
        assert!(clean_artifact_path("/etc/passwd").is_err());
        assert!(clean_artifact_path("../escape.txt").is_err());
        assert!(clean_artifact_path("a\\b").is_err());
        assert!(clean_artifact_path("").is_err());
    }

    #[test]
    fn test_write_to_creates_directories() {
        let temp = TempDir::new().unwrap();
        let mut set = ArtifactSet::new();
        set.insert(Artifact::new("blog/atom.xml", "<feed/>")).unwrap();
        set.insert_json("data.json", &vec![1, 2], false).unwrap();
        set.write_to(temp.path()).unwrap();

        assert_eq!(fs::read_to_string(temp.path().join("blog/atom.xml")).unwrap(), "<feed/>");
        assert_eq!(fs::read_to_string(temp.path().join("data.json")).unwrap(), "[1,2]");
        assert_eq!(set.paths().collect::<Vec<_>>(), vec!["blog/atom.xml", "data.json"]);
    }

    #[test]
    fn test_later_insert_replaces() {
        let mut set = ArtifactSet::new();
        set.insert(Artifact::new("sitemap.xml", "old")).unwrap();
        set.insert(Artifact::new("sitemap.xml", "new")).unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(set.get("sitemap.xml"), Some("new"));
    }
}
