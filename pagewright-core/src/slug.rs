//! Slug generation and identifier derivation.

use regex::Regex;
use std::path::{Component, Path};
use std::sync::OnceLock;
use unicode_segmentation::UnicodeSegmentation;

static HYPHEN_RUN: OnceLock<Regex> = OnceLock::new();
static NUMBER_PREFIX: OnceLock<Regex> = OnceLock::new();

fn hyphen_run() -> &'static Regex {
    HYPHEN_RUN.get_or_init(|| Regex::new(r"-+").unwrap())
}

fn number_prefix() -> &'static Regex {
    NUMBER_PREFIX.get_or_init(|| Regex::new(r"^(\d+)[-_.]\s*").unwrap())
}

/// Convert a string to a URL-safe slug
///
/// Rules:
/// - Lowercase
/// - Replace whitespace and underscores with hyphens
/// - Remove punctuation (unicode letters survive)
/// - Collapse multiple hyphens
/// - Trim leading/trailing hyphens
///
/// # Examples
///
/// ```
/// use pagewright_core::slugify;
///
/// assert_eq!(slugify("Getting Started"), "getting-started");
/// assert_eq!(slugify("Tables & Delta"), "tables-delta");
/// ```
pub fn slugify(input: &str) -> String {
    let cleaned = input
        .to_lowercase()
        .graphemes(true)
        .filter_map(|g| {
            let c = g.chars().next()?;
            if c.is_whitespace() || c == '_' || c == '-' {
                Some("-")
            } else if c.is_alphanumeric() {
                Some(g)
            } else {
                None
            }
        })
        .collect::<String>();

    hyphen_run()
        .replace_all(&cleaned, "-")
        .trim_matches('-')
        .to_string()
}

/// Split a leading ordering prefix (`01-`, `2_`, `10.`) off a file or directory name.
///
/// Returns the numeric prefix, if any, and the remaining name. A name that
/// consists only of a prefix is returned unchanged.
pub fn split_number_prefix(name: &str) -> (Option<u32>, &str) {
    if let Some(m) = number_prefix().captures(name) {
        let whole = m.get(0).map(|g| g.end()).unwrap_or(0);
        let rest = &name[whole..];
        if !rest.is_empty() {
            let number = m.get(1).and_then(|n| n.as_str().parse().ok());
            return (number, rest);
        }
    }
    (None, name)
}

/// Derive a stable page identifier from a document path relative to its content root.
///
/// Directory segments and the file stem lose their ordering prefixes and are
/// joined with `/`. A front-matter `id` replaces the file-name segment only.
///
/// ```
/// use std::path::Path;
/// use pagewright_core::slug::page_id_from_path;
///
/// assert_eq!(page_id_from_path(Path::new("01-streamlit/02-tables.md"), None), "streamlit/tables");
/// assert_eq!(page_id_from_path(Path::new("guide/setup.md"), Some("install")), "guide/install");
/// ```
pub fn page_id_from_path(rel_path: &Path, declared_id: Option<&str>) -> String {
    let mut segments = directory_segments(rel_path);

    let stem = rel_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default();
    let leaf = match declared_id.map(str::trim).filter(|id| !id.is_empty()) {
        Some(id) => id.to_string(),
        None => split_number_prefix(stem).1.to_string(),
    };
    segments.push(leaf);
    segments.join("/")
}

/// Directory segments of a relative path with ordering prefixes removed.
pub fn directory_segments(rel_path: &Path) -> Vec<String> {
    rel_path
        .parent()
        .map(|parent| {
            parent
                .components()
                .filter_map(|c| match c {
                    Component::Normal(os) => os.to_str(),
                    _ => None,
                })
                .map(|s| split_number_prefix(s).1.to_string())
                .collect()
        })
        .unwrap_or_default()
}

/// Assigns unique heading anchors the way GitHub does: repeated slugs get
/// `-1`, `-2`, ... suffixes in document order.
#[derive(Debug, Default)]
pub struct AnchorSlugger {
    seen: std::collections::HashMap<String, usize>,
}

impl AnchorSlugger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn slug(&mut self, text: &str) -> String {
        let base = slugify(text);
        self.reserve(base)
    }

    /// Register an explicit anchor, suffixing it if it was already used.
    pub fn reserve(&mut self, base: String) -> String {
        match self.seen.get_mut(&base) {
            Some(count) => {
                *count += 1;
                let candidate = format!("{}-{}", base, count);
                self.seen.insert(candidate.clone(), 0);
                candidate
            }
            None => {
                self.seen.insert(base.clone(), 0);
                base
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_slugify() {
        assert_eq!(slugify("Hello World"), "hello-world");
        assert_eq!(slugify("Delta Table Edit"), "delta-table-edit");
    }

    #[test]
    fn test_special_characters() {
        assert_eq!(slugify("C++ Programming"), "c-programming");
        assert_eq!(slugify("What's new?"), "whats-new");
        assert_eq!(slugify("snake_case_name"), "snake-case-name");
    }

    #[test]
    fn test_unicode() {
        assert_eq!(slugify("Café Setup"), "café-setup");
    }

    #[test]
    fn test_empty_and_special_only() {
        assert_eq!(slugify(""), "");
        assert_eq!(slugify("!!!"), "");
        assert_eq!(slugify("  --  "), "");
    }

    #[test]
    fn test_number_prefix() {
        assert_eq!(split_number_prefix("01-intro"), (Some(1), "intro"));
        assert_eq!(split_number_prefix("10_setup"), (Some(10), "setup"));
        assert_eq!(split_number_prefix("2024"), (None, "2024"));
        assert_eq!(split_number_prefix("3-"), (None, "3-"));
        assert_eq!(split_number_prefix("intro"), (None, "intro"));
    }

    #[test]
    fn test_page_id_from_path() {
        assert_eq!(page_id_from_path(Path::new("intro.md"), None), "intro");
        assert_eq!(
            page_id_from_path(Path::new("streamlit/tables_read.md"), None),
            "streamlit/tables_read"
        );
        assert_eq!(
            page_id_from_path(Path::new("02-dash/01-embed.mdx"), None),
            "dash/embed"
        );
        assert_eq!(
            page_id_from_path(Path::new("welcome.md"), Some("intro")),
            "intro"
        );
    }

    #[test]
    fn test_anchor_slugger_dedupes() {
        let mut slugger = AnchorSlugger::new();
        assert_eq!(slugger.slug("Setup"), "setup");
        assert_eq!(slugger.slug("Setup"), "setup-1");
        assert_eq!(slugger.slug("Setup"), "setup-2");
        assert_eq!(slugger.slug("Usage"), "usage");
    }
}
