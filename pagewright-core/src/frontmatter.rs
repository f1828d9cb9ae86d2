//! Front-matter parsing from markdown documents.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use std::sync::OnceLock;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FrontmatterError {
    #[error("invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("front matter must be a mapping, found {0}")]
    NotAMapping(&'static str),

    #[error("front matter keys must be strings")]
    NonStringKey,
}

static FRONTMATTER_REGEX: OnceLock<Regex> = OnceLock::new();

fn frontmatter_regex() -> &'static Regex {
    FRONTMATTER_REGEX.get_or_init(|| {
        Regex::new(r"(?s)\A---[ \t]*\r?\n(?:(.*?)\r?\n)?---[ \t]*(?:\r?\n|\z)(.*)\z").unwrap()
    })
}

/// Ordered key/value metadata from the head of a document.
///
/// Keys keep their declaration order so manifests and diagnostics are
/// reproducible across builds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FrontMatter {
    entries: Mapping,
}

impl FrontMatter {
    pub fn from_mapping(entries: Mapping) -> Result<Self, FrontmatterError> {
        if entries.keys().any(|k| !k.is_string()) {
            return Err(FrontmatterError::NonStringKey);
        }
        Ok(Self { entries })
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(Value::as_bool)
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(Value::as_f64)
    }

    /// A string or a list of strings, as used by `tags` and `authors`.
    pub fn get_string_list(&self, key: &str) -> Vec<String> {
        match self.get(key) {
            Some(Value::String(s)) => vec![s.clone()],
            Some(Value::Sequence(items)) => items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            _ => Vec::new(),
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().filter_map(Value::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A document split into its raw front-matter block and body.
#[derive(Debug, Clone, PartialEq)]
pub struct SplitDocument<'a> {
    /// YAML between the `---` fences, if the document has a front-matter block.
    pub yaml: Option<&'a str>,
    pub body: &'a str,
    /// Number of lines preceding the body in the original file.
    pub body_line_offset: usize,
}

/// Separate the front-matter block from the body without interpreting it.
pub fn split_frontmatter(content: &str) -> SplitDocument<'_> {
    match frontmatter_regex().captures(content) {
        Some(captures) => {
            let body = captures.get(2).map(|m| m.as_str()).unwrap_or_default();
            let body_start = captures.get(2).map(|m| m.start()).unwrap_or(content.len());
            SplitDocument {
                yaml: Some(captures.get(1).map(|m| m.as_str()).unwrap_or_default()),
                body,
                body_line_offset: content[..body_start].matches('\n').count(),
            }
        }
        None => SplitDocument {
            yaml: None,
            body: content,
            body_line_offset: 0,
        },
    }
}

/// Parse a front-matter YAML block into an ordered mapping.
pub fn parse_frontmatter_block(yaml: &str) -> Result<FrontMatter, FrontmatterError> {
    match serde_yaml::from_str::<Value>(yaml)? {
        Value::Null => Ok(FrontMatter::default()),
        Value::Mapping(entries) => FrontMatter::from_mapping(entries),
        Value::Sequence(_) => Err(FrontmatterError::NotAMapping("a sequence")),
        Value::Tagged(_) => Err(FrontmatterError::NotAMapping("a tagged value")),
        _ => Err(FrontmatterError::NotAMapping("a scalar")),
    }
}

/// Parse front matter from markdown content
///
/// Returns a tuple of (front matter, markdown body).
/// If no front matter is present, returns empty front matter with the full content as body.
///
/// # Example
///
/// ```
/// use pagewright_core::frontmatter::parse_frontmatter;
///
/// let content = "---\ntitle: Intro\nsidebar_position: 1\n---\n# Hello\n";
///
/// let (fm, body) = parse_frontmatter(content).unwrap();
/// assert_eq!(fm.get_str("title"), Some("Intro"));
/// assert_eq!(fm.keys().collect::<Vec<_>>(), vec!["title", "sidebar_position"]);
/// assert!(body.starts_with("# Hello"));
/// ```
pub fn parse_frontmatter(content: &str) -> Result<(FrontMatter, &str), FrontmatterError> {
    let split = split_frontmatter(content);
    let frontmatter = match split.yaml {
        Some(yaml) => parse_frontmatter_block(yaml)?,
        None => FrontMatter::default(),
    };
    Ok((frontmatter, split.body))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_frontmatter() {
        let content = r#"---
title: Read a table
sidebar_position: 2
tags:
  - delta
  - unity-catalog
---

# Read a table

Body text."#;

        let (fm, body) = parse_frontmatter(content).unwrap();
        assert_eq!(fm.get_str("title"), Some("Read a table"));
        assert_eq!(fm.get_f64("sidebar_position"), Some(2.0));
        assert_eq!(fm.get_string_list("tags"), vec!["delta", "unity-catalog"]);
        assert!(body.contains("Body text."));
    }

    #[test]
    fn test_keys_keep_declaration_order() {
        let content = "---\nzeta: 1\nalpha: 2\nmid: 3\n---\nbody";
        let (fm, _) = parse_frontmatter(content).unwrap();
        assert_eq!(fm.keys().collect::<Vec<_>>(), vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn test_empty_block() {
        let content = "---\n---\nJust body";
        let (fm, body) = parse_frontmatter(content).unwrap();
        assert!(fm.is_empty());
        assert_eq!(body, "Just body");
    }

    #[test]
    fn test_no_frontmatter() {
        let content = "# Just Content\n\nNo front matter here.";
        let (fm, body) = parse_frontmatter(content).unwrap();
        assert!(fm.is_empty());
        assert_eq!(body, content);
    }

    #[test]
    fn test_dashes_inside_values_do_not_close_block() {
        let content = "---\ntitle: a---b\n---\nbody";
        let (fm, body) = parse_frontmatter(content).unwrap();
        assert_eq!(fm.get_str("title"), Some("a---b"));
        assert_eq!(body, "body");
    }

    #[test]
    fn test_body_line_offset() {
        let content = "---\ntitle: x\nid: y\n---\nfirst body line\n";
        let split = split_frontmatter(content);
        assert_eq!(split.body_line_offset, 4);
        assert_eq!(split.body, "first body line\n");
    }

    #[test]
    fn test_invalid_yaml() {
        let content = "---\ntitle: Test\ninvalid yaml: [unclosed\n---\n\nContent.";
        assert!(matches!(
            parse_frontmatter(content),
            Err(FrontmatterError::Yaml(_))
        ));
    }

    #[test]
    fn test_scalar_block_is_rejected() {
        let content = "---\njust a string\n---\nbody";
        assert!(matches!(
            parse_frontmatter(content),
            Err(FrontmatterError::NotAMapping(_))
        ));
    }
}
