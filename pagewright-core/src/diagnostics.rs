//! Policy-gated content problems and the aggregated build report.
//!
//! Indexing and validation never stop at the first defect. Every problem is
//! recorded as a [`Diagnostic`] whose severity follows the configured
//! [`FailurePolicy`], and the orchestrator decides afterwards whether the
//! build may continue.

use crate::plugin::HookPhase;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// What to do when a content defect is detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    #[default]
    Throw,
    Warn,
    Ignore,
}

impl FailurePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailurePolicy::Throw => "throw",
            FailurePolicy::Warn => "warn",
            FailurePolicy::Ignore => "ignore",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            FailurePolicy::Throw => Severity::Error,
            FailurePolicy::Warn => Severity::Warning,
            FailurePolicy::Ignore => Severity::Info,
        }
    }
}

impl FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "throw" => Ok(FailurePolicy::Throw),
            "warn" => Ok(FailurePolicy::Warn),
            "ignore" => Ok(FailurePolicy::Ignore),
            other => Err(format!(
                "unknown failure policy `{}` (expected throw, warn or ignore)",
                other
            )),
        }
    }
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

/// A detected content defect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Problem {
    #[error("identifier `{id}` is declared by more than one document: {}", .paths.join(", "))]
    DuplicateIdentifier { id: String, paths: Vec<String> },

    #[error("route `{route}` is claimed by more than one page: {}", .pages.join(", "))]
    DuplicateRoute { route: String, pages: Vec<String> },

    #[error("navigation entry `{node}` appears more than once in the sidebar")]
    DuplicateNavigationEntry { node: String },

    #[error("malformed front matter: {message}")]
    MalformedFrontMatter { message: String },

    #[error("broken link to `{target}`")]
    BrokenLink { target: String },

    #[error("broken markdown link to `{target}`")]
    BrokenMarkdownLink { target: String },

    #[error("broken anchor `#{anchor}` in link `{target}` (no such heading on `{page}`)")]
    BrokenAnchor {
        target: String,
        anchor: String,
        page: String,
    },

    #[error("plugin `{plugin}` timed out after {timeout_ms}ms during {phase}")]
    PluginTimeout {
        plugin: String,
        phase: HookPhase,
        timeout_ms: u64,
    },

    #[error("inline tags not declared in the tags file: {}", .tags.join(", "))]
    InlineTags { tags: Vec<String> },

    #[error("inline authors not declared in the authors file: {}", .authors.join(", "))]
    InlineAuthors { authors: Vec<String> },

    #[error("blog post has no truncation marker")]
    UntruncatedBlogPost,
}

impl Problem {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Problem::DuplicateIdentifier { .. } => "duplicate-identifier",
            Problem::DuplicateRoute { .. } => "duplicate-route",
            Problem::DuplicateNavigationEntry { .. } => "duplicate-navigation-entry",
            Problem::MalformedFrontMatter { .. } => "malformed-front-matter",
            Problem::BrokenLink { .. } => "broken-link",
            Problem::BrokenMarkdownLink { .. } => "broken-markdown-link",
            Problem::BrokenAnchor { .. } => "broken-anchor",
            Problem::PluginTimeout { .. } => "plugin-timeout",
            Problem::InlineTags { .. } => "inline-tags",
            Problem::InlineAuthors { .. } => "inline-authors",
            Problem::UntruncatedBlogPost => "untruncated-blog-post",
        }
    }
}

/// Where a problem was found.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Location {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
}

impl Location {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            line: None,
        }
    }

    pub fn at_line(path: impl Into<String>, line: usize) -> Self {
        Self {
            path: path.into(),
            line: Some(line),
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "{}:{}", self.path, line),
            None => f.write_str(&self.path),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub code: String,
    pub severity: Severity,
    pub policy: FailurePolicy,
    pub location: Location,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_id: Option<String>,
    pub message: String,
    pub problem: Problem,
}

impl Diagnostic {
    pub fn new(problem: Problem, policy: FailurePolicy, location: Location) -> Self {
        Self {
            code: problem.code().to_string(),
            severity: policy.severity(),
            policy,
            location,
            page_id: None,
            message: problem.to_string(),
            problem,
        }
    }

    pub fn with_page(mut self, page_id: impl Into<String>) -> Self {
        self.page_id = Some(page_id.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let severity = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Info => "ignored",
        };
        write!(
            f,
            "{}: {} [{}] {}",
            self.location, severity, self.code, self.message
        )
    }
}

/// Every diagnostic collected during one build, in a deterministic order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildReport {
    diagnostics: Vec<Diagnostic>,
}

impl BuildReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        match diagnostic.severity {
            Severity::Warning => tracing::warn!("{}", diagnostic),
            Severity::Info => tracing::debug!("ignored by policy: {}", diagnostic),
            Severity::Error => {}
        }
        self.diagnostics.push(diagnostic);
    }

    pub fn record(&mut self, problem: Problem, policy: FailurePolicy, location: Location) {
        self.push(Diagnostic::new(problem, policy, location));
    }

    pub fn merge(&mut self, other: BuildReport) {
        self.diagnostics.extend(other.diagnostics);
    }

    /// Sort by location, then code, then message.
    pub fn sort(&mut self) {
        self.diagnostics.sort_by(|a, b| {
            a.location
                .cmp(&b.location)
                .then_with(|| a.code.cmp(&b.code))
                .then_with(|| a.message.cmp(&b.message))
        });
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter()
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| d.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Warning)
    }

    /// Diagnostics that are not suppressed by an `ignore` policy.
    pub fn visible(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| d.severity != Severity::Info)
    }

    pub fn has_errors(&self) -> bool {
        self.errors().next().is_some()
    }

    pub fn find(&self, code: &str) -> impl Iterator<Item = &Diagnostic> {
        let code = code.to_string();
        self.diagnostics.iter().filter(move |d| d.code == code)
    }

    pub fn len(&self) -> usize {
        self.diagnostics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }
}

impl fmt::Display for BuildReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for diagnostic in self.visible() {
            writeln!(f, "{}", diagnostic)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_parsing() {
        assert_eq!("throw".parse::<FailurePolicy>(), Ok(FailurePolicy::Throw));
        assert_eq!("WARN".parse::<FailurePolicy>(), Ok(FailurePolicy::Warn));
        assert!("explode".parse::<FailurePolicy>().is_err());
    }

    #[test]
    fn test_severity_follows_policy() {
        let mut report = BuildReport::new();
        let problem = Problem::BrokenLink {
            target: "/docs/missing".into(),
        };
        report.record(problem.clone(), FailurePolicy::Warn, Location::new("a.md"));
        assert!(!report.has_errors());
        report.record(problem.clone(), FailurePolicy::Ignore, Location::new("b.md"));
        assert_eq!(report.visible().count(), 1);
        assert_eq!(report.len(), 2);
        report.record(problem, FailurePolicy::Throw, Location::at_line("c.md", 3));
        assert!(report.has_errors());
    }

    #[test]
    fn test_sort_is_by_location() {
        let mut report = BuildReport::new();
        report.record(
            Problem::UntruncatedBlogPost,
            FailurePolicy::Warn,
            Location::at_line("z.md", 1),
        );
        report.record(
            Problem::UntruncatedBlogPost,
            FailurePolicy::Warn,
            Location::at_line("a.md", 9),
        );
        report.sort();
        let paths: Vec<_> = report.iter().map(|d| d.location.path.as_str()).collect();
        assert_eq!(paths, vec!["a.md", "z.md"]);
    }

    #[test]
    fn test_display_includes_location_and_code() {
        let diagnostic = Diagnostic::new(
            Problem::BrokenAnchor {
                target: "#setup".into(),
                anchor: "setup".into(),
                page: "intro".into(),
            },
            FailurePolicy::Throw,
            Location::at_line("docs/intro.md", 12),
        );
        let text = diagnostic.to_string();
        assert!(text.starts_with("docs/intro.md:12: error [broken-anchor]"));
        assert!(text.contains("#setup"));
    }
}
