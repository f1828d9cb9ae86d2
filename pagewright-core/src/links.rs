//! Link graph construction and validation.
//!
//! Every reference found in a page body is classified, resolved against the
//! finalized identifier space and recorded as a [`LinkEdge`]. Unresolved
//! references become diagnostics under their kind's failure policy; none is
//! ever dropped, so a `throw` build reports every violation at once.

use crate::blog;
use crate::config::BuildConfig;
use crate::diagnostics::{BuildReport, Diagnostic, FailurePolicy, Location, Problem};
use crate::markdown::RawReference;
use crate::models::{route_key, LinkEdge, LinkGraph, NavigationTree, PageRecord, PageSet, ReferenceKind};
use rayon::prelude::*;
use regex::Regex;
use std::borrow::Cow;
use std::collections::{HashMap, HashSet};
use std::path::{Component, Path, PathBuf};
use std::sync::OnceLock;

/// Pseudo-source for sidebar entries.
pub const SIDEBAR_SOURCE: &str = "@sidebar";
/// Pseudo-source for navbar items.
pub const NAVBAR_SOURCE: &str = "@navbar";

const MARKDOWN_EXTENSIONS: [&str; 2] = [".md", ".mdx"];
const PAGE_EXTENSIONS: [&str; 2] = ["html", "htm"];

fn scheme_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-zA-Z][a-zA-Z0-9+.\-]*:").unwrap())
}

/// A reference target after classification, before resolution. Paths and
/// anchors are percent-decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Classified<'t> {
    External,
    SamePageAnchor(Cow<'t, str>),
    MarkdownFile {
        path: Cow<'t, str>,
        anchor: Option<Cow<'t, str>>,
    },
    Asset {
        path: Cow<'t, str>,
    },
    Route {
        path: Cow<'t, str>,
        anchor: Option<Cow<'t, str>>,
    },
}

/// Percent-decode a URL component; invalid UTF-8 keeps the raw text.
fn decode(component: &str) -> Cow<'_, str> {
    urlencoding::decode(component).unwrap_or(Cow::Borrowed(component))
}

/// Split `path#anchor`; an empty fragment (`page#`, bare `#`) is no anchor.
fn split_anchor(target: &str) -> (&str, Option<Cow<'_, str>>) {
    match target.split_once('#') {
        Some((path, anchor)) if !anchor.is_empty() => (path, Some(decode(anchor))),
        Some((path, _)) => (path, None),
        None => (target, None),
    }
}

fn classify(target: &str, image: bool) -> Classified<'_> {
    if target.starts_with("//") || scheme_regex().is_match(target) {
        return Classified::External;
    }

    let (path, anchor) = split_anchor(target);
    let path = path.split_once('?').map(|(p, _)| p).unwrap_or(path);
    if target.starts_with('#') {
        return match anchor {
            Some(anchor) => Classified::SamePageAnchor(anchor),
            // A bare `#` points at the page itself
            None => Classified::Route {
                path: Cow::Borrowed(""),
                anchor: None,
            },
        };
    }
    let path = decode(path);

    let lower = path.to_ascii_lowercase();
    if MARKDOWN_EXTENSIONS.iter().any(|ext| lower.ends_with(ext)) {
        return Classified::MarkdownFile { path, anchor };
    }

    let last = path.rsplit('/').next().unwrap_or_default();
    let extension = last.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase());
    let is_asset = match extension {
        Some(ext) => !PAGE_EXTENSIONS.contains(&ext.as_str()),
        None => false,
    };
    if image || is_asset {
        Classified::Asset { path }
    } else {
        Classified::Route { path, anchor }
    }
}

/// Output of link validation.
#[derive(Debug, Clone)]
pub struct ValidationOutput {
    pub graph: LinkGraph,
    pub report: BuildReport,
}

/// Resolves page references against the frozen page set and navigation tree.
pub struct LinkValidator<'a> {
    config: &'a BuildConfig,
    pages: &'a PageSet,
    navigation: &'a NavigationTree,
    /// Routes that exist without a page: site root, category indexes, blog lists
    generated_routes: HashSet<String>,
    pages_by_file: HashMap<PathBuf, &'a str>,
    static_dirs: Vec<PathBuf>,
}

impl<'a> LinkValidator<'a> {
    pub fn new(config: &'a BuildConfig, pages: &'a PageSet, navigation: &'a NavigationTree) -> Self {
        let mut generated_routes: HashSet<String> = HashSet::new();
        generated_routes.insert(route_key(&config.route(&[])));
        generated_routes.extend(navigation.category_routes().into_iter().map(route_key));
        generated_routes.extend(
            blog::generated_routes(config, &pages.blog_posts())
                .iter()
                .map(|r| route_key(r)),
        );

        let pages_by_file = pages
            .iter()
            .map(|p| (normalize_path(&p.origin), p.id.as_str()))
            .collect();

        Self {
            config,
            pages,
            navigation,
            generated_routes,
            pages_by_file,
            static_dirs: config.static_dirs(),
        }
    }

    /// Build the link graph and collect every violation.
    pub fn validate(&self) -> ValidationOutput {
        let per_page: Vec<(Vec<LinkEdge>, Vec<Diagnostic>)> = self
            .pages
            .as_slice()
            .par_iter()
            .map(|page| self.validate_page(page))
            .collect();

        let mut edges = Vec::new();
        let mut report = BuildReport::new();
        for (page_edges, diagnostics) in per_page {
            edges.extend(page_edges);
            for diagnostic in diagnostics {
                report.push(diagnostic);
            }
        }

        self.validate_sidebar(&mut edges, &mut report);
        self.validate_navbar(&mut edges, &mut report);

        let graph = LinkGraph::from_edges(edges);
        tracing::debug!(
            "Validated {} references, {} broken",
            graph.edges.len(),
            graph.broken().count()
        );

        ValidationOutput { graph, report }
    }

    fn validate_page(&self, page: &PageRecord) -> (Vec<LinkEdge>, Vec<Diagnostic>) {
        let mut edges = Vec::with_capacity(page.references.len());
        let mut diagnostics = Vec::new();

        for reference in &page.references {
            let (edge, problem) = self.resolve(page, reference);
            if let Some((problem, policy)) = problem {
                diagnostics.push(
                    Diagnostic::new(
                        problem,
                        policy,
                        Location::at_line(page.source.clone(), reference.line),
                    )
                    .with_page(page.id.clone()),
                );
            }
            edges.push(edge);
        }

        (edges, diagnostics)
    }

    fn resolve(&self, page: &PageRecord, reference: &RawReference) -> (LinkEdge, Option<(Problem, FailurePolicy)>) {
        let target = reference.target.as_str();
        let policies = &self.config.policies;
        let mut edge = LinkEdge {
            source: page.id.clone(),
            target: target.to_string(),
            kind: ReferenceKind::External,
            resolved: None,
            line: Some(reference.line),
            valid: true,
        };

        let problem = match classify(target, reference.image) {
            Classified::External => None,
            Classified::SamePageAnchor(anchor) => {
                edge.kind = ReferenceKind::Anchor;
                edge.resolved = Some(page.id.clone());
                self.check_anchor(page, target, &anchor)
            }
            Classified::MarkdownFile { path, anchor } => {
                edge.kind = kind_for(anchor.as_deref());
                match self.resolve_markdown_file(page, &path) {
                    Some(found) => {
                        edge.resolved = Some(found.id.clone());
                        anchor.as_deref().and_then(|anchor| self.check_anchor(found, target, anchor))
                    }
                    None => Some((
                        Problem::BrokenMarkdownLink {
                            target: target.to_string(),
                        },
                        policies.broken_markdown_links,
                    )),
                }
            }
            Classified::Asset { path } => {
                edge.kind = ReferenceKind::Asset;
                match self.resolve_asset(page, &path) {
                    Some(found) => {
                        edge.resolved = Some(self.config.display_path(&found));
                        None
                    }
                    None => Some((
                        Problem::BrokenLink {
                            target: target.to_string(),
                        },
                        policies.broken_links,
                    )),
                }
            }
            Classified::Route { path, anchor } => {
                edge.kind = kind_for(anchor.as_deref());
                let route = if path.is_empty() {
                    page.permalink.clone()
                } else {
                    resolve_route(&page.permalink, &path)
                };
                match self.lookup_route(&route) {
                    Some(RouteTarget::Page(found)) => {
                        edge.resolved = Some(found.id.clone());
                        anchor.as_deref().and_then(|anchor| self.check_anchor(found, target, anchor))
                    }
                    Some(RouteTarget::Generated(route)) => {
                        edge.resolved = Some(route);
                        None
                    }
                    None => Some((
                        Problem::BrokenLink {
                            target: target.to_string(),
                        },
                        policies.broken_links,
                    )),
                }
            }
        };

        edge.valid = problem.is_none();
        (edge, problem)
    }

    fn check_anchor(&self, page: &PageRecord, target: &str, anchor: &str) -> Option<(Problem, FailurePolicy)> {
        if page.anchors.contains(anchor) {
            return None;
        }
        Some((
            Problem::BrokenAnchor {
                target: target.to_string(),
                anchor: anchor.to_string(),
                page: page.id.clone(),
            },
            self.config.policies.broken_anchors,
        ))
    }

    fn resolve_markdown_file(&self, page: &PageRecord, path: &str) -> Option<&'a PageRecord> {
        let mut candidates = Vec::new();
        match path.strip_prefix('/') {
            Some(absolute) => {
                for root in self.config.content_roots() {
                    candidates.push(root.path.join(absolute));
                }
                candidates.push(self.config.base_dir.join(absolute));
            }
            None => {
                if let Some(dir) = page.origin.parent() {
                    candidates.push(dir.join(path));
                }
            }
        }
        candidates
            .iter()
            .find_map(|candidate| self.pages_by_file.get(&normalize_path(candidate)))
            .and_then(|id| self.pages.get(id))
    }

    fn resolve_asset(&self, page: &PageRecord, path: &str) -> Option<PathBuf> {
        let mut candidates = Vec::new();
        match path.strip_prefix('/') {
            Some(absolute) => {
                let base = self.config.base_url.trim_start_matches('/');
                let relative = absolute.strip_prefix(base).unwrap_or(absolute);
                for dir in &self.static_dirs {
                    candidates.push(dir.join(relative));
                    if relative != absolute {
                        candidates.push(dir.join(absolute));
                    }
                }
            }
            None => {
                if let Some(dir) = page.origin.parent() {
                    candidates.push(dir.join(path));
                }
                for dir in &self.static_dirs {
                    candidates.push(dir.join(path));
                }
            }
        }
        candidates
            .into_iter()
            .map(|c| normalize_path(&c))
            .find(|c| c.is_file())
    }

    fn lookup_route(&self, route: &str) -> Option<RouteTarget<'a>> {
        let mut keys = vec![route_key(route)];
        if self.config.base_url != "/" && !route.starts_with(&self.config.base_url) {
            keys.push(route_key(&self.config.route(&[route])));
        }
        for key in keys {
            if let Some(page) = self.pages.by_permalink(&key) {
                return Some(RouteTarget::Page(page));
            }
            if self.generated_routes.contains(&key) {
                return Some(RouteTarget::Generated(key));
            }
        }
        None
    }

    fn validate_sidebar(&self, edges: &mut Vec<LinkEdge>, report: &mut BuildReport) {
        for id in self.navigation.leaf_pages() {
            let valid = self.pages.contains(id);
            edges.push(LinkEdge {
                source: SIDEBAR_SOURCE.to_string(),
                target: id.to_string(),
                kind: ReferenceKind::InternalPage,
                resolved: valid.then(|| id.to_string()),
                line: None,
                valid,
            });
            if !valid {
                report.record(
                    Problem::BrokenLink {
                        target: id.to_string(),
                    },
                    self.config.policies.broken_links,
                    Location::new(self.config.origin.clone()),
                );
            }
        }
    }

    fn validate_navbar(&self, edges: &mut Vec<LinkEdge>, report: &mut BuildReport) {
        for item in &self.config.navbar {
            if let Some(href) = &item.href {
                edges.push(LinkEdge {
                    source: NAVBAR_SOURCE.to_string(),
                    target: href.clone(),
                    kind: ReferenceKind::External,
                    resolved: None,
                    line: None,
                    valid: true,
                });
            }
            let Some(to) = &item.to else { continue };
            let (path, anchor) = split_anchor(to);
            let route = resolve_route(&self.config.base_url, &decode(path));
            let (resolved, problem) = match self.lookup_route(&route) {
                Some(RouteTarget::Page(page)) => (
                    Some(page.id.clone()),
                    anchor.as_deref().and_then(|anchor| self.check_anchor(page, to, anchor)),
                ),
                Some(RouteTarget::Generated(route)) => (Some(route), None),
                None => (
                    None,
                    Some((
                        Problem::BrokenLink { target: to.clone() },
                        self.config.policies.broken_links,
                    )),
                ),
            };
            edges.push(LinkEdge {
                source: NAVBAR_SOURCE.to_string(),
                target: to.clone(),
                kind: kind_for(anchor.as_deref()),
                resolved,
                line: None,
                valid: problem.is_none(),
            });
            if let Some((problem, policy)) = problem {
                report.record(problem, policy, Location::new(self.config.origin.clone()));
            }
        }
    }
}

enum RouteTarget<'a> {
    Page(&'a PageRecord),
    Generated(String),
}

fn kind_for(anchor: Option<&str>) -> ReferenceKind {
    match anchor {
        Some(_) => ReferenceKind::Anchor,
        None => ReferenceKind::InternalPage,
    }
}

/// Resolve a route reference against the page it appears on, the way a
/// browser resolves a relative URL.
///
/// ```
/// use pagewright_core::links::resolve_route;
///
/// assert_eq!(resolve_route("/docs/guide/setup", "../intro"), "/docs/intro");
/// assert_eq!(resolve_route("/docs/guide/setup", "tables.html"), "/docs/guide/tables");
/// assert_eq!(resolve_route("/docs/guide/setup", "/blog/"), "/blog");
/// ```
pub fn resolve_route(from: &str, path: &str) -> String {
    let joined = if path.starts_with('/') {
        path.to_string()
    } else {
        let dir = match from.rsplit_once('/') {
            Some((dir, _)) => dir,
            None => "",
        };
        format!("{}/{}", dir, path)
    };

    let mut segments: Vec<&str> = Vec::new();
    for segment in joined.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    if let Some(last) = segments.pop() {
        let last = last
            .strip_suffix(".html")
            .or_else(|| last.strip_suffix(".htm"))
            .unwrap_or(last);
        if !last.eq_ignore_ascii_case("index") {
            segments.push(last);
        }
    }
    format!("/{}", segments.join("/"))
}

/// Lexically normalize `.` and `..` components.
fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        assert_eq!(classify("https://streamlit.io", false), Classified::External);
        assert_eq!(classify("mailto:a@b.c", false), Classified::External);
        assert_eq!(classify("//cdn.example.com/x.js", false), Classified::External);
        assert_eq!(classify("#setup", false), Classified::SamePageAnchor("setup".into()));
        assert_eq!(
            classify("./setup.md#install", false),
            Classified::MarkdownFile {
                path: "./setup.md".into(),
                anchor: Some("install".into())
            }
        );
        assert_eq!(
            classify("/img/logo.png", false),
            Classified::Asset {
                path: "/img/logo.png".into()
            }
        );
        assert_eq!(
            classify("/img/diagram", true),
            Classified::Asset {
                path: "/img/diagram".into()
            }
        );
        assert_eq!(
            classify("/docs/intro?x=1#top", false),
            Classified::Route {
                path: "/docs/intro".into(),
                anchor: Some("top".into())
            }
        );
        assert_eq!(
            classify("guide.html", false),
            Classified::Route {
                path: "guide.html".into(),
                anchor: None
            }
        );
    }

    #[test]
    fn test_empty_fragment_links_to_the_page_itself() {
        assert_eq!(
            classify("#", false),
            Classified::Route {
                path: "".into(),
                anchor: None
            }
        );
        assert_eq!(
            classify("./setup.md#", false),
            Classified::MarkdownFile {
                path: "./setup.md".into(),
                anchor: None
            }
        );
    }

    #[test]
    fn test_paths_and_anchors_are_percent_decoded() {
        assert_eq!(
            classify("./my%20page.md#caf%C3%A9", false),
            Classified::MarkdownFile {
                path: "./my page.md".into(),
                anchor: Some("café".into())
            }
        );
        assert_eq!(
            classify("/img/team%20photo.png", false),
            Classified::Asset {
                path: "/img/team photo.png".into()
            }
        );
        assert_eq!(classify("#getting%20started", false), Classified::SamePageAnchor("getting started".into()));
        // Invalid UTF-8 keeps the raw text
        assert_eq!(
            classify("/docs/%FF", false),
            Classified::Route {
                path: "/docs/%FF".into(),
                anchor: None
            }
        );
    }

    #[test]
    fn test_resolve_route() {
        assert_eq!(resolve_route("/docs/intro", "setup"), "/docs/setup");
        assert_eq!(resolve_route("/docs/a/b", "../../blog/post"), "/blog/post");
        assert_eq!(resolve_route("/docs/intro", "../../../x"), "/x");
        assert_eq!(resolve_route("/", "docs/category/streamlit"), "/docs/category/streamlit");
        assert_eq!(resolve_route("/docs/x", "/docs/guide/index.html"), "/docs/guide");
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path(Path::new("/a/b/../c/./d.md")), PathBuf::from("/a/c/d.md"));
        assert_eq!(normalize_path(Path::new("./docs/x.md")), PathBuf::from("docs/x.md"));
    }
}
