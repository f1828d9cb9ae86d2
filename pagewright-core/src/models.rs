//! Content model: pages, navigation and the link graph.

use crate::blog::BlogMeta;
use crate::frontmatter::FrontMatter;
use crate::markdown::RawReference;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Which content root a page belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Docs,
    Blog,
}

impl ContentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Docs => "docs",
            ContentKind::Blog => "blog",
        }
    }
}

/// A document contributed by a plugin instead of being read from disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDocument {
    pub kind: ContentKind,
    /// Path relative to the content root; drives the identifier like a file would.
    pub rel_path: PathBuf,
    pub contents: String,
}

impl SourceDocument {
    pub fn docs(rel_path: impl Into<PathBuf>, contents: impl Into<String>) -> Self {
        Self {
            kind: ContentKind::Docs,
            rel_path: rel_path.into(),
            contents: contents.into(),
        }
    }

    pub fn blog(rel_path: impl Into<PathBuf>, contents: impl Into<String>) -> Self {
        Self {
            kind: ContentKind::Blog,
            rel_path: rel_path.into(),
            contents: contents.into(),
        }
    }
}

/// One indexed content document
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageRecord {
    /// Stable identifier derived from the content path
    pub id: String,
    pub kind: ContentKind,
    pub title: String,
    pub permalink: String,
    /// Source path as shown in diagnostics (relative to the site directory)
    pub source: String,
    /// Location on disk; plugin documents get a virtual path under their root
    #[serde(skip)]
    pub origin: PathBuf,
    /// Directory segments of the page relative to its content root, prefixes kept
    #[serde(skip)]
    pub rel_dir: PathBuf,
    #[serde(skip)]
    pub body: String,
    pub front_matter: FrontMatter,
    pub references: Vec<RawReference>,
    pub anchors: BTreeSet<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sidebar_position: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sidebar_label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Plain text of the body, used for search
    #[serde(skip)]
    pub text: String,
    pub word_count: usize,
    pub draft: bool,
    /// blake3 of the raw file contents
    pub content_hash: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blog: Option<BlogMeta>,
}

impl PageRecord {
    pub fn is_blog_post(&self) -> bool {
        self.kind == ContentKind::Blog
    }

    /// Label used in navigation: `sidebar_label`, then the title.
    pub fn nav_label(&self) -> &str {
        self.sidebar_label.as_deref().unwrap_or(&self.title)
    }
}

/// The frozen set of pages for one build, ordered by identifier.
#[derive(Debug, Clone, Default)]
pub struct PageSet {
    pages: Vec<PageRecord>,
    by_id: HashMap<String, usize>,
    by_permalink: HashMap<String, usize>,
    by_origin: HashMap<PathBuf, usize>,
}

impl PageSet {
    /// Build a set from pages; when identifiers repeat the first page wins.
    pub fn from_pages(mut pages: Vec<PageRecord>) -> Self {
        pages.sort_by(|a, b| a.id.cmp(&b.id).then_with(|| a.source.cmp(&b.source)));
        pages.dedup_by(|later, earlier| later.id == earlier.id);

        let mut by_id = HashMap::with_capacity(pages.len());
        let mut by_permalink = HashMap::with_capacity(pages.len());
        let mut by_origin = HashMap::with_capacity(pages.len());
        for (index, page) in pages.iter().enumerate() {
            by_id.insert(page.id.clone(), index);
            by_permalink
                .entry(route_key(&page.permalink))
                .or_insert(index);
            by_origin.insert(page.origin.clone(), index);
        }

        Self {
            pages,
            by_id,
            by_permalink,
            by_origin,
        }
    }

    pub fn get(&self, id: &str) -> Option<&PageRecord> {
        self.by_id.get(id).map(|&i| &self.pages[i])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.by_id.contains_key(id)
    }

    pub fn by_permalink(&self, route: &str) -> Option<&PageRecord> {
        self.by_permalink
            .get(&route_key(route))
            .map(|&i| &self.pages[i])
    }

    pub fn by_origin(&self, path: &Path) -> Option<&PageRecord> {
        self.by_origin.get(path).map(|&i| &self.pages[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &PageRecord> {
        self.pages.iter()
    }

    pub fn as_slice(&self) -> &[PageRecord] {
        &self.pages
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn docs(&self) -> impl Iterator<Item = &PageRecord> {
        self.pages.iter().filter(|p| p.kind == ContentKind::Docs)
    }

    /// Blog posts, newest first; undated posts sort last, then by identifier.
    pub fn blog_posts(&self) -> Vec<&PageRecord> {
        let mut posts: Vec<&PageRecord> = self.pages.iter().filter(|p| p.is_blog_post()).collect();
        posts.sort_by(|a, b| {
            let date_a = a.blog.as_ref().and_then(|m| m.date);
            let date_b = b.blog.as_ref().and_then(|m| m.date);
            date_b.cmp(&date_a).then_with(|| a.id.cmp(&b.id))
        });
        posts
    }
}

/// Routes compare without a trailing slash.
pub(crate) fn route_key(route: &str) -> String {
    let trimmed = route.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Sidebar tree node.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum NavigationNode {
    Leaf {
        /// Identifier of the referenced page
        page: String,
        label: String,
    },
    Category {
        id: String,
        label: String,
        /// Generated index route, when the category has one
        #[serde(skip_serializing_if = "Option::is_none")]
        permalink: Option<String>,
        children: Vec<NavigationNode>,
    },
}

impl NavigationNode {
    /// Node identifier; leaves are identified by their page.
    pub fn id(&self) -> &str {
        match self {
            NavigationNode::Leaf { page, .. } => page,
            NavigationNode::Category { id, .. } => id,
        }
    }

    pub fn label(&self) -> &str {
        match self {
            NavigationNode::Leaf { label, .. } | NavigationNode::Category { label, .. } => label,
        }
    }

    fn collect<'a>(&'a self, out: &mut Vec<&'a NavigationNode>) {
        out.push(self);
        if let NavigationNode::Category { children, .. } = self {
            for child in children {
                child.collect(out);
            }
        }
    }
}

/// The docs sidebar plus the blog post list.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NavigationTree {
    pub sidebar: Vec<NavigationNode>,
    /// Blog post identifiers, newest first
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub blog: Vec<String>,
}

impl NavigationTree {
    /// Every node in depth-first, document order.
    pub fn nodes(&self) -> Vec<&NavigationNode> {
        let mut out = Vec::new();
        for node in &self.sidebar {
            node.collect(&mut out);
        }
        out
    }

    /// Page identifiers referenced by leaves, in sidebar order.
    pub fn leaf_pages(&self) -> Vec<&str> {
        self.nodes()
            .into_iter()
            .filter_map(|node| match node {
                NavigationNode::Leaf { page, .. } => Some(page.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Generated category index routes.
    pub fn category_routes(&self) -> Vec<&str> {
        self.nodes()
            .into_iter()
            .filter_map(|node| match node {
                NavigationNode::Category {
                    permalink: Some(permalink),
                    ..
                } => Some(permalink.as_str()),
                _ => None,
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReferenceKind {
    InternalPage,
    Anchor,
    Asset,
    External,
}

/// One outgoing reference, classified and (where possible) resolved.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct LinkEdge {
    pub source: String,
    pub target: String,
    pub kind: ReferenceKind,
    /// Identifier of the page (or route) the reference resolved to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
    pub valid: bool,
}

/// Every link edge of a build, sorted.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LinkGraph {
    pub edges: Vec<LinkEdge>,
}

impl LinkGraph {
    pub fn from_edges(mut edges: Vec<LinkEdge>) -> Self {
        edges.sort();
        Self { edges }
    }

    pub fn outgoing<'a>(&'a self, source: &'a str) -> impl Iterator<Item = &'a LinkEdge> + 'a {
        self.edges.iter().filter(move |e| e.source == source)
    }

    /// Pages linking to `id`; sidebar and navbar entries are not pages.
    pub fn backlinks(&self, id: &str) -> Vec<&str> {
        let mut sources: Vec<&str> = self
            .edges
            .iter()
            .filter(|e| e.kind != ReferenceKind::External && e.resolved.as_deref() == Some(id))
            .filter(|e| e.source != id && !e.source.starts_with('@'))
            .map(|e| e.source.as_str())
            .collect();
        sources.dedup();
        sources
    }

    pub fn broken(&self) -> impl Iterator<Item = &LinkEdge> {
        self.edges.iter().filter(|e| !e.valid)
    }
}

/// Frozen outputs of indexing and validation, shared read-only downstream.
#[derive(Debug, Clone)]
pub struct SiteIndex {
    pub pages: Arc<PageSet>,
    pub navigation: Arc<NavigationTree>,
    pub links: Arc<LinkGraph>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(id: &str, source: &str, permalink: &str) -> PageRecord {
        PageRecord {
            id: id.to_string(),
            kind: ContentKind::Docs,
            title: id.to_string(),
            permalink: permalink.to_string(),
            source: source.to_string(),
            origin: PathBuf::from(source),
            rel_dir: PathBuf::new(),
            body: String::new(),
            front_matter: FrontMatter::default(),
            references: Vec::new(),
            anchors: BTreeSet::new(),
            sidebar_position: None,
            sidebar_label: None,
            description: None,
            text: String::new(),
            word_count: 0,
            draft: false,
            content_hash: String::new(),
            blog: None,
        }
    }

    #[test]
    fn test_page_set_lookup() {
        let set = PageSet::from_pages(vec![
            page("tables", "docs/tables.md", "/docs/tables"),
            page("intro", "docs/intro.md", "/docs/intro"),
        ]);
        let ids: Vec<_> = set.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["intro", "tables"]);
        assert_eq!(set.by_permalink("/docs/tables/").map(|p| p.id.as_str()), Some("tables"));
        assert_eq!(
            set.by_origin(Path::new("docs/intro.md")).map(|p| p.id.as_str()),
            Some("intro")
        );
    }

    #[test]
    fn test_page_set_keeps_first_duplicate() {
        let set = PageSet::from_pages(vec![
            page("intro", "docs/welcome.md", "/docs/intro"),
            page("intro", "docs/intro.md", "/docs/intro"),
        ]);
        assert_eq!(set.len(), 1);
        assert_eq!(set.get("intro").map(|p| p.source.as_str()), Some("docs/intro.md"));
    }

    #[test]
    fn test_backlinks() {
        let graph = LinkGraph::from_edges(vec![
            LinkEdge {
                source: "b".into(),
                target: "./a.md".into(),
                kind: ReferenceKind::InternalPage,
                resolved: Some("a".into()),
                line: Some(3),
                valid: true,
            },
            LinkEdge {
                source: "c".into(),
                target: "/docs/a#x".into(),
                kind: ReferenceKind::Anchor,
                resolved: Some("a".into()),
                line: None,
                valid: false,
            },
        ]);
        assert_eq!(graph.backlinks("a"), vec!["b", "c"]);
        assert_eq!(graph.broken().count(), 1);
        assert_eq!(graph.outgoing("b").count(), 1);
    }
}
