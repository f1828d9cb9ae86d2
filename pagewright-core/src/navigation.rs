//! Sidebar construction.
//!
//! With no configured sidebar the tree mirrors the docs directory layout.
//! Siblings with a position hint (front-matter `sidebar_position`,
//! `_category_.yml` or a numeric name prefix) come first in ascending order;
//! the rest follow in lexicographic order of their file names.

use crate::config::{BuildConfig, SidebarEntry, SidebarItem};
use crate::diagnostics::{BuildReport, Location, Problem};
use crate::models::{ContentKind, NavigationNode, NavigationTree, PageRecord, PageSet};
use crate::slug::{slugify, split_number_prefix};
use serde::Deserialize;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};
use std::path::{Component, Path, PathBuf};

const CATEGORY_FILES: [&str; 2] = ["_category_.yml", "_category_.yaml"];

#[derive(Debug, Default, Deserialize)]
struct CategoryMeta {
    #[serde(default)]
    label: Option<String>,
    #[serde(default)]
    position: Option<f64>,
}

#[derive(Default)]
struct DirNode<'a> {
    dirs: BTreeMap<String, DirNode<'a>>,
    pages: Vec<&'a PageRecord>,
}

impl<'a> DirNode<'a> {
    fn insert(&mut self, segments: &[String], page: &'a PageRecord) {
        match segments.split_first() {
            Some((head, rest)) => self.dirs.entry(head.clone()).or_default().insert(rest, page),
            None => self.pages.push(page),
        }
    }

    /// Find a subdirectory by raw or prefix-stripped segment names.
    fn find(&self, segments: &[&str]) -> Option<(&DirNode<'a>, Vec<String>)> {
        match segments.split_first() {
            None => Some((self, Vec::new())),
            Some((head, rest)) => {
                let (name, child) = self
                    .dirs
                    .iter()
                    .find(|(name, _)| name.as_str() == *head || split_number_prefix(name).1 == *head)?;
                let (found, mut path) = child.find(rest)?;
                path.insert(0, name.clone());
                Some((found, path))
            }
        }
    }
}

type Sortable = (Option<f64>, String, NavigationNode);

/// Builds the [`NavigationTree`] from a finalized page set.
pub struct NavigationBuilder<'a> {
    config: &'a BuildConfig,
    pages: &'a PageSet,
    docs_roots: Vec<PathBuf>,
}

impl<'a> NavigationBuilder<'a> {
    pub fn new(config: &'a BuildConfig, pages: &'a PageSet) -> Self {
        let docs_roots = config
            .content_roots()
            .into_iter()
            .filter(|root| root.kind == ContentKind::Docs)
            .map(|root| root.path)
            .collect();
        Self {
            config,
            pages,
            docs_roots,
        }
    }

    pub fn build(&self) -> (NavigationTree, BuildReport) {
        let mut report = BuildReport::new();

        let mut root = DirNode::default();
        for page in self.pages.docs() {
            root.insert(&path_segments(&page.rel_dir), page);
        }

        let (nodes, location) = match self.config.docs.as_ref().and_then(|d| d.sidebar.as_ref()) {
            Some(items) => {
                let nodes = self.explicit(items, &root, &[], &mut report);
                (nodes, Location::new(self.config.origin.clone()))
            }
            None => {
                let nodes = self.autogenerate(&root, &[], &[], &mut report);
                let location = self
                    .docs_roots
                    .first()
                    .map(|p| Location::new(self.config.display_path(p)))
                    .unwrap_or_else(|| Location::new(self.config.origin.clone()));
                (nodes, location)
            }
        };

        let mut seen = HashSet::new();
        let mut duplicates = Vec::new();
        let sidebar = dedupe(nodes, &mut seen, &mut duplicates);
        for node in duplicates {
            report.record(
                Problem::DuplicateNavigationEntry { node },
                self.config.policies.duplicate_ids,
                location.clone(),
            );
        }

        let blog = self
            .pages
            .blog_posts()
            .into_iter()
            .map(|p| p.id.clone())
            .collect();

        (NavigationTree { sidebar, blog }, report)
    }

    fn explicit(
        &self,
        items: &[SidebarItem],
        root: &DirNode<'_>,
        labels: &[String],
        report: &mut BuildReport,
    ) -> Vec<NavigationNode> {
        let mut nodes = Vec::new();
        for item in items {
            match item {
                SidebarItem::Doc(id) => nodes.push(self.leaf(id, None)),
                SidebarItem::Entry(SidebarEntry::Doc { id, label }) => {
                    nodes.push(self.leaf(id, label.as_deref()))
                }
                SidebarItem::Entry(SidebarEntry::Category { label, items }) => {
                    let mut path = labels.to_vec();
                    path.push(slugify(label));
                    let children = self.explicit(items, root, &path, report);
                    nodes.push(self.category(label, &path, children));
                }
                SidebarItem::Entry(SidebarEntry::Autogenerated { dir }) => {
                    let segments: Vec<&str> = dir
                        .split('/')
                        .filter(|s| !s.is_empty() && *s != ".")
                        .collect();
                    if let Some((node, raw)) = root.find(&segments) {
                        nodes.extend(self.autogenerate(node, &raw, labels, report));
                    } else {
                        tracing::warn!("Autogenerated sidebar directory `{}` has no documents", dir);
                    }
                }
            }
        }
        nodes
    }

    /// Leaves for unknown identifiers are kept; the link validator reports them.
    fn leaf(&self, id: &str, label: Option<&str>) -> NavigationNode {
        let label = label
            .map(str::to_string)
            .or_else(|| self.pages.get(id).map(|p| p.nav_label().to_string()))
            .unwrap_or_else(|| id.to_string());
        NavigationNode::Leaf {
            page: id.to_string(),
            label,
        }
    }

    fn category(&self, label: &str, path: &[String], children: Vec<NavigationNode>) -> NavigationNode {
        let slug_path = path.join("/");
        let route_base = self.config.route_base(ContentKind::Docs);
        NavigationNode::Category {
            id: format!("category:{}", slug_path),
            label: label.to_string(),
            permalink: Some(self.config.route(&[route_base, "category", slug_path.as_str()])),
            children,
        }
    }

    fn autogenerate(
        &self,
        dir: &DirNode<'_>,
        raw_path: &[String],
        labels: &[String],
        report: &mut BuildReport,
    ) -> Vec<NavigationNode> {
        let mut items: Vec<Sortable> = Vec::new();

        for page in &dir.pages {
            let file = page
                .origin
                .file_name()
                .and_then(|f| f.to_str())
                .unwrap_or(&page.id)
                .to_string();
            let position = page
                .sidebar_position
                .or_else(|| split_number_prefix(&file).0.map(f64::from));
            items.push((position, file, self.leaf(&page.id, None)));
        }

        for (name, child) in &dir.dirs {
            let mut child_raw = raw_path.to_vec();
            child_raw.push(name.clone());
            let meta = self.category_meta(&child_raw, report);

            let (prefix, stripped) = split_number_prefix(name);
            let label = meta.label.unwrap_or_else(|| stripped.to_string());
            let mut child_labels = labels.to_vec();
            child_labels.push(slugify(&label));

            let children = self.autogenerate(child, &child_raw, &child_labels, report);
            if children.is_empty() {
                continue;
            }
            let position = meta.position.or_else(|| prefix.map(f64::from));
            items.push((position, name.clone(), self.category(&label, &child_labels, children)));
        }

        sort_siblings(&mut items);
        items.into_iter().map(|(_, _, node)| node).collect()
    }

    fn category_meta(&self, raw_path: &[String], report: &mut BuildReport) -> CategoryMeta {
        for root in &self.docs_roots {
            let dir = raw_path.iter().fold(root.clone(), |acc, s| acc.join(s));
            for name in CATEGORY_FILES {
                let path = dir.join(name);
                if !path.is_file() {
                    continue;
                }
                let parsed = std::fs::read_to_string(&path)
                    .map_err(|e| e.to_string())
                    .and_then(|s| serde_yaml::from_str::<Option<CategoryMeta>>(&s).map_err(|e| e.to_string()));
                match parsed {
                    Ok(meta) => return meta.unwrap_or_default(),
                    Err(message) => {
                        report.record(
                            Problem::MalformedFrontMatter { message },
                            self.config.policies.malformed_front_matter,
                            Location::new(self.config.display_path(&path)),
                        );
                        return CategoryMeta::default();
                    }
                }
            }
        }
        CategoryMeta::default()
    }
}

fn path_segments(path: &Path) -> Vec<String> {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(os) => os.to_str().map(str::to_string),
            _ => None,
        })
        .collect()
}

fn sort_siblings(items: &mut [Sortable]) {
    items.sort_by(|a, b| match (a.0, b.0) {
        (Some(x), Some(y)) => x.total_cmp(&y).then_with(|| a.1.cmp(&b.1)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.1.cmp(&b.1),
    });
}

/// Drop every node whose id was already seen, depth first.
fn dedupe(
    nodes: Vec<NavigationNode>,
    seen: &mut HashSet<String>,
    duplicates: &mut Vec<String>,
) -> Vec<NavigationNode> {
    let mut kept = Vec::with_capacity(nodes.len());
    for node in nodes {
        if !seen.insert(node.id().to_string()) {
            duplicates.push(node.id().to_string());
            continue;
        }
        match node {
            NavigationNode::Category {
                id,
                label,
                permalink,
                children,
            } => kept.push(NavigationNode::Category {
                id,
                label,
                permalink,
                children: dedupe(children, seen, duplicates),
            }),
            leaf => kept.push(leaf),
        }
    }
    kept
}
