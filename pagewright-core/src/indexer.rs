//! Content discovery and page indexing.

use crate::blog::{self, BlogRegistries};
use crate::config::{BuildConfig, ContentRoot};
use crate::diagnostics::{BuildReport, Diagnostic, Location, Problem};
use crate::error::BuildError;
use crate::frontmatter::{parse_frontmatter_block, split_frontmatter, FrontMatter};
use crate::markdown;
use crate::models::{route_key, ContentKind, NavigationTree, PageRecord, PageSet, SourceDocument};
use crate::navigation::NavigationBuilder;
use crate::slug::{page_id_from_path, split_number_prefix};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Component, Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

const CONTENT_EXTENSIONS: [&str; 2] = ["md", "mdx"];

/// Output of the indexing phase.
#[derive(Debug, Clone)]
pub struct IndexOutput {
    pub pages: PageSet,
    pub navigation: NavigationTree,
    pub report: BuildReport,
}

/// A document waiting to be parsed.
#[derive(Debug, Clone)]
struct Candidate {
    kind: ContentKind,
    route_base: String,
    rel_path: PathBuf,
    origin: PathBuf,
    source: String,
    /// Inline contents for plugin documents; files are read during parsing
    contents: Option<String>,
}

struct Parsed {
    page: Option<PageRecord>,
    diagnostics: Vec<Diagnostic>,
}

/// Walks content roots and produces the frozen page set and navigation tree.
pub struct ContentIndexer<'a> {
    config: &'a BuildConfig,
    contributed: Vec<(String, SourceDocument)>,
}

impl<'a> ContentIndexer<'a> {
    pub fn new(config: &'a BuildConfig) -> Self {
        Self {
            config,
            contributed: Vec::new(),
        }
    }

    /// Add documents contributed by a plugin; they are indexed after the files on disk.
    pub fn with_documents(mut self, plugin: &str, documents: Vec<SourceDocument>) -> Self {
        self.contributed
            .extend(documents.into_iter().map(|doc| (plugin.to_string(), doc)));
        self
    }

    pub fn index(&self, roots: &[ContentRoot]) -> Result<IndexOutput, BuildError> {
        let mut report = BuildReport::new();

        let mut candidates = Vec::new();
        for root in roots {
            candidates.extend(self.discover(root)?);
        }
        candidates.extend(self.plugin_candidates(roots));
        tracing::info!("Found {} content documents", candidates.len());

        let registries = self.load_blog_registries(roots, &mut report);

        let parsed = candidates
            .par_iter()
            .map(|candidate| self.parse(candidate, &registries))
            .collect::<Result<Vec<_>, BuildError>>()?;

        let mut pages = Vec::with_capacity(parsed.len());
        for result in parsed {
            for diagnostic in result.diagnostics {
                report.push(diagnostic);
            }
            pages.extend(result.page);
        }

        let pages = self.resolve_duplicates(pages, &mut report);
        let pages = PageSet::from_pages(pages);

        let (navigation, nav_report) = NavigationBuilder::new(self.config, &pages).build();
        report.merge(nav_report);

        Ok(IndexOutput {
            pages,
            navigation,
            report,
        })
    }

    fn discover(&self, root: &ContentRoot) -> Result<Vec<Candidate>, BuildError> {
        if !root.path.is_dir() {
            tracing::warn!(
                "Content root {} does not exist, skipping",
                self.config.display_path(&root.path)
            );
            return Ok(Vec::new());
        }

        let mut candidates = Vec::new();
        let walker = WalkDir::new(&root.path)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_excluded(e));

        for entry in walker {
            let entry = entry?;
            if !entry.file_type().is_file() || !has_content_extension(entry.path()) {
                continue;
            }
            let rel_path = entry
                .path()
                .strip_prefix(&root.path)
                .unwrap_or(entry.path())
                .to_path_buf();
            candidates.push(Candidate {
                kind: root.kind,
                route_base: root.route_base.clone(),
                rel_path,
                origin: entry.path().to_path_buf(),
                source: self.config.display_path(entry.path()),
                contents: None,
            });
        }

        Ok(candidates)
    }

    fn plugin_candidates(&self, roots: &[ContentRoot]) -> Vec<Candidate> {
        self.contributed
            .iter()
            .filter_map(|(plugin, doc)| {
                let Some(root) = roots.iter().find(|r| r.kind == doc.kind) else {
                    tracing::warn!(
                        "Plugin `{}` contributed {} content but that root is disabled",
                        plugin,
                        doc.kind.as_str()
                    );
                    return None;
                };
                Some(Candidate {
                    kind: doc.kind,
                    route_base: root.route_base.clone(),
                    rel_path: doc.rel_path.clone(),
                    origin: root.path.join(&doc.rel_path),
                    source: format!("plugin:{}/{}", plugin, slash_path(&doc.rel_path)),
                    contents: Some(doc.contents.clone()),
                })
            })
            .collect()
    }

    fn load_blog_registries(&self, roots: &[ContentRoot], report: &mut BuildReport) -> BlogRegistries {
        let (Some(options), Some(root)) = (
            self.config.blog.as_ref(),
            roots.iter().find(|r| r.kind == ContentKind::Blog),
        ) else {
            return BlogRegistries::default();
        };
        let (registries, problems) = BlogRegistries::load(&root.path, options);
        for (path, problem) in problems {
            report.record(
                problem,
                self.config.policies.malformed_front_matter,
                Location::new(self.config.display_path(Path::new(&path))),
            );
        }
        registries
    }

    fn parse(&self, candidate: &Candidate, registries: &BlogRegistries) -> Result<Parsed, BuildError> {
        let contents = match &candidate.contents {
            Some(contents) => contents.clone(),
            None => fs::read_to_string(&candidate.origin)
                .map_err(|e| BuildError::io(&candidate.origin, e))?,
        };
        let content_hash = blake3::hash(contents.as_bytes()).to_hex().to_string();
        let mut diagnostics = Vec::new();

        let split = split_frontmatter(&contents);
        let front_matter = match split.yaml.map(parse_frontmatter_block) {
            Some(Ok(front_matter)) => front_matter,
            Some(Err(err)) => {
                diagnostics.push(Diagnostic::new(
                    Problem::MalformedFrontMatter {
                        message: err.to_string(),
                    },
                    self.config.policies.malformed_front_matter,
                    Location::at_line(candidate.source.clone(), 1),
                ));
                FrontMatter::default()
            }
            None => FrontMatter::default(),
        };

        let draft = front_matter.get_bool("draft").unwrap_or(false);
        if draft && !self.config.include_drafts {
            tracing::debug!("Skipping draft {}", candidate.source);
            return Ok(Parsed {
                page: None,
                diagnostics,
            });
        }

        let scan = markdown::scan(split.body, split.body_line_offset);
        let id = self.page_id(candidate, &front_matter);
        let permalink = self.permalink(candidate, &id, &front_matter);

        let title = front_matter
            .get_str("title")
            .map(str::to_string)
            .or_else(|| scan.first_h1().map(str::to_string))
            .unwrap_or_else(|| fallback_title(&candidate.rel_path));

        let blog = match candidate.kind {
            ContentKind::Blog => {
                let (meta, problems) = blog::post_meta(
                    &candidate.rel_path,
                    &front_matter,
                    split.body,
                    &scan,
                    registries,
                    &self.config.policies,
                );
                for (problem, policy) in problems {
                    diagnostics.push(
                        Diagnostic::new(problem, policy, Location::new(candidate.source.clone()))
                            .with_page(id.clone()),
                    );
                }
                Some(meta)
            }
            ContentKind::Docs => None,
        };

        for diagnostic in diagnostics.iter_mut() {
            if diagnostic.page_id.is_none() {
                diagnostic.page_id = Some(id.clone());
            }
        }

        let page = PageRecord {
            kind: candidate.kind,
            title,
            permalink,
            source: candidate.source.clone(),
            origin: candidate.origin.clone(),
            rel_dir: candidate
                .rel_path
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_default(),
            body: split.body.to_string(),
            references: scan.references,
            anchors: scan.anchors,
            sidebar_position: front_matter.get_f64("sidebar_position"),
            sidebar_label: front_matter.get_str("sidebar_label").map(str::to_string),
            description: front_matter.get_str("description").map(str::to_string),
            text: scan.text,
            word_count: scan.word_count,
            draft,
            content_hash,
            blog,
            front_matter,
            id,
        };

        Ok(Parsed {
            page: Some(page),
            diagnostics,
        })
    }

    fn page_id(&self, candidate: &Candidate, front_matter: &FrontMatter) -> String {
        let declared = front_matter.get_str("id");
        match candidate.kind {
            ContentKind::Docs => page_id_from_path(&candidate.rel_path, declared),
            ContentKind::Blog => {
                let slug = blog_slug(&candidate.rel_path, declared);
                format!("{}/{}", candidate.route_base.trim_matches('/'), slug)
            }
        }
    }

    fn permalink(&self, candidate: &Candidate, id: &str, front_matter: &FrontMatter) -> String {
        let route_base = candidate.route_base.as_str();
        let default_path = match candidate.kind {
            ContentKind::Docs => id.to_string(),
            ContentKind::Blog => id
                .strip_prefix(route_base.trim_matches('/'))
                .unwrap_or(id)
                .trim_start_matches('/')
                .to_string(),
        };

        let path = match front_matter.get_str("slug").map(str::trim) {
            Some(slug) if slug.starts_with('/') => slug.to_string(),
            Some(slug) if !slug.is_empty() => match default_path.rsplit_once('/') {
                Some((dir, _)) => format!("{}/{}", dir, slug),
                None => slug.to_string(),
            },
            _ => collapse_index(&default_path),
        };

        self.config.route(&[route_base, path.as_str()])
    }

    /// Keep the first document (in path order) per identifier and per route.
    fn resolve_duplicates(&self, pages: Vec<PageRecord>, report: &mut BuildReport) -> Vec<PageRecord> {
        let policy = self.config.policies.duplicate_ids;

        let mut by_id: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for (index, page) in pages.iter().enumerate() {
            by_id.entry(page.id.clone()).or_default().push(index);
        }
        let mut excluded = vec![false; pages.len()];
        for (id, indices) in by_id.into_iter().filter(|(_, v)| v.len() > 1) {
            let paths = indices.iter().map(|&i| pages[i].source.clone()).collect();
            report.push(
                Diagnostic::new(
                    Problem::DuplicateIdentifier {
                        id: id.clone(),
                        paths,
                    },
                    policy,
                    Location::new(pages[indices[1]].source.clone()),
                )
                .with_page(id),
            );
            for &i in &indices[1..] {
                excluded[i] = true;
            }
        }

        let mut by_route: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for (index, page) in pages.iter().enumerate().filter(|(i, _)| !excluded[*i]) {
            by_route.entry(route_key(&page.permalink)).or_default().push(index);
        }
        for (route, indices) in by_route.into_iter().filter(|(_, v)| v.len() > 1) {
            report.push(Diagnostic::new(
                Problem::DuplicateRoute {
                    route,
                    pages: indices.iter().map(|&i| pages[i].id.clone()).collect(),
                },
                policy,
                Location::new(pages[indices[1]].source.clone()),
            ));
        }

        pages
            .into_iter()
            .zip(excluded)
            .filter_map(|(page, excluded)| (!excluded).then_some(page))
            .collect()
    }
}

fn is_excluded(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|name| name.starts_with('_') || name.starts_with('.'))
        .unwrap_or(false)
}

fn has_content_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| CONTENT_EXTENSIONS.contains(&ext))
        .unwrap_or(false)
}

fn slash_path(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(os) => os.to_str(),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// `guide/index` -> `guide`; a lone `index` becomes the empty path.
fn collapse_index(path: &str) -> String {
    match path.rsplit_once('/') {
        Some((dir, last)) if is_index_name(last) => dir.to_string(),
        None if is_index_name(path) => String::new(),
        _ => path.to_string(),
    }
}

fn is_index_name(name: &str) -> bool {
    name.eq_ignore_ascii_case("index") || name.eq_ignore_ascii_case("readme")
}

/// Blog slug: date prefixes stripped from every segment, `index` files named
/// after their directory.
fn blog_slug(rel_path: &Path, declared: Option<&str>) -> String {
    let mut segments: Vec<String> = rel_path
        .parent()
        .map(|parent| {
            parent
                .components()
                .filter_map(|c| match c {
                    Component::Normal(os) => os.to_str(),
                    _ => None,
                })
                .map(|s| blog::split_date_prefix(s).1.to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default();

    let stem = rel_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default();
    match declared.map(str::trim).filter(|d| !d.is_empty()) {
        Some(id) => segments.push(id.to_string()),
        None => {
            let name = blog::split_date_prefix(stem).1;
            if !is_index_name(name) && !name.is_empty() {
                segments.push(name.to_string());
            }
        }
    }
    if segments.is_empty() {
        segments.push(stem.to_string());
    }
    segments.join("/")
}

fn fallback_title(rel_path: &Path) -> String {
    let stem = rel_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default();
    let name = if is_index_name(stem) {
        rel_path
            .parent()
            .and_then(|p| p.file_name())
            .and_then(|s| s.to_str())
            .unwrap_or(stem)
    } else {
        stem
    };
    let name = blog::split_date_prefix(split_number_prefix(name).1).1;
    name.replace(['-', '_'], " ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigResolver, RawOptions};
    use crate::context::BuildContext;
    use crate::diagnostics::Severity;
    use crate::models::NavigationNode;
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &Path, rel: &str, contents: &str) {
        let path = dir.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, contents).unwrap();
    }

    fn config(dir: &Path, extra: &str) -> BuildConfig {
        let yaml = format!("site:\n  title: Test\n  url: https://example.com\n{}", extra);
        let raw = RawOptions::from_yaml_str(&yaml, dir).unwrap();
        ConfigResolver::new(&BuildContext::with_builtins())
            .resolve(&raw)
            .unwrap()
    }

    fn index(config: &BuildConfig) -> IndexOutput {
        ContentIndexer::new(config)
            .index(&config.content_roots())
            .unwrap()
    }

    #[test]
    fn test_ids_titles_and_permalinks() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "docs/intro.md", "---\ntitle: Welcome\n---\n# Ignored\n");
        write(temp.path(), "docs/01-streamlit/02-tables.md", "# Tables\n");
        write(temp.path(), "docs/01-streamlit/index.md", "Overview\n");
        write(temp.path(), "docs/guide/setup.md", "---\nid: install\n---\nBody\n");
        write(temp.path(), "docs/_partials/snippet.md", "# Partial\n");
        write(temp.path(), "docs/notes.txt", "not content");

        let config = config(temp.path(), "");
        let output = index(&config);
        let pages: Vec<_> = output
            .pages
            .iter()
            .map(|p| (p.id.as_str(), p.title.as_str(), p.permalink.as_str()))
            .collect();
        assert_eq!(
            pages,
            vec![
                ("guide/install", "setup", "/docs/guide/install"),
                ("intro", "Welcome", "/docs/intro"),
                ("streamlit/index", "streamlit", "/docs/streamlit"),
                ("streamlit/tables", "Tables", "/docs/streamlit/tables"),
            ]
        );
        assert!(output.report.is_empty());
    }

    #[test]
    fn test_autogenerated_navigation_order() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "docs/zeta.md", "# Zeta\n");
        write(temp.path(), "docs/alpha.md", "# Alpha\n");
        write(temp.path(), "docs/first.md", "---\nsidebar_position: 1\n---\n# First\n");
        write(temp.path(), "docs/streamlit/_category_.yml", "label: Streamlit Apps\nposition: 2\n");
        write(temp.path(), "docs/streamlit/b.md", "# B\n");
        write(temp.path(), "docs/streamlit/a.md", "---\nsidebar_label: Short A\n---\n# A\n");

        let config = config(temp.path(), "");
        let output = index(&config);
        let top: Vec<_> = output.navigation.sidebar.iter().map(|n| n.id()).collect();
        assert_eq!(top, vec!["first", "category:streamlit-apps", "alpha", "zeta"]);

        match &output.navigation.sidebar[1] {
            NavigationNode::Category {
                label,
                permalink,
                children,
                ..
            } => {
                assert_eq!(label, "Streamlit Apps");
                assert_eq!(permalink.as_deref(), Some("/docs/category/streamlit-apps"));
                let labels: Vec<_> = children.iter().map(|c| c.label()).collect();
                assert_eq!(labels, vec!["Short A", "B"]);
            }
            other => panic!("expected category, got {:?}", other),
        }
    }

    #[test]
    fn test_indexing_is_deterministic() {
        let temp = TempDir::new().unwrap();
        for i in 0..20 {
            write(temp.path(), &format!("docs/section-{}/page-{}.md", i % 3, i), "# Page\n");
        }
        let config = config(temp.path(), "");
        let first = index(&config);
        let second = index(&config);
        let ids = |o: &IndexOutput| o.pages.iter().map(|p| p.id.clone()).collect::<Vec<_>>();
        assert_eq!(ids(&first), ids(&second));
        assert_eq!(first.navigation, second.navigation);
    }

    #[test]
    fn test_duplicate_identifier_names_both_paths() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "docs/intro.md", "# Intro\n");
        write(temp.path(), "docs/welcome.md", "---\nid: intro\n---\n# Welcome\n");

        let config = config(temp.path(), "on_duplicate_ids: warn\n");
        let output = index(&config);
        let diagnostic = output.report.find("duplicate-identifier").next().unwrap();
        assert_eq!(diagnostic.severity, Severity::Warning);
        match &diagnostic.problem {
            Problem::DuplicateIdentifier { id, paths } => {
                assert_eq!(id, "intro");
                assert_eq!(paths, &vec!["docs/intro.md".to_string(), "docs/welcome.md".to_string()]);
            }
            other => panic!("unexpected problem {:?}", other),
        }
        assert_eq!(output.pages.len(), 1);
        assert_eq!(output.pages.get("intro").unwrap().title, "Intro");
    }

    #[test]
    fn test_malformed_front_matter_still_indexes_page() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "docs/bad.md", "---\ntitle: [unclosed\n---\n# Bad\n");

        let config = config(temp.path(), "on_malformed_front_matter: warn\n");
        let output = index(&config);
        let diagnostic = output.report.find("malformed-front-matter").next().unwrap();
        assert_eq!(diagnostic.location.to_string(), "docs/bad.md:1");
        assert!(!output.report.has_errors());
        assert_eq!(output.pages.get("bad").unwrap().title, "Bad");
    }

    #[test]
    fn test_drafts_are_excluded_unless_requested() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "docs/wip.md", "---\ndraft: true\n---\n# WIP\n");

        assert!(index(&config(temp.path(), "")).pages.is_empty());
        assert_eq!(index(&config(temp.path(), "include_drafts: true\n")).pages.len(), 1);
    }

    #[test]
    fn test_blog_posts() {
        let temp = TempDir::new().unwrap();
        write(
            temp.path(),
            "blog/2024-01-05-launch.md",
            "---\ntags: [release]\n---\n# Launch\n\nIntro\n\n<!-- truncate -->\n\nMore\n",
        );
        write(temp.path(), "blog/2023-06-01-hello/index.md", "# Hello\n\n<!-- truncate -->\n");

        let config = config(temp.path(), "preset: classic\n");
        let output = index(&config);
        let launch = output.pages.get("blog/launch").unwrap();
        assert_eq!(launch.permalink, "/blog/launch");
        let meta = launch.blog.as_ref().unwrap();
        assert_eq!(meta.date.map(|d| d.to_string()).as_deref(), Some("2024-01-05"));
        assert_eq!(meta.tags[0].permalink, "release");
        assert_eq!(output.navigation.blog, vec!["blog/launch", "blog/hello"]);
        assert_eq!(output.report.find("untruncated-blog-post").count(), 0);
    }

    #[test]
    fn test_plugin_documents_are_indexed() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "docs/intro.md", "# Intro\n");
        let config = config(temp.path(), "");
        let output = ContentIndexer::new(&config)
            .with_documents(
                "changelog",
                vec![SourceDocument::docs("changelog.md", "# Changelog\n")],
            )
            .index(&config.content_roots())
            .unwrap();
        let page = output.pages.get("changelog").unwrap();
        assert_eq!(page.source, "plugin:changelog/changelog.md");
        assert_eq!(page.permalink, "/docs/changelog");
    }

    #[test]
    fn test_blog_slug() {
        assert_eq!(blog_slug(Path::new("2021-08-26-welcome.md"), None), "welcome");
        assert_eq!(blog_slug(Path::new("2021-08-26-welcome/index.md"), None), "welcome");
        assert_eq!(blog_slug(Path::new("news/post.mdx"), Some("custom")), "news/custom");
    }

    #[test]
    fn test_collapse_index() {
        assert_eq!(collapse_index("guide/index"), "guide");
        assert_eq!(collapse_index("index"), "");
        assert_eq!(collapse_index("guide/setup"), "guide/setup");
    }
}
