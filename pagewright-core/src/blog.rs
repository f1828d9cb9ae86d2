//! Blog post metadata: dates, authors, tags and reading time.

use crate::config::{BlogOptions, BuildConfig, FailurePolicies};
use crate::diagnostics::{FailurePolicy, Problem};
use crate::frontmatter::FrontMatter;
use crate::markdown::{self, DocumentScan};
use crate::slug::slugify;
use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::OnceLock;

const WORDS_PER_MINUTE: usize = 200;
const SUMMARY_CHARS: usize = 280;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct BlogTag {
    pub label: String,
    /// Segment under `<blog>/tags/`
    pub permalink: String,
}

#[derive(Debug, Clone, Deserialize)]
struct TagDefinition {
    #[serde(default)]
    label: Option<String>,
    #[serde(default)]
    permalink: Option<String>,
}

/// Per-post metadata carried on blog [`PageRecord`](crate::PageRecord)s.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BlogMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    pub authors: Vec<Author>,
    pub tags: Vec<BlogTag>,
    pub reading_time_minutes: usize,
    pub truncated: bool,
    pub summary: String,
}

/// Predeclared authors and tags, loaded once from the blog directory.
///
/// A missing file means no registry; inline usage is then not reported.
#[derive(Debug, Clone, Default)]
pub struct BlogRegistries {
    pub authors: Option<BTreeMap<String, Author>>,
    pub tags: Option<BTreeMap<String, BlogTag>>,
}

impl BlogRegistries {
    /// Load `authors.yml` / `tags.yml`. Malformed files are returned as problems
    /// together with the file they came from.
    pub fn load(blog_dir: &Path, options: &BlogOptions) -> (Self, Vec<(String, Problem)>) {
        let mut registries = Self::default();
        let mut problems = Vec::new();

        let authors_path = blog_dir.join(&options.authors_file);
        if let Some(contents) = read_optional(&authors_path) {
            match serde_yaml::from_str::<BTreeMap<String, Author>>(&contents) {
                Ok(mut authors) => {
                    for (key, author) in authors.iter_mut() {
                        author.key = Some(key.clone());
                    }
                    registries.authors = Some(authors);
                }
                Err(err) => problems.push((
                    authors_path.display().to_string(),
                    Problem::MalformedFrontMatter {
                        message: err.to_string(),
                    },
                )),
            }
        }

        let tags_path = blog_dir.join(&options.tags_file);
        if let Some(contents) = read_optional(&tags_path) {
            match serde_yaml::from_str::<BTreeMap<String, TagDefinition>>(&contents) {
                Ok(definitions) => {
                    let tags = definitions
                        .into_iter()
                        .map(|(key, def)| {
                            let label = def.label.unwrap_or_else(|| key.clone());
                            let permalink = def
                                .permalink
                                .map(|p| p.trim_matches('/').to_string())
                                .unwrap_or_else(|| slugify(&key));
                            (key, BlogTag { label, permalink })
                        })
                        .collect();
                    registries.tags = Some(tags);
                }
                Err(err) => problems.push((
                    tags_path.display().to_string(),
                    Problem::MalformedFrontMatter {
                        message: err.to_string(),
                    },
                )),
            }
        }

        (registries, problems)
    }
}

fn read_optional(path: &Path) -> Option<String> {
    if path.is_file() {
        std::fs::read_to_string(path).ok()
    } else {
        None
    }
}

fn date_prefix_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d{4})[-/](\d{2})[-/](\d{2})[-/]?(.*)$").unwrap())
}

/// Split a `YYYY-MM-DD-` prefix off a post file or directory name.
///
/// ```
/// use pagewright_core::blog::split_date_prefix;
///
/// let (date, rest) = split_date_prefix("2024-03-09-release-notes");
/// assert_eq!(date.map(|d| d.to_string()).as_deref(), Some("2024-03-09"));
/// assert_eq!(rest, "release-notes");
/// ```
pub fn split_date_prefix(name: &str) -> (Option<NaiveDate>, &str) {
    if let Some(captures) = date_prefix_regex().captures(name) {
        let date = format!("{}-{}-{}", &captures[1], &captures[2], &captures[3]);
        if let Ok(date) = NaiveDate::parse_from_str(&date, "%Y-%m-%d") {
            let rest = captures.get(4).map(|m| m.as_str()).unwrap_or_default();
            return (Some(date), rest);
        }
    }
    (None, name)
}

/// Parse a front-matter date; datetimes keep only their date part.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    let date = raw.get(..10).unwrap_or(raw);
    NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()
}

pub fn reading_time_minutes(word_count: usize) -> usize {
    word_count.div_ceil(WORDS_PER_MINUTE).max(1)
}

/// Derive blog metadata for one post and the policy-bearing problems it raises.
pub fn post_meta(
    rel_path: &Path,
    front_matter: &FrontMatter,
    body: &str,
    scan: &DocumentScan,
    registries: &BlogRegistries,
    policies: &FailurePolicies,
) -> (BlogMeta, Vec<(Problem, FailurePolicy)>) {
    let mut problems = Vec::new();

    let date = match front_matter.get("date") {
        Some(Value::String(raw)) => match parse_date(raw) {
            Some(date) => Some(date),
            None => {
                problems.push((
                    Problem::MalformedFrontMatter {
                        message: format!("invalid date `{}`", raw),
                    },
                    policies.malformed_front_matter,
                ));
                None
            }
        },
        _ => date_from_path(rel_path),
    };

    let (authors, inline_authors) = resolve_authors(front_matter, registries);
    if !inline_authors.is_empty() {
        problems.push((
            Problem::InlineAuthors {
                authors: inline_authors,
            },
            policies.inline_authors,
        ));
    }

    let (tags, inline_tags) = resolve_tags(front_matter, registries);
    if !inline_tags.is_empty() {
        problems.push((Problem::InlineTags { tags: inline_tags }, policies.inline_tags));
    }

    let marker = markdown::truncation_marker(body);
    if marker.is_none() {
        problems.push((Problem::UntruncatedBlogPost, policies.untruncated_blog_posts));
    }

    let summary = match (front_matter.get_str("description"), marker) {
        (Some(description), _) => description.trim().to_string(),
        (None, Some(offset)) => markdown::scan(&body[..offset], 0).text,
        (None, None) => scan.text.chars().take(SUMMARY_CHARS).collect(),
    };

    let meta = BlogMeta {
        date,
        authors,
        tags,
        reading_time_minutes: reading_time_minutes(scan.word_count),
        truncated: marker.is_some(),
        summary,
    };
    (meta, problems)
}

fn date_from_path(rel_path: &Path) -> Option<NaiveDate> {
    rel_path
        .iter()
        .rev()
        .filter_map(|part| part.to_str())
        .find_map(|part| split_date_prefix(part).0)
}

fn resolve_authors(front_matter: &FrontMatter, registries: &BlogRegistries) -> (Vec<Author>, Vec<String>) {
    let mut authors = Vec::new();
    let mut inline = Vec::new();

    let entries: Vec<Value> = match front_matter.get("authors") {
        Some(Value::Sequence(items)) => items.clone(),
        Some(value) => vec![value.clone()],
        None => match front_matter.get_str("author") {
            Some(name) => vec![Value::String(name.to_string())],
            None => Vec::new(),
        },
    };

    for entry in entries {
        match entry {
            Value::String(key) => match registries.authors.as_ref().map(|r| r.get(&key)) {
                Some(Some(author)) => authors.push(author.clone()),
                Some(None) => {
                    inline.push(key.clone());
                    authors.push(inline_author(key));
                }
                None => authors.push(inline_author(key)),
            },
            Value::Mapping(_) => {
                if let Ok(author) = serde_yaml::from_value::<Author>(entry) {
                    if registries.authors.is_some() {
                        inline.push(author.name.clone());
                    }
                    authors.push(author);
                }
            }
            _ => {}
        }
    }

    (authors, inline)
}

fn inline_author(name: String) -> Author {
    Author {
        key: None,
        name,
        title: None,
        url: None,
        image_url: None,
    }
}

fn resolve_tags(front_matter: &FrontMatter, registries: &BlogRegistries) -> (Vec<BlogTag>, Vec<String>) {
    let mut tags = BTreeSet::new();
    let mut inline = Vec::new();

    for key in front_matter.get_string_list("tags") {
        match registries.tags.as_ref().map(|r| r.get(&key)) {
            Some(Some(tag)) => {
                tags.insert(tag.clone());
            }
            Some(None) => {
                inline.push(key.clone());
                tags.insert(inline_tag(&key));
            }
            None => {
                tags.insert(inline_tag(&key));
            }
        }
    }

    (tags.into_iter().collect(), inline)
}

fn inline_tag(label: &str) -> BlogTag {
    BlogTag {
        label: label.to_string(),
        permalink: slugify(label),
    }
}

/// Routes the blog generates beyond the posts themselves: paginated lists,
/// the archive and tag pages.
pub fn generated_routes(config: &BuildConfig, posts: &[&crate::PageRecord]) -> BTreeSet<String> {
    let mut routes = BTreeSet::new();
    let Some(blog) = &config.blog else {
        return routes;
    };
    let base = blog.route_base.as_str();

    routes.insert(config.route(&[base]));
    routes.insert(config.route(&[base, "archive"]));
    routes.insert(config.route(&[base, "tags"]));

    let per_page = blog.posts_per_page.max(1);
    let pages = posts.len().div_ceil(per_page);
    for page in 2..=pages {
        let page = page.to_string();
        routes.insert(config.route(&[base, "page", page.as_str()]));
    }

    for post in posts {
        if let Some(meta) = &post.blog {
            for tag in &meta.tags {
                routes.insert(config.route(&[base, "tags", tag.permalink.as_str()]));
            }
        }
    }

    routes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontmatter::parse_frontmatter_block;

    fn policies() -> FailurePolicies {
        FailurePolicies {
            broken_links: FailurePolicy::Throw,
            broken_markdown_links: FailurePolicy::Warn,
            broken_anchors: FailurePolicy::Warn,
            duplicate_ids: FailurePolicy::Throw,
            malformed_front_matter: FailurePolicy::Throw,
            plugin_timeout: FailurePolicy::Throw,
            inline_tags: FailurePolicy::Warn,
            inline_authors: FailurePolicy::Warn,
            untruncated_blog_posts: FailurePolicy::Warn,
        }
    }

    fn registries() -> BlogRegistries {
        let mut authors = BTreeMap::new();
        authors.insert(
            "ada".to_string(),
            Author {
                key: Some("ada".to_string()),
                name: "Ada".to_string(),
                title: None,
                url: None,
                image_url: None,
            },
        );
        let mut tags = BTreeMap::new();
        tags.insert(
            "release".to_string(),
            BlogTag {
                label: "Release".to_string(),
                permalink: "releases".to_string(),
            },
        );
        BlogRegistries {
            authors: Some(authors),
            tags: Some(tags),
        }
    }

    #[test]
    fn test_split_date_prefix() {
        assert_eq!(split_date_prefix("welcome").1, "welcome");
        assert!(split_date_prefix("welcome").0.is_none());
        assert!(split_date_prefix("2024-13-40-bad").0.is_none());
        let (date, rest) = split_date_prefix("2021-08-26-welcome");
        assert_eq!(date, NaiveDate::from_ymd_opt(2021, 8, 26));
        assert_eq!(rest, "welcome");
    }

    #[test]
    fn test_reading_time() {
        assert_eq!(reading_time_minutes(0), 1);
        assert_eq!(reading_time_minutes(200), 1);
        assert_eq!(reading_time_minutes(201), 2);
    }

    #[test]
    fn test_post_meta_with_registries() {
        let fm = parse_frontmatter_block("authors: [ada, bob]\ntags: [release, misc]\n").unwrap();
        let body = "Short intro.\n\n<!-- truncate -->\n\nThe rest.\n";
        let scan = markdown::scan(body, 0);
        let (meta, problems) = post_meta(
            Path::new("2024-01-05-launch.md"),
            &fm,
            body,
            &scan,
            &registries(),
            &policies(),
        );

        assert_eq!(meta.date, NaiveDate::from_ymd_opt(2024, 1, 5));
        assert!(meta.truncated);
        assert_eq!(meta.summary, "Short intro.");
        assert_eq!(meta.authors[0].name, "Ada");
        assert_eq!(meta.tags.iter().map(|t| t.permalink.as_str()).collect::<Vec<_>>(), vec!["releases", "misc"]);

        let codes: Vec<_> = problems.iter().map(|(p, _)| p.code()).collect();
        assert_eq!(codes, vec!["inline-authors", "inline-tags"]);
    }

    #[test]
    fn test_untruncated_post_is_reported() {
        let fm = parse_frontmatter_block("date: 2023-02-01\n").unwrap();
        let body = "All in one go.\n";
        let scan = markdown::scan(body, 0);
        let (meta, problems) = post_meta(
            Path::new("post.md"),
            &fm,
            body,
            &scan,
            &BlogRegistries::default(),
            &policies(),
        );
        assert_eq!(meta.date, NaiveDate::from_ymd_opt(2023, 2, 1));
        assert!(!meta.truncated);
        assert_eq!(problems.len(), 1);
        assert_eq!(problems[0].0, Problem::UntruncatedBlogPost);
    }
}
