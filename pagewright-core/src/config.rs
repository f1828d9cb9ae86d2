//! Configuration resolution.
//!
//! Options arrive as nested YAML (`pagewright.yml`) and are merged in layers:
//! built-in defaults < preset defaults < the user's file < CLI overrides.
//! The merged tree is deserialized into a strict raw struct, validated and
//! frozen into a [`BuildConfig`] that downstream phases only ever read.

use crate::context::BuildContext;
use crate::diagnostics::FailurePolicy;
use crate::models::ContentKind;
use crate::plugin::PluginRegistry;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use std::collections::BTreeMap;
use std::ops::{Deref, DerefMut};
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Default configuration file name.
pub const CONFIG_FILENAME: &str = "pagewright.yml";

const BUILTIN_DEFAULTS: &str = r#"
base_url: /
i18n:
  default_locale: en
  locales: [en]
docs:
  path: docs
  route_base: docs
blog: false
content_roots: []
static_dirs: [static]
navbar: []
on_broken_links: throw
on_broken_markdown_links: warn
on_broken_anchors: warn
on_duplicate_ids: throw
on_malformed_front_matter: throw
on_plugin_timeout: throw
on_inline_tags: warn
on_inline_authors: warn
on_untruncated_blog_posts: warn
search:
  min_token_length: 2
  stop_words: {}
plugins: {}
include_drafts: false
output_dir: build
"#;

#[derive(Error, Debug)]
pub enum ConfigurationError {
    #[error("failed to read config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse YAML in {origin}: {source}")]
    Parse {
        origin: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid configuration in {origin}: {message}")]
    Invalid { origin: String, message: String },

    #[error("missing required field `{0}`")]
    MissingField(String),

    #[error("unknown preset `{0}`")]
    UnknownPreset(String),

    #[error("plugin options reference unregistered plugin `{0}`")]
    UnknownPlugin(String),

    #[error("plugin `{0}` is registered more than once")]
    DuplicatePlugin(String),

    #[error("invalid options for plugin `{plugin}`: {message}")]
    PluginOptions { plugin: String, message: String },

    #[error("default locale `{default}` is not in the locale list {locales:?}")]
    UnknownDefaultLocale {
        default: String,
        locales: Vec<String>,
    },

    #[error("conflicting configuration: {0}")]
    Conflict(String),
}

/// Unresolved options: the user's YAML tree plus any CLI overrides.
#[derive(Debug, Clone)]
pub struct RawOptions {
    user: Value,
    overrides: Value,
    base_dir: PathBuf,
    origin: String,
}

impl RawOptions {
    /// Load options from a YAML file; relative paths resolve against its directory.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigurationError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigurationError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let base_dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let origin = path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or(CONFIG_FILENAME)
            .to_string();
        Self::parse(&contents, base_dir, origin)
    }

    pub fn from_yaml_str(yaml: &str, base_dir: impl Into<PathBuf>) -> Result<Self, ConfigurationError> {
        Self::parse(yaml, base_dir.into(), CONFIG_FILENAME.to_string())
    }

    fn parse(yaml: &str, base_dir: PathBuf, origin: String) -> Result<Self, ConfigurationError> {
        let user: Value = serde_yaml::from_str(yaml).map_err(|source| ConfigurationError::Parse {
            origin: origin.clone(),
            source,
        })?;
        let user = match user {
            Value::Null => Value::Mapping(Mapping::new()),
            Value::Mapping(_) => user,
            _ => {
                return Err(ConfigurationError::Invalid {
                    origin,
                    message: "top level must be a mapping".to_string(),
                })
            }
        };
        Ok(Self {
            user,
            overrides: Value::Mapping(Mapping::new()),
            base_dir,
            origin,
        })
    }

    /// Override a (dotted) key on top of every other layer.
    ///
    /// ```
    /// use pagewright_core::RawOptions;
    ///
    /// let mut raw = RawOptions::from_yaml_str("site: {title: T, url: 'https://x'}", ".").unwrap();
    /// raw.set_override("on_broken_links", "warn");
    /// raw.set_override("docs.path", "content");
    /// ```
    pub fn set_override(&mut self, key: &str, value: impl Into<Value>) {
        let mut layer = value.into();
        for part in key.rsplit('.') {
            let mut mapping = Mapping::new();
            mapping.insert(Value::String(part.to_string()), layer);
            layer = Value::Mapping(mapping);
        }
        deep_merge(&mut self.overrides, layer);
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    fn preset_name(&self) -> Option<String> {
        [&self.overrides, &self.user]
            .into_iter()
            .find_map(|layer| layer.get("preset").and_then(Value::as_str))
            .map(str::to_string)
    }
}

/// Merge `layer` into `base`; mappings merge recursively, anything else is replaced.
pub fn deep_merge(base: &mut Value, layer: Value) {
    match (base, layer) {
        (Value::Mapping(base_map), Value::Mapping(layer_map)) => {
            for (key, value) in layer_map {
                match base_map.get_mut(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (base, layer) => *base = layer,
    }
}

/// A named bundle of defaults layered between the built-ins and the user's file.
#[derive(Debug, Clone)]
pub struct Preset {
    pub name: String,
    pub defaults: Value,
}

impl Preset {
    pub fn from_yaml(name: &str, yaml: &str) -> Result<Self, ConfigurationError> {
        let defaults = serde_yaml::from_str(yaml).map_err(|source| ConfigurationError::Parse {
            origin: format!("preset `{}`", name),
            source,
        })?;
        Ok(Self {
            name: name.to_string(),
            defaults,
        })
    }

    /// Docs plus blog, with the feed and sitemap plugins switched on.
    pub fn classic() -> Self {
        let mut defaults = Mapping::new();
        let mut blog = Mapping::new();
        blog.insert("path".into(), "blog".into());
        blog.insert("route_base".into(), "blog".into());
        defaults.insert("blog".into(), Value::Mapping(blog));

        let mut feed = Mapping::new();
        feed.insert("types".into(), Value::from(vec!["rss", "atom"]));
        let mut plugins = Mapping::new();
        plugins.insert("blog-feed".into(), Value::Mapping(feed));
        plugins.insert("sitemap".into(), Value::Mapping(Mapping::new()));
        defaults.insert("plugins".into(), Value::Mapping(plugins));

        Self {
            name: "classic".to_string(),
            defaults: Value::Mapping(defaults),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PresetRegistry {
    presets: BTreeMap<String, Preset>,
}

impl PresetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, preset: Preset) {
        self.presets.insert(preset.name.clone(), preset);
    }

    pub fn get(&self, name: &str) -> Option<&Preset> {
        self.presets.get(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteMetadata {
    pub title: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tagline: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub favicon: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawSite {
    title: Option<String>,
    url: Option<String>,
    tagline: Option<String>,
    favicon: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct I18nConfig {
    pub default_locale: String,
    pub locales: Vec<String>,
}

/// One sidebar entry in an explicitly configured sidebar.
///
/// A bare string is shorthand for a doc entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SidebarItem {
    Doc(String),
    Entry(SidebarEntry),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SidebarEntry {
    Doc {
        id: String,
        #[serde(default)]
        label: Option<String>,
    },
    Category {
        label: String,
        #[serde(default)]
        items: Vec<SidebarItem>,
    },
    Autogenerated {
        dir: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DocsOptions {
    pub path: PathBuf,
    pub route_base: String,
    pub sidebar: Option<Vec<SidebarItem>>,
}

impl Default for DocsOptions {
    fn default() -> Self {
        Self {
            path: PathBuf::from("docs"),
            route_base: "docs".to_string(),
            sidebar: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BlogOptions {
    pub path: PathBuf,
    pub route_base: String,
    /// Relative to the blog directory.
    pub authors_file: PathBuf,
    /// Relative to the blog directory.
    pub tags_file: PathBuf,
    pub posts_per_page: usize,
    pub show_reading_time: bool,
}

impl Default for BlogOptions {
    fn default() -> Self {
        Self {
            path: PathBuf::from("blog"),
            route_base: "blog".to_string(),
            authors_file: PathBuf::from("authors.yml"),
            tags_file: PathBuf::from("tags.yml"),
            posts_per_page: 10,
            show_reading_time: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NavbarItem {
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SearchOptions {
    pub min_token_length: usize,
    /// Per-locale stop-word lists replacing the built-in ones.
    pub stop_words: BTreeMap<String, Vec<String>>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            min_token_length: 2,
            stop_words: BTreeMap::new(),
        }
    }
}

/// Failure policy per defect class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailurePolicies {
    pub broken_links: FailurePolicy,
    pub broken_markdown_links: FailurePolicy,
    pub broken_anchors: FailurePolicy,
    pub duplicate_ids: FailurePolicy,
    pub malformed_front_matter: FailurePolicy,
    pub plugin_timeout: FailurePolicy,
    pub inline_tags: FailurePolicy,
    pub inline_authors: FailurePolicy,
    pub untruncated_blog_posts: FailurePolicy,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Section<T> {
    Enabled(T),
    Toggle(bool),
}

impl<T: Default> Section<T> {
    fn into_option(self) -> Option<T> {
        match self {
            Section::Enabled(value) => Some(value),
            Section::Toggle(true) => Some(T::default()),
            Section::Toggle(false) => None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    #[serde(default)]
    #[allow(dead_code)]
    preset: Option<String>,
    #[serde(default)]
    site: RawSite,
    base_url: String,
    i18n: I18nConfig,
    docs: Section<DocsOptions>,
    blog: Section<BlogOptions>,
    content_roots: Vec<PathBuf>,
    static_dirs: Vec<PathBuf>,
    navbar: Vec<NavbarItem>,
    on_broken_links: FailurePolicy,
    on_broken_markdown_links: FailurePolicy,
    on_broken_anchors: FailurePolicy,
    on_duplicate_ids: FailurePolicy,
    on_malformed_front_matter: FailurePolicy,
    on_plugin_timeout: FailurePolicy,
    on_inline_tags: FailurePolicy,
    on_inline_authors: FailurePolicy,
    on_untruncated_blog_posts: FailurePolicy,
    search: SearchOptions,
    plugins: BTreeMap<String, Value>,
    #[serde(default)]
    plugin_timeout_ms: Option<u64>,
    include_drafts: bool,
    output_dir: PathBuf,
}

/// Expected shape of one plugin option.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionKind {
    String,
    Bool,
    Integer,
    StringList,
    Mapping,
    Any,
}

impl OptionKind {
    fn matches(&self, value: &Value) -> bool {
        match self {
            OptionKind::String => value.is_string(),
            OptionKind::Bool => value.is_bool(),
            OptionKind::Integer => value.is_i64() || value.is_u64(),
            OptionKind::StringList => value
                .as_sequence()
                .map(|items| items.iter().all(Value::is_string))
                .unwrap_or(false),
            OptionKind::Mapping => value.is_mapping(),
            OptionKind::Any => true,
        }
    }

    fn describe(&self) -> &'static str {
        match self {
            OptionKind::String => "a string",
            OptionKind::Bool => "a boolean",
            OptionKind::Integer => "an integer",
            OptionKind::StringList => "a list of strings",
            OptionKind::Mapping => "a mapping",
            OptionKind::Any => "any value",
        }
    }
}

#[derive(Debug, Clone)]
pub struct OptionField {
    pub name: String,
    pub kind: OptionKind,
    pub required: bool,
    pub default: Option<Value>,
}

/// Declared option shape for a plugin; bundles are checked against it
/// before the configuration is frozen.
#[derive(Debug, Clone, Default)]
pub struct OptionSchema {
    fields: Vec<OptionField>,
    allow_unknown: bool,
}

impl OptionSchema {
    /// A schema accepting no options at all.
    pub fn new() -> Self {
        Self::default()
    }

    /// A schema accepting any key.
    pub fn open() -> Self {
        Self {
            fields: Vec::new(),
            allow_unknown: true,
        }
    }

    pub fn field(mut self, name: &str, kind: OptionKind) -> Self {
        self.fields.push(OptionField {
            name: name.to_string(),
            kind,
            required: false,
            default: None,
        });
        self
    }

    pub fn required(mut self, name: &str, kind: OptionKind) -> Self {
        self.fields.push(OptionField {
            name: name.to_string(),
            kind,
            required: true,
            default: None,
        });
        self
    }

    pub fn with_default(mut self, name: &str, kind: OptionKind, default: impl Into<Value>) -> Self {
        self.fields.push(OptionField {
            name: name.to_string(),
            kind,
            required: false,
            default: Some(default.into()),
        });
        self
    }

    /// Check a bundle and fill in defaults. Declared fields come first, in
    /// schema order.
    pub fn validate(&self, options: &Mapping) -> Result<PluginOptions, String> {
        let mut values = Mapping::new();

        for field in &self.fields {
            match options.get(field.name.as_str()) {
                Some(value) if !field.kind.matches(value) => {
                    return Err(format!(
                        "`{}` must be {}",
                        field.name,
                        field.kind.describe()
                    ));
                }
                Some(value) => {
                    values.insert(Value::String(field.name.clone()), value.clone());
                }
                None if field.required => {
                    return Err(format!("missing required option `{}`", field.name));
                }
                None => {
                    if let Some(default) = &field.default {
                        values.insert(Value::String(field.name.clone()), default.clone());
                    }
                }
            }
        }

        for (key, value) in options {
            let Some(name) = key.as_str() else {
                return Err("option names must be strings".to_string());
            };
            if self.fields.iter().any(|f| f.name == name) {
                continue;
            }
            if !self.allow_unknown {
                return Err(format!("unknown option `{}`", name));
            }
            values.insert(key.clone(), value.clone());
        }

        Ok(PluginOptions { values })
    }
}

/// Validated options for one plugin.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct PluginOptions {
    values: Mapping,
}

impl PluginOptions {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(Value::as_bool)
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.get(key).and_then(Value::as_u64)
    }

    pub fn get_string_list(&self, key: &str) -> Vec<String> {
        self.get(key)
            .and_then(Value::as_sequence)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Deserialize into a plugin's own typed options struct.
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T, serde_yaml::Error> {
        serde_yaml::from_value(Value::Mapping(self.values.clone()))
    }

    pub fn as_mapping(&self) -> &Mapping {
        &self.values
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PluginBundle {
    pub name: String,
    pub options: PluginOptions,
}

/// A content root the indexer walks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContentRoot {
    pub kind: ContentKind,
    pub path: PathBuf,
    pub route_base: String,
}

/// The resolved, immutable build configuration.
#[derive(Debug, Clone, Serialize)]
pub struct BuildConfig {
    pub site: SiteMetadata,
    pub base_url: String,
    pub i18n: I18nConfig,
    pub docs: Option<DocsOptions>,
    pub blog: Option<BlogOptions>,
    /// Additional docs roots sharing the docs identifier space.
    pub content_roots: Vec<PathBuf>,
    pub static_dirs: Vec<PathBuf>,
    pub navbar: Vec<NavbarItem>,
    pub policies: FailurePolicies,
    pub search: SearchOptions,
    pub plugins: Vec<PluginBundle>,
    pub plugin_timeout: Option<Duration>,
    pub include_drafts: bool,
    pub output_dir: PathBuf,
    pub base_dir: PathBuf,
    /// Name of the file the options came from, used in diagnostics.
    pub origin: String,
}

impl BuildConfig {
    /// Resolve a path relative to the config file location
    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    pub fn output_dir(&self) -> PathBuf {
        self.resolve_path(&self.output_dir)
    }

    pub fn static_dirs(&self) -> Vec<PathBuf> {
        self.static_dirs
            .iter()
            .map(|p| self.resolve_path(p))
            .collect()
    }

    /// Content roots in walk order: docs, extra docs roots, blog.
    pub fn content_roots(&self) -> Vec<ContentRoot> {
        let mut roots = Vec::new();
        if let Some(docs) = &self.docs {
            roots.push(ContentRoot {
                kind: ContentKind::Docs,
                path: self.resolve_path(&docs.path),
                route_base: docs.route_base.clone(),
            });
            for extra in &self.content_roots {
                roots.push(ContentRoot {
                    kind: ContentKind::Docs,
                    path: self.resolve_path(extra),
                    route_base: docs.route_base.clone(),
                });
            }
        }
        if let Some(blog) = &self.blog {
            roots.push(ContentRoot {
                kind: ContentKind::Blog,
                path: self.resolve_path(&blog.path),
                route_base: blog.route_base.clone(),
            });
        }
        roots
    }

    pub fn route_base(&self, kind: ContentKind) -> &str {
        match kind {
            ContentKind::Docs => self.docs.as_ref().map(|d| d.route_base.as_str()),
            ContentKind::Blog => self.blog.as_ref().map(|b| b.route_base.as_str()),
        }
        .unwrap_or_default()
    }

    pub fn plugin_options(&self, name: &str) -> Option<&PluginOptions> {
        self.plugins
            .iter()
            .rev()
            .find(|bundle| bundle.name == name)
            .map(|bundle| &bundle.options)
    }

    pub fn is_plugin_enabled(&self, name: &str) -> bool {
        self.plugin_options(name).is_some()
    }

    /// Join route segments under the base URL: `/base/docs/intro`.
    pub fn route(&self, segments: &[&str]) -> String {
        let mut route = self.base_url.trim_end_matches('/').to_string();
        for segment in segments {
            let segment = segment.trim_matches('/');
            if !segment.is_empty() {
                route.push('/');
                route.push_str(segment);
            }
        }
        if route.len() < self.base_url.len() {
            return self.base_url.clone();
        }
        route
    }

    /// Absolute URL for a route, using the site URL.
    pub fn absolute_url(&self, route: &str) -> String {
        format!("{}{}", self.site.url.trim_end_matches('/'), route)
    }

    /// Path shown to authors in diagnostics: relative to the config directory.
    pub fn display_path(&self, path: &Path) -> String {
        let rel = path.strip_prefix(&self.base_dir).unwrap_or(path);
        rel.components()
            .filter_map(|c| match c {
                Component::Normal(os) => os.to_str(),
                Component::RootDir => Some(""),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("/")
    }
}

/// Mutable configuration handed to config-transform hooks before freezing.
#[derive(Debug, Clone)]
pub struct ConfigDraft {
    config: BuildConfig,
}

impl Deref for ConfigDraft {
    type Target = BuildConfig;

    fn deref(&self) -> &Self::Target {
        &self.config
    }
}

impl DerefMut for ConfigDraft {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.config
    }
}

/// Merges option layers and validates them against the registered plugins.
pub struct ConfigResolver<'a> {
    plugins: &'a PluginRegistry,
    presets: &'a PresetRegistry,
}

impl<'a> ConfigResolver<'a> {
    pub fn new(context: &'a BuildContext) -> Self {
        Self {
            plugins: &context.plugins,
            presets: &context.presets,
        }
    }

    /// Resolve options into a frozen configuration without running plugin hooks.
    pub fn resolve(&self, raw: &RawOptions) -> Result<BuildConfig, ConfigurationError> {
        self.freeze(self.draft(raw)?)
    }

    /// The merged option tree: defaults < preset < user < overrides.
    pub fn merged(&self, raw: &RawOptions) -> Result<Value, ConfigurationError> {
        let mut merged: Value =
            serde_yaml::from_str(BUILTIN_DEFAULTS).map_err(|source| ConfigurationError::Parse {
                origin: "built-in defaults".to_string(),
                source,
            })?;

        if let Some(name) = raw.preset_name() {
            let preset = self
                .presets
                .get(&name)
                .ok_or_else(|| ConfigurationError::UnknownPreset(name.clone()))?;
            tracing::debug!("Applying preset `{}`", preset.name);
            deep_merge(&mut merged, preset.defaults.clone());
        }

        deep_merge(&mut merged, raw.user.clone());
        deep_merge(&mut merged, raw.overrides.clone());
        Ok(merged)
    }

    pub fn draft(&self, raw: &RawOptions) -> Result<ConfigDraft, ConfigurationError> {
        let merged = self.merged(raw)?;
        let parsed: RawConfig =
            serde_yaml::from_value(merged).map_err(|err| ConfigurationError::Invalid {
                origin: raw.origin.clone(),
                message: err.to_string(),
            })?;

        let title = required(parsed.site.title, "site.title")?;
        let url = required(parsed.site.url, "site.url")?;

        let mut plugins = Vec::new();
        for (name, value) in parsed.plugins {
            if self.plugins.get(&name).is_none() {
                return Err(ConfigurationError::UnknownPlugin(name));
            }
            let options = match value {
                Value::Bool(false) => continue,
                Value::Bool(true) | Value::Null => Mapping::new(),
                Value::Mapping(mapping) => mapping,
                _ => {
                    return Err(ConfigurationError::PluginOptions {
                        plugin: name,
                        message: "options must be a mapping or a boolean".to_string(),
                    })
                }
            };
            let options = self.validate_plugin_options(&name, &options)?;
            plugins.push(PluginBundle { name, options });
        }

        let policies = FailurePolicies {
            broken_links: parsed.on_broken_links,
            broken_markdown_links: parsed.on_broken_markdown_links,
            broken_anchors: parsed.on_broken_anchors,
            duplicate_ids: parsed.on_duplicate_ids,
            malformed_front_matter: parsed.on_malformed_front_matter,
            plugin_timeout: parsed.on_plugin_timeout,
            inline_tags: parsed.on_inline_tags,
            inline_authors: parsed.on_inline_authors,
            untruncated_blog_posts: parsed.on_untruncated_blog_posts,
        };

        Ok(ConfigDraft {
            config: BuildConfig {
                site: SiteMetadata {
                    title,
                    url,
                    tagline: parsed.site.tagline,
                    favicon: parsed.site.favicon,
                },
                base_url: parsed.base_url,
                i18n: parsed.i18n,
                docs: parsed.docs.into_option(),
                blog: parsed.blog.into_option(),
                content_roots: parsed.content_roots,
                static_dirs: parsed.static_dirs,
                navbar: parsed.navbar,
                policies,
                search: parsed.search,
                plugins,
                plugin_timeout: parsed.plugin_timeout_ms.map(Duration::from_millis),
                include_drafts: parsed.include_drafts,
                output_dir: parsed.output_dir,
                base_dir: raw.base_dir.clone(),
                origin: raw.origin.clone(),
            },
        })
    }

    /// Validate a (possibly plugin-transformed) draft and freeze it.
    pub fn freeze(&self, draft: ConfigDraft) -> Result<BuildConfig, ConfigurationError> {
        let mut config = draft.config;

        if config.site.title.trim().is_empty() {
            return Err(ConfigurationError::MissingField("site.title".to_string()));
        }
        if config.site.url.trim().is_empty() {
            return Err(ConfigurationError::MissingField("site.url".to_string()));
        }

        config.base_url = normalize_base_url(&config.base_url);

        if config.i18n.locales.is_empty() {
            return Err(ConfigurationError::MissingField("i18n.locales".to_string()));
        }
        if !config.i18n.locales.contains(&config.i18n.default_locale) {
            return Err(ConfigurationError::UnknownDefaultLocale {
                default: config.i18n.default_locale.clone(),
                locales: config.i18n.locales.clone(),
            });
        }

        if let (Some(docs), Some(blog)) = (&config.docs, &config.blog) {
            if docs.route_base.trim_matches('/') == blog.route_base.trim_matches('/') {
                return Err(ConfigurationError::Conflict(format!(
                    "docs and blog share the route base `{}`",
                    docs.route_base
                )));
            }
            if docs.path == blog.path {
                return Err(ConfigurationError::Conflict(format!(
                    "docs and blog share the content path {:?}",
                    docs.path
                )));
            }
        }
        if !config.content_roots.is_empty() && config.docs.is_none() {
            return Err(ConfigurationError::Conflict(
                "content_roots requires docs to be enabled".to_string(),
            ));
        }

        for item in &config.navbar {
            if item.to.is_some() == item.href.is_some() {
                return Err(ConfigurationError::Conflict(format!(
                    "navbar item `{}` needs exactly one of `to` or `href`",
                    item.label
                )));
            }
        }

        // A later bundle for the same plugin replaces the earlier one.
        let mut plugins: BTreeMap<String, PluginBundle> = BTreeMap::new();
        for bundle in config.plugins {
            let options = self.validate_plugin_options(&bundle.name, bundle.options.as_mapping())?;
            plugins.insert(
                bundle.name.clone(),
                PluginBundle {
                    name: bundle.name,
                    options,
                },
            );
        }
        config.plugins = plugins.into_values().collect();

        Ok(config)
    }

    fn validate_plugin_options(
        &self,
        name: &str,
        options: &Mapping,
    ) -> Result<PluginOptions, ConfigurationError> {
        let plugin = self
            .plugins
            .get(name)
            .ok_or_else(|| ConfigurationError::UnknownPlugin(name.to_string()))?;
        plugin
            .options_schema()
            .validate(options)
            .map_err(|message| ConfigurationError::PluginOptions {
                plugin: name.to_string(),
                message,
            })
    }
}

fn required(value: Option<String>, field: &str) -> Result<String, ConfigurationError> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ConfigurationError::MissingField(field.to_string()))
}

/// Ensure base URLs have a leading and trailing slash
pub fn normalize_base_url(raw: &str) -> String {
    let segments: Vec<&str> = raw
        .trim()
        .split('/')
        .filter(|segment| !segment.is_empty())
        .collect();
    if segments.is_empty() {
        "/".to_string()
    } else {
        format!("/{}/", segments.join("/"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::{HookPhase, Plugin};
    use std::sync::Arc;

    const MINIMAL: &str = "site:\n  title: Cookbook\n  url: https://example.com\n";

    struct Strict;

    impl Plugin for Strict {
        fn name(&self) -> &str {
            "strict"
        }

        fn hooks(&self) -> &[HookPhase] {
            &[]
        }

        fn options_schema(&self) -> OptionSchema {
            OptionSchema::new()
                .required("api", OptionKind::String)
                .with_default("retries", OptionKind::Integer, 3u64)
        }
    }

    fn resolve(yaml: &str) -> Result<BuildConfig, ConfigurationError> {
        let context = BuildContext::with_builtins();
        let raw = RawOptions::from_yaml_str(yaml, "/site")?;
        ConfigResolver::new(&context).resolve(&raw)
    }

    #[test]
    fn test_builtin_defaults() {
        let config = resolve(MINIMAL).unwrap();
        assert_eq!(config.base_url, "/");
        assert_eq!(config.i18n.default_locale, "en");
        assert_eq!(config.policies.broken_links, FailurePolicy::Throw);
        assert_eq!(config.policies.broken_markdown_links, FailurePolicy::Warn);
        assert!(config.docs.is_some());
        assert!(config.blog.is_none());
        assert!(config.plugins.is_empty());
        assert_eq!(config.output_dir(), PathBuf::from("/site/build"));
    }

    #[test]
    fn test_preset_layer_sits_between_defaults_and_user() {
        let yaml = format!("{}preset: classic\nplugins:\n  sitemap: false\n", MINIMAL);
        let config = resolve(&yaml).unwrap();
        assert_eq!(config.blog.as_ref().map(|b| b.route_base.as_str()), Some("blog"));
        assert!(config.is_plugin_enabled("blog-feed"));
        assert!(!config.is_plugin_enabled("sitemap"));
        assert_eq!(
            config
                .plugin_options("blog-feed")
                .map(|o| o.get_string_list("types")),
            Some(vec!["rss".to_string(), "atom".to_string()])
        );
    }

    #[test]
    fn test_overrides_win() {
        let context = BuildContext::with_builtins();
        let mut raw = RawOptions::from_yaml_str(
            &format!("{}on_broken_links: throw\n", MINIMAL),
            "/site",
        )
        .unwrap();
        raw.set_override("on_broken_links", "warn");
        raw.set_override("docs.path", "content");
        let config = ConfigResolver::new(&context).resolve(&raw).unwrap();
        assert_eq!(config.policies.broken_links, FailurePolicy::Warn);
        assert_eq!(
            config.docs.as_ref().map(|d| d.path.clone()),
            Some(PathBuf::from("content"))
        );
        assert_eq!(config.docs.as_ref().map(|d| d.route_base.as_str()), Some("docs"));
    }

    #[test]
    fn test_missing_title_fails() {
        let err = resolve("site:\n  url: https://example.com\n").unwrap_err();
        assert!(matches!(err, ConfigurationError::MissingField(ref f) if f == "site.title"));
    }

    #[test]
    fn test_unregistered_plugin_fails() {
        let yaml = format!("{}plugins:\n  not-a-plugin: {{}}\n", MINIMAL);
        let err = resolve(&yaml).unwrap_err();
        assert!(matches!(err, ConfigurationError::UnknownPlugin(ref p) if p == "not-a-plugin"));
    }

    #[test]
    fn test_disabling_an_unregistered_plugin_fails() {
        let yaml = format!("{}plugins:\n  site-map: false\n", MINIMAL);
        let err = resolve(&yaml).unwrap_err();
        assert!(matches!(err, ConfigurationError::UnknownPlugin(ref p) if p == "site-map"));
    }

    #[test]
    fn test_later_plugin_bundle_wins() {
        let mut context = BuildContext::new();
        context.plugins.register(Arc::new(Strict)).unwrap();
        let resolver = ConfigResolver::new(&context);
        let raw = RawOptions::from_yaml_str(
            &format!("{}plugins:\n  strict:\n    api: first\n", MINIMAL),
            ".",
        )
        .unwrap();

        let mut draft = resolver.draft(&raw).unwrap();
        let mut values = Mapping::new();
        values.insert(Value::from("api"), Value::from("second"));
        draft.plugins.push(PluginBundle {
            name: "strict".to_string(),
            options: PluginOptions { values },
        });
        assert_eq!(draft.plugin_options("strict").and_then(|o| o.get_str("api")), Some("second"));

        let config = resolver.freeze(draft).unwrap();
        assert_eq!(config.plugins.len(), 1);
        let options = config.plugin_options("strict").unwrap();
        assert_eq!(options.get_str("api"), Some("second"));
        assert_eq!(options.get_u64("retries"), Some(3));
    }

    #[test]
    fn test_unknown_preset_fails() {
        let yaml = format!("{}preset: fancy\n", MINIMAL);
        assert!(matches!(
            resolve(&yaml).unwrap_err(),
            ConfigurationError::UnknownPreset(_)
        ));
    }

    #[test]
    fn test_unknown_top_level_key_fails() {
        let yaml = format!("{}colour: blue\n", MINIMAL);
        assert!(matches!(
            resolve(&yaml).unwrap_err(),
            ConfigurationError::Invalid { .. }
        ));
    }

    #[test]
    fn test_default_locale_must_be_listed() {
        let yaml = format!("{}i18n:\n  default_locale: fr\n  locales: [en]\n", MINIMAL);
        assert!(matches!(
            resolve(&yaml).unwrap_err(),
            ConfigurationError::UnknownDefaultLocale { .. }
        ));
    }

    #[test]
    fn test_plugin_schema_is_enforced() {
        let mut context = BuildContext::new();
        context.plugins.register(Arc::new(Strict)).unwrap();
        let resolver = ConfigResolver::new(&context);

        let missing =
            RawOptions::from_yaml_str(&format!("{}plugins:\n  strict: {{}}\n", MINIMAL), ".")
                .unwrap();
        assert!(matches!(
            resolver.resolve(&missing).unwrap_err(),
            ConfigurationError::PluginOptions { .. }
        ));

        let wrong_type = RawOptions::from_yaml_str(
            &format!("{}plugins:\n  strict:\n    api: x\n    retries: many\n", MINIMAL),
            ".",
        )
        .unwrap();
        assert!(resolver.resolve(&wrong_type).is_err());

        let ok = RawOptions::from_yaml_str(
            &format!("{}plugins:\n  strict:\n    api: x\n", MINIMAL),
            ".",
        )
        .unwrap();
        let config = resolver.resolve(&ok).unwrap();
        let options = config.plugin_options("strict").unwrap();
        assert_eq!(options.get_str("api"), Some("x"));
        assert_eq!(options.get_u64("retries"), Some(3));
    }

    #[test]
    fn test_navbar_item_needs_one_target() {
        let yaml = format!("{}navbar:\n  - label: Both\n    to: docs/intro\n    href: https://x\n", MINIMAL);
        assert!(matches!(
            resolve(&yaml).unwrap_err(),
            ConfigurationError::Conflict(_)
        ));
    }

    #[test]
    fn test_explicit_sidebar_shapes() {
        let yaml = format!(
            "{}docs:\n  sidebar:\n    - intro\n    - type: category\n      label: Streamlit\n      items:\n        - type: autogenerated\n          dir: streamlit\n",
            MINIMAL
        );
        let config = resolve(&yaml).unwrap();
        let sidebar = config.docs.unwrap().sidebar.unwrap();
        assert_eq!(sidebar[0], SidebarItem::Doc("intro".to_string()));
        assert!(matches!(
            &sidebar[1],
            SidebarItem::Entry(SidebarEntry::Category { label, items }) if label == "Streamlit" && items.len() == 1
        ));
    }

    #[test]
    fn test_normalize_base_url() {
        assert_eq!(normalize_base_url(""), "/");
        assert_eq!(normalize_base_url("/"), "/");
        assert_eq!(normalize_base_url("docs"), "/docs/");
        assert_eq!(normalize_base_url("//a//b/"), "/a/b/");
    }

    #[test]
    fn test_route_joining() {
        let config = resolve(&format!("{}base_url: /cookbook/\n", MINIMAL)).unwrap();
        assert_eq!(config.route(&["docs", "intro"]), "/cookbook/docs/intro");
        assert_eq!(config.route(&[]), "/cookbook/");
        assert_eq!(config.route(&["", "/"]), "/cookbook/");
        assert_eq!(
            config.absolute_url("/cookbook/docs"),
            "https://example.com/cookbook/docs"
        );
    }
}
