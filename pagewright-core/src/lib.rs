//! # pagewright-core
//!
//! Build pipeline for the pagewright documentation site generator.
//!
//! A build resolves layered configuration, indexes docs and blog content into
//! page records and a navigation tree, validates every link, builds a search
//! index and lets plugins contribute content and artifacts. The
//! [`Orchestrator`] drives these phases in order.

pub mod artifacts;
pub mod blog;
pub mod config;
pub mod context;
pub mod diagnostics;
pub mod error;
pub mod frontmatter;
pub mod indexer;
pub mod links;
pub mod markdown;
pub mod models;
pub mod navigation;
pub mod orchestrator;
pub mod plugin;
pub mod search;
pub mod slug;

pub use artifacts::{Artifact, ArtifactSet, FinalArtifactSet};
pub use config::{BuildConfig, ConfigDraft, ConfigResolver, ConfigurationError, PluginOptions, Preset, RawOptions};
pub use context::BuildContext;
pub use diagnostics::{BuildReport, Diagnostic, FailurePolicy, Location, Problem, Severity};
pub use error::BuildError;
pub use models::{
    ContentKind, LinkEdge, LinkGraph, NavigationNode, NavigationTree, PageRecord, PageSet, SiteIndex, SourceDocument,
};
pub use orchestrator::Orchestrator;
pub use plugin::{HookPhase, Plugin, PluginError, PostProcessInput};
pub use search::{SearchIndex, SearchIndexBuilder};
pub use slug::slugify;
