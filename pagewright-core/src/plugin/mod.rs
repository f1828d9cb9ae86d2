//! Plugin hooks and registry.
//!
//! A plugin implements any subset of three hooks: configuration transform
//! (before the config is frozen), content contribution (before the page set
//! is finalized) and artifact post-processing (after the search index is
//! built). Within a phase, hooks run in descending specificity, then in
//! registration order.

pub mod feed;
pub mod sitemap;

use crate::artifacts::{Artifact, ArtifactSet};
use crate::config::{BuildConfig, ConfigDraft, ConfigurationError, OptionSchema, PluginOptions};
use crate::models::{SiteIndex, SourceDocument};
use crate::search::SearchIndex;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HookPhase {
    ConfigTransform,
    ContentContribute,
    PostProcess,
}

impl HookPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            HookPhase::ConfigTransform => "config-transform",
            HookPhase::ContentContribute => "content-contribute",
            HookPhase::PostProcess => "post-process",
        }
    }
}

impl fmt::Display for HookPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PluginError {
    #[error("plugin `{plugin}` failed during {phase}: {message}")]
    Execution {
        plugin: String,
        phase: HookPhase,
        message: String,
    },

    #[error("plugin `{plugin}` timed out after {timeout_ms}ms during {phase}")]
    Timeout {
        plugin: String,
        phase: HookPhase,
        timeout_ms: u64,
    },
}

/// Frozen build state handed to post-process hooks.
#[derive(Debug, Clone)]
pub struct PostProcessInput {
    pub config: Arc<BuildConfig>,
    pub site: SiteIndex,
    pub search_index: Arc<SearchIndex>,
    /// Core artifacts plus whatever earlier post-process hooks produced
    pub artifacts: Arc<ArtifactSet>,
}

/// Trait for build plugins
pub trait Plugin: Send + Sync {
    /// Name used as the key under `plugins:` in the config file
    fn name(&self) -> &str;

    /// Hooks with higher specificity run earlier within a phase
    fn specificity(&self) -> i32 {
        0
    }

    /// Phases this plugin takes part in
    fn hooks(&self) -> &[HookPhase];

    /// Shape of the plugin's option bundle; by default no options are accepted
    fn options_schema(&self) -> OptionSchema {
        OptionSchema::new()
    }

    fn transform_config(&self, _draft: &mut ConfigDraft, _options: &PluginOptions) -> anyhow::Result<()> {
        Ok(())
    }

    fn contribute_content(
        &self,
        _config: &BuildConfig,
        _options: &PluginOptions,
    ) -> anyhow::Result<Vec<SourceDocument>> {
        Ok(Vec::new())
    }

    fn post_process(&self, _input: &PostProcessInput, _options: &PluginOptions) -> anyhow::Result<Vec<Artifact>> {
        Ok(Vec::new())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PluginDescriptor {
    pub name: String,
    /// Registration position
    pub ordinal: usize,
    pub specificity: i32,
    pub hooks: Vec<HookPhase>,
}

impl PluginDescriptor {
    pub fn implements(&self, phase: HookPhase) -> bool {
        self.hooks.contains(&phase)
    }
}

/// Registered plugins in registration order.
#[derive(Clone, Default)]
pub struct PluginRegistry {
    entries: Vec<(PluginDescriptor, Arc<dyn Plugin>)>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, plugin: Arc<dyn Plugin>) -> Result<(), ConfigurationError> {
        let name = plugin.name().to_string();
        if self.get(&name).is_some() {
            return Err(ConfigurationError::DuplicatePlugin(name));
        }
        let descriptor = PluginDescriptor {
            name,
            ordinal: self.entries.len(),
            specificity: plugin.specificity(),
            hooks: plugin.hooks().to_vec(),
        };
        self.entries.push((descriptor, plugin));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Plugin>> {
        self.entries
            .iter()
            .find(|(descriptor, _)| descriptor.name == name)
            .map(|(_, plugin)| plugin)
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &PluginDescriptor> {
        self.entries.iter().map(|(descriptor, _)| descriptor)
    }

    /// Execution order: descending specificity, ties by registration order.
    pub fn ordered(&self) -> Vec<(&PluginDescriptor, &Arc<dyn Plugin>)> {
        let mut ordered: Vec<_> = self.entries.iter().map(|(d, p)| (d, p)).collect();
        ordered.sort_by_key(|(descriptor, _)| (Reverse(descriptor.specificity), descriptor.ordinal));
        ordered
    }

    /// Plugins taking part in `phase`, in execution order.
    pub fn for_phase(&self, phase: HookPhase) -> Vec<(&PluginDescriptor, &Arc<dyn Plugin>)> {
        self.ordered()
            .into_iter()
            .filter(|(descriptor, _)| descriptor.implements(phase))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.descriptors()).finish()
    }
}

/// Escape text for XML element content and attributes.
pub(crate) fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named {
        name: &'static str,
        specificity: i32,
        hooks: Vec<HookPhase>,
    }

    impl Plugin for Named {
        fn name(&self) -> &str {
            self.name
        }

        fn specificity(&self) -> i32 {
            self.specificity
        }

        fn hooks(&self) -> &[HookPhase] {
            &self.hooks
        }
    }

    fn named(name: &'static str, specificity: i32, hooks: &[HookPhase]) -> Arc<dyn Plugin> {
        Arc::new(Named {
            name,
            specificity,
            hooks: hooks.to_vec(),
        })
    }

    #[test]
    fn test_order_is_specificity_then_registration() {
        let mut registry = PluginRegistry::new();
        registry.register(named("first", 0, &[HookPhase::PostProcess])).unwrap();
        registry.register(named("specific", 5, &[HookPhase::PostProcess])).unwrap();
        registry.register(named("second", 0, &[HookPhase::PostProcess])).unwrap();
        registry.register(named("config-only", 9, &[HookPhase::ConfigTransform])).unwrap();

        let order: Vec<_> = registry.ordered().iter().map(|(d, _)| d.name.as_str()).collect();
        assert_eq!(order, vec!["config-only", "specific", "first", "second"]);

        let post: Vec<_> = registry
            .for_phase(HookPhase::PostProcess)
            .iter()
            .map(|(d, _)| d.ordinal)
            .collect();
        assert_eq!(post, vec![1, 0, 2]);
    }

    #[test]
    fn test_duplicate_registration_is_rejected() {
        let mut registry = PluginRegistry::new();
        registry.register(named("sitemap", 0, &[])).unwrap();
        assert!(matches!(
            registry.register(named("sitemap", 1, &[])),
            Err(ConfigurationError::DuplicatePlugin(_))
        ));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_phase_names() {
        assert_eq!(HookPhase::ContentContribute.to_string(), "content-contribute");
        assert_eq!(
            serde_json::to_string(&HookPhase::PostProcess).unwrap(),
            "\"post-process\""
        );
    }
}
