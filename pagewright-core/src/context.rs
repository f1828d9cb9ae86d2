use crate::config::{ConfigurationError, Preset, PresetRegistry};
use crate::plugin::feed::BlogFeedPlugin;
use crate::plugin::sitemap::SitemapPlugin;
use crate::plugin::{Plugin, PluginRegistry};
use std::sync::Arc;

/// Registered plugins and presets available to a build.
///
/// Registering a plugin makes it available; it only runs when the
/// configuration names it under `plugins:`.
#[derive(Debug, Clone, Default)]
pub struct BuildContext {
    pub plugins: PluginRegistry,
    pub presets: PresetRegistry,
}

impl BuildContext {
    /// An empty context with no plugins or presets.
    pub fn new() -> Self {
        Self::default()
    }

    /// The `classic` preset plus the `blog-feed` and `sitemap` plugins.
    pub fn with_builtins() -> Self {
        let mut context = Self::new();
        context.register_preset(Preset::classic());
        let builtins: [Arc<dyn Plugin>; 2] = [Arc::new(BlogFeedPlugin::new()), Arc::new(SitemapPlugin::new())];
        for plugin in builtins {
            if let Err(err) = context.register_plugin(plugin) {
                tracing::warn!("Skipping built-in plugin: {}", err);
            }
        }
        context
    }

    pub fn register_plugin(&mut self, plugin: Arc<dyn Plugin>) -> Result<(), ConfigurationError> {
        self.plugins.register(plugin)
    }

    pub fn register_preset(&mut self, preset: Preset) {
        self.presets.register(preset);
    }
}
