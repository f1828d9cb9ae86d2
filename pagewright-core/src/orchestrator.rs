//! Phase driver.
//!
//! Phases run strictly in sequence: configuration, content contribution,
//! indexing, link validation, search indexing, core artifacts and
//! post-processing. Each phase reads only the frozen output of the phases
//! before it.

use crate::artifacts::{core_artifacts, ArtifactSet, FinalArtifactSet};
use crate::config::{BuildConfig, ConfigResolver, PluginOptions, RawOptions};
use crate::context::BuildContext;
use crate::diagnostics::{BuildReport, FailurePolicy, Location, Problem};
use crate::error::BuildError;
use crate::indexer::{ContentIndexer, IndexOutput};
use crate::links::LinkValidator;
use crate::models::SiteIndex;
use crate::plugin::{HookPhase, Plugin, PluginDescriptor, PluginError, PostProcessInput};
use crate::search::{SearchIndex, SearchIndexBuilder};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Runs a full build against a [`BuildContext`].
pub struct Orchestrator<'a> {
    context: &'a BuildContext,
}

impl<'a> Orchestrator<'a> {
    pub fn new(context: &'a BuildContext) -> Self {
        Self { context }
    }

    /// Run every phase. Content defects under a `throw` policy fail the build
    /// with [`BuildError::Violations`] carrying the whole report.
    pub fn run(&self, raw: &RawOptions) -> Result<FinalArtifactSet, BuildError> {
        let mut report = BuildReport::new();

        let config = self.configure(raw, &mut report)?;
        tracing::info!("Building {}", config.site.title);

        let indexed = self.index(&config, &mut report)?;
        let IndexOutput {
            pages, navigation, ..
        } = indexed;

        let validation = LinkValidator::new(&config, &pages, &navigation).validate();
        report.merge(validation.report);
        report.sort();
        if report.has_errors() {
            tracing::error!("Build failed with {} error(s)", report.errors().count());
            return Err(BuildError::Violations(report));
        }

        let site = SiteIndex {
            pages: Arc::new(pages),
            navigation: Arc::new(navigation),
            links: Arc::new(validation.graph),
        };
        tracing::info!("Indexed {} pages", site.pages.len());

        let search_index = Arc::new(SearchIndexBuilder::new(&config).build(&site.pages));
        let artifacts = core_artifacts(&site, &search_index)?;
        let artifacts = self.post_process(&config, &site, &search_index, artifacts, &mut report)?;

        report.sort();
        Ok(FinalArtifactSet {
            config,
            site,
            search_index,
            artifacts,
            report,
        })
    }

    /// Resolve options, run config-transform hooks and freeze the result.
    pub fn configure(&self, raw: &RawOptions, report: &mut BuildReport) -> Result<Arc<BuildConfig>, BuildError> {
        let resolver = ConfigResolver::new(self.context);
        let mut draft = resolver.draft(raw)?;
        let timeout = draft.plugin_timeout;
        let policy = draft.policies.plugin_timeout;
        let origin = draft.origin.clone();

        for (descriptor, plugin) in self.context.plugins.for_phase(HookPhase::ConfigTransform) {
            let Some(options) = draft.plugin_options(&descriptor.name).cloned() else {
                continue;
            };
            let mut working = draft.clone();
            let outcome = invoke(plugin, HookPhase::ConfigTransform, timeout, move |plugin| {
                plugin.transform_config(&mut working, &options)?;
                Ok(working)
            })?;
            match outcome {
                Some(transformed) => draft = transformed,
                None => timed_out(descriptor, HookPhase::ConfigTransform, timeout, policy, &origin, report)?,
            }
        }

        Ok(Arc::new(resolver.freeze(draft)?))
    }

    fn index(&self, config: &Arc<BuildConfig>, report: &mut BuildReport) -> Result<IndexOutput, BuildError> {
        let mut indexer = ContentIndexer::new(config);

        for (descriptor, plugin, options) in self.active(config, HookPhase::ContentContribute) {
            let hook_config = Arc::clone(config);
            let outcome = invoke(plugin, HookPhase::ContentContribute, config.plugin_timeout, move |plugin| {
                plugin.contribute_content(&hook_config, &options)
            })?;
            match outcome {
                Some(documents) => {
                    tracing::debug!("Plugin `{}` contributed {} documents", descriptor.name, documents.len());
                    indexer = indexer.with_documents(&descriptor.name, documents);
                }
                None => timed_out(
                    descriptor,
                    HookPhase::ContentContribute,
                    config.plugin_timeout,
                    config.policies.plugin_timeout,
                    &config.origin,
                    report,
                )?,
            }
        }

        let mut output = indexer.index(&config.content_roots())?;
        report.merge(std::mem::take(&mut output.report));
        Ok(output)
    }

    fn post_process(
        &self,
        config: &Arc<BuildConfig>,
        site: &SiteIndex,
        search_index: &Arc<SearchIndex>,
        mut artifacts: ArtifactSet,
        report: &mut BuildReport,
    ) -> Result<ArtifactSet, BuildError> {
        for (descriptor, plugin, options) in self.active(config, HookPhase::PostProcess) {
            let input = PostProcessInput {
                config: Arc::clone(config),
                site: site.clone(),
                search_index: Arc::clone(search_index),
                artifacts: Arc::new(artifacts.clone()),
            };
            let outcome = invoke(plugin, HookPhase::PostProcess, config.plugin_timeout, move |plugin| {
                plugin.post_process(&input, &options)
            })?;
            let Some(produced) = outcome else {
                timed_out(
                    descriptor,
                    HookPhase::PostProcess,
                    config.plugin_timeout,
                    config.policies.plugin_timeout,
                    &config.origin,
                    report,
                )?;
                continue;
            };
            for artifact in produced {
                let path = artifact.path.clone();
                artifacts.insert(artifact).map_err(|_| PluginError::Execution {
                    plugin: descriptor.name.clone(),
                    phase: HookPhase::PostProcess,
                    message: format!("invalid artifact path `{}`", path),
                })?;
            }
        }
        Ok(artifacts)
    }

    /// Registered plugins enabled by the configuration for `phase`, in execution order.
    fn active(
        &self,
        config: &BuildConfig,
        phase: HookPhase,
    ) -> Vec<(&'a PluginDescriptor, &'a Arc<dyn Plugin>, PluginOptions)> {
        self.context
            .plugins
            .for_phase(phase)
            .into_iter()
            .filter_map(|(descriptor, plugin)| {
                config
                    .plugin_options(&descriptor.name)
                    .map(|options| (descriptor, plugin, options.clone()))
            })
            .collect()
    }
}

fn timed_out(
    descriptor: &PluginDescriptor,
    phase: HookPhase,
    timeout: Option<Duration>,
    policy: FailurePolicy,
    origin: &str,
    report: &mut BuildReport,
) -> Result<(), BuildError> {
    let timeout_ms = timeout.map(|t| t.as_millis() as u64).unwrap_or_default();
    if policy == FailurePolicy::Throw {
        return Err(PluginError::Timeout {
            plugin: descriptor.name.clone(),
            phase,
            timeout_ms,
        }
        .into());
    }
    report.record(
        Problem::PluginTimeout {
            plugin: descriptor.name.clone(),
            phase,
            timeout_ms,
        },
        policy,
        Location::new(origin),
    );
    Ok(())
}

/// Run one hook. Errors and panics become [`PluginError::Execution`]; with a
/// timeout the hook runs on its own thread and `Ok(None)` means it did not
/// finish in time (the thread is abandoned).
fn invoke<T, F>(
    plugin: &Arc<dyn Plugin>,
    phase: HookPhase,
    timeout: Option<Duration>,
    hook: F,
) -> Result<Option<T>, PluginError>
where
    T: Send + 'static,
    F: FnOnce(&dyn Plugin) -> anyhow::Result<T> + Send + 'static,
{
    let name = plugin.name().to_string();
    let execution = |message: String| PluginError::Execution {
        plugin: name.clone(),
        phase,
        message,
    };
    tracing::debug!("Running {} hook of `{}`", phase, name);

    let Some(limit) = timeout else {
        return match panic::catch_unwind(AssertUnwindSafe(|| hook(plugin.as_ref()))) {
            Ok(Ok(value)) => Ok(Some(value)),
            Ok(Err(err)) => Err(execution(format!("{:#}", err))),
            Err(payload) => Err(execution(panic_message(payload))),
        };
    };

    let (tx, rx) = mpsc::channel();
    let worker = Arc::clone(plugin);
    thread::Builder::new()
        .name(format!("plugin-{}", name))
        .spawn(move || {
            let result = panic::catch_unwind(AssertUnwindSafe(|| hook(worker.as_ref())));
            // The receiver is gone once the hook has timed out.
            let _ = tx.send(result);
        })
        .map_err(|err| execution(format!("failed to spawn hook thread: {}", err)))?;

    match rx.recv_timeout(limit) {
        Ok(Ok(Ok(value))) => Ok(Some(value)),
        Ok(Ok(Err(err))) => Err(execution(format!("{:#}", err))),
        Ok(Err(payload)) => Err(execution(panic_message(payload))),
        Err(RecvTimeoutError::Timeout) => Ok(None),
        Err(RecvTimeoutError::Disconnected) => Err(execution("hook thread exited without a result".to_string())),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("panicked: {}", message)
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("panicked: {}", message)
    } else {
        "panicked".to_string()
    }
}
