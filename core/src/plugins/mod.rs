//! Plugin contract and registry.
//!
//! A plugin is an independent scoring engine. Each one reads the shared
//! context on its own and answers `predict` with a ranked `Prediction`; the
//! activator fans calls out to every registered plugin and merges the
//! results. `learn`, `train` and `extract` are extension points for adaptive
//! plugins and default to no-ops.

pub mod arpa;
pub mod dummy;

pub use arpa::ArpaPlugin;
pub use dummy::DummyPlugin;

use ahash::AHashMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::configuration::{keys, Configuration};
use crate::context::SharedContext;
use crate::error::{Error, Result};
use crate::prediction::Prediction;

/// Scoring engine capability set.
///
/// Implementations must be safe to call from several threads at once:
/// `predict` runs on a worker thread under the activator's time budget.
///
/// # Example
///
/// ```
/// use soothsayer_core::plugins::{DummyPlugin, Plugin};
///
/// let plugin = DummyPlugin::new();
/// let prediction = plugin.predict(3, None);
/// assert_eq!(prediction.len(), 3);
/// ```
pub trait Plugin: Send + Sync {
    /// Registry name, e.g. `ARPAPlugin`.
    fn name(&self) -> &str;

    fn short_description(&self) -> &str;

    fn long_description(&self) -> &str;

    /// Rank at most `max_partial_prediction_size` completions of the current
    /// prefix. `filter`, when given, restricts completions to words that
    /// continue the prefix with one of its entries.
    fn predict(&self, max_partial_prediction_size: usize, filter: Option<&[String]>) -> Prediction;

    /// Learn from the text entered so far.
    fn learn(&self) {
        debug!(plugin = self.name(), "learn() has nothing to do");
    }

    /// Retrain the underlying model.
    fn train(&self) {
        debug!(plugin = self.name(), "train() has nothing to do");
    }

    /// Extract training material from the context.
    fn extract(&self) {
        debug!(plugin = self.name(), "extract() has nothing to do");
    }
}

/// Builds a plugin from configuration and the shared context.
pub type PluginFactory = fn(&Configuration, &SharedContext) -> Result<Arc<dyn Plugin>>;

fn dummy_factory(config: &Configuration, _context: &SharedContext) -> Result<Arc<dyn Plugin>> {
    Ok(Arc::new(DummyPlugin::from_config(config)))
}

fn arpa_factory(config: &Configuration, context: &SharedContext) -> Result<Arc<dyn Plugin>> {
    Ok(Arc::new(ArpaPlugin::from_config(config, Arc::clone(context))?))
}

/// Ordered collection of active plugins.
///
/// Plugins are kept, and invoked, in registration order.
pub struct PluginRegistry {
    plugins: Vec<Arc<dyn Plugin>>,
    factories: AHashMap<String, PluginFactory>,
}

impl PluginRegistry {
    /// Empty registry that knows the built-in plugin names.
    pub fn new() -> Self {
        let mut factories: AHashMap<String, PluginFactory> = AHashMap::new();
        factories.insert(DummyPlugin::NAME.to_string(), dummy_factory);
        factories.insert(ArpaPlugin::NAME.to_string(), arpa_factory);
        Self {
            plugins: Vec::new(),
            factories,
        }
    }

    /// Instantiate every plugin listed in `Soothsayer.PluginRegistry.PLUGINS`.
    ///
    /// Any unknown name or failing plugin aborts construction.
    pub fn from_config(config: &Configuration, context: &SharedContext) -> Result<Self> {
        let mut registry = Self::new();
        let names = config.get_optional(keys::PLUGINS).unwrap_or_default();
        for name in names.split_whitespace() {
            registry.instantiate(name, config, context)?;
        }
        Ok(registry)
    }

    /// Make `name` available to `instantiate` and `from_config`.
    pub fn register_factory(&mut self, name: impl Into<String>, factory: PluginFactory) {
        self.factories.insert(name.into(), factory);
    }

    /// Build the plugin registered as `name` and append it.
    pub fn instantiate(
        &mut self,
        name: &str,
        config: &Configuration,
        context: &SharedContext,
    ) -> Result<()> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| Error::UnknownPlugin(name.to_string()))?;
        let plugin = factory(config, context)?;
        self.register(plugin);
        Ok(())
    }

    /// Append an already constructed plugin.
    pub fn register(&mut self, plugin: Arc<dyn Plugin>) {
        info!(plugin = plugin.name(), "registered predictive plugin");
        self.plugins.push(plugin);
    }

    pub fn plugins(&self) -> &[Arc<dyn Plugin>] {
        &self.plugins
    }

    pub fn names(&self) -> Vec<&str> {
        self.plugins.iter().map(|p| p.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextTracker;

    #[test]
    fn registry_preserves_order() {
        let config = Configuration::with_defaults();
        config.set(keys::PLUGINS, "DummyPlugin DummyPlugin");
        let context = ContextTracker::new().into_shared();
        let mut registry = PluginRegistry::from_config(&config, &context).unwrap();
        registry.register(Arc::new(DummyPlugin::with_suggestions(
            "Other",
            vec![("x".into(), 0.5)],
        )));
        assert_eq!(registry.names(), vec!["DummyPlugin", "DummyPlugin", "Other"]);
    }

    #[test]
    fn unknown_plugin_is_fatal() {
        let config = Configuration::with_defaults();
        config.set(keys::PLUGINS, "DummyPlugin NoSuchPlugin");
        let context = ContextTracker::new().into_shared();
        match PluginRegistry::from_config(&config, &context) {
            Err(Error::UnknownPlugin(name)) => assert_eq!(name, "NoSuchPlugin"),
            Err(other) => panic!("unexpected error {other}"),
            Ok(_) => panic!("registry should not build"),
        }
    }

    #[test]
    fn arpa_plugin_without_files_fails_to_register() {
        let config = Configuration::with_defaults();
        config.set(keys::PLUGINS, "ARPAPlugin");
        let context = ContextTracker::new().into_shared();
        let err = PluginRegistry::from_config(&config, &context).err().unwrap();
        assert!(err.is_initialization());
    }

    #[test]
    fn default_contract_methods_are_noops() {
        let plugin = DummyPlugin::new();
        plugin.learn();
        plugin.train();
        plugin.extract();
        assert_eq!(plugin.predict(100, None).len(), DummyPlugin::new().predict(100, None).len());
    }
}
