//! Entry point tying context tracking to plugin prediction.

use std::path::Path;
use std::sync::{Arc, PoisonError, RwLockReadGuard};
use tracing::info;

use crate::activator::PredictorActivator;
use crate::configuration::Configuration;
use crate::context::{ContextTracker, SharedContext};
use crate::error::Result;
use crate::plugins::PluginRegistry;
use crate::prediction::Prediction;

/// Word prediction session.
///
/// Feed typed characters through `update`, then ask for `predict`.
///
/// ```
/// use std::sync::Arc;
/// use soothsayer_core::{configuration::keys, Configuration, Soothsayer};
///
/// let config = Configuration::with_defaults();
/// config.set(keys::PLUGINS, "DummyPlugin");
/// let soothsayer = Soothsayer::new(Arc::new(config)).unwrap();
/// soothsayer.update("hello wor");
/// assert_eq!(soothsayer.prefix(), "wor");
/// assert_eq!(soothsayer.predict().unwrap().len(), 6);
/// ```
pub struct Soothsayer {
    config: Arc<Configuration>,
    context: SharedContext,
    activator: PredictorActivator,
}

impl Soothsayer {
    /// Build the tracker, the plugins listed in configuration and the
    /// activator. Fails if any plugin cannot be initialised.
    pub fn new(config: Arc<Configuration>) -> Result<Self> {
        let context = ContextTracker::from_config(&config).into_shared();
        let registry = PluginRegistry::from_config(&config, &context)?;
        info!(plugins = ?registry.names(), "predictive plugins ready");
        let activator = PredictorActivator::new(&config, registry, Arc::clone(&context))?;
        Ok(Self {
            config,
            context,
            activator,
        })
    }

    /// Defaults overlaid with a TOML configuration file.
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::new(Arc::new(Configuration::load_toml(path)?))
    }

    fn tracker(&self) -> RwLockReadGuard<'_, ContextTracker> {
        self.context.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply typed text. Returns whether a token boundary was crossed.
    pub fn update(&self, text: &str) -> bool {
        self.context
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .update(text)
    }

    /// Ranked completions of the current prefix.
    pub fn predict(&self) -> Result<Prediction> {
        self.activator.predict(1, None)
    }

    /// Completions restricted to words continuing the prefix with one of
    /// the `filter` entries.
    pub fn predict_with_filter(&self, filter: &[String]) -> Result<Prediction> {
        self.activator.predict(1, Some(filter))
    }

    /// Characters still to type to turn the prefix into `word`, or `None`
    /// if `word` does not continue the prefix. Case is ignored.
    pub fn completion(&self, word: &str) -> Option<String> {
        let prefix = self.prefix();
        let typed = prefix.chars().count();
        let matches = word
            .chars()
            .flat_map(char::to_lowercase)
            .take(prefix.chars().flat_map(char::to_lowercase).count())
            .eq(prefix.chars().flat_map(char::to_lowercase));
        matches.then(|| word.chars().skip(typed).collect())
    }

    /// Text before the cursor.
    pub fn context(&self) -> String {
        self.tracker().past_stream()
    }

    pub fn prefix(&self) -> String {
        self.tracker().prefix()
    }

    pub fn context_change(&self) -> bool {
        self.tracker().context_change()
    }

    pub fn past_stream(&self) -> String {
        self.tracker().past_stream()
    }

    pub fn future_stream(&self) -> String {
        self.tracker().future_stream()
    }

    pub fn learn(&self) {
        self.activator.plugins().iter().for_each(|p| p.learn());
    }

    pub fn train(&self) {
        self.activator.plugins().iter().for_each(|p| p.train());
    }

    pub fn extract(&self) {
        self.activator.plugins().iter().for_each(|p| p.extract());
    }

    pub fn config(&self) -> &Arc<Configuration> {
        &self.config
    }

    pub fn shared_context(&self) -> &SharedContext {
        &self.context
    }

    pub fn activator(&self) -> &PredictorActivator {
        &self.activator
    }
}
