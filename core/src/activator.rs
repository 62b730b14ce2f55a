//! Time-bounded fan-out of prediction requests to plugins.
//!
//! Every registered plugin runs on its own blocking worker. The activator
//! waits until all of them answer or `PREDICT_TIME` elapses, whichever comes
//! first, then hands the predictions that made it to the active combiner.
//! Late plugins are left to finish in the background and their results are
//! discarded. A plugin is not asked again until its previous call returns.
//!
//! Settings are driven by four configuration variables and take effect on
//! the next call to `predict`:
//!
//! | variable | meaning |
//! |----------|---------|
//! | `LOGGER` | activator log level |
//! | `PREDICT_TIME` | budget in milliseconds, 0 waits for every plugin |
//! | `MAX_PARTIAL_PREDICTION_SIZE` | per-plugin result cap |
//! | `COMBINATION_POLICY` | combiner name |

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};
use tokio::runtime::Runtime;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn, Level};

use crate::combiner::{combiner_for_policy, Combiner};
use crate::configuration::{keys, Configuration, Dispatcher};
use crate::context::SharedContext;
use crate::error::{Error, Result};
use crate::logging::{parse_level, ComponentLevel};
use crate::plugins::{Plugin, PluginRegistry};
use crate::prediction::Prediction;

pub const DEFAULT_PREDICT_TIME_MS: u64 = 1000;
pub const DEFAULT_MAX_PARTIAL_PREDICTION_SIZE: usize = 6;

type ActiveCombiner = (String, Arc<dyn Combiner>);

/// Live settings, updated from configuration notifications.
pub struct ActivatorSettings {
    level: ComponentLevel,
    predict_time_ms: AtomicU64,
    max_partial_prediction_size: AtomicUsize,
    combiner: RwLock<Option<ActiveCombiner>>,
}

impl Default for ActivatorSettings {
    fn default() -> Self {
        Self {
            level: ComponentLevel::default(),
            predict_time_ms: AtomicU64::new(DEFAULT_PREDICT_TIME_MS),
            max_partial_prediction_size: AtomicUsize::new(DEFAULT_MAX_PARTIAL_PREDICTION_SIZE),
            combiner: RwLock::new(None),
        }
    }
}

impl ActivatorSettings {
    fn set_logger(&self, value: &str) {
        match parse_level(keys::ACTIVATOR_LOGGER, value) {
            Ok(filter) => {
                self.level.set(filter);
                if self.level.enabled(Level::INFO) {
                    info!(level = %filter, "LOGGER");
                }
            }
            Err(e) => warn!("{e}"),
        }
    }

    fn set_predict_time(&self, value: &str) {
        match value.trim().parse::<i64>() {
            Ok(ms) if ms >= 0 => {
                self.predict_time_ms.store(ms as u64, Ordering::Relaxed);
                if self.level.enabled(Level::INFO) {
                    info!(ms, "PREDICT_TIME");
                }
            }
            Ok(ms) => error!(
                ms,
                kept = self.predict_time_ms(),
                "PREDICT_TIME must be greater than or equal to zero"
            ),
            Err(e) => error!(value, kept = self.predict_time_ms(), "invalid PREDICT_TIME: {e}"),
        }
    }

    fn set_combination_policy(&self, value: &str) {
        match combiner_for_policy(value) {
            Ok(combiner) => {
                *self.combiner.write().unwrap_or_else(PoisonError::into_inner) =
                    Some((value.trim().to_string(), combiner));
                if self.level.enabled(Level::INFO) {
                    info!(policy = value, "COMBINATION_POLICY");
                }
            }
            Err(e) => error!(kept = ?self.combination_policy(), "{e}"),
        }
    }

    fn set_max_partial_prediction_size(&self, value: &str) {
        match value.trim().parse::<usize>() {
            Ok(size) => {
                self.max_partial_prediction_size
                    .store(size, Ordering::Relaxed);
                if self.level.enabled(Level::INFO) {
                    info!(size, "MAX_PARTIAL_PREDICTION_SIZE");
                }
            }
            Err(e) => error!(
                value,
                kept = self.max_partial_prediction_size(),
                "invalid MAX_PARTIAL_PREDICTION_SIZE: {e}"
            ),
        }
    }

    pub fn predict_time_ms(&self) -> u64 {
        self.predict_time_ms.load(Ordering::Relaxed)
    }

    pub fn max_partial_prediction_size(&self) -> usize {
        self.max_partial_prediction_size.load(Ordering::Relaxed)
    }

    /// Name of the active policy as configured.
    pub fn combination_policy(&self) -> Option<String> {
        self.combiner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|(name, _)| name.clone())
    }

    fn combiner(&self) -> Option<Arc<dyn Combiner>> {
        self.combiner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|(_, c)| Arc::clone(c))
    }
}

/// Marks a plugin as busy until its blocking call returns or is cancelled.
struct InFlight(Arc<AtomicBool>);

impl InFlight {
    /// `None` if the previous call of this plugin is still running.
    fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        (!flag.swap(true, Ordering::AcqRel)).then(|| Self(Arc::clone(flag)))
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Runs plugins concurrently under a deadline and merges their output.
pub struct PredictorActivator {
    plugins: Vec<Arc<dyn Plugin>>,
    in_flight: Vec<Arc<AtomicBool>>,
    context: SharedContext,
    settings: Arc<ActivatorSettings>,
    runtime: Option<Runtime>,
    _dispatcher: Dispatcher<ActivatorSettings>,
}

impl PredictorActivator {
    /// Subscribe to the activator variables of `config` and take ownership
    /// of the registry's plugins.
    pub fn new(config: &Configuration, registry: PluginRegistry, context: SharedContext) -> Result<Self> {
        let settings = Arc::new(ActivatorSettings::default());
        let mut dispatcher = Dispatcher::new(&settings);
        dispatcher.map(config.find(keys::ACTIVATOR_LOGGER), ActivatorSettings::set_logger);
        dispatcher.map(config.find(keys::PREDICT_TIME), ActivatorSettings::set_predict_time);
        dispatcher.map(
            config.find(keys::COMBINATION_POLICY),
            ActivatorSettings::set_combination_policy,
        );
        dispatcher.map(
            config.find(keys::MAX_PARTIAL_PREDICTION_SIZE),
            ActivatorSettings::set_max_partial_prediction_size,
        );

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("soothsayer-activator")
            .enable_time()
            .build()
            .map_err(Error::Runtime)?;

        let plugins = registry.plugins().to_vec();
        Ok(Self {
            in_flight: plugins.iter().map(|_| Arc::default()).collect(),
            plugins,
            context,
            settings,
            runtime: Some(runtime),
            _dispatcher: dispatcher,
        })
    }

    /// Install `combiner` directly, bypassing the configured policy name.
    pub fn set_combiner(&self, combiner: Arc<dyn Combiner>) {
        let name = combiner.name().to_string();
        *self
            .settings
            .combiner
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some((name, combiner));
    }

    pub fn settings(&self) -> &ActivatorSettings {
        &self.settings
    }

    pub fn plugins(&self) -> &[Arc<dyn Plugin>] {
        &self.plugins
    }

    pub fn context(&self) -> &SharedContext {
        &self.context
    }

    /// Collect and merge predictions from every plugin.
    ///
    /// Each plugin is asked for at most `MAX_PARTIAL_PREDICTION_SIZE *
    /// multiplier` suggestions, and so is the merged result. Must not be
    /// called from inside an async runtime; use `predict_async` there.
    pub fn predict(&self, multiplier: usize, filter: Option<&[String]>) -> Result<Prediction> {
        match &self.runtime {
            Some(runtime) => runtime.block_on(self.predict_async(multiplier, filter)),
            None => Ok(Prediction::new()),
        }
    }

    /// Async form of `predict`, for callers already running on tokio.
    pub async fn predict_async(
        &self,
        multiplier: usize,
        filter: Option<&[String]>,
    ) -> Result<Prediction> {
        // one snapshot per call: a concurrent policy change never mixes in
        let combiner = self.settings.combiner().ok_or(Error::NoCombiner)?;
        let cap = self
            .settings
            .max_partial_prediction_size()
            .saturating_mul(multiplier);
        let budget = match self.settings.predict_time_ms() {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        };

        let started = Instant::now();
        let predictions = self.gather(cap, filter, budget).await;
        let mut result = combiner.combine(&predictions);
        result.truncate(cap);

        if self.settings.level.enabled(Level::DEBUG) {
            debug!(
                plugins = self.plugins.len(),
                answered = predictions.len(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                suggestions = result.len(),
                "predict()"
            );
        }
        Ok(result)
    }

    /// Predictions of the plugins that answered in time, in registration
    /// order.
    async fn gather(
        &self,
        cap: usize,
        filter: Option<&[String]>,
        budget: Option<Duration>,
    ) -> Vec<Prediction> {
        let filter: Option<Arc<[String]>> = filter.map(Arc::from);
        let mut set = JoinSet::new();
        for (index, (plugin, flag)) in self.plugins.iter().zip(&self.in_flight).enumerate() {
            let Some(guard) = InFlight::acquire(flag) else {
                warn!(plugin = plugin.name(), "previous call still running, skipped");
                continue;
            };
            let plugin = Arc::clone(plugin);
            let filter = filter.clone();
            set.spawn_blocking(move || {
                let _guard = guard;
                (index, plugin.predict(cap, filter.as_deref()))
            });
        }

        let mut slots: Vec<Option<Prediction>> = vec![None; self.plugins.len()];
        let join_all = async {
            while let Some(joined) = set.join_next().await {
                match joined {
                    Ok((index, prediction)) => slots[index] = Some(prediction),
                    Err(e) => error!("predictive plugin task failed: {e}"),
                }
            }
        };
        match budget {
            Some(budget) => {
                if tokio::time::timeout(budget, join_all).await.is_err() {
                    let late: Vec<&str> = slots
                        .iter()
                        .zip(&self.plugins)
                        .filter(|(slot, _)| slot.is_none())
                        .map(|(_, plugin)| plugin.name())
                        .collect();
                    warn!(?late, budget_ms = budget.as_millis() as u64, "plugins exceeded PREDICT_TIME");
                }
            }
            None => join_all.await,
        }
        // Late tasks keep running; their in-flight guard clears on return.
        set.detach_all();

        slots.into_iter().flatten().collect()
    }
}

impl Drop for PredictorActivator {
    fn drop(&mut self) {
        // Late plugins may still be running; don't wait for them.
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combiner::MeritocracyCombiner;
    use crate::context::ContextTracker;
    use crate::plugins::DummyPlugin;
    use crate::prediction::Suggestion;

    struct SlowPlugin {
        delay: Duration,
    }

    impl Plugin for SlowPlugin {
        fn name(&self) -> &str {
            "SlowPlugin"
        }

        fn short_description(&self) -> &str {
            "sleeps before answering"
        }

        fn long_description(&self) -> &str {
            "sleeps before answering"
        }

        fn predict(&self, _size: usize, _filter: Option<&[String]>) -> Prediction {
            std::thread::sleep(self.delay);
            std::iter::once(Suggestion::new("slow", 1.0)).collect()
        }
    }

    struct CountingPlugin {
        delay: Duration,
        calls: Arc<AtomicUsize>,
    }

    impl Plugin for CountingPlugin {
        fn name(&self) -> &str {
            "CountingPlugin"
        }

        fn short_description(&self) -> &str {
            "counts calls, then sleeps"
        }

        fn long_description(&self) -> &str {
            "counts calls, then sleeps"
        }

        fn predict(&self, _size: usize, _filter: Option<&[String]>) -> Prediction {
            self.calls.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(self.delay);
            std::iter::once(Suggestion::new("counted", 1.0)).collect()
        }
    }

    struct PanickingPlugin;

    impl Plugin for PanickingPlugin {
        fn name(&self) -> &str {
            "PanickingPlugin"
        }

        fn short_description(&self) -> &str {
            "panics"
        }

        fn long_description(&self) -> &str {
            "panics"
        }

        fn predict(&self, _size: usize, _filter: Option<&[String]>) -> Prediction {
            panic!("plugin failure");
        }
    }

    fn activator(config: &Configuration, plugins: Vec<Arc<dyn Plugin>>) -> PredictorActivator {
        let mut registry = PluginRegistry::new();
        for plugin in plugins {
            registry.register(plugin);
        }
        PredictorActivator::new(config, registry, ContextTracker::new().into_shared()).unwrap()
    }

    #[test]
    fn late_plugins_are_excluded() {
        let config = Configuration::with_defaults();
        config.set(keys::PREDICT_TIME, "100");
        let activator = activator(
            &config,
            vec![
                Arc::new(SlowPlugin {
                    delay: Duration::from_secs(3),
                }),
                Arc::new(DummyPlugin::new()),
            ],
        );
        let started = Instant::now();
        let p = activator.predict(1, None).unwrap();
        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(!p.contains("slow"));
        assert_eq!(p, DummyPlugin::new().predict(6, None));
    }

    #[test]
    fn hung_plugin_is_not_called_again() {
        let config = Configuration::with_defaults();
        config.set(keys::PREDICT_TIME, "5");
        let calls = Arc::new(AtomicUsize::new(0));
        let activator = activator(
            &config,
            vec![
                Arc::new(CountingPlugin {
                    delay: Duration::from_secs(3600),
                    calls: Arc::clone(&calls),
                }),
                Arc::new(DummyPlugin::new()),
            ],
        );
        for _ in 0..520 {
            let p = activator.predict(1, None).unwrap();
            assert_eq!(p, DummyPlugin::new().predict(6, None));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn late_plugin_is_called_again_once_finished() {
        let config = Configuration::with_defaults();
        config.set(keys::PREDICT_TIME, "20");
        let calls = Arc::new(AtomicUsize::new(0));
        let activator = activator(
            &config,
            vec![Arc::new(CountingPlugin {
                delay: Duration::from_millis(200),
                calls: Arc::clone(&calls),
            })],
        );
        assert!(activator.predict(1, None).unwrap().is_empty());
        assert!(activator.predict(1, None).unwrap().is_empty());
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        std::thread::sleep(Duration::from_millis(600));
        config.set(keys::PREDICT_TIME, "0");
        assert_eq!(activator.predict(1, None).unwrap().words(), vec!["counted"]);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn zero_budget_waits_for_everyone() {
        let config = Configuration::with_defaults();
        config.set(keys::PREDICT_TIME, "0");
        let activator = activator(
            &config,
            vec![Arc::new(SlowPlugin {
                delay: Duration::from_millis(150),
            })],
        );
        assert_eq!(activator.predict(1, None).unwrap().words(), vec!["slow"]);
    }

    #[test]
    fn missing_combiner_is_an_error() {
        let config = Configuration::new();
        let activator = activator(&config, vec![Arc::new(DummyPlugin::new())]);
        assert!(matches!(activator.predict(1, None), Err(Error::NoCombiner)));
        activator.set_combiner(Arc::new(MeritocracyCombiner::new()));
        assert_eq!(activator.predict(1, None).unwrap().len(), 6);
    }

    #[test]
    fn unknown_policy_keeps_previous_combiner() {
        let config = Configuration::with_defaults();
        let activator = activator(&config, vec![Arc::new(DummyPlugin::new())]);
        config.set(keys::COMBINATION_POLICY, "Anarchy");
        assert_eq!(
            activator.settings().combination_policy().as_deref(),
            Some("Meritocracy")
        );
        assert_eq!(activator.predict(1, None).unwrap().len(), 6);
    }

    #[test]
    fn settings_follow_configuration_changes() {
        let config = Configuration::with_defaults();
        let activator = activator(
            &config,
            vec![Arc::new(DummyPlugin::new()), Arc::new(DummyPlugin::new())],
        );
        config.set(keys::MAX_PARTIAL_PREDICTION_SIZE, "2");
        assert_eq!(activator.predict(1, None).unwrap().len(), 2);
        assert_eq!(activator.predict(2, None).unwrap().len(), 4);

        config.set(keys::MAX_PARTIAL_PREDICTION_SIZE, "many");
        assert_eq!(activator.settings().max_partial_prediction_size(), 2);

        config.set(keys::PREDICT_TIME, "-5");
        assert_eq!(activator.settings().predict_time_ms(), DEFAULT_PREDICT_TIME_MS);
        config.set(keys::PREDICT_TIME, "250");
        assert_eq!(activator.settings().predict_time_ms(), 250);

        config.set(keys::ACTIVATOR_LOGGER, "DEBUG");
        config.set(keys::ACTIVATOR_LOGGER, "SHOUT");
        assert!(activator.settings().level.enabled(Level::DEBUG));
    }

    #[test]
    fn failing_plugin_does_not_break_prediction() {
        let config = Configuration::with_defaults();
        let activator = activator(
            &config,
            vec![Arc::new(PanickingPlugin), Arc::new(DummyPlugin::new())],
        );
        assert_eq!(activator.predict(1, None).unwrap().words()[0], "foo");
    }

    #[test]
    fn filter_reaches_plugins() {
        let config = Configuration::with_defaults();
        let context = ContextTracker::new().into_shared();
        context.write().unwrap().update("ba");
        let seen = Arc::new(RwLock::new(None));

        struct Recorder(Arc<RwLock<Option<Vec<String>>>>);
        impl Plugin for Recorder {
            fn name(&self) -> &str {
                "Recorder"
            }
            fn short_description(&self) -> &str {
                ""
            }
            fn long_description(&self) -> &str {
                ""
            }
            fn predict(&self, _size: usize, filter: Option<&[String]>) -> Prediction {
                *self.0.write().unwrap() = filter.map(<[String]>::to_vec);
                Prediction::new()
            }
        }

        let mut registry = PluginRegistry::new();
        registry.register(Arc::new(Recorder(Arc::clone(&seen))));
        let activator = PredictorActivator::new(&config, registry, context).unwrap();
        let filter = vec!["r".to_string(), "z".to_string()];
        assert!(activator.predict(1, Some(&filter)).unwrap().is_empty());
        assert_eq!(*seen.read().unwrap(), Some(filter));
    }
}
