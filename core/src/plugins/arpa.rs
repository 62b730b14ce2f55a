//! Statistical plugin backed by an ARPA back-off trigram model.

use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Mutex, PoisonError};
use tracing::{debug, info, warn, Level};

use super::Plugin;
use crate::configuration::{keys, Configuration};
use crate::context::SharedContext;
use crate::error::{ConfigError, Error, Result};
use crate::logging::{parse_level, ComponentLevel};
use crate::ngram::LanguageModel;
use crate::prediction::Prediction;
use crate::utils::normalize;

/// Default number of memoized predictions.
pub const DEFAULT_CACHE_SIZE: usize = 128;

// (before previous, previous, prefix, filter, size)
type CacheKey = (String, String, String, Option<Vec<String>>, usize);

/// Completes the current prefix from the two previous words.
pub struct ArpaPlugin {
    model: LanguageModel,
    context: SharedContext,
    cache: Option<Mutex<LruCache<CacheKey, Prediction>>>,
    level: ComponentLevel,
}

impl ArpaPlugin {
    pub const NAME: &'static str = "ARPAPlugin";

    /// Wrap an already loaded model.
    pub fn new(model: LanguageModel, context: SharedContext) -> Self {
        Self {
            model,
            context,
            cache: None,
            level: ComponentLevel::default(),
        }
        .with_cache_size(DEFAULT_CACHE_SIZE)
    }

    /// Memoize up to `size` predictions; 0 disables the cache.
    pub fn with_cache_size(mut self, size: usize) -> Self {
        self.cache = NonZeroUsize::new(size).map(|n| Mutex::new(LruCache::new(n)));
        self
    }

    /// Build the plugin from the `Soothsayer.Plugins.ARPAPlugin.*` variables.
    ///
    /// `SNAPSHOT`, when set, names a bincode model and replaces the two text
    /// files. Otherwise `VOCABFILENAME` and `ARPAFILENAME` are required.
    pub fn from_config(config: &Configuration, context: SharedContext) -> Result<Self> {
        let level = ComponentLevel::default();
        match config.get(keys::ARPA_LOGGER) {
            Ok(value) => match parse_level(keys::ARPA_LOGGER, &value) {
                Ok(filter) => level.set(filter),
                Err(e) => warn!("{e}"),
            },
            Err(e) => warn!("{e}"),
        }

        let snapshot = config
            .get_optional(keys::ARPA_SNAPSHOT)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        let model = match snapshot {
            Some(path) => {
                info!(snapshot = %path, "loading ARPA snapshot");
                LanguageModel::load_bincode(&path)?
            }
            None => {
                let vocab = required(config, keys::ARPA_VOCAB_FILENAME)?;
                let arpa = required(config, keys::ARPA_FILENAME)?;
                info!(vocab = %vocab, arpa = %arpa, "loading ARPA model");
                LanguageModel::load(&vocab, &arpa)?
            }
        };

        let cache_size = match config.get_as::<usize>(keys::ARPA_CACHE_SIZE) {
            Ok(size) => size,
            Err(ConfigError::NotFound(_)) | Err(ConfigError::Unset(_)) => DEFAULT_CACHE_SIZE,
            Err(e) => {
                warn!("{e}");
                DEFAULT_CACHE_SIZE
            }
        };

        let mut plugin = Self::new(model, context).with_cache_size(cache_size);
        plugin.level = level;
        Ok(plugin)
    }

    pub fn model(&self) -> &LanguageModel {
        &self.model
    }

    fn context_tokens(&self) -> (String, String, String) {
        let ctx = self.context.read().unwrap_or_else(PoisonError::into_inner);
        let token = |n| normalize(&ctx.token(n)).to_lowercase();
        (token(2), token(1), token(0))
    }
}

fn required(config: &Configuration, name: &str) -> Result<String> {
    config
        .get(name)
        .map(|v| v.trim().to_string())
        .map_err(|e| Error::PluginInit {
            plugin: ArpaPlugin::NAME.to_string(),
            reason: e.to_string(),
        })
}

impl Plugin for ArpaPlugin {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn short_description(&self) -> &str {
        "ARPAPlugin, a plugin relying on an ARPA language model"
    }

    fn long_description(&self) -> &str {
        "Ranks completions of the current prefix with a Katz back-off trigram model \
         read from an ARPA file and its vocabulary."
    }

    fn predict(&self, max_partial_prediction_size: usize, filter: Option<&[String]>) -> Prediction {
        let (wd1, wd2, prefix) = self.context_tokens();
        if self.level.enabled(Level::DEBUG) {
            debug!(%wd1, %wd2, %prefix, max_partial_prediction_size, "predict()");
        }

        let Some(cache) = &self.cache else {
            return self
                .model
                .predict(&wd1, &wd2, &prefix, filter, max_partial_prediction_size);
        };

        let key: CacheKey = (
            wd1,
            wd2,
            prefix,
            filter.map(<[String]>::to_vec),
            max_partial_prediction_size,
        );
        if let Some(hit) = cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
        {
            return hit.clone();
        }
        let prediction = self
            .model
            .predict(&key.0, &key.1, &key.2, filter, max_partial_prediction_size);
        cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .put(key, prediction.clone());
        prediction
    }
}
