//! Context-independent plugin used for smoke tests.

use tracing::{debug, warn, Level};

use super::Plugin;
use crate::configuration::{keys, Configuration};
use crate::logging::{parse_level, ComponentLevel};
use crate::prediction::{Prediction, Suggestion};

const CANNED: &[(&str, f64)] = &[
    ("foo", 0.99),
    ("bar", 0.9),
    ("foobar", 0.8),
    ("foo2", 0.7),
    ("bar2", 0.6),
    ("foobar2", 0.5),
];

/// Always suggests the same words, whatever the context.
pub struct DummyPlugin {
    name: String,
    suggestions: Vec<(String, f64)>,
    level: ComponentLevel,
}

impl DummyPlugin {
    pub const NAME: &'static str = "DummyPlugin";

    pub fn new() -> Self {
        Self::with_suggestions(
            Self::NAME,
            CANNED.iter().map(|(w, p)| (w.to_string(), *p)).collect(),
        )
    }

    /// A dummy that answers with `suggestions` under its own `name`.
    pub fn with_suggestions(name: impl Into<String>, suggestions: Vec<(String, f64)>) -> Self {
        Self {
            name: name.into(),
            suggestions,
            level: ComponentLevel::default(),
        }
    }

    pub fn from_config(config: &Configuration) -> Self {
        let plugin = Self::new();
        if let Some(value) = config.get_optional(keys::DUMMY_LOGGER) {
            match parse_level(keys::DUMMY_LOGGER, &value) {
                Ok(level) => plugin.level.set(level),
                Err(e) => warn!("{e}"),
            }
        }
        plugin
    }
}

impl Default for DummyPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl Plugin for DummyPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn short_description(&self) -> &str {
        "Dummy plugin"
    }

    fn long_description(&self) -> &str {
        "Dummy plugin returning a fixed list of suggestions, for testing the prediction pipeline."
    }

    fn predict(&self, max_partial_prediction_size: usize, _filter: Option<&[String]>) -> Prediction {
        if self.level.enabled(Level::DEBUG) {
            debug!(plugin = %self.name, max_partial_prediction_size, "predict()");
        }
        let mut prediction: Prediction = self
            .suggestions
            .iter()
            .map(|(w, p)| Suggestion::new(w.clone(), *p))
            .collect();
        prediction.truncate(max_partial_prediction_size);
        prediction
    }
}
