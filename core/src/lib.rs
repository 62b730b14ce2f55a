//! soothsayer-core
//!
//! Incremental word prediction. Typed characters go into a `ContextTracker`;
//! a `PredictorActivator` asks every registered plugin for completions of
//! the current prefix under a time budget and merges them with a
//! `Combiner`.
//!
//! Public API:
//! - `Soothsayer` - Session facade: update, predict, completion
//! - `ContextTracker` - Cursor-aware history and token view
//! - `Configuration` - Observable named values loaded from TOML
//! - `Plugin` / `PluginRegistry` - Scoring engine contract and instantiation
//! - `LanguageModel` - Katz back-off trigram model read from ARPA files
//! - `Prediction` - Ranked, duplicate-free suggestion list

pub mod activator;
pub use activator::PredictorActivator;

pub mod charsets;
pub use charsets::{CharClass, CharClassifier, CharSets};

pub mod combiner;
pub use combiner::{combiner_for_policy, Combiner, MeritocracyCombiner};

pub mod configuration;
pub use configuration::{Configuration, Dispatcher, Variable};

pub mod context;
pub use context::{CaseMode, ContextTracker, SharedContext};

pub mod edit_buffer;
pub use edit_buffer::EditBuffer;

pub mod error;
pub use error::{ConfigError, Error, Result};

pub mod logging;

pub mod ngram;
pub use ngram::{LanguageModel, Vocabulary};

pub mod plugins;
pub use plugins::{Plugin, PluginRegistry};

pub mod prediction;
pub use prediction::{Prediction, Suggestion};

pub mod soothsayer;
pub use soothsayer::Soothsayer;

/// Utility helpers.
pub mod utils {
    /// Normalize input strings (NFC) and trim whitespace.
    pub fn normalize(s: &str) -> String {
        use unicode_normalization::UnicodeNormalization;
        s.nfc().collect::<String>().trim().to_string()
    }

}
