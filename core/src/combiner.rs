//! Strategies merging per-plugin predictions into one ranked list.

use ahash::AHashMap;
use std::sync::Arc;

use crate::configuration::keys;
use crate::error::ConfigError;
use crate::prediction::{Prediction, Suggestion};

/// Merges the predictions of several plugins.
///
/// Implementations must accept any number of inputs, including none, and
/// must not repeat a word in their output.
pub trait Combiner: Send + Sync {
    /// Policy name as used in configuration.
    fn name(&self) -> &str;

    fn combine(&self, predictions: &[Prediction]) -> Prediction;
}

/// Rewards words proposed by many plugins with high probability.
///
/// The merged probability of a word is the sum of its probabilities divided
/// by the number of inputs, so a word only one of two plugins proposes keeps
/// half its weight. Equal merged probabilities are ordered by number of
/// contributing plugins (more first), then by summed rank (smaller first),
/// then by the word itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct MeritocracyCombiner;

impl MeritocracyCombiner {
    pub const NAME: &'static str = "Meritocracy";

    pub fn new() -> Self {
        Self
    }
}

#[derive(Default)]
struct Tally {
    probability: f64,
    votes: usize,
    rank_sum: usize,
}

impl Combiner for MeritocracyCombiner {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn combine(&self, predictions: &[Prediction]) -> Prediction {
        match predictions {
            [] => return Prediction::new(),
            [single] => return single.clone(),
            _ => {}
        }

        let mut tallies: AHashMap<&str, Tally> = AHashMap::new();
        for prediction in predictions {
            for (rank, s) in prediction.iter().enumerate() {
                let tally = tallies.entry(s.word.as_str()).or_default();
                tally.probability += s.probability;
                tally.votes += 1;
                tally.rank_sum += rank;
            }
        }

        let n = predictions.len() as f64;
        let mut merged: Vec<(&str, f64, Tally)> = tallies
            .into_iter()
            .map(|(word, t)| (word, (t.probability / n).min(1.0), t))
            .collect();
        merged.sort_by(|a, b| {
            b.1.total_cmp(&a.1)
                .then(b.2.votes.cmp(&a.2.votes))
                .then(a.2.rank_sum.cmp(&b.2.rank_sum))
                .then(a.0.cmp(b.0))
        });

        merged
            .into_iter()
            .map(|(word, probability, _)| Suggestion::new(word, probability))
            .collect()
    }
}

/// Combiner registered under `policy`, compared case-insensitively.
pub fn combiner_for_policy(policy: &str) -> Result<Arc<dyn Combiner>, ConfigError> {
    match policy.trim().to_lowercase().as_str() {
        "meritocracy" => Ok(Arc::new(MeritocracyCombiner::new())),
        _ => Err(ConfigError::Invalid {
            name: keys::COMBINATION_POLICY.to_string(),
            value: policy.to_string(),
            reason: "unknown combination policy".to_string(),
        }),
    }
}
