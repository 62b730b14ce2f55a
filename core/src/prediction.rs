//! Ranked suggestion lists.
//!
//! This module provides:
//! - `Suggestion`: a word with its probability
//! - `Prediction`: suggestions ordered by descending probability, unique by word

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single suggested word and its probability in `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    pub word: String,
    pub probability: f64,
}

impl Suggestion {
    pub fn new<T: Into<String>>(word: T, probability: f64) -> Self {
        Suggestion {
            word: word.into(),
            probability,
        }
    }
}

/// Suggestions sorted by descending probability with no repeated word.
///
/// Suggestions with equal probability keep their insertion order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    suggestions: Vec<Suggestion>,
}

impl Prediction {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `suggestion` at its rank.
    ///
    /// Returns false, leaving the prediction untouched, if the probability
    /// is outside `[0, 1]` or the word is already present with an equal or
    /// higher probability. A present word with a lower probability is
    /// re-ranked.
    pub fn add_suggestion(&mut self, suggestion: Suggestion) -> bool {
        if !(0.0..=1.0).contains(&suggestion.probability) {
            return false;
        }
        if let Some(pos) = self.position(&suggestion.word) {
            if self.suggestions[pos].probability >= suggestion.probability {
                return false;
            }
            self.suggestions.remove(pos);
        }
        let at = self
            .suggestions
            .partition_point(|s| s.probability >= suggestion.probability);
        self.suggestions.insert(at, suggestion);
        true
    }

    pub fn suggestions(&self) -> &[Suggestion] {
        &self.suggestions
    }

    pub fn get(&self, index: usize) -> Option<&Suggestion> {
        self.suggestions.get(index)
    }

    pub fn len(&self) -> usize {
        self.suggestions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.suggestions.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Suggestion> {
        self.suggestions.iter()
    }

    /// Rank of `word`, if present.
    pub fn position(&self, word: &str) -> Option<usize> {
        self.suggestions.iter().position(|s| s.word == word)
    }

    pub fn contains(&self, word: &str) -> bool {
        self.position(word).is_some()
    }

    /// Suggested words in rank order.
    pub fn words(&self) -> Vec<String> {
        self.suggestions.iter().map(|s| s.word.clone()).collect()
    }

    /// Keep only the `len` best suggestions.
    pub fn truncate(&mut self, len: usize) {
        self.suggestions.truncate(len);
    }
}

impl FromIterator<Suggestion> for Prediction {
    fn from_iter<I: IntoIterator<Item = Suggestion>>(iter: I) -> Self {
        let mut prediction = Prediction::new();
        for s in iter {
            prediction.add_suggestion(s);
        }
        prediction
    }
}

impl<'a> IntoIterator for &'a Prediction {
    type Item = &'a Suggestion;
    type IntoIter = std::slice::Iter<'a, Suggestion>;

    fn into_iter(self) -> Self::IntoIter {
        self.suggestions.iter()
    }
}

impl fmt::Display for Prediction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for s in &self.suggestions {
            writeln!(f, "{}\t{}", s.word, s.probability)?;
        }
        Ok(())
    }
}
