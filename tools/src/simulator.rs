//! Keystroke-savings simulation.
//!
//! Each word of a text is typed one character at a time. Before every
//! keystroke the simulator asks for predictions; as soon as the word is
//! offered, selecting it costs one keystroke and inserts the rest of the word
//! followed by a space. Words that are never offered are typed in full and
//! closed with a space.

use anyhow::Result;
use serde::Serialize;
use soothsayer_core::{CharSets, Prediction, Soothsayer};
use std::fmt;
use std::sync::PoisonError;
use tracing::debug;

/// Split `text` on the blankspace and separator characters of `sets`.
pub fn tokenize(text: &str, sets: &CharSets, lowercase: bool) -> Vec<String> {
    text.split(|c: char| sets.blankspace.contains(c) || sets.separator.contains(c))
        .filter(|t| !t.is_empty())
        .map(|t| if lowercase { t.to_lowercase() } else { t.to_string() })
        .collect()
}

/// Totals of a simulation run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SimulationReport {
    /// Words simulated.
    pub words: usize,
    /// Characters needed without prediction, spaces included.
    pub characters: usize,
    /// Keystrokes actually spent, selections included.
    pub keystrokes: usize,
    /// Words completed by selecting a suggestion.
    pub accepted: usize,
}

impl SimulationReport {
    pub fn saved(&self) -> usize {
        self.characters.saturating_sub(self.keystrokes)
    }

    /// Keystroke savings rate in percent.
    pub fn ksr(&self) -> f64 {
        if self.characters == 0 {
            return 0.0;
        }
        (1.0 - self.keystrokes as f64 / self.characters as f64) * 100.0
    }
}

impl fmt::Display for SimulationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Words:              {}", self.words)?;
        writeln!(f, "Characters:         {}", self.characters)?;
        writeln!(f, "Keystrokes typed:   {}", self.keystrokes)?;
        writeln!(f, "Keystrokes saved:   {}", self.saved())?;
        writeln!(f, "Words selected:     {}", self.accepted)?;
        write!(f, "KSR:                {:.2}%", self.ksr())
    }
}

pub struct Simulator {
    soothsayer: Soothsayer,
    case_insensitive: bool,
    report: SimulationReport,
}

impl Simulator {
    pub fn new(soothsayer: Soothsayer, case_insensitive: bool) -> Self {
        Self {
            soothsayer,
            case_insensitive,
            report: SimulationReport::default(),
        }
    }

    /// Split `text` the way the session's context tracker delimits tokens.
    pub fn tokenize(&self, text: &str) -> Vec<String> {
        let context = self
            .soothsayer
            .shared_context()
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        tokenize(text, context.charsets(), self.case_insensitive)
    }

    fn offered(&self, prediction: &Prediction, word: &str) -> bool {
        prediction.iter().any(|s| {
            if self.case_insensitive {
                s.word.to_lowercase() == word.to_lowercase()
            } else {
                s.word == word
            }
        })
    }

    /// Type `word` and the space after it.
    pub fn simulate(&mut self, word: &str) -> Result<()> {
        let chars: Vec<char> = word.chars().collect();
        let mut selected = false;

        for i in 0..chars.len() {
            let prediction = self.soothsayer.predict()?;
            if self.offered(&prediction, word) {
                let rest: String = chars[i..].iter().collect();
                debug!(word, typed = i, "suggestion selected");
                self.soothsayer.update(&format!("{rest} "));
                self.report.keystrokes += 1;
                self.report.accepted += 1;
                selected = true;
                break;
            }
            self.soothsayer.update(&chars[i].to_string());
            self.report.keystrokes += 1;
        }

        if !selected {
            self.soothsayer.update(" ");
            self.report.keystrokes += 1;
        }
        self.report.words += 1;
        self.report.characters += chars.len() + 1;
        Ok(())
    }

    /// Simulate every word of `words` in order.
    pub fn run<I, S>(&mut self, words: I) -> Result<SimulationReport>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for word in words {
            self.simulate(word.as_ref())?;
        }
        Ok(self.report)
    }

    pub fn report(&self) -> SimulationReport {
        self.report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use soothsayer_core::configuration::keys;
    use soothsayer_core::Configuration;
    use std::sync::Arc;

    fn simulator(plugins: &str) -> Simulator {
        let config = Configuration::with_defaults();
        config.set(keys::PLUGINS, plugins);
        Simulator::new(Soothsayer::new(Arc::new(config)).unwrap(), false)
    }

    #[test]
    fn tokenizes_on_blankspace_and_separators() {
        let sets = CharSets::default();
        assert_eq!(
            tokenize("Hello, world!  foo-bar\n", &sets, false),
            vec!["Hello", "world", "foo", "bar"]
        );
        assert_eq!(tokenize("ABC def", &sets, true), vec!["abc", "def"]);
    }

    #[test]
    fn tokenizes_with_configured_sets() {
        let config = Configuration::with_defaults();
        config.set(keys::PLUGINS, "");
        config.set(keys::SEPARATOR_CHARS, ",");
        config.set(keys::BLANKSPACE_CHARS, " ");
        let sim = Simulator::new(Soothsayer::new(Arc::new(config)).unwrap(), false);
        assert_eq!(sim.tokenize("foo-bar, baz"), vec!["foo-bar", "baz"]);
    }

    #[test]
    fn without_plugins_every_character_is_typed() {
        let mut sim = simulator("");
        let report = sim.run(["abc", "de"]).unwrap();
        assert_eq!(report.characters, 7);
        assert_eq!(report.keystrokes, 7);
        assert_eq!(report.saved(), 0);
        assert_eq!(report.ksr(), 0.0);
    }

    #[test]
    fn offered_words_cost_one_keystroke() {
        let mut sim = simulator("DummyPlugin");
        // "foobar" is always suggested by the dummy plugin
        let report = sim.run(["foobar", "zz"]).unwrap();
        assert_eq!(report.accepted, 1);
        assert_eq!(report.characters, 7 + 3);
        assert_eq!(report.keystrokes, 1 + 3);
        assert!((report.ksr() - 60.0).abs() < 1e-9);
        assert!(report.to_string().contains("KSR"));
    }
}
