//! Context tracking for word prediction.
//!
//! The `ContextTracker` consumes the raw character stream produced by the
//! front end and maintains a cursor-aware view of it: the token currently
//! being typed (the prefix), the completed tokens before it, and whether the
//! last update crossed a token boundary.
//!
//! ```text
//! History: the market t|     prefix "t"   token(1) "market"   token(2) "the"
//! <LEFT>   the market |t     prefix ""    token(1) "market"   token(2) "the"
//! <LEFT>   the market| t     prefix "market"                  token(1) "the"
//! 's'      the markets| t    prefix "markets"                 token(1) "the"
//! ```
//!
//! Tokens are derived on demand by scanning the text before the cursor from
//! the end, so cursor movement never leaves stale token state behind.

use std::fmt;
use std::sync::{Arc, RwLock};
use tracing::{debug, warn, Level};

use crate::charsets::{
    CharClass, CharClassifier, CharSets, BACKSPACE, CURSOR_LEFT, CURSOR_RIGHT, DELETE,
};
use crate::configuration::{keys, Configuration};
use crate::edit_buffer::EditBuffer;
use crate::logging::{parse_level, ComponentLevel};

/// Tracker shared between the writer (the facade) and readers (plugins).
pub type SharedContext = Arc<RwLock<ContextTracker>>;

/// How `is_completion_valid` compares a candidate with the prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaseMode {
    #[default]
    Sensitive,
    Insensitive,
}

#[derive(Debug)]
pub struct ContextTracker {
    buffer: EditBuffer,
    sets: CharSets,
    classifier: CharClassifier,
    context_changed: bool,
    max_buffer_size: usize,
    lookback: usize,
    level: ComponentLevel,
}

impl ContextTracker {
    pub const DEFAULT_MAX_BUFFER_SIZE: usize = 1024;
    /// Completed tokens that eviction always keeps reconstructable.
    pub const DEFAULT_LOOKBACK: usize = 2;

    /// Create a tracker with the default character sets.
    pub fn new() -> Self {
        Self::with_charsets(CharSets::default())
    }

    pub fn with_charsets(sets: CharSets) -> Self {
        Self {
            buffer: EditBuffer::new(),
            classifier: CharClassifier::new(&sets),
            sets,
            context_changed: false,
            max_buffer_size: Self::DEFAULT_MAX_BUFFER_SIZE,
            lookback: Self::DEFAULT_LOOKBACK,
            level: ComponentLevel::default(),
        }
    }

    /// Build a tracker from configuration.
    ///
    /// Character-set variables that are set replace the matching default.
    /// Malformed values are reported and the defaults kept.
    pub fn from_config(config: &Configuration) -> Self {
        let defaults = CharSets::default();
        let sets = CharSets {
            word: config.get_optional(keys::WORD_CHARS).unwrap_or(defaults.word),
            separator: config
                .get_optional(keys::SEPARATOR_CHARS)
                .unwrap_or(defaults.separator),
            blankspace: config
                .get_optional(keys::BLANKSPACE_CHARS)
                .unwrap_or(defaults.blankspace),
            control: config
                .get_optional(keys::CONTROL_CHARS)
                .unwrap_or(defaults.control),
        };
        let mut tracker = Self::with_charsets(sets);

        if let Some(value) = config.get_optional(keys::CONTEXT_TRACKER_LOGGER) {
            match parse_level(keys::CONTEXT_TRACKER_LOGGER, &value) {
                Ok(level) => tracker.level.set(level),
                Err(e) => warn!("{e}"),
            }
        }

        if config.get_optional(keys::MAX_BUFFER_SIZE).is_some() {
            match config.get_as::<usize>(keys::MAX_BUFFER_SIZE) {
                Ok(size) if size > 0 => tracker.max_buffer_size = size,
                Ok(_) => warn!("{} must be positive, keeping default", keys::MAX_BUFFER_SIZE),
                Err(e) => warn!("{e}"),
            }
        }

        tracker
    }

    /// Wrap the tracker for sharing with plugins.
    pub fn into_shared(self) -> SharedContext {
        Arc::new(RwLock::new(self))
    }

    /// Apply every character of `text` in order.
    ///
    /// Returns true if a blankspace or separator character was applied,
    /// i.e. the prefix was reset by this call.
    pub fn update(&mut self, text: &str) -> bool {
        let mut changed = false;
        for ch in text.chars() {
            changed |= self.update_char(ch);
        }
        self.context_changed = changed;

        if self.level.enabled(Level::DEBUG) {
            debug!(
                past = %self.buffer.past(),
                future = %self.buffer.future(),
                changed,
                "context updated"
            );
        }
        changed
    }

    fn update_char(&mut self, ch: char) -> bool {
        let class = self.classifier.classify(ch);
        match class {
            CharClass::Word | CharClass::Blankspace | CharClass::Separator => {
                self.buffer.push(ch);
                self.trim();
            }
            CharClass::Control => match ch {
                CURSOR_LEFT => {
                    self.buffer.move_left();
                }
                CURSOR_RIGHT => {
                    if self.buffer.move_right() {
                        self.trim();
                    }
                }
                BACKSPACE | DELETE => {
                    self.buffer.delete_before();
                }
                _ => {
                    if !self.classifier.is_listed_control(ch) && self.level.enabled(Level::DEBUG) {
                        debug!(ch = ?ch, "unclassified character kept as control marker");
                    }
                    self.buffer.push(ch);
                    self.trim();
                }
            },
        }
        class.is_boundary()
    }

    /// Whether the most recent `update` crossed a token boundary.
    pub fn context_change(&self) -> bool {
        self.context_changed
    }

    /// The token being typed at the cursor (possibly empty).
    pub fn prefix(&self) -> String {
        self.token(0)
    }

    /// Token `n` counting back from the cursor: 0 is the prefix, 1 the last
    /// completed token, and so on. Empty if there are not that many tokens.
    pub fn token(&self, n: usize) -> String {
        match self.token_span(n) {
            Some((start, end)) => self.buffer.past_chars().range(start..end).collect(),
            None => String::new(),
        }
    }

    /// Character range of token `n` within `past`.
    fn token_span(&self, n: usize) -> Option<(usize, usize)> {
        let past = self.buffer.past_chars();
        let is_word = |i: usize| self.classifier.is_word(past[i]);

        let mut end = past.len();
        let mut start = end;
        while start > 0 && is_word(start - 1) {
            start -= 1;
        }

        for _ in 0..n {
            end = start;
            while end > 0 && !is_word(end - 1) {
                end -= 1;
            }
            if end == 0 {
                return None;
            }
            start = end;
            while start > 0 && is_word(start - 1) {
                start -= 1;
            }
        }
        Some((start, end))
    }

    /// Evict the oldest characters of `past` beyond `max_buffer_size`,
    /// never touching the protected lookback tokens and never leaving a
    /// truncated word at the front.
    fn trim(&mut self) {
        let len = self.buffer.past_len();
        if len <= self.max_buffer_size {
            return;
        }
        let excess = len - self.max_buffer_size;

        let protected = (0..=self.lookback)
            .rev()
            .find_map(|depth| self.token_span(depth))
            .map(|(start, _)| start)
            .unwrap_or(0);

        let past = self.buffer.past_chars();
        let mut cut = excess.min(protected);
        while cut > 0
            && cut < protected
            && self.classifier.is_word(past[cut - 1])
            && self.classifier.is_word(past[cut])
        {
            cut += 1;
        }

        if cut < excess && self.level.enabled(Level::DEBUG) {
            debug!(
                kept = len - cut,
                limit = self.max_buffer_size,
                "history exceeds limit to keep lookback tokens"
            );
        }
        self.buffer.evict_front(cut);
    }

    /// Everything before the cursor.
    pub fn past_stream(&self) -> String {
        self.buffer.past()
    }

    /// Everything after the cursor.
    pub fn future_stream(&self) -> String {
        self.buffer.future()
    }

    /// True iff `candidate` is a non-empty run of word characters that
    /// starts with the current prefix.
    pub fn is_completion_valid(&self, candidate: &str, case: CaseMode) -> bool {
        if candidate.is_empty() || !candidate.chars().all(|c| self.classifier.is_word(c)) {
            return false;
        }
        let prefix = self.prefix();
        match case {
            CaseMode::Sensitive => candidate.starts_with(&prefix),
            CaseMode::Insensitive => candidate.to_lowercase().starts_with(&prefix.to_lowercase()),
        }
    }

    pub fn classifier(&self) -> &CharClassifier {
        &self.classifier
    }

    pub fn charsets(&self) -> &CharSets {
        &self.sets
    }

    pub fn max_buffer_size(&self) -> usize {
        self.max_buffer_size
    }

    /// Change the retained history size; shrinking trims immediately.
    pub fn set_max_buffer_size(&mut self, size: usize) {
        self.max_buffer_size = size.max(1);
        self.trim();
    }

    pub fn lookback(&self) -> usize {
        self.lookback
    }

    /// Number of completed tokens eviction must preserve.
    pub fn set_lookback(&mut self, depth: usize) {
        self.lookback = depth;
    }

    /// Forget all history.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.context_changed = false;
    }
}

impl Default for ContextTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ContextTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.buffer.past(), self.buffer.future())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn left() -> String {
        CURSOR_LEFT.to_string()
    }

    #[test]
    fn tokens_follow_the_cursor() {
        let mut ct = ContextTracker::new();
        ct.update("the market");
        ct.update(" ");
        ct.update("t");
        assert_eq!(ct.token(0), "t");
        assert_eq!(ct.token(1), "market");
        assert_eq!(ct.token(2), "the");
        assert_eq!(ct.token(3), "");

        ct.update(&left());
        assert_eq!(ct.prefix(), "");
        assert!(ct.future_stream().starts_with('t'));
        assert_eq!(ct.token(1), "market");

        ct.update(&left());
        assert_eq!(ct.prefix(), "market");
        assert_eq!(ct.token(1), "the");

        ct.update("s");
        assert_eq!(ct.prefix(), "markets");
        assert_eq!(ct.to_string(), "the markets| t");
    }

    #[test]
    fn context_change_fires_on_boundary_only() {
        let mut ct = ContextTracker::new();
        for ch in "word".chars() {
            assert!(!ct.update(&ch.to_string()));
            assert!(!ct.context_change());
        }
        assert!(ct.update(","));
        assert!(ct.context_change());
        assert_eq!(ct.prefix(), "");
        assert!(!ct.update("n"));
        assert!(!ct.context_change());
    }

    #[test]
    fn empty_update_is_noop() {
        let mut ct = ContextTracker::new();
        ct.update("a ");
        assert!(ct.context_change());
        assert!(!ct.update(""));
        assert!(!ct.context_change());
        assert_eq!(ct.past_stream(), "a ");
    }

    #[test]
    fn cursor_at_edges_is_noop() {
        let mut ct = ContextTracker::new();
        ct.update(&left());
        assert_eq!(ct.past_stream(), "");
        assert_eq!(ct.future_stream(), "");
        ct.update("ab");
        ct.update(&CURSOR_RIGHT.to_string());
        assert_eq!(ct.past_stream(), "ab");
        assert_eq!(ct.future_stream(), "");
    }

    #[test]
    fn backspace_and_unknown_controls() {
        let mut ct = ContextTracker::new();
        ct.update("cat");
        ct.update(&BACKSPACE.to_string());
        assert_eq!(ct.prefix(), "ca");
        ct.update("\u{1b}");
        assert_eq!(ct.past_stream(), "ca\u{1b}");
        assert!(!ct.context_change());
        assert_eq!(ct.prefix(), "");
        assert_eq!(ct.token(1), "ca");
    }

    #[test]
    fn past_plus_future_is_full_text() {
        let mut ct = ContextTracker::new();
        let script = format!("hello{l}{l}{l}XY{r} w", l = CURSOR_LEFT, r = CURSOR_RIGHT);
        let mut expected = String::new();
        let mut cursor = 0usize;
        for ch in script.chars() {
            ct.update(&ch.to_string());
            match ch {
                CURSOR_LEFT => cursor = cursor.saturating_sub(1),
                CURSOR_RIGHT => cursor = (cursor + 1).min(expected.chars().count()),
                c => {
                    let at: usize = expected.chars().take(cursor).map(char::len_utf8).sum();
                    expected.insert(at, c);
                    cursor += 1;
                }
            }
            assert_eq!(format!("{}{}", ct.past_stream(), ct.future_stream()), expected);
        }
        assert_eq!(expected, "heXYl wlo");
    }

    #[test]
    fn eviction_keeps_lookback_tokens() {
        let mut ct = ContextTracker::new();
        ct.set_max_buffer_size(8);
        ct.update("alpha beta gamma de");
        assert_eq!(ct.prefix(), "de");
        assert_eq!(ct.token(1), "gamma");
        assert_eq!(ct.token(2), "beta");
        assert_eq!(ct.past_stream(), "beta gamma de");
        assert_eq!(ct.token(3), "");
    }

    #[test]
    fn eviction_never_leaves_partial_words() {
        let mut ct = ContextTracker::new();
        ct.set_max_buffer_size(10);
        ct.set_lookback(1);
        ct.update("one two three four");
        // "four" prefix and "three" are protected; nothing older survives partially
        let past = ct.past_stream();
        assert!(past.ends_with("three four"));
        let first = past.split_whitespace().next().unwrap();
        assert!(["one", "two", "three"].contains(&first));
        assert!(past.chars().count() <= 11);
    }

    #[test]
    fn eviction_preserves_context_change_flag() {
        let mut ct = ContextTracker::new();
        ct.set_max_buffer_size(4);
        ct.update("ab cd ef");
        assert!(ct.context_change());
        assert!(!ct.update("g"));
        assert!(ct.update(" "));
        assert!(ct.context_change());
        assert_eq!(ct.past_stream(), "cd efg ");
        assert_eq!(ct.token(1), "efg");
        assert_eq!(ct.token(2), "cd");
    }

    #[test]
    fn completion_validity() {
        let mut ct = ContextTracker::new();
        ct.update("the Mar");
        assert!(ct.is_completion_valid("Market", CaseMode::Sensitive));
        assert!(!ct.is_completion_valid("market", CaseMode::Sensitive));
        assert!(ct.is_completion_valid("market", CaseMode::Insensitive));
        assert!(!ct.is_completion_valid("", CaseMode::Insensitive));
        assert!(!ct.is_completion_valid("Mar-ket", CaseMode::Sensitive));
    }

    #[test]
    fn from_config_overrides_charsets_and_size() {
        let config = Configuration::with_defaults();
        config.set(keys::WORD_CHARS, "abc'");
        config.set(keys::MAX_BUFFER_SIZE, "32");
        let mut ct = ContextTracker::from_config(&config);
        assert_eq!(ct.max_buffer_size(), 32);
        ct.update("ab'c");
        assert_eq!(ct.prefix(), "ab'c");

        config.set(keys::MAX_BUFFER_SIZE, "lots");
        assert_eq!(
            ContextTracker::from_config(&config).max_buffer_size(),
            ContextTracker::DEFAULT_MAX_BUFFER_SIZE
        );
    }
}
