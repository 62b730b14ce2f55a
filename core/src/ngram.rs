//! Back-off trigram language model loaded from ARPA files.
//!
//! The model is made of a `Vocabulary` (word <-> dense code, with an fst index
//! for prefix search) and three read-only tables keyed by codes:
//!
//! - unigram: code -> (log P, log back-off weight)
//! - bigram: (code1, code2) -> (log P, log back-off weight)
//! - trigram: (code1, code2, code3) -> log P
//!
//! Suggestions carry `exp(log P)` clamped to [0, 1]. Scoring follows
//! Katz back-off: a missing n-gram falls back to the (n-1)-gram estimate
//! plus the back-off weight of its context.

use ahash::AHashMap;
use fst::automaton::{Automaton, Str};
use fst::{IntoStreamer, Map, Streamer};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter};
use std::path::Path;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::prediction::{Prediction, Suggestion};

/// Reserved out-of-vocabulary token, matched case-insensitively.
pub const OOV_TOKEN: &str = "<unk>";

/// Highest n-gram order the model stores.
pub const MAX_ORDER: usize = 3;

fn is_oov(word: &str) -> bool {
    word.eq_ignore_ascii_case(OOV_TOKEN)
}

/// Bijective word <-> code mapping, codes assigned in file order from 0.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Vocabulary {
    words: Vec<String>,
    index: AHashMap<String, u32>,
    // word -> code, rebuilt after deserialization
    #[serde(skip)]
    fst: Map<Vec<u8>>,
}

impl Vocabulary {
    /// Build from words in code order. Repeated words keep their first code.
    pub fn from_words<I, S>(words: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut vocab = Vocabulary::default();
        for word in words {
            vocab.push(word.into());
        }
        vocab.rebuild_index()?;
        Ok(vocab)
    }

    /// Load a vocabulary file: one word per line, `#` lines are comments.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| Error::io(path, e))?;
        Self::parse(path, BufReader::new(file))
    }

    /// Parse vocabulary lines from `reader`; `path` is only used in errors.
    pub fn parse<R: BufRead>(path: &Path, reader: R) -> Result<Self> {
        let mut vocab = Vocabulary::default();
        let mut duplicates = 0usize;
        for line in reader.lines() {
            let line = line.map_err(|e| Error::io(path, e))?;
            let word = line.trim();
            if word.is_empty() || word.starts_with('#') {
                continue;
            }
            if !vocab.push(word.to_string()) {
                duplicates += 1;
            }
        }
        if duplicates > 0 {
            warn!(path = %path.display(), duplicates, "vocabulary contains repeated words");
        }
        vocab.rebuild_index()?;
        debug!(path = %path.display(), words = vocab.len(), "loaded vocabulary");
        Ok(vocab)
    }

    fn push(&mut self, word: String) -> bool {
        if self.index.contains_key(&word) {
            return false;
        }
        let code = self.words.len() as u32;
        self.index.insert(word.clone(), code);
        self.words.push(word);
        true
    }

    /// Rebuild the prefix index from the word list.
    pub fn rebuild_index(&mut self) -> Result<()> {
        let mut pairs: Vec<(&str, u64)> = self
            .words
            .iter()
            .enumerate()
            .map(|(code, w)| (w.as_str(), code as u64))
            .collect();
        pairs.sort_unstable_by(|a, b| a.0.as_bytes().cmp(b.0.as_bytes()));
        self.fst = Map::from_iter(pairs).map_err(|e| Error::Model(e.to_string()))?;
        Ok(())
    }

    pub fn code(&self, word: &str) -> Option<u32> {
        self.index.get(word).copied()
    }

    pub fn word(&self, code: u32) -> Option<&str> {
        self.words.get(code as usize).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn words(&self) -> &[String] {
        &self.words
    }

    /// Codes of every word starting with `prefix`, ascending.
    pub fn codes_with_prefix(&self, prefix: &str) -> Vec<u32> {
        let mut codes = Vec::new();
        let mut stream = self.fst.search(Str::new(prefix).starts_with()).into_stream();
        while let Some((_, code)) = stream.next() {
            codes.push(code as u32);
        }
        codes.sort_unstable();
        codes
    }

    /// Codes matching `prefix`, or `prefix` followed by one of the `filter`
    /// entries when a filter is given. Ascending, without repeats.
    pub fn codes_matching(&self, prefix: &str, filter: Option<&[String]>) -> Vec<u32> {
        let Some(filter) = filter else {
            return self.codes_with_prefix(prefix);
        };
        let mut codes: Vec<u32> = filter
            .iter()
            .flat_map(|suffix| self.codes_with_prefix(&format!("{prefix}{suffix}")))
            .collect();
        codes.sort_unstable();
        codes.dedup();
        codes
    }
}

/// Log probability and log back-off weight of a unigram or bigram.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ArpaEntry {
    pub log_prob: f64,
    pub log_backoff: f64,
}

impl ArpaEntry {
    pub fn new(log_prob: f64, log_backoff: f64) -> Self {
        Self {
            log_prob,
            log_backoff,
        }
    }
}

/// Row counts read from a model file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadStats {
    /// Counts announced in the `\data\` header, per order.
    pub declared: [usize; MAX_ORDER],
    /// Data rows parsed, per order.
    pub parsed: [usize; MAX_ORDER],
    /// Rows actually stored, per order.
    pub inserted: [usize; MAX_ORDER],
}

enum Section {
    Preamble,
    Header,
    Grams(usize),
    Skipped,
}

/// Katz back-off trigram model.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LanguageModel {
    vocab: Vocabulary,
    unigram: AHashMap<u32, ArpaEntry>,
    bigram: AHashMap<(u32, u32), ArpaEntry>,
    trigram: AHashMap<(u32, u32, u32), f64>,
}

impl LanguageModel {
    /// Empty tables over `vocab`.
    pub fn new(vocab: Vocabulary) -> Self {
        Self {
            vocab,
            ..Default::default()
        }
    }

    /// Load a vocabulary file and an ARPA model file.
    pub fn load<P: AsRef<Path>, Q: AsRef<Path>>(vocab_path: P, arpa_path: Q) -> Result<Self> {
        let vocab = Vocabulary::load(vocab_path)?;
        let arpa_path = arpa_path.as_ref();
        let file = File::open(arpa_path).map_err(|e| Error::io(arpa_path, e))?;
        let mut model = Self::new(vocab);
        let stats = model.parse_arpa(arpa_path, BufReader::new(file))?;
        info!(
            path = %arpa_path.display(),
            unigrams = stats.inserted[0],
            bigrams = stats.inserted[1],
            trigrams = stats.inserted[2],
            "loaded ARPA model"
        );
        Ok(model)
    }

    /// Read ARPA text from `reader` into the tables.
    ///
    /// Lines before `\data\` are ignored and parsing stops at `\end\`.
    /// Rows naming the OOV token or a word missing from the vocabulary are
    /// counted but not stored. Sections above trigrams are skipped.
    pub fn parse_arpa<R: BufRead>(&mut self, path: &Path, reader: R) -> Result<LoadStats> {
        let mut stats = LoadStats::default();
        let mut section = Section::Preamble;
        let mut line_no = 0;

        for line in reader.lines() {
            line_no += 1;
            let line = line.map_err(|e| Error::io(path, e))?;
            let row = line.trim();
            if row.is_empty() {
                continue;
            }
            if row == "\\end\\" {
                break;
            }
            if row == "\\data\\" {
                section = Section::Header;
                continue;
            }
            if let Section::Preamble = section {
                continue;
            }
            if let Some(order) = section_marker(row) {
                let order = order.map_err(|m| Error::parse(path, line_no, m))?;
                section = if (1..=MAX_ORDER).contains(&order) {
                    Section::Grams(order)
                } else {
                    warn!(path = %path.display(), order, "skipping unsupported n-gram order");
                    Section::Skipped
                };
                continue;
            }
            match section {
                Section::Header => {
                    if let Some((order, count)) = parse_count(row)
                        .map_err(|m| Error::parse(path, line_no, m))?
                    {
                        if (1..=MAX_ORDER).contains(&order) {
                            stats.declared[order - 1] = count;
                        }
                    }
                }
                Section::Grams(order) => {
                    if self
                        .parse_row(order, row)
                        .map_err(|m| Error::parse(path, line_no, m))?
                    {
                        stats.inserted[order - 1] += 1;
                    }
                    stats.parsed[order - 1] += 1;
                }
                Section::Preamble | Section::Skipped => {}
            }
        }

        if let Section::Preamble = section {
            return Err(Error::parse(path, line_no, "missing \\data\\ header"));
        }
        for order in 1..=MAX_ORDER {
            let (declared, parsed) = (stats.declared[order - 1], stats.parsed[order - 1]);
            if declared != parsed {
                warn!(
                    path = %path.display(),
                    order,
                    declared,
                    parsed,
                    "n-gram count differs from header"
                );
            }
        }
        Ok(stats)
    }

    /// Parse one data row of the given order. Returns whether it was stored.
    fn parse_row(&mut self, order: usize, row: &str) -> std::result::Result<bool, String> {
        let fields: Vec<&str> = row.split_whitespace().collect();
        if fields.len() < order + 1 {
            return Err(format!("expected {} fields in {order}-gram row", order + 1));
        }
        let log_prob = parse_float(fields[0], "log probability")?;
        let log_backoff = match fields.get(order + 1) {
            Some(field) if order < MAX_ORDER => parse_float(field, "back-off weight")?,
            _ => 0.0,
        };
        let words = &fields[1..=order];
        if words.iter().any(|w| is_oov(w)) {
            return Ok(false);
        }
        let Some(codes) = words
            .iter()
            .map(|w| self.vocab.code(w))
            .collect::<Option<Vec<u32>>>()
        else {
            return Ok(false);
        };
        match codes[..] {
            [w] => {
                self.unigram.insert(w, ArpaEntry::new(log_prob, log_backoff));
            }
            [w1, w2] => {
                self.bigram
                    .insert((w1, w2), ArpaEntry::new(log_prob, log_backoff));
            }
            [w1, w2, w3] => {
                self.trigram.insert((w1, w2, w3), log_prob);
            }
            _ => return Ok(false),
        }
        Ok(true)
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocab
    }

    /// Store a unigram. Returns false if the word is not in the vocabulary.
    pub fn insert_unigram(&mut self, w: &str, log_prob: f64, log_backoff: f64) -> bool {
        match self.vocab.code(w) {
            Some(c) if !is_oov(w) => {
                self.unigram.insert(c, ArpaEntry::new(log_prob, log_backoff));
                true
            }
            _ => false,
        }
    }

    /// Store a bigram. Returns false if either word is not in the vocabulary.
    pub fn insert_bigram(&mut self, w1: &str, w2: &str, log_prob: f64, log_backoff: f64) -> bool {
        match (self.vocab.code(w1), self.vocab.code(w2)) {
            (Some(c1), Some(c2)) if !is_oov(w1) && !is_oov(w2) => {
                self.bigram
                    .insert((c1, c2), ArpaEntry::new(log_prob, log_backoff));
                true
            }
            _ => false,
        }
    }

    /// Store a trigram. Returns false if any word is not in the vocabulary.
    pub fn insert_trigram(&mut self, w1: &str, w2: &str, w3: &str, log_prob: f64) -> bool {
        if [w1, w2, w3].iter().any(|w| is_oov(w)) {
            return false;
        }
        match (self.vocab.code(w1), self.vocab.code(w2), self.vocab.code(w3)) {
            (Some(c1), Some(c2), Some(c3)) => {
                self.trigram.insert((c1, c2, c3), log_prob);
                true
            }
            _ => false,
        }
    }

    pub fn unigram(&self, w: u32) -> Option<ArpaEntry> {
        self.unigram.get(&w).copied()
    }

    pub fn bigram(&self, w1: u32, w2: u32) -> Option<ArpaEntry> {
        self.bigram.get(&(w1, w2)).copied()
    }

    pub fn trigram(&self, w1: u32, w2: u32, w3: u32) -> Option<f64> {
        self.trigram.get(&(w1, w2, w3)).copied()
    }

    /// Number of stored unigrams, bigrams and trigrams.
    pub fn counts(&self) -> [usize; MAX_ORDER] {
        [self.unigram.len(), self.bigram.len(), self.trigram.len()]
    }

    /// log P(w2 | w1) with back-off to the unigram of `w2`.
    ///
    /// `None` when neither the bigram nor the unigram of `w2` is known. A
    /// context word without a unigram contributes a back-off weight of 0.
    pub fn bigram_backoff(&self, w1: u32, w2: u32) -> Option<f64> {
        if let Some(entry) = self.bigram(w1, w2) {
            return Some(entry.log_prob);
        }
        let alpha = self.unigram(w1).map_or(0.0, |e| e.log_backoff);
        self.unigram(w2).map(|e| alpha + e.log_prob)
    }

    /// log P(w3 | w1, w2) with Katz back-off.
    pub fn trigram_backoff(&self, w1: u32, w2: u32, w3: u32) -> Option<f64> {
        if let Some(log_prob) = self.trigram(w1, w2, w3) {
            return Some(log_prob);
        }
        match self.bigram(w1, w2) {
            Some(context) => self
                .bigram_backoff(w2, w3)
                .map(|p| context.log_backoff + p),
            None => self.bigram_backoff(w2, w3),
        }
    }

    /// Rank completions of `prefix` given the two previous words.
    ///
    /// `before_previous` and `previous` are the second and first words before
    /// the prefix. The scoring order depends on which of them are known: both
    /// use trigrams, only `previous` uses bigrams, otherwise unigrams. Words
    /// without a unigram are never suggested. Ties keep vocabulary order.
    pub fn predict(
        &self,
        before_previous: &str,
        previous: &str,
        prefix: &str,
        filter: Option<&[String]>,
        limit: usize,
    ) -> Prediction {
        if limit == 0 {
            return Prediction::new();
        }
        let wd1 = self.vocab.code(before_previous);
        let wd2 = self.vocab.code(previous);

        let score = |w: u32| -> Option<f64> {
            match (wd1, wd2) {
                (Some(w1), Some(w2)) => self.trigram_backoff(w1, w2, w),
                (_, Some(w2)) => self.bigram_backoff(w2, w),
                _ => self.unigram(w).map(|e| e.log_prob),
            }
        };

        let mut scored: Vec<(f64, u32)> = self
            .vocab
            .codes_matching(prefix, filter)
            .into_iter()
            .filter(|w| self.unigram.contains_key(w))
            .filter_map(|w| score(w).map(|s| (s, w)))
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0).then(a.1.cmp(&b.1)));
        scored.truncate(limit);

        let mut prediction = Prediction::new();
        for (log_prob, code) in scored {
            if let Some(word) = self.vocab.word(code) {
                let probability = log_prob.exp().clamp(0.0, 1.0);
                prediction.add_suggestion(Suggestion::new(word, probability));
            }
        }
        prediction
    }

    /// Save the model to the given path using bincode.
    pub fn save_bincode<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|e| Error::io(path, e))?;
        let mut writer = BufWriter::new(file);
        bincode::serialize_into(&mut writer, self)?;
        Ok(())
    }

    /// Load a model saved with `save_bincode`.
    pub fn load_bincode<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| Error::io(path, e))?;
        let mut model: Self = bincode::deserialize_from(BufReader::new(file))?;
        model.vocab.rebuild_index()?;
        Ok(model)
    }
}

/// `Some(Ok(order))` for a `\N-grams:` marker.
fn section_marker(row: &str) -> Option<std::result::Result<usize, String>> {
    let inner = row.strip_prefix('\\')?.strip_suffix("-grams:")?;
    Some(
        inner
            .parse()
            .map_err(|_| format!("invalid section marker {row:?}")),
    )
}

/// `ngram N=COUNT` header line; other header lines are ignored.
fn parse_count(row: &str) -> std::result::Result<Option<(usize, usize)>, String> {
    let Some(rest) = row.strip_prefix("ngram") else {
        return Ok(None);
    };
    let malformed = || format!("malformed header count {row:?}");
    let (order, count) = rest.split_once('=').ok_or_else(malformed)?;
    let order = order.trim().parse().map_err(|_| malformed())?;
    let count = count.trim().parse().map_err(|_| malformed())?;
    Ok(Some((order, count)))
}

fn parse_float(field: &str, what: &str) -> std::result::Result<f64, String> {
    field
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| format!("invalid {what} {field:?}"))
}
