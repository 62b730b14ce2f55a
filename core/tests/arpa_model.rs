// Loading and scoring of ARPA models read from disk.

use soothsayer_core::ngram::ArpaEntry;
use soothsayer_core::{Error, LanguageModel};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).expect("write fixture");
    path
}

const VOCAB: &str = "# three words\napple\nbanana\ncherry\n";

const UNIGRAMS_ONLY: &str = "\
\\data\\
ngram 1=3

\\1-grams:
-1.2 apple
-0.5 banana
-2.0 cherry

\\end\\
";

const FULL: &str = "\
some tool banner
\\data\\
ngram 1=4
ngram 2=3
ngram 3=2

\\1-grams:
-1.0 apple -0.30
-1.5 banana -0.20
-2.0 cherry -0.10
-3.0 <UNK>

\\2-grams:
-0.3 apple banana -0.05
-0.6 banana cherry
-0.9 apple durian

\\3-grams:
-0.2 apple banana cherry
-0.4 <unk> banana cherry

\\end\\
trailing garbage is ignored
";

#[test]
fn unigram_only_model_ranks_by_probability() {
    let dir = TempDir::new().unwrap();
    let vocab = write(dir.path(), "vocab.txt", VOCAB);
    let arpa = write(dir.path(), "model.arpa", UNIGRAMS_ONLY);
    let model = LanguageModel::load(&vocab, &arpa).unwrap();

    let p = model.predict("", "", "", None, 10);
    assert_eq!(p.words(), vec!["banana", "apple", "cherry"]);
    let probs: Vec<f64> = p.iter().map(|s| s.probability).collect();
    assert!((probs[0] - (-0.5f64).exp()).abs() < 1e-12);
    assert!(probs.windows(2).all(|w| w[0] >= w[1]));
}

#[test]
fn bigram_backoff_equals_weight_plus_unigram() {
    let dir = TempDir::new().unwrap();
    let vocab = write(dir.path(), "vocab.txt", VOCAB);
    let arpa = write(dir.path(), "model.arpa", FULL);
    let model = LanguageModel::load(&vocab, &arpa).unwrap();
    let v = model.vocabulary();
    let (apple, banana, cherry) = (
        v.code("apple").unwrap(),
        v.code("banana").unwrap(),
        v.code("cherry").unwrap(),
    );

    assert!(model.bigram(cherry, apple).is_none());
    let expected = model.unigram(cherry).unwrap().log_backoff + model.unigram(apple).unwrap().log_prob;
    assert_eq!(model.bigram_backoff(cherry, apple), Some(expected));
    assert_eq!(model.bigram_backoff(apple, banana), Some(-0.3));
    assert_eq!(model.trigram_backoff(apple, banana, cherry), Some(-0.2));
    assert_eq!(model.bigram(apple, banana), Some(ArpaEntry::new(-0.3, -0.05)));
}

#[test]
fn oov_and_unknown_rows_are_dropped() {
    let dir = TempDir::new().unwrap();
    let vocab = write(dir.path(), "vocab.txt", VOCAB);
    let arpa = write(dir.path(), "model.arpa", FULL);
    let model = LanguageModel::load(&vocab, &arpa).unwrap();
    // <UNK> unigram, "durian" bigram and <unk> trigram are not stored
    assert_eq!(model.counts(), [3, 2, 1]);
}

#[test]
fn context_selects_scoring_order() {
    let dir = TempDir::new().unwrap();
    let vocab = write(dir.path(), "vocab.txt", VOCAB);
    let arpa = write(dir.path(), "model.arpa", FULL);
    let model = LanguageModel::load(&vocab, &arpa).unwrap();

    // trigram context known
    let p = model.predict("apple", "banana", "", None, 3);
    assert_eq!(p.words()[0], "cherry");
    // only the previous word known
    let p = model.predict("nothing", "apple", "b", None, 3);
    assert_eq!(p.words(), vec!["banana"]);
    // filter restricts the character after the prefix
    let filter = vec!["h".to_string()];
    assert_eq!(model.predict("", "", "c", Some(&filter), 3).words(), vec!["cherry"]);
    let filter = vec!["x".to_string()];
    assert!(model.predict("", "", "c", Some(&filter), 3).is_empty());
}

#[test]
fn unreadable_or_malformed_files_fail() {
    let dir = TempDir::new().unwrap();
    let vocab = write(dir.path(), "vocab.txt", VOCAB);

    let missing = dir.path().join("missing.arpa");
    assert!(matches!(LanguageModel::load(&vocab, &missing), Err(Error::Io { .. })));

    let bad = write(
        dir.path(),
        "bad.arpa",
        "\\data\\\nngram 1=1\n\n\\1-grams:\n-1.0 apple not-a-number\n",
    );
    match LanguageModel::load(&vocab, &bad) {
        Err(Error::Parse { line, .. }) => assert_eq!(line, 5),
        other => panic!("expected parse error, got {:?}", other.map(|m| m.counts())),
    }
}

#[test]
fn snapshot_round_trip_keeps_predictions() {
    let dir = TempDir::new().unwrap();
    let vocab = write(dir.path(), "vocab.txt", VOCAB);
    let arpa = write(dir.path(), "model.arpa", FULL);
    let model = LanguageModel::load(&vocab, &arpa).unwrap();

    let snapshot = dir.path().join("model.bincode");
    model.save_bincode(&snapshot).unwrap();
    let restored = LanguageModel::load_bincode(&snapshot).unwrap();

    assert_eq!(restored.counts(), model.counts());
    assert_eq!(
        restored.predict("apple", "banana", "", None, 5),
        model.predict("apple", "banana", "", None, 5)
    );
    assert_eq!(restored.vocabulary().codes_with_prefix("b"), vec![1]);
}
