use anyhow::{Context, Result};
use clap::Parser;
use soothsayer_core::LanguageModel;
use soothsayer_tools::logging::init_logging;
use std::path::PathBuf;

/// Compile a vocabulary and an ARPA model into a bincode snapshot that the
/// ARPA plugin loads through its SNAPSHOT setting.
#[derive(Parser)]
#[command(name = "serialize_arpa", version)]
struct Args {
    /// Vocabulary file, one word per line
    #[arg(long)]
    vocab: PathBuf,

    /// ARPA model file
    #[arg(long)]
    arpa: PathBuf,

    #[arg(long, default_value = "model.bincode")]
    out: PathBuf,

    /// Increase log verbosity (repeatable)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose)?;

    let model = LanguageModel::load(&args.vocab, &args.arpa)
        .with_context(|| format!("load {} with {}", args.arpa.display(), args.vocab.display()))?;
    model
        .save_bincode(&args.out)
        .with_context(|| format!("write {}", args.out.display()))?;

    let [unigrams, bigrams, trigrams] = model.counts();
    println!(
        "Wrote {} ({} words, {unigrams} unigrams, {bigrams} bigrams, {trigrams} trigrams)",
        args.out.display(),
        model.vocabulary().len()
    );
    Ok(())
}
