use std::{env, path::PathBuf};

use tracing::info;

use materia_cli::{flag_value, init_tracing};
use materia_core::config::Config;
use materia_core::corpus::{flatten, CorpusLoader};
use materia_core::types::CategoryFilter;
use materia_embed::load_embedder;
use materia_text::{fit_and_save, VECTORIZER_FILE};
use materia_vector::IndexBuilder;

fn main() -> anyhow::Result<()> {
    init_tracing();
    let config = Config::load().map_err(|e| { eprintln!("Error loading config: {:#}", e); e })?;
    let mut settings = config.settings()?;

    let args: Vec<String> = env::args().skip(1).collect();
    let mut skip_lexical = false;
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--skip-lexical" | "-s" => skip_lexical = true,
            "--fake" => settings.model.use_fake = true,
            "--index-dir" => { settings.data.index_dir = PathBuf::from(flag_value(&args, i, "--index-dir")); i += 1; }
            "--batch-size" => {
                match flag_value(&args, i, "--batch-size").parse::<usize>() {
                    Ok(n) if n > 0 => settings.index.batch_size = n,
                    _ => { eprintln!("Error: --batch-size requires a positive number"); std::process::exit(2); }
                }
                i += 1;
            }
            arg if !arg.starts_with('-') => settings.data.corpus_dir = PathBuf::from(arg),
            other => { eprintln!("Unknown option: {}", other); std::process::exit(2); }
        }
        i += 1;
    }

    println!("Materia Indexer\n===============");
    println!("Corpus directory: {}", settings.data.corpus_dir.display());
    println!("Index directory:  {}", settings.data.index_dir.display());

    let loader = CorpusLoader::new(&settings.data.corpus_dir);
    let corpus = loader.load(CategoryFilter::All);
    for (category, records) in &corpus { println!("  {:<9} {} records", category.label(), records.len()); }

    let loaded = load_embedder(&settings.model)?;
    info!(snapshot = ?loaded.snapshot, device = loaded.embedder.device(), "embedder loaded");
    let index = IndexBuilder::new(loaded.embedder.as_ref())
        .batch_size(settings.index.batch_size)
        .show_progress(true)
        .build_and_save(&corpus, &settings.data.index_dir)?;
    println!("\nEmbedded {} records (dim {}) using {:?} model", index.len(), index.dim(), loaded.snapshot);

    if skip_lexical {
        println!("Skipping lexical vectorizer (--skip-lexical)");
    } else {
        let path = settings.data.index_dir.join(VECTORIZER_FILE);
        let vectorizer = fit_and_save(&flatten(&corpus), loader.normalizer(), &path, settings.lexical.min_df)?;
        println!("Fitted lexical vectorizer with {} terms", vectorizer.vocabulary_len());
    }

    println!("\nIndexing completed.");
    println!("To search, use: cargo run --bin materia-search -- '<query>'");
    Ok(())
}
