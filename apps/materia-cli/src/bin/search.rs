use std::env;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

use materia_cli::{flag_value, init_tracing, print_results};
use materia_core::config::Config;
use materia_core::corpus::CorpusLoader;
use materia_core::traits::MaterialSearch;
use materia_core::types::CategoryFilter;
use materia_text::LexicalEngine;
use materia_vector::{spawn_engine_load, LoadEvent};

fn usage(program: &str) -> ! {
    eprintln!("Usage: {} <query> [--category all|quotes|examples|poems] [--top-k N] [--threshold X] [--lexical] [--fake]", program);
    eprintln!("Example: {} '坚持梦想' --category quotes --top-k 3", program);
    std::process::exit(1);
}

fn main() -> anyhow::Result<()> {
    init_tracing();
    let config = Config::load()?;
    let mut settings = config.settings()?;

    let argv: Vec<String> = env::args().collect();
    let program = argv.first().cloned().unwrap_or_else(|| "materia-search".to_string());
    let args = &argv[1.min(argv.len())..];
    let mut query = None;
    let mut lexical = false;
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--lexical" => lexical = true,
            "--fake" => settings.model.use_fake = true,
            "--category" | "-c" => {
                match flag_value(args, i, "--category").parse::<CategoryFilter>() {
                    Ok(c) => settings.search.category = c,
                    Err(e) => { eprintln!("Error: {}", e); std::process::exit(2); }
                }
                i += 1;
            }
            "--top-k" | "-k" => {
                match flag_value(args, i, "--top-k").parse::<usize>() {
                    Ok(n) if n > 0 => settings.search.top_k = n,
                    _ => { eprintln!("Error: --top-k requires a positive number"); std::process::exit(2); }
                }
                i += 1;
            }
            "--threshold" | "-t" => {
                match flag_value(args, i, "--threshold").parse::<f32>() {
                    Ok(t) if (-1.0..=1.0).contains(&t) => settings.search.similarity_threshold = t,
                    _ => { eprintln!("Error: --threshold requires a number in [-1, 1]"); std::process::exit(2); }
                }
                i += 1;
            }
            "--help" | "-h" => usage(&program),
            arg if !arg.starts_with('-') && query.is_none() => query = Some(arg.to_string()),
            other => { eprintln!("Unknown argument: {}", other); usage(&program) }
        }
        i += 1;
    }
    let Some(query) = query.filter(|q| !q.trim().is_empty()) else { usage(&program) };
    let request = settings.search.request();

    println!("Materia Search\n==============");
    println!("Query: {}", query);
    println!("Category: {}  top_k: {}  threshold: {}", request.category, request.top_k, request.similarity_threshold);

    if lexical {
        let loader = CorpusLoader::new(&settings.data.corpus_dir);
        let engine = LexicalEngine::open(&loader, &settings.data.index_dir, settings.lexical.min_df)?;
        println!("Mode: lexical ({} rows)", engine.len());
        print_results(&query, &engine.search(&query, &request));
        return Ok(());
    }

    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg} [{elapsed}]") {
        spinner.set_style(style);
    }
    spinner.set_message("Loading model...");
    let mut task = spawn_engine_load(settings);
    let event = loop {
        if let Some(event) = task.try_take() { break event; }
        spinner.tick();
        std::thread::sleep(Duration::from_millis(100));
    };
    spinner.finish_and_clear();

    match event {
        LoadEvent::Ready(loaded) => {
            println!("Mode: {} ({:?} model, {} rows, device {})", loaded.mode.as_str(), loaded.snapshot, loaded.engine.len(), loaded.engine.embedder().device());
            print_results(&query, &loaded.engine.search(&query, &request));
            Ok(())
        }
        LoadEvent::Failed(msg) => {
            eprintln!("Model load failed: {}", msg);
            std::process::exit(1);
        }
    }
}
