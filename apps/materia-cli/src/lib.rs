//! Shared helpers for the materia binaries.

use std::sync::Once;

use materia_core::types::SearchResult;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

static INIT: Once = Once::new();

/// Log to stderr, filtered by `RUST_LOG` (default `info`). Idempotent.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        tracing_subscriber::registry()
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .with(filter)
            .init();
    });
}

pub fn print_results(query: &str, results: &[SearchResult]) {
    println!("\nFound {} results for: \"{}\"", results.len(), query);
    for (i, r) in results.iter().enumerate() {
        println!("\n  {}. [{}] score={:.3}", i + 1, r.category.label(), r.score);
        println!("     {}", r.content);
        if let Some(source) = r.source.as_deref().filter(|s| !s.is_empty()) {
            println!("     -- {}", source);
        }
        if !r.tags.is_empty() {
            println!("     tags: {}", r.tags.join(", "));
        }
    }
}

/// Value following a flag, or exit with a usage error.
pub fn flag_value<'a>(args: &'a [String], i: usize, flag: &str) -> &'a str {
    match args.get(i + 1) {
        Some(v) => v,
        None => {
            eprintln!("Error: {} requires a value", flag);
            std::process::exit(2);
        }
    }
}
