//! Offline index construction.
//!
//! Flow:
//! 1) Flatten the loaded corpus into metadata entries (category order, file order)
//! 2) Encode `normalized_text` in batches through the embedder
//! 3) Zip vectors and entries into an `EmbeddingIndex`; optionally save it

use anyhow::{bail, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::time::Instant;
use tracing::{info, warn};

use materia_core::corpus::{flatten, Corpus};
use materia_core::traits::Embedder;
use materia_core::types::MetadataEntry;

use crate::index::EmbeddingIndex;

pub const DEFAULT_BATCH_SIZE: usize = 128;

pub struct IndexBuilder<'a> {
    embedder: &'a dyn Embedder,
    batch_size: usize,
    show_progress: bool,
}

impl<'a> IndexBuilder<'a> {
    pub fn new(embedder: &'a dyn Embedder) -> Self {
        Self { embedder, batch_size: DEFAULT_BATCH_SIZE, show_progress: false }
    }

    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn show_progress(mut self, on: bool) -> Self {
        self.show_progress = on;
        self
    }

    pub fn build(&self, corpus: &Corpus) -> Result<EmbeddingIndex> { self.build_entries(flatten(corpus)) }

    pub fn build_entries(&self, entries: Vec<MetadataEntry>) -> Result<EmbeddingIndex> {
        let start = Instant::now();
        let dim = self.embedder.dim();
        if entries.is_empty() {
            warn!("corpus is empty, building an index with zero rows");
            return Ok(EmbeddingIndex::new(dim));
        }

        let batches = entries.len().div_ceil(self.batch_size);
        let pb = if self.show_progress { ProgressBar::new(batches as u64) } else { ProgressBar::hidden() };
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} batches ({percent}%) {msg}")
        {
            pb.set_style(style.progress_chars("#>-"));
        }

        let mut index = EmbeddingIndex::with_capacity(dim, entries.len());
        for chunk in entries.chunks(self.batch_size) {
            let texts: Vec<String> = chunk.iter().map(|e| e.normalized_text.clone()).collect();
            let vectors = encode_in_batches(self.embedder, &texts, self.batch_size)?;
            for (entry, vector) in chunk.iter().zip(vectors) {
                index.push(entry.clone(), vector)?;
            }
            pb.inc(1);
        }
        pb.finish_with_message("done");
        info!(rows = index.len(), dim, elapsed_ms = start.elapsed().as_millis() as u64, "built embedding index");
        Ok(index)
    }

    pub fn build_and_save(&self, corpus: &Corpus, dir: &Path) -> Result<EmbeddingIndex> {
        let index = self.build(corpus)?;
        index.save(dir)?;
        Ok(index)
    }
}

/// Encode `texts` in fixed-size batches, checking each batch's shape.
pub fn encode_in_batches(embedder: &dyn Embedder, texts: &[String], batch_size: usize) -> Result<Vec<Vec<f32>>> {
    let mut out = Vec::with_capacity(texts.len());
    for chunk in texts.chunks(batch_size.max(1)) {
        let vectors = embedder.embed_batch(chunk)?;
        if vectors.len() != chunk.len() {
            bail!("embedder returned {} vectors for {} texts", vectors.len(), chunk.len());
        }
        if let Some(v) = vectors.iter().find(|v| v.len() != embedder.dim()) {
            bail!("embedder returned dimension {}, expected {}", v.len(), embedder.dim());
        }
        out.extend(vectors);
    }
    Ok(out)
}
