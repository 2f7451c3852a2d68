use anyhow::Result;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use materia_core::corpus::{flatten, CorpusLoader};
use materia_core::error::Error;
use materia_core::normalize::normalize;
use materia_core::traits::{Embedder, MaterialSearch};
use materia_core::types::{CategoryFilter, MaterialRecord, MetadataEntry, SearchRequest, SearchResult};

use crate::index::{cosine, l2_norm, read_metadata, EmbeddingIndex};
use crate::index_build::{encode_in_batches, DEFAULT_BATCH_SIZE};
use crate::schema::ArtifactPaths;

/// Candidate pool over-provisioning factor relative to `top_k`.
pub const POOL_FACTOR: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    /// Scores against a persisted embedding matrix.
    Precomputed,
    /// Re-encodes every row's normalized text on each query.
    Realtime,
}

impl SearchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchMode::Precomputed => "precomputed",
            SearchMode::Realtime => "realtime",
        }
    }
}

enum VectorSource {
    Precomputed(EmbeddingIndex),
    Realtime(Vec<MetadataEntry>),
}

/// Ranks materials against a query by cosine similarity.
///
/// Read-only after construction; `&self` queries may run concurrently.
pub struct RetrievalEngine {
    embedder: Box<dyn Embedder>,
    source: VectorSource,
    batch_size: usize,
}

impl RetrievalEngine {
    pub fn with_index(embedder: Box<dyn Embedder>, index: EmbeddingIndex) -> Result<Self> {
        if !index.is_empty() && index.dim() != embedder.dim() {
            return Err(Error::Configuration(format!(
                "index dimension {} does not match model dimension {}",
                index.dim(),
                embedder.dim()
            ))
            .into());
        }
        Ok(Self { embedder, source: VectorSource::Precomputed(index), batch_size: DEFAULT_BATCH_SIZE })
    }

    /// Degraded mode: no embedding matrix, rows are encoded per query.
    /// Entries without a stored `normalized_text` get one derived here.
    pub fn realtime(embedder: Box<dyn Embedder>, mut entries: Vec<MetadataEntry>) -> Self {
        for entry in entries.iter_mut().filter(|e| e.normalized_text.is_empty()) {
            let composite = MaterialRecord::indexing_text(&entry.content, &entry.keywords, entry.theme.as_deref());
            entry.normalized_text = normalize(&composite);
        }
        warn!(rows = entries.len(), "no precomputed embeddings, every query will re-encode the corpus");
        Self { embedder, source: VectorSource::Realtime(entries), batch_size: DEFAULT_BATCH_SIZE }
    }

    /// Open whatever artifacts `index_dir` holds.
    ///
    /// - `embeddings.bin` + `metadata.json`: precomputed mode
    /// - `metadata.json` only: realtime over the stored rows
    /// - neither: realtime over the raw corpus, when a loader is given
    pub fn open(embedder: Box<dyn Embedder>, index_dir: &Path, corpus: Option<&CorpusLoader>) -> Result<Self> {
        if let Some(index) = EmbeddingIndex::load(index_dir)? {
            return Self::with_index(embedder, index);
        }
        let paths = ArtifactPaths::in_dir(index_dir);
        let entries = if paths.metadata.exists() {
            read_metadata(&paths.metadata)?
        } else if let Some(loader) = corpus {
            info!(dir = %loader.data_dir().display(), "no index artifacts, reading raw corpus");
            flatten(&loader.load(CategoryFilter::All))
        } else {
            warn!(dir = %index_dir.display(), "no index artifacts and no corpus, engine has zero rows");
            Vec::new()
        };
        Ok(Self::realtime(embedder, entries))
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn mode(&self) -> SearchMode {
        match self.source {
            VectorSource::Precomputed(_) => SearchMode::Precomputed,
            VectorSource::Realtime(_) => SearchMode::Realtime,
        }
    }

    pub fn len(&self) -> usize {
        match &self.source {
            VectorSource::Precomputed(index) => index.len(),
            VectorSource::Realtime(entries) => entries.len(),
        }
    }

    pub fn is_empty(&self) -> bool { self.len() == 0 }

    pub fn embedder(&self) -> &dyn Embedder { self.embedder.as_ref() }

    fn entry(&self, i: usize) -> &MetadataEntry {
        match &self.source {
            VectorSource::Precomputed(index) => index.entry(i),
            VectorSource::Realtime(entries) => &entries[i],
        }
    }

    fn scores(&self, query: &[f32]) -> Result<Vec<f32>> {
        match &self.source {
            VectorSource::Precomputed(index) => index.cosine_scores(query),
            VectorSource::Realtime(entries) => {
                debug!(rows = entries.len(), "realtime encoding for query");
                let texts: Vec<String> = entries.iter().map(|e| e.normalized_text.clone()).collect();
                let vectors = encode_in_batches(self.embedder.as_ref(), &texts, self.batch_size)?;
                let q_norm = l2_norm(query);
                Ok(vectors.iter().map(|v| cosine(query, q_norm, v, l2_norm(v))).collect())
            }
        }
    }

    /// Rank the corpus against `query`. The query is embedded as given.
    pub fn try_search(&self, query: &str, request: &SearchRequest) -> Result<Vec<SearchResult>> {
        let start = Instant::now();
        if request.top_k == 0 || self.is_empty() {
            return Ok(Vec::new());
        }
        let query_vec = self.embedder.embed(query).map_err(|e| Error::Query(format!("failed to encode query: {:#}", e)))?;
        let scores = self.scores(&query_vec).map_err(|e| Error::Query(format!("{:#}", e)))?;
        let results = select(&scores, |i| self.entry(i), request);
        info!(
            query = %preview(query),
            mode = self.mode().as_str(),
            results = results.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "search complete"
        );
        Ok(results)
    }

    /// Like `try_search`, but a failed query yields no results.
    pub fn search(&self, query: &str, request: &SearchRequest) -> Vec<SearchResult> {
        match self.try_search(query, request) {
            Ok(results) => results,
            Err(e) => {
                error!(query = %preview(query), error = %format!("{:#}", e), "search failed");
                Vec::new()
            }
        }
    }
}

impl MaterialSearch for RetrievalEngine {
    fn search(&self, query: &str, request: &SearchRequest) -> Vec<SearchResult> { RetrievalEngine::search(self, query, request) }
}

/// Indices of the `size` highest scores, best first; equal scores keep row order.
pub fn candidate_pool(scores: &[f32], size: usize) -> Vec<usize> {
    let size = size.min(scores.len());
    if size == 0 { return Vec::new(); }
    let by_score = |a: &usize, b: &usize| scores[*b].total_cmp(&scores[*a]).then(a.cmp(b));
    let mut idx: Vec<usize> = (0..scores.len()).collect();
    if size < idx.len() {
        idx.select_nth_unstable_by(size - 1, by_score);
        idx.truncate(size);
    }
    idx.sort_by(by_score);
    idx
}

/// Pool of `POOL_FACTOR * top_k`, then threshold, then category, stopping at
/// `top_k`. A row outside the pool is never considered, even if the filters
/// leave fewer than `top_k` results.
pub fn select<'a, F>(scores: &[f32], entry_at: F, request: &SearchRequest) -> Vec<SearchResult>
where
    F: Fn(usize) -> &'a MetadataEntry,
{
    if request.top_k == 0 { return Vec::new(); }
    let pool = candidate_pool(scores, POOL_FACTOR.saturating_mul(request.top_k));
    let mut results = Vec::with_capacity(request.top_k.min(pool.len()));
    for i in pool {
        let score = scores[i];
        if score < request.similarity_threshold { continue; }
        let entry = entry_at(i);
        if !request.category.matches(entry.category) { continue; }
        results.push(SearchResult::from_entry(entry, score));
        if results.len() >= request.top_k { break; }
    }
    results
}

fn preview(query: &str) -> String {
    let mut p: String = query.chars().take(20).collect();
    if p.len() < query.len() { p.push_str("..."); }
    p
}
