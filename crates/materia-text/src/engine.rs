use anyhow::Result;
use std::path::Path;
use std::time::Instant;
use tracing::{error, info, warn};

use materia_core::corpus::{flatten, CorpusLoader};
use materia_core::normalize::Normalizer;
use materia_core::traits::MaterialSearch;
use materia_core::types::{CategoryFilter, MetadataEntry, SearchRequest, SearchResult};

use crate::vectorizer::{SparseVector, TfidfVectorizer};

pub const VECTORIZER_FILE: &str = "tfidf_vectorizer.json";

/// Exactly `top_k` rows by rank, then the category filter. No threshold.
pub struct LexicalEngine {
    vectorizer: TfidfVectorizer,
    normalizer: Normalizer,
    entries: Vec<MetadataEntry>,
    matrix: Vec<SparseVector>,
}

impl LexicalEngine {
    pub fn new(vectorizer: TfidfVectorizer, normalizer: Normalizer, entries: Vec<MetadataEntry>) -> Self {
        let matrix = entries.iter().map(|e| vectorizer.transform(&analyze(&normalizer, &document_text(e)))).collect();
        Self { vectorizer, normalizer, entries, matrix }
    }

    /// Load the corpus and reuse `<index_dir>/tfidf_vectorizer.json`, fitting
    /// and saving a new one when absent.
    pub fn open(loader: &CorpusLoader, index_dir: &Path, min_df: f64) -> Result<Self> {
        let entries = flatten(&loader.load(CategoryFilter::All));
        let path = index_dir.join(VECTORIZER_FILE);
        let vectorizer = if path.exists() {
            TfidfVectorizer::load(&path)?
        } else {
            fit_and_save(&entries, loader.normalizer(), &path, min_df)?
        };
        Ok(Self::new(vectorizer, loader.normalizer().clone(), entries))
    }

    pub fn len(&self) -> usize { self.entries.len() }
    pub fn is_empty(&self) -> bool { self.entries.is_empty() }
    pub fn vectorizer(&self) -> &TfidfVectorizer { &self.vectorizer }

    pub fn try_search(&self, query: &str, top_k: usize, category: CategoryFilter) -> Result<Vec<SearchResult>> {
        let start = Instant::now();
        if top_k == 0 || self.is_empty() { return Ok(Vec::new()); }
        let q = self.vectorizer.transform(&analyze(&self.normalizer, query));
        let scores: Vec<f32> = self.matrix.iter().map(|row| q.dot(row)).collect();

        let mut order: Vec<usize> = (0..scores.len()).collect();
        order.sort_by(|a, b| scores[*b].total_cmp(&scores[*a]).then(a.cmp(b)));
        let results: Vec<SearchResult> = order
            .into_iter()
            .take(top_k)
            .filter(|i| category.matches(self.entries[*i].category))
            .map(|i| SearchResult::from_entry(&self.entries[i], round3(scores[i])))
            .collect();
        info!(results = results.len(), elapsed_ms = start.elapsed().as_millis() as u64, "lexical search complete");
        Ok(results)
    }
}

impl MaterialSearch for LexicalEngine {
    fn search(&self, query: &str, request: &SearchRequest) -> Vec<SearchResult> {
        self.try_search(query, request.top_k, request.category).unwrap_or_else(|e| {
            error!(error = %format!("{:#}", e), "lexical search failed");
            Vec::new()
        })
    }
}

/// Fit a vectorizer over `entries` and persist it at `path`.
pub fn fit_and_save(entries: &[MetadataEntry], normalizer: &Normalizer, path: &Path, min_df: f64) -> Result<TfidfVectorizer> {
    let mut vectorizer = TfidfVectorizer::new(min_df);
    if entries.is_empty() {
        warn!("no documents to fit, lexical vectorizer left empty and not saved");
        return Ok(vectorizer);
    }
    let docs: Vec<Vec<String>> = entries.iter().map(|e| analyze(normalizer, &document_text(e))).collect();
    vectorizer.fit(&docs);
    vectorizer.save(path)?;
    Ok(vectorizer)
}

/// `content keywords theme`, the raw document text before analysis.
pub fn document_text(entry: &MetadataEntry) -> String {
    format!("{} {} {}", entry.content, entry.keywords.join(" "), entry.theme.as_deref().unwrap_or(""))
}

/// Segmented, filtered, lowercased tokens.
pub fn analyze(normalizer: &Normalizer, text: &str) -> Vec<String> {
    normalizer.tokens(text).into_iter().map(|t| t.to_lowercase()).collect()
}

fn round3(score: f32) -> f32 { (score * 1000.0).round() / 1000.0 }
