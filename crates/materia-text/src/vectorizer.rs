use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::info;

use materia_core::error::Error;

pub const FORMAT_VERSION: u32 = 1;

/// Word unigrams and bigrams, weighted by smoothed inverse document frequency.
///
/// Terms are built from already segmented, lowercased tokens. Weights follow
/// `tf * (ln((1 + n) / (1 + df)) + 1)` with each row L2-normalized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TfidfVectorizer {
    format: u32,
    /// Terms seen in fewer than `min_df * n_docs` documents are dropped.
    min_df: f64,
    max_ngram: usize,
    vocabulary: BTreeMap<String, usize>,
    idf: Vec<f32>,
}

impl TfidfVectorizer {
    pub fn new(min_df: f64) -> Self {
        Self { format: FORMAT_VERSION, min_df, max_ngram: 2, vocabulary: BTreeMap::new(), idf: Vec::new() }
    }

    pub fn min_df(&self) -> f64 { self.min_df }
    pub fn vocabulary_len(&self) -> usize { self.vocabulary.len() }
    pub fn is_fitted(&self) -> bool { !self.vocabulary.is_empty() }
    pub fn contains(&self, term: &str) -> bool { self.vocabulary.contains_key(term) }

    /// Learn vocabulary and IDF weights from token lists, one per document.
    pub fn fit(&mut self, docs: &[Vec<String>]) {
        let n_docs = docs.len();
        let mut df: HashMap<String, usize> = HashMap::new();
        for doc in docs {
            let mut terms = self.terms(doc);
            terms.sort_unstable();
            terms.dedup();
            for term in terms { *df.entry(term).or_insert(0) += 1; }
        }

        let min_count = self.min_df * n_docs as f64;
        let kept: BTreeMap<String, usize> = df.into_iter().filter(|(_, count)| *count as f64 >= min_count).collect();
        self.vocabulary = kept.keys().enumerate().map(|(col, term)| (term.clone(), col)).collect();
        self.idf = kept
            .values()
            .map(|count| (((1 + n_docs) as f64 / (1 + count) as f64).ln() + 1.0) as f32)
            .collect();
        info!(docs = n_docs, terms = self.vocabulary.len(), "fitted tf-idf vocabulary");
    }

    pub fn transform(&self, tokens: &[String]) -> SparseVector {
        let mut counts: BTreeMap<usize, f32> = BTreeMap::new();
        for term in self.terms(tokens) {
            if let Some(&col) = self.vocabulary.get(&term) { *counts.entry(col).or_insert(0.0) += 1.0; }
        }
        let weights: Vec<(usize, f32)> = counts.into_iter().map(|(col, tf)| (col, tf * self.idf[col])).collect();
        SparseVector::normalized(weights)
    }

    fn terms(&self, tokens: &[String]) -> Vec<String> {
        let mut out: Vec<String> = Vec::with_capacity(tokens.len() * self.max_ngram);
        for n in 1..=self.max_ngram {
            out.extend(tokens.windows(n).map(|w| w.join(" ")));
        }
        out
    }

    /// Serialize as JSON next to the other index artifacts, via a temp file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
        fs::create_dir_all(dir)?;
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(&serde_json::to_vec(self)?)?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| e.error)?;
        info!(path = %path.display(), terms = self.vocabulary.len(), "saved tf-idf vectorizer");
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)?;
        let v: Self = serde_json::from_slice(&bytes)
            .map_err(|e| Error::Configuration(format!("unreadable vectorizer {}: {}", path.display(), e)))?;
        if v.format != FORMAT_VERSION || v.idf.len() != v.vocabulary.len() || v.vocabulary.values().any(|c| *c >= v.idf.len()) {
            return Err(Error::Configuration(format!("inconsistent vectorizer {}", path.display())).into());
        }
        Ok(v)
    }
}

/// Sparse row sorted by column, L2-normalized (or empty).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SparseVector {
    entries: Vec<(usize, f32)>,
}

impl SparseVector {
    fn normalized(mut entries: Vec<(usize, f32)>) -> Self {
        let norm = entries.iter().map(|(_, w)| w * w).sum::<f32>().sqrt();
        if norm <= f32::EPSILON { return Self::default(); }
        for (_, w) in &mut entries { *w /= norm; }
        Self { entries }
    }

    pub fn is_empty(&self) -> bool { self.entries.is_empty() }
    pub fn entries(&self) -> &[(usize, f32)] { &self.entries }

    /// Cosine similarity; both sides are unit length or empty.
    pub fn dot(&self, other: &SparseVector) -> f32 {
        let (mut i, mut j, mut acc) = (0, 0, 0.0f32);
        while i < self.entries.len() && j < other.entries.len() {
            let (a, b) = (self.entries[i], other.entries[j]);
            match a.0.cmp(&b.0) {
                std::cmp::Ordering::Less => i += 1,
                std::cmp::Ordering::Greater => j += 1,
                std::cmp::Ordering::Equal => {
                    acc += a.1 * b.1;
                    i += 1;
                    j += 1;
                }
            }
        }
        acc
    }
}
