use anyhow::Result;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::error::Error;
use crate::normalize::Normalizer;
use crate::types::{Category, CategoryFilter, MaterialRecord, MetadataEntry};

/// Loaded material keyed by category. A present key with an empty vector
/// means the source was missing; an absent key means it was unreadable.
pub type Corpus = BTreeMap<Category, Vec<MaterialRecord>>;

#[derive(Debug, Deserialize)]
struct RawRecord {
    content: String,
    keywords: Vec<String>,
    #[serde(default)]
    source: Option<String>,
    #[serde(default)]
    theme: Option<String>,
}

/// Reads `<data_dir>/<category>.json` files into a [`Corpus`].
#[derive(Debug, Clone)]
pub struct CorpusLoader {
    data_dir: PathBuf,
    normalizer: Normalizer,
}

impl CorpusLoader {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self { Self { data_dir: data_dir.into(), normalizer: Normalizer::new() } }

    pub fn with_normalizer(mut self, normalizer: Normalizer) -> Self { self.normalizer = normalizer; self }

    pub fn data_dir(&self) -> &Path { &self.data_dir }

    pub fn normalizer(&self) -> &Normalizer { &self.normalizer }

    /// Load every selected category. Never fails as a whole: missing sources
    /// yield empty sets and malformed sources are omitted.
    pub fn load(&self, selection: CategoryFilter) -> Corpus {
        let mut corpus = Corpus::new();
        for category in selection.categories() {
            match self.load_category(category) {
                Ok(records) => { corpus.insert(category, records); }
                Err(e) => warn!(error = %e, "skipping category"),
            }
        }
        corpus
    }

    /// Records of one category. A missing file is an empty set; a file that is
    /// not a JSON array is an error.
    pub fn load_category(&self, category: Category) -> Result<Vec<MaterialRecord>> {
        let path = self.data_dir.join(category.file_name());
        if !path.exists() {
            warn!(path = %path.display(), %category, "corpus source missing");
            return Ok(Vec::new());
        }
        let bytes = fs::read(&path)?;
        let text = String::from_utf8(bytes)
            .map_err(|e| Error::PartialCorpus { category, reason: format!("invalid UTF-8: {}", e) })?;
        let records = self.parse_records(category, &text)?;
        info!(%category, count = records.len(), "loaded corpus source");
        Ok(records)
    }

    fn parse_records(&self, category: Category, text: &str) -> Result<Vec<MaterialRecord>> {
        let items: Vec<serde_json::Value> = serde_json::from_str(text)
            .map_err(|e| Error::PartialCorpus { category, reason: e.to_string() })?;
        let mut records = Vec::with_capacity(items.len());
        for (i, item) in items.into_iter().enumerate() {
            match serde_json::from_value::<RawRecord>(item) {
                Ok(raw) => records.push(self.to_record(category, raw)),
                Err(e) => warn!(%category, index = i, error = %e, "skipping malformed record"),
            }
        }
        Ok(records)
    }

    fn to_record(&self, category: Category, raw: RawRecord) -> MaterialRecord {
        let composite = MaterialRecord::indexing_text(&raw.content, &raw.keywords, raw.theme.as_deref());
        let normalized_text = self.normalizer.normalize(&composite);
        MaterialRecord {
            category,
            content: raw.content,
            keywords: raw.keywords,
            source: raw.source,
            theme: raw.theme,
            normalized_text,
        }
    }
}

/// Flatten in category order; the result's order is the permanent row order
/// of any index built from it.
pub fn flatten(corpus: &Corpus) -> Vec<MetadataEntry> {
    corpus.values().flat_map(|records| records.iter().map(MetadataEntry::from)).collect()
}
