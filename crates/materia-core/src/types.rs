//! Domain types shared by the embedding and lexical engines.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// The three kinds of material in the corpus. Declaration order is the
/// order categories are flattened into the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Quotes,
    Examples,
    Poems,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Quotes, Category::Examples, Category::Poems];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Quotes => "quotes",
            Category::Examples => "examples",
            Category::Poems => "poems",
        }
    }

    /// Capitalized name shown by front-ends.
    pub fn label(&self) -> &'static str {
        match self {
            Category::Quotes => "Quotes",
            Category::Examples => "Examples",
            Category::Poems => "Poems",
        }
    }

    /// Name of the raw source file for this category.
    pub fn file_name(&self) -> String { format!("{}.json", self.as_str()) }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for Category {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "quotes" => Ok(Category::Quotes),
            "examples" => Ok(Category::Examples),
            "poems" => Ok(Category::Poems),
            other => Err(Error::NotFound(format!("unknown category '{}'", other))),
        }
    }
}

/// Either every category or exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum CategoryFilter {
    #[default]
    All,
    Only(Category),
}

impl CategoryFilter {
    pub fn matches(&self, category: Category) -> bool {
        match self {
            CategoryFilter::All => true,
            CategoryFilter::Only(c) => *c == category,
        }
    }

    /// Categories selected by this filter, in flattening order.
    pub fn categories(&self) -> Vec<Category> {
        match self {
            CategoryFilter::All => Category::ALL.to_vec(),
            CategoryFilter::Only(c) => vec![*c],
        }
    }
}

impl FromStr for CategoryFilter {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("all") { return Ok(CategoryFilter::All); }
        s.parse().map(CategoryFilter::Only)
    }
}

impl TryFrom<String> for CategoryFilter {
    type Error = Error;
    fn try_from(value: String) -> Result<Self, Self::Error> { value.parse() }
}

impl From<CategoryFilter> for String {
    fn from(value: CategoryFilter) -> Self {
        match value {
            CategoryFilter::All => "all".to_string(),
            CategoryFilter::Only(c) => c.as_str().to_string(),
        }
    }
}

impl fmt::Display for CategoryFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CategoryFilter::All => f.write_str("all"),
            CategoryFilter::Only(c) => f.write_str(c.as_str()),
        }
    }
}

impl From<Category> for CategoryFilter {
    fn from(value: Category) -> Self { CategoryFilter::Only(value) }
}

/// A piece of material as loaded from the raw corpus.
///
/// `normalized_text` is derived by the corpus loader from the composite
/// indexing text and is the only input the embedding model sees.
#[derive(Debug, Clone, PartialEq)]
pub struct MaterialRecord {
    pub category: Category,
    pub content: String,
    pub keywords: Vec<String>,
    pub source: Option<String>,
    pub theme: Option<String>,
    pub normalized_text: String,
}

impl MaterialRecord {
    /// `content [SEP] keywords [SEP] theme`, the string fed to the normalizer.
    pub fn indexing_text(content: &str, keywords: &[String], theme: Option<&str>) -> String {
        let mut text = format!("{} [SEP] {}", content, keywords.join(" "));
        if let Some(theme) = theme {
            text.push_str(" [SEP] ");
            text.push_str(theme);
        }
        text
    }
}

/// One row of the persisted metadata table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataEntry {
    #[serde(rename = "type")]
    pub category: Category,
    pub content: String,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub theme: Option<String>,
    #[serde(default)]
    pub normalized_text: String,
}

impl From<&MaterialRecord> for MetadataEntry {
    fn from(r: &MaterialRecord) -> Self {
        Self {
            category: r.category,
            content: r.content.clone(),
            source: r.source.clone(),
            keywords: r.keywords.clone(),
            theme: r.theme.clone(),
            normalized_text: r.normalized_text.clone(),
        }
    }
}

/// Query parameters accepted by every engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchRequest {
    pub top_k: usize,
    pub category: CategoryFilter,
    /// Candidates scoring strictly below this are dropped. Ignored by the
    /// lexical engine.
    pub similarity_threshold: f32,
}

impl Default for SearchRequest {
    fn default() -> Self { Self { top_k: 5, category: CategoryFilter::All, similarity_threshold: 0.3 } }
}

impl SearchRequest {
    pub fn new(top_k: usize) -> Self { Self { top_k, ..Self::default() } }
    pub fn category(mut self, category: impl Into<CategoryFilter>) -> Self { self.category = category.into(); self }
    pub fn threshold(mut self, similarity_threshold: f32) -> Self { self.similarity_threshold = similarity_threshold; self }
}

/// A ranked hit returned to front-ends. Built per query, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    pub category: Category,
    pub content: String,
    pub source: Option<String>,
    pub tags: Vec<String>,
    pub score: f32,
}

impl SearchResult {
    pub fn from_entry(entry: &MetadataEntry, score: f32) -> Self {
        Self {
            category: entry.category,
            content: entry.content.clone(),
            source: entry.source.clone(),
            tags: entry.keywords.clone(),
            score,
        }
    }
}
