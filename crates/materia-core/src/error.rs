use thiserror::Error;

use crate::types::Category;

#[derive(Debug, Error)]
pub enum Error {
    /// A required model or index artifact is missing or corrupt.
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// A category source could not be read; the load continues without it.
    #[error("Partial corpus: {category} skipped ({reason})")]
    PartialCorpus { category: Category, reason: String },

    /// A single query failed during encoding or scoring.
    #[error("Query failed: {0}")]
    Query(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
