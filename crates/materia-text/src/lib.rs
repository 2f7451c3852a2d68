//! materia-text
//!
//! Lexical fallback search: a TF-IDF word and bigram vector space over the
//! same corpus, ranked by cosine similarity.

pub mod engine;
pub mod vectorizer;

pub use engine::{analyze, document_text, fit_and_save, LexicalEngine, VECTORIZER_FILE};
pub use vectorizer::{SparseVector, TfidfVectorizer};
