//! materia-vector
//!
//! Embedding index persistence, the offline index builder, and the online
//! retrieval engine with its background loader.

pub mod index;
pub mod index_build;
pub mod loader;
pub mod schema;
pub mod search;

pub use index::{cosine, l2_norm, read_metadata, EmbeddingIndex, IndexRow};
pub use index_build::{encode_in_batches, IndexBuilder, DEFAULT_BATCH_SIZE};
pub use loader::{spawn_engine_load, spawn_load, LoadEvent, LoadTask, LoadedEngine};
pub use schema::{ArtifactPaths, EMBEDDINGS_FILE, METADATA_FILE};
pub use search::{candidate_pool, select, RetrievalEngine, SearchMode, POOL_FACTOR};
