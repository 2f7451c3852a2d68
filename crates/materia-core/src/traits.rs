use crate::types::{SearchRequest, SearchResult};

/// Maps text to fixed-length vectors. Implementations must be deterministic
/// for a fixed model snapshot.
pub trait Embedder: Send + Sync {
    fn dim(&self) -> usize;
    fn max_len(&self) -> usize;
    /// Label of the compute device the model runs on (`cpu`, `cuda:0`, ...).
    fn device(&self) -> &str;
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;

    fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        self.embed_batch(&[text.to_string()])?
            .pop()
            .ok_or_else(|| anyhow::anyhow!("embedder returned no vector"))
    }
}

/// The surface front-ends call. Failures are absorbed: an engine that cannot
/// answer returns no results.
pub trait MaterialSearch: Send + Sync {
    fn search(&self, query: &str, request: &SearchRequest) -> Vec<SearchResult>;
}
