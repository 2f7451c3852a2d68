//! Layered configuration and path helpers.
//!
//! Uses Figment to merge built-in defaults, `config.toml`,
//! `config.<env>.toml` and `APP_*` env vars (`__` separates nested keys, e.g.
//! `APP_SEARCH__TOP_K=10`). Paths expand `~` and `${VAR}` and resolve relative
//! to the directory the config was loaded from.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::error::Error;
use crate::types::{CategoryFilter, SearchRequest};

pub struct Config {
    figment: Figment,
    base_dir: PathBuf,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> { Self::load_from(Path::new(".")) }

    pub fn load_from(dir: &Path) -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());
        Self::load_for_env(dir, &env_name)
    }

    pub fn load_for_env(dir: &Path, env_name: &str) -> anyhow::Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(dir.join("config.toml")));
        match env_name {
            "dev" | "development" => figment = figment.merge(Toml::file(dir.join("config.dev.toml"))),
            "prod" | "production" => figment = figment.merge(Toml::file(dir.join("config.prod.toml"))),
            "test" | "testing" => figment = figment.merge(Toml::file(dir.join("config.test.toml"))),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        let config = Self { figment, base_dir: dir.to_path_buf() };
        config.settings()?;
        Ok(config)
    }

    pub fn get<T>(&self, key: &str) -> anyhow::Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| anyhow::anyhow!("Failed to get '{}': {}", key, e))
    }

    /// Typed, validated settings with paths resolved against the config dir.
    pub fn settings(&self) -> anyhow::Result<Settings> {
        let settings: Settings = self
            .figment
            .extract()
            .map_err(|e| Error::Configuration(e.to_string()))?;
        settings.validate()?;
        Ok(settings.resolved(&self.base_dir))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub data: DataSettings,
    pub model: ModelSettings,
    pub index: IndexSettings,
    pub search: SearchSettings,
    pub lexical: LexicalSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSettings {
    /// Holds `quotes.json`, `examples.json`, `poems.json`.
    pub corpus_dir: PathBuf,
    /// Holds `embeddings.bin`, `metadata.json`, `tfidf_vectorizer.json`.
    pub index_dir: PathBuf,
}

impl Default for DataSettings {
    fn default() -> Self { Self { corpus_dir: PathBuf::from("data"), index_dir: PathBuf::from("model") } }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DevicePreference {
    #[default]
    Auto,
    Cpu,
    Cuda,
    Metal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    /// Root holding `fine_tuned/` and/or `pretrained/` snapshots.
    pub dir: PathBuf,
    pub use_fine_tuned: bool,
    pub device: DevicePreference,
    pub max_len: usize,
    /// Use the hashing embedder instead of loading weights.
    pub use_fake: bool,
    pub fake_dim: usize,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("model"),
            use_fine_tuned: true,
            device: DevicePreference::Auto,
            max_len: 256,
            use_fake: false,
            fake_dim: 768,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexSettings {
    pub batch_size: usize,
}

impl Default for IndexSettings {
    fn default() -> Self { Self { batch_size: 128 } }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    pub top_k: usize,
    pub similarity_threshold: f32,
    pub category: CategoryFilter,
}

impl Default for SearchSettings {
    fn default() -> Self {
        let r = SearchRequest::default();
        Self { top_k: r.top_k, similarity_threshold: r.similarity_threshold, category: r.category }
    }
}

impl SearchSettings {
    pub fn request(&self) -> SearchRequest {
        SearchRequest { top_k: self.top_k, category: self.category, similarity_threshold: self.similarity_threshold }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LexicalSettings {
    /// Minimum document frequency as a proportion of the corpus.
    pub min_df: f64,
}

impl Default for LexicalSettings {
    fn default() -> Self { Self { min_df: 0.01 } }
}

impl Settings {
    pub fn validate(&self) -> Result<(), Error> {
        if self.index.batch_size == 0 {
            return Err(Error::Configuration("index.batch_size must be at least 1".into()));
        }
        if self.search.top_k == 0 {
            return Err(Error::Configuration("search.top_k must be at least 1".into()));
        }
        if !(-1.0..=1.0).contains(&self.search.similarity_threshold) {
            return Err(Error::Configuration(format!(
                "search.similarity_threshold must lie in [-1, 1], got {}",
                self.search.similarity_threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.lexical.min_df) {
            return Err(Error::Configuration(format!("lexical.min_df must lie in [0, 1], got {}", self.lexical.min_df)));
        }
        if self.model.use_fake && self.model.fake_dim == 0 {
            return Err(Error::Configuration("model.fake_dim must be at least 1".into()));
        }
        Ok(())
    }

    fn resolved(mut self, base: &Path) -> Self {
        self.data.corpus_dir = resolve_with_base(base, self.data.corpus_dir.to_string_lossy());
        self.data.index_dir = resolve_with_base(base, self.data.index_dir.to_string_lossy());
        self.model.dir = resolve_with_base(base, self.model.dir.to_string_lossy());
        self
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
/// If `p` is absolute, it's returned as-is; otherwise `base.join(p)` is returned.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}
