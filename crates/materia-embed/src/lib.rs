//! materia-embed
//!
//! The embedding capability consumed by the index builder and retrieval
//! engine: a local BERT-family sentence encoder and a hashing embedder for
//! tests and offline development. Both implement `materia_core::traits::Embedder`.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use tokenizers::Tokenizer;
use tracing::{debug, info};

use materia_core::config::ModelSettings;
use materia_core::error::Error;
use materia_core::traits::Embedder;

pub mod device;
pub mod pool;
pub mod tokenize;

pub use device::{device_label, select_device};
pub use pool::masked_mean_l2;
pub use tokenize::{tokenize_batch, TokenBatch};

/// Sentence encoder: BERT forward pass, masked mean pooling, L2 normalization.
pub struct SentenceEmbedder {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
    device_label: String,
    dim: usize,
    max_len: usize,
}

impl SentenceEmbedder {
    /// Expects `config.json`, `tokenizer.json` and `model.safetensors` or
    /// `pytorch_model.bin` in `model_dir`.
    pub fn load(model_dir: &Path, device: Device, max_len: usize) -> Result<Self> {
        let start = Instant::now();
        info!(dir = %model_dir.display(), "loading sentence encoder");
        let tokenizer_path = model_dir.join("tokenizer.json");
        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| Error::Configuration(format!("failed to load tokenizer from {}: {}", tokenizer_path.display(), e)))?;

        let config_path = model_dir.join("config.json");
        let raw = std::fs::read_to_string(&config_path)
            .map_err(|e| Error::Configuration(format!("failed to read {}: {}", config_path.display(), e)))?;
        let config: BertConfig = serde_json::from_str(&raw)?;
        let dim = serde_json::from_str::<serde_json::Value>(&raw)?
            .get("hidden_size")
            .and_then(serde_json::Value::as_u64)
            .ok_or_else(|| Error::Configuration(format!("{} has no hidden_size", config_path.display())))? as usize;

        let vb = load_weights(model_dir, &device)?;
        let model = BertModel::load(vb, &config)?;
        let device_label = device_label(&device);
        info!(device = %device_label, dim, elapsed_ms = start.elapsed().as_millis() as u64, "sentence encoder ready");
        Ok(Self { model, tokenizer, device, device_label, dim, max_len })
    }
}

fn load_weights(model_dir: &Path, device: &Device) -> Result<VarBuilder<'static>> {
    let safetensors = model_dir.join("model.safetensors");
    if safetensors.exists() {
        // SAFETY: the weight file is not modified while mapped.
        return Ok(unsafe { VarBuilder::from_mmaped_safetensors(&[safetensors], DType::F32, device)? });
    }
    let pickle = model_dir.join("pytorch_model.bin");
    if pickle.exists() {
        let weights = candle_core::pickle::read_all(&pickle)?;
        let weights_map: HashMap<String, Tensor> = weights.into_iter().collect();
        return Ok(VarBuilder::from_tensors(weights_map, DType::F32, device));
    }
    Err(Error::Configuration(format!("no model weights under {}", model_dir.display())).into())
}

impl Embedder for SentenceEmbedder {
    fn dim(&self) -> usize { self.dim }
    fn max_len(&self) -> usize { self.max_len }
    fn device(&self) -> &str { &self.device_label }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() { return Ok(Vec::new()); }
        let start = Instant::now();
        let batch = tokenize_batch(&self.tokenizer, texts, self.max_len, &self.device)?;
        let hidden = self.model.forward(&batch.input_ids, &batch.token_type_ids, Some(&batch.attention_mask))?;
        let pooled = masked_mean_l2(&hidden, &batch.attention_mask)?;
        let out: Vec<Vec<f32>> = pooled.to_device(&Device::Cpu)?.to_dtype(DType::F32)?.to_vec2()?;
        debug!(batch = texts.len(), elapsed_ms = start.elapsed().as_millis() as u64, "embedded batch");
        Ok(out)
    }
}

/// Token-hashing embedder. Deterministic and dependency-free; vectors are
/// L2-normalized (the empty string maps to the zero vector).
pub struct HashEmbedder { dim: usize }

impl HashEmbedder {
    pub fn new(dim: usize) -> Self { Self { dim: dim.max(1) } }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        use std::hash::{Hash, Hasher};
        use twox_hash::XxHash64;
        let mut v = vec![0f32; self.dim];
        for (i, token) in text.split_whitespace().enumerate() {
            let mut hasher = XxHash64::with_seed(0);
            token.hash(&mut hasher);
            let h = hasher.finish();
            let idx = (h as usize) % self.dim;
            let val = (((h >> 32) as u32) as f32) / (u32::MAX as f32);
            v[idx] += val + (i as f32 % 3.0) * 0.01;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt().max(1e-6);
        for x in &mut v { *x /= norm; }
        v
    }
}

impl Embedder for HashEmbedder {
    fn dim(&self) -> usize { self.dim }
    fn max_len(&self) -> usize { usize::MAX }
    fn device(&self) -> &str { "cpu" }
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

/// Which weights an embedder was built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelSnapshot {
    FineTuned,
    Pretrained,
    Hashing,
}

pub struct LoadedEmbedder {
    pub embedder: Box<dyn Embedder>,
    pub snapshot: ModelSnapshot,
}

/// `<root>/fine_tuned` when preferred and present, else `<root>/pretrained`.
pub fn resolve_model_dir(root: &Path, use_fine_tuned: bool) -> Result<(PathBuf, ModelSnapshot)> {
    let fine_tuned = root.join("fine_tuned");
    if use_fine_tuned && fine_tuned.is_dir() { return Ok((fine_tuned, ModelSnapshot::FineTuned)); }
    let pretrained = root.join("pretrained");
    if pretrained.is_dir() { return Ok((pretrained, ModelSnapshot::Pretrained)); }
    Err(Error::Configuration(format!("no model found, expected {}", pretrained.display())).into())
}

/// Build the embedder described by `settings`. Slow for real models; see
/// the vector crate's background loader for a non-blocking wrapper.
pub fn load_embedder(settings: &ModelSettings) -> Result<LoadedEmbedder> {
    if settings.use_fake {
        info!(dim = settings.fake_dim, "using hashing embedder");
        return Ok(LoadedEmbedder { embedder: Box::new(HashEmbedder::new(settings.fake_dim)), snapshot: ModelSnapshot::Hashing });
    }
    let (dir, snapshot) = resolve_model_dir(&settings.dir, settings.use_fine_tuned)?;
    let device = select_device(settings.device)?;
    let embedder = SentenceEmbedder::load(&dir, device, settings.max_len)
        .with_context(|| format!("failed to load model from {}", dir.display()))?;
    Ok(LoadedEmbedder { embedder: Box::new(embedder), snapshot })
}
