use anyhow::{anyhow, Result};
use candle_core::{Device, Tensor};
use tokenizers::Tokenizer;

pub struct TokenBatch {
    pub input_ids: Tensor,
    pub attention_mask: Tensor,
    pub token_type_ids: Tensor,
}

/// Encode a batch, truncate to `max_len` and right-pad to the longest row.
pub fn tokenize_batch(tokenizer: &Tokenizer, texts: &[String], max_len: usize, device: &Device) -> Result<TokenBatch> {
    let inputs: Vec<&str> = texts.iter().map(String::as_str).collect();
    let encodings = tokenizer.encode_batch(inputs, true).map_err(|e| anyhow!("Tokenization failed: {}", e))?;
    let pad_id = tokenizer
        .get_padding()
        .map(|p| p.pad_id)
        .or_else(|| tokenizer.token_to_id("[PAD]"))
        .unwrap_or(0);
    let width = encodings.iter().map(|e| e.get_ids().len().min(max_len)).max().unwrap_or(0).max(1);

    let rows = encodings.len();
    let mut ids = Vec::with_capacity(rows * width);
    let mut mask = Vec::with_capacity(rows * width);
    let mut types = Vec::with_capacity(rows * width);
    for enc in &encodings {
        let n = enc.get_ids().len().min(width);
        ids.extend_from_slice(&enc.get_ids()[..n]);
        mask.extend_from_slice(&enc.get_attention_mask()[..n]);
        types.extend_from_slice(&enc.get_type_ids()[..n]);
        let pad = width - n;
        ids.extend(std::iter::repeat(pad_id).take(pad));
        mask.extend(std::iter::repeat(0u32).take(pad));
        types.extend(std::iter::repeat(0u32).take(pad));
    }

    Ok(TokenBatch {
        input_ids: Tensor::from_vec(ids, (rows, width), device)?,
        attention_mask: Tensor::from_vec(mask, (rows, width), device)?,
        token_type_ids: Tensor::from_vec(types, (rows, width), device)?,
    })
}
