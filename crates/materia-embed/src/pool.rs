use anyhow::{bail, Result};
use candle_core::{DType, Tensor};

/// Mean of the unmasked token states, L2-normalized per row.
///
/// `hidden` is `[B, T, H]`, `attention_mask` is `[B, T]` (any numeric dtype);
/// the result is `[B, H]`.
pub fn masked_mean_l2(hidden: &Tensor, attention_mask: &Tensor) -> Result<Tensor> {
    let (batch, _tokens, hidden_dim) = match hidden.dims() {
        &[b, t, h] => (b, t, h),
        dims => bail!("hidden states must be [B,T,H], got {:?}", dims),
    };

    let mask = attention_mask.to_device(hidden.device())?.to_dtype(hidden.dtype())?;
    let mask_3d = mask.unsqueeze(2)?;
    let mask_b = match mask_3d.broadcast_as(hidden.shape()) {
        Ok(m) => m,
        Err(_) => mask_3d.repeat((1, 1, hidden_dim))?,
    };
    let summed = (hidden * &mask_b)?.sum(1)?;
    // clamp so fully masked rows pool to zero instead of NaN
    let lengths = mask.sum_keepdim(1)?.maximum(1.0)?;
    let mean = summed.broadcast_div(&lengths)?;

    let eps = match hidden.dtype() { DType::F16 | DType::BF16 => 1e-6, _ => 1e-12 };
    let norm = (mean.sqr()?.sum_keepdim(1)?.sqrt()? + eps)?;
    let out = mean.broadcast_div(&norm)?;
    if out.dims() != &[batch, hidden_dim] {
        bail!("pooled shape {:?} != [{}, {}]", out.dims(), batch, hidden_dim);
    }
    Ok(out)
}
