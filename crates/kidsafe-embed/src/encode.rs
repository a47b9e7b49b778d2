//! Batch encoding for the local XLM-R model: ragged token rows padded into
//! `[batch, width]` tensors, and token states pooled into sentence vectors.

use anyhow::{anyhow, bail, Context, Result};
use candle_core::{DType, Device, Tensor};
use tokenizers::Tokenizer;

/// XLM-RoBERTa padding token id.
pub const PAD_ID: u32 = 1;

pub struct EncodedBatch {
    pub input_ids: Tensor,
    pub attention_mask: Tensor,
    pub token_type_ids: Tensor,
}

/// Row-major ids and mask padded to the longest row, capped at `max_len`.
#[derive(Debug, PartialEq, Eq)]
pub struct PaddedRows {
    pub ids: Vec<u32>,
    pub mask: Vec<u32>,
    pub rows: usize,
    pub width: usize,
}

pub fn pad_rows(rows: &[(&[u32], &[u32])], max_len: usize) -> PaddedRows {
    let width = rows.iter().map(|(ids, _)| ids.len().min(max_len)).max().unwrap_or(0).max(1);
    let mut ids = Vec::with_capacity(rows.len() * width);
    let mut mask = Vec::with_capacity(rows.len() * width);
    for (row_ids, row_mask) in rows {
        let (start, n) = (ids.len(), row_ids.len().min(width));
        ids.extend_from_slice(&row_ids[..n]);
        mask.extend_from_slice(&row_mask[..n.min(row_mask.len())]);
        ids.resize(start + width, PAD_ID);
        mask.resize(start + width, 0);
    }
    PaddedRows { ids, mask, rows: rows.len(), width }
}

pub fn encode_batch(tokenizer: &Tokenizer, texts: &[String], max_len: usize, device: &Device) -> Result<EncodedBatch> {
    if texts.is_empty() { bail!("cannot encode an empty batch"); }
    let encodings = tokenizer.encode_batch(texts.to_vec(), true).map_err(|e| anyhow!("Tokenization failed: {e}"))?;
    let rows: Vec<(&[u32], &[u32])> = encodings.iter().map(|e| (e.get_ids(), e.get_attention_mask())).collect();
    let padded = pad_rows(&rows, max_len);
    let shape = (padded.rows, padded.width);
    Ok(EncodedBatch {
        input_ids: Tensor::from_vec(padded.ids, shape, device)?,
        attention_mask: Tensor::from_vec(padded.mask, shape, device)?,
        token_type_ids: Tensor::zeros(shape, DType::U32, device)?,
    })
}

/// Mean of the unmasked token states of each row, scaled to unit length.
///
/// `hidden` is `[batch, tokens, hidden]` and `attention_mask` is
/// `[batch, tokens]`. A row with no unmasked tokens pools to zeros.
pub fn masked_mean_l2(hidden: &Tensor, attention_mask: &Tensor) -> Result<Tensor> {
    let (batch, tokens, _) = hidden.dims3().context("hidden states must be [batch, tokens, hidden]")?;
    if attention_mask.dims() != [batch, tokens] {
        bail!("attention mask {:?} does not match hidden states {:?}", attention_mask.dims(), hidden.dims());
    }
    let mask = attention_mask.to_device(hidden.device())?.to_dtype(hidden.dtype())?;
    let summed = hidden.broadcast_mul(&mask.unsqueeze(2)?)?.sum(1)?;
    let counts = mask.sum_keepdim(1)?.maximum(1.0)?;
    let mean = summed.broadcast_div(&counts)?;
    let norms = mean.sqr()?.sum_keepdim(1)?.sqrt()?.maximum(1e-6)?;
    Ok(mean.broadcast_div(&norms)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ragged_rows_pad_to_the_longest() {
        let long = [0u32, 9, 8, 7, 2];
        let short = [0u32, 5, 2];
        let out = pad_rows(&[(&long, &[1; 5]), (&short, &[1; 3])], 16);
        assert_eq!(out.width, 5);
        assert_eq!(out.ids, vec![0, 9, 8, 7, 2, 0, 5, 2, PAD_ID, PAD_ID]);
        assert_eq!(out.mask, vec![1, 1, 1, 1, 1, 1, 1, 1, 0, 0]);
    }

    #[test]
    fn rows_longer_than_the_cap_are_truncated() {
        let ids: Vec<u32> = (0..10).collect();
        let out = pad_rows(&[(&ids, &[1; 10])], 4);
        assert_eq!((out.rows, out.width), (1, 4));
        assert_eq!(out.ids, vec![0, 1, 2, 3]);
    }
}
