use anyhow::Result;
use async_trait::async_trait;
use std::hash::{Hash, Hasher};
use twox_hash::XxHash64;

use kidsafe_core::traits::Embedder;

/// Deterministic bag-of-words hashing embedder for tests and offline runs.
///
/// Texts sharing words land near each other, which is enough for the dense
/// strategies to rank lexically similar chunks first.
pub struct FakeEmbedder {
    dim: usize,
    id: String,
}

impl FakeEmbedder {
    pub fn new(dim: usize) -> Self {
        let dim = dim.max(1);
        Self { dim, id: format!("fake:d{dim}") }
    }

    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0f32; self.dim];
        for token in text.split_whitespace() {
            let token = token.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase();
            if token.is_empty() { continue; }
            let mut hasher = XxHash64::with_seed(0);
            token.hash(&mut hasher);
            let h = hasher.finish();
            let idx = (h as usize) % self.dim;
            v[idx] += 0.5 + (((h >> 32) as u32) as f32) / (u32::MAX as f32);
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 { for x in &mut v { *x /= norm; } } else { v[0] = 1.0; }
        v
    }
}

#[async_trait]
impl Embedder for FakeEmbedder {
    fn embedder_id(&self) -> &str { &self.id }
    fn dim(&self) -> usize { self.dim }
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cosine(a: &[f32], b: &[f32]) -> f32 { a.iter().zip(b).map(|(x, y)| x * y).sum() }

    #[test]
    fn case_and_punctuation_do_not_matter() {
        let e = FakeEmbedder::new(64);
        assert_eq!(e.embed_text("Red 40, sugar."), e.embed_text("red 40 SUGAR"));
    }

    #[test]
    fn shared_words_are_closer() {
        let e = FakeEmbedder::new(256);
        let q = e.embed_text("artificial colors red 40");
        let near = e.embed_text("red 40 is one of the artificial colors");
        let far = e.embed_text("whole grain oats provide fiber");
        assert!(cosine(&q, &near) > cosine(&q, &far));
    }

    #[test]
    fn empty_text_still_has_unit_norm() {
        let v = FakeEmbedder::new(8).embed_text("  ");
        assert!((v.iter().map(|x| x * x).sum::<f32>().sqrt() - 1.0).abs() < 1e-6);
    }
}
