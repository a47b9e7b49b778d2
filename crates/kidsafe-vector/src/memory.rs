use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

use kidsafe_core::error::Error;
use kidsafe_core::traits::VectorStore;
use kidsafe_core::types::{ChunkId, DocumentChunk, SearchHit};

/// Brute-force cosine store. Rows keep insertion order so equal scores rank
/// deterministically.
pub struct MemoryVectorStore {
    dim: usize,
    rows: RwLock<Vec<(ChunkId, Vec<f32>)>>,
}

impl MemoryVectorStore {
    pub fn new(dim: usize) -> Self { Self { dim, rows: RwLock::new(Vec::new()) } }
}

pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let (mut dot, mut na, mut nb) = (0f32, 0f32, 0f32);
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    if na == 0.0 || nb == 0.0 { return 0.0; }
    dot / (na.sqrt() * nb.sqrt())
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn insert(&self, chunks: &[Arc<DocumentChunk>], embeddings: &[Vec<f32>]) -> Result<()> {
        check_batch(self.dim, chunks, embeddings)?;
        let mut rows = self.rows.write().await;
        rows.extend(chunks.iter().map(|c| c.id.clone()).zip(embeddings.iter().cloned()));
        Ok(())
    }

    async fn search_vec(&self, query_vec: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        if query_vec.len() != self.dim {
            return Err(Error::Operation(format!("query vector has {} dims, store holds {}", query_vec.len(), self.dim)).into());
        }
        let rows = self.rows.read().await;
        let mut hits: Vec<SearchHit> = rows.iter().map(|(id, v)| SearchHit { id: id.clone(), score: cosine(query_vec, v) }).collect();
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(k);
        Ok(hits)
    }

    async fn count(&self) -> Result<usize> { Ok(self.rows.read().await.len()) }
}

pub(crate) fn check_batch(dim: usize, chunks: &[Arc<DocumentChunk>], embeddings: &[Vec<f32>]) -> Result<()> {
    if chunks.len() != embeddings.len() {
        return Err(Error::Operation(format!("{} chunks but {} embeddings", chunks.len(), embeddings.len())).into());
    }
    if let Some(bad) = embeddings.iter().find(|v| v.len() != dim) {
        return Err(Error::Operation(format!("embedding has {} dims, store expects {}", bad.len(), dim)).into());
    }
    Ok(())
}
