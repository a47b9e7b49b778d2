use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use kidsafe_core::traits::{Embedder, Retriever, VectorStore};
use kidsafe_core::types::{Corpus, ScoredChunk, StrategyKind};

use crate::index_build::embed_into;

/// Dense strategy: embed the query, cosine top-k over the store.
pub struct DenseRetriever {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    corpus: Arc<Corpus>,
}

impl DenseRetriever {
    /// Wrap a store that already holds embeddings for `corpus`.
    pub fn new(embedder: Arc<dyn Embedder>, store: Arc<dyn VectorStore>, corpus: Arc<Corpus>) -> Self {
        Self { embedder, store, corpus }
    }

    /// Embed every corpus chunk into `store`, then wrap it.
    pub async fn build(embedder: Arc<dyn Embedder>, store: Arc<dyn VectorStore>, corpus: Arc<Corpus>, batch_size: usize, show_progress: bool) -> Result<Self> {
        embed_into(store.as_ref(), embedder.as_ref(), corpus.chunks(), batch_size, show_progress).await?;
        Ok(Self::new(embedder, store, corpus))
    }

    pub fn corpus(&self) -> &Arc<Corpus> { &self.corpus }
}

#[async_trait]
impl Retriever for DenseRetriever {
    fn kind(&self) -> StrategyKind { StrategyKind::Dense }

    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<ScoredChunk>> {
        let k = k.min(self.corpus.len());
        if k == 0 { return Ok(Vec::new()); }
        let q_vec = self.embedder.embed_query(query).await?;
        let hits = self.store.search_vec(&q_vec, k).await?;
        debug!("dense: {} hits for {:?}", hits.len(), query);
        Ok(self.corpus.resolve(hits))
    }
}
