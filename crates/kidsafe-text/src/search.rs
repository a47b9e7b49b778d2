use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use kidsafe_core::traits::Retriever;
use kidsafe_core::types::{Corpus, ScoredChunk, StrategyKind};

use crate::index::Bm25Index;

/// Keyword strategy: BM25 top-k, scored by tantivy.
pub struct SparseRetriever {
	index: Arc<Bm25Index>,
	corpus: Arc<Corpus>,
}

impl SparseRetriever {
	pub fn new(corpus: Arc<Corpus>) -> Result<Self> {
		let index = Bm25Index::build(corpus.chunks().iter().map(|c| c.as_ref()))?;
		Ok(Self { index: Arc::new(index), corpus })
	}

	pub fn from_index(index: Arc<Bm25Index>, corpus: Arc<Corpus>) -> Self { Self { index, corpus } }
}

#[async_trait]
impl Retriever for SparseRetriever {
	fn kind(&self) -> StrategyKind { StrategyKind::Sparse }

	async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<ScoredChunk>> {
		let hits = self.index.search(query, k)?;
		debug!("sparse: {} hits for {:?}", hits.len(), query);
		Ok(self.corpus.resolve(hits))
	}
}
