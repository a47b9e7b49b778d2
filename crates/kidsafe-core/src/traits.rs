use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::types::{DocumentChunk, ScoredChunk, SearchHit, StrategyKind};

#[async_trait]
pub trait Embedder: Send + Sync {
    /// Stable identifier for the provider/model (e.g. `openai:text-embedding-3-small`).
    fn embedder_id(&self) -> &str;
    fn dim(&self) -> usize;
    /// Embeddings for a batch of texts, one L2-normalized vector per input.
    async fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;

    async fn embed_query(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        self.embed_batch(&[text.to_string()])
            .await?
            .pop()
            .ok_or_else(|| anyhow::anyhow!("embedder '{}' returned no vector for query", self.embedder_id()))
    }
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn insert(&self, chunks: &[Arc<DocumentChunk>], embeddings: &[Vec<f32>]) -> anyhow::Result<()>;
    async fn search_vec(&self, query_vec: &[f32], k: usize) -> anyhow::Result<Vec<SearchHit>>;
    async fn count(&self) -> anyhow::Result<usize>;
}

/// One retrieval strategy: a pure function from query to ranked chunks.
///
/// Every concrete strategy and the ensemble composer implement this, so
/// callers never need to know which one they hold.
#[async_trait]
pub trait Retriever: Send + Sync {
    fn kind(&self) -> StrategyKind;
    async fn retrieve(&self, query: &str, k: usize) -> anyhow::Result<Vec<ScoredChunk>>;
}

#[async_trait]
impl<R: Retriever + ?Sized> Retriever for Arc<R> {
    fn kind(&self) -> StrategyKind { (**self).kind() }
    async fn retrieve(&self, query: &str, k: usize) -> anyhow::Result<Vec<ScoredChunk>> { (**self).retrieve(query, k).await }
}

/// Second-pass relevance scoring of an over-fetched candidate set.
#[async_trait]
pub trait Reranker: Send + Sync {
    fn name(&self) -> &str;
    /// Returns at most `top_n` candidates, best first, scored by the reranker.
    async fn rerank(&self, query: &str, candidates: Vec<ScoredChunk>, top_n: usize) -> anyhow::Result<Vec<ScoredChunk>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self { Self { role: Role::System, content: content.into() } }
    pub fn user(content: impl Into<String>) -> Self { Self { role: Role::User, content: content.into() } }
    pub fn assistant(content: impl Into<String>) -> Self { Self { role: Role::Assistant, content: content.into() } }
}

#[async_trait]
pub trait ChatModel: Send + Sync {
    fn model(&self) -> &str;
    async fn complete(&self, messages: &[ChatMessage], temperature: f32) -> anyhow::Result<String>;
}
