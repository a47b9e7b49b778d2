//! Builds strategies from [`Settings`] over one shared corpus.
//!
//! Indexes are built lazily, once, on first use: the dense store, the BM25
//! index, and the parent/child store. Every strategy handed out is wrapped in
//! the configured retry policy.

use anyhow::Result;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::OnceCell;
use tracing::{info, warn};

use kidsafe_core::config::{RerankerKind, Settings};
use kidsafe_core::data_processor::ChunkingConfig;
use kidsafe_core::error::Error;
use kidsafe_core::traits::{ChatModel, Embedder, Reranker, Retriever};
use kidsafe_core::types::{Availability, Corpus, ScoredChunk, StrategyKind};
use kidsafe_text::SparseRetriever;
use kidsafe_vector::{open_store, DenseRetriever};

use crate::compression::{CohereReranker, CompressionRetriever, LexicalReranker};
use crate::ensemble::{EnsembleConfig, EnsembleRetriever};
use crate::multi_query::MultiQueryRetriever;
use crate::parent_child::{HierarchyConfig, ParentChildRetriever};
use crate::retry::{RetryPolicy, Retrying};

pub struct RetrievalManager {
    settings: Settings,
    corpus: Arc<Corpus>,
    embedder: Arc<dyn Embedder>,
    chat: Option<Arc<dyn ChatModel>>,
    policy: RetryPolicy,
    show_progress: bool,
    dense: OnceCell<Arc<DenseRetriever>>,
    sparse: OnceCell<Arc<SparseRetriever>>,
    parent_child: OnceCell<Arc<ParentChildRetriever>>,
}

/// Outcome of one strategy in [`RetrievalManager::compare`].
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    Ok { elapsed_ms: u64, chunks: Vec<ScoredChunk> },
    Unavailable { reason: String },
    Failed { error: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct StrategyRun {
    pub kind: StrategyKind,
    #[serde(flatten)]
    pub outcome: RunOutcome,
}

impl RetrievalManager {
    pub fn new(settings: Settings, corpus: Arc<Corpus>, embedder: Arc<dyn Embedder>, chat: Option<Arc<dyn ChatModel>>) -> Self {
        let policy = RetryPolicy::from(&settings.retrieval.retry);
        Self { settings, corpus, embedder, chat, policy, show_progress: false, dense: OnceCell::new(), sparse: OnceCell::new(), parent_child: OnceCell::new() }
    }

    /// Use the configured embedding provider.
    pub fn from_settings(settings: Settings, corpus: Arc<Corpus>, chat: Option<Arc<dyn ChatModel>>) -> Result<Self> {
        let embedder = kidsafe_embed::get_default_embedder(&settings)?;
        Ok(Self::new(settings, corpus, embedder, chat))
    }

    /// Show an embedding progress bar while indexes build.
    pub fn with_progress(mut self, yes: bool) -> Self { self.show_progress = yes; self }

    pub fn corpus(&self) -> &Arc<Corpus> { &self.corpus }

    pub fn settings(&self) -> &Settings { &self.settings }

    /// The strategy selected by `retrieval.strategy`. An unavailable
    /// selection is a configuration error here.
    pub async fn active(&self) -> Result<Arc<dyn Retriever>> {
        let kind = self.settings.retrieval.strategy;
        match self.strategy(kind).await? {
            Availability::Available(r) => Ok(r),
            Availability::Unavailable { reason } => Err(Error::InvalidConfig(format!("selected strategy {kind} is unavailable: {reason}")).into()),
        }
    }

    pub async fn strategy(&self, kind: StrategyKind) -> Result<Availability<Arc<dyn Retriever>>> {
        match kind {
            StrategyKind::Ensemble => Ok(Availability::Available(Arc::new(self.ensemble().await?))),
            other => self.member(other).await,
        }
    }

    pub async fn ensemble(&self) -> Result<EnsembleRetriever> {
        let r = &self.settings.retrieval;
        let mut candidates = Vec::with_capacity(r.ensemble.len());
        for &kind in &r.ensemble {
            candidates.push((kind, self.member(kind).await?));
        }
        let timeout = (r.strategy_timeout_ms > 0).then(|| Duration::from_millis(r.strategy_timeout_ms));
        EnsembleRetriever::new(candidates, EnsembleConfig { weights: r.weights.clone(), rank_constant: r.rank_constant, timeout })
    }

    async fn member(&self, kind: StrategyKind) -> Result<Availability<Arc<dyn Retriever>>> {
        let built: Availability<Arc<dyn Retriever>> = match kind {
            StrategyKind::Dense => Availability::Available(self.dense().await?),
            StrategyKind::Sparse => Availability::Available(self.sparse().await?),
            StrategyKind::MultiQuery => match &self.chat {
                Some(chat) => {
                    let mq = &self.settings.retrieval.multi_query;
                    let retriever = MultiQueryRetriever::new(Arc::clone(chat), self.dense().await?, mq.variants)
                        .include_original(mq.include_original)
                        .temperature(mq.temperature);
                    Availability::Available(Arc::new(retriever))
                }
                None => {
                    warn!("No chat model configured; multi_query is unavailable");
                    Availability::unavailable("multi_query needs a chat model (OPENAI_API_KEY)")
                }
            },
            StrategyKind::ParentChild => Availability::Available(self.parent_child().await?),
            StrategyKind::Compression => match self.reranker()? {
                Availability::Available(reranker) => {
                    let fetch = self.settings.retrieval.compression.fetch_multiplier;
                    Availability::Available(Arc::new(CompressionRetriever::new(self.dense().await?, reranker, fetch)))
                }
                Availability::Unavailable { reason } => Availability::Unavailable { reason },
            },
            StrategyKind::Ensemble => {
                return Err(Error::InvalidConfig("an ensemble cannot contain another ensemble".into()).into());
            }
        };
        let policy = self.policy;
        Ok(built.map(|r| Arc::new(Retrying::new(r, policy)) as Arc<dyn Retriever>))
    }

    fn reranker(&self) -> Result<Availability<Arc<dyn Reranker>>> {
        let c = &self.settings.retrieval.compression;
        match c.reranker {
            RerankerKind::Lexical => Ok(Availability::Available(Arc::new(LexicalReranker))),
            RerankerKind::Cohere => {
                let timeout = Duration::from_secs(self.settings.llm.request_timeout_secs);
                let cohere = CohereReranker::connect(&c.base_url, self.settings.credentials.cohere(), &c.model, timeout)?;
                Ok(cohere.map(|r| Arc::new(r) as Arc<dyn Reranker>))
            }
        }
    }

    async fn dense(&self) -> Result<Arc<dyn Retriever>> {
        let dense = self
            .dense
            .get_or_try_init(|| async {
                let store = open_store(&self.settings.vector, &self.settings.vector.table, self.embedder.dim()).await?;
                let dense = DenseRetriever::build(Arc::clone(&self.embedder), store, Arc::clone(&self.corpus), self.settings.embeddings.batch_size, self.show_progress).await?;
                Ok::<_, anyhow::Error>(Arc::new(dense))
            })
            .await?;
        Ok(Arc::clone(dense) as Arc<dyn Retriever>)
    }

    async fn sparse(&self) -> Result<Arc<dyn Retriever>> {
        let sparse = self
            .sparse
            .get_or_try_init(|| async { Ok::<_, anyhow::Error>(Arc::new(SparseRetriever::new(Arc::clone(&self.corpus))?)) })
            .await?;
        Ok(Arc::clone(sparse) as Arc<dyn Retriever>)
    }

    async fn parent_child(&self) -> Result<Arc<dyn Retriever>> {
        let pc = self
            .parent_child
            .get_or_try_init(|| async {
                let p = &self.settings.retrieval.parent_child;
                let cfg = HierarchyConfig {
                    parent: ChunkingConfig::new(p.parent_chunk_size, p.parent_overlap)?,
                    child: ChunkingConfig::new(p.child_chunk_size, p.child_overlap)?,
                    fanout: p.fanout,
                };
                let table = format!("{}_children", self.settings.vector.table);
                let store = open_store(&self.settings.vector, &table, self.embedder.dim()).await?;
                let retriever = ParentChildRetriever::build(self.corpus.pages(), cfg, Arc::clone(&self.embedder), store, self.settings.embeddings.batch_size).await?;
                Ok::<_, anyhow::Error>(Arc::new(retriever))
            })
            .await?;
        Ok(Arc::clone(pc) as Arc<dyn Retriever>)
    }

    /// Run every strategy, then the ensemble, on `query`. Individual
    /// failures are reported rather than aborting the comparison.
    pub async fn compare(&self, query: &str, k: usize) -> Vec<StrategyRun> {
        let mut runs = Vec::with_capacity(StrategyKind::ALL.len());
        for kind in StrategyKind::ALL {
            let outcome = match self.strategy(kind).await {
                Ok(Availability::Available(r)) => {
                    let start = Instant::now();
                    match r.retrieve(query, k).await {
                        Ok(chunks) => RunOutcome::Ok { elapsed_ms: start.elapsed().as_millis() as u64, chunks },
                        Err(e) => RunOutcome::Failed { error: format!("{e:#}") },
                    }
                }
                Ok(Availability::Unavailable { reason }) => RunOutcome::Unavailable { reason },
                Err(e) => RunOutcome::Failed { error: format!("{e:#}") },
            };
            if let RunOutcome::Ok { chunks, elapsed_ms } = &outcome {
                info!("{}: {} chunks in {} ms", kind, chunks.len(), elapsed_ms);
            }
            runs.push(StrategyRun { kind, outcome });
        }
        runs
    }
}
