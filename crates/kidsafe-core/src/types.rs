//! Domain types used by every retrieval strategy.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::Error;

pub type ChunkId = String;

/// One page of the source document as extracted at load time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcePage {
    pub source: String,
    pub page: u32,
    pub text: String,
}

/// A chunk of the source document that is independently retrievable.
///
/// - `id`: unique within a corpus (`<doc>:<chunk_index>` for base chunks)
/// - `source`/`page`: where the text came from (pages are 1-based)
/// - `offset`: byte offset of `content` inside the page text
/// - `chunk_index`: position in build order
/// - `parent_id`: set on child chunks of a parent/child hierarchy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub id: ChunkId,
    pub source: String,
    pub page: u32,
    pub offset: usize,
    pub chunk_index: usize,
    pub parent_id: Option<ChunkId>,
    pub content: String,
}

/// A chunk plus the relevance score one strategy assigned to it.
///
/// Scores are strategy-specific but higher is always better.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredChunk {
    pub chunk: Arc<DocumentChunk>,
    pub score: f32,
}

impl ScoredChunk {
    pub fn new(chunk: Arc<DocumentChunk>, score: f32) -> Self { Self { chunk, score } }
    pub fn id(&self) -> &str { &self.chunk.id }
    pub fn content(&self) -> &str { &self.chunk.content }
}

/// The minimal surface returned by index backends: an id plus a score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: ChunkId,
    pub score: f32,
}

/// Pages and chunks produced by one index build. Read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct Corpus {
    pages: Vec<SourcePage>,
    chunks: Vec<Arc<DocumentChunk>>,
    by_id: HashMap<ChunkId, usize>,
}

impl Corpus {
    pub fn new(pages: Vec<SourcePage>, chunks: Vec<DocumentChunk>) -> Self {
        let chunks: Vec<Arc<DocumentChunk>> = chunks.into_iter().map(Arc::new).collect();
        let by_id = chunks.iter().enumerate().map(|(i, c)| (c.id.clone(), i)).collect();
        Self { pages, chunks, by_id }
    }

    pub fn pages(&self) -> &[SourcePage] { &self.pages }

    /// Chunks in build order.
    pub fn chunks(&self) -> &[Arc<DocumentChunk>] { &self.chunks }

    pub fn get(&self, id: &str) -> Option<&Arc<DocumentChunk>> { self.by_id.get(id).map(|&i| &self.chunks[i]) }

    pub fn len(&self) -> usize { self.chunks.len() }

    pub fn is_empty(&self) -> bool { self.chunks.is_empty() }

    /// Resolve index hits against this corpus, dropping ids it does not know.
    pub fn resolve(&self, hits: Vec<SearchHit>) -> Vec<ScoredChunk> {
        hits.into_iter()
            .filter_map(|h| self.get(&h.id).map(|c| ScoredChunk::new(Arc::clone(c), h.score)))
            .collect()
    }
}

/// The retrieval strategies this workspace knows how to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    #[serde(alias = "naive", alias = "vector")]
    Dense,
    #[serde(alias = "bm25", alias = "keyword")]
    Sparse,
    MultiQuery,
    ParentChild,
    Compression,
    Ensemble,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 6] = [
        StrategyKind::Dense,
        StrategyKind::Sparse,
        StrategyKind::MultiQuery,
        StrategyKind::ParentChild,
        StrategyKind::Compression,
        StrategyKind::Ensemble,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            StrategyKind::Dense => "dense",
            StrategyKind::Sparse => "sparse",
            StrategyKind::MultiQuery => "multi_query",
            StrategyKind::ParentChild => "parent_child",
            StrategyKind::Compression => "compression",
            StrategyKind::Ensemble => "ensemble",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for StrategyKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "dense" | "naive" | "vector" => Ok(StrategyKind::Dense),
            "sparse" | "bm25" | "keyword" => Ok(StrategyKind::Sparse),
            "multi_query" | "multiquery" => Ok(StrategyKind::MultiQuery),
            "parent_child" | "parent" => Ok(StrategyKind::ParentChild),
            "compression" | "rerank" => Ok(StrategyKind::Compression),
            "ensemble" => Ok(StrategyKind::Ensemble),
            other => Err(Error::InvalidConfig(format!("unknown retrieval strategy '{other}'"))),
        }
    }
}

/// Outcome of building an optional component.
///
/// `Unavailable` is a value rather than an error: a missing optional
/// credential degrades the pipeline instead of failing it.
#[derive(Debug)]
pub enum Availability<T> {
    Available(T),
    Unavailable { reason: String },
}

impl<T> Availability<T> {
    pub fn unavailable(reason: impl Into<String>) -> Self { Availability::Unavailable { reason: reason.into() } }

    pub fn is_available(&self) -> bool { matches!(self, Availability::Available(_)) }

    pub fn into_option(self) -> Option<T> {
        match self {
            Availability::Available(v) => Some(v),
            Availability::Unavailable { .. } => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Availability<U> {
        match self {
            Availability::Available(v) => Availability::Available(f(v)),
            Availability::Unavailable { reason } => Availability::Unavailable { reason },
        }
    }
}
