//! kidsafe-core
//!
//! Shared domain types, the error taxonomy, configuration, and the traits every
//! retrieval strategy, embedder, vector store, reranker and chat model plugs into.
//! The index build (document loading + chunking) lives in `data_processor`.

pub mod config;
pub mod data_processor;
pub mod error;
pub mod http;
pub mod logging;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
pub use types::{Availability, ChunkId, Corpus, DocumentChunk, ScoredChunk, SearchHit, SourcePage, StrategyKind};
