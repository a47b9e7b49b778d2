//! kidsafe-retrieval
//!
//! Composite and model-assisted retrieval strategies on top of the dense and
//! sparse building blocks, plus rank fusion and the strategy factory.
pub mod compression;
pub mod ensemble;
pub mod fusion;
pub mod manager;
pub mod multi_query;
pub mod parent_child;
pub mod retry;

pub use compression::{CohereReranker, CompressionRetriever, LexicalReranker};
pub use ensemble::{EnsembleConfig, EnsembleRetriever, Member};
pub use fusion::weighted_rrf;
pub use manager::{RetrievalManager, RunOutcome, StrategyRun};
pub use multi_query::MultiQueryRetriever;
pub use parent_child::{HierarchyConfig, ParentChildRetriever};
pub use retry::{RetryPolicy, Retrying};
