//! kidsafe-text
//!
//! Sparse keyword retrieval: an in-RAM tantivy BM25 index over chunk texts.
pub mod tantivy_utils;
pub mod index;
pub mod search;

pub use index::Bm25Index;
pub use search::SparseRetriever;
