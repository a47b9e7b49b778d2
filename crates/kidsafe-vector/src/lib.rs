//! kidsafe-vector
//!
//! Vector stores (in-memory cosine, LanceDB) and the dense retrieval strategy.
pub mod dense;
pub mod index_build;
pub mod lance;
pub mod memory;
pub mod schema;
pub mod table;

pub use dense::DenseRetriever;
pub use index_build::{embed_into, open_store};
pub use lance::LanceVectorStore;
pub use memory::MemoryVectorStore;
