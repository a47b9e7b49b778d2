//! One-shot embedding of a chunk set into a vector store.
use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use kidsafe_core::config::{VectorBackend, VectorSettings};
use kidsafe_core::traits::{Embedder, VectorStore};
use kidsafe_core::types::DocumentChunk;

use crate::lance::LanceVectorStore;
use crate::memory::MemoryVectorStore;

/// Embed `chunks` in batches of `batch_size` and insert them into `store`.
/// Returns the number of rows written.
pub async fn embed_into(store: &dyn VectorStore, embedder: &dyn Embedder, chunks: &[Arc<DocumentChunk>], batch_size: usize, show_progress: bool) -> Result<usize> {
	if chunks.is_empty() { warn!("No chunks to embed"); return Ok(0); }
	let start = Instant::now();
	let pb = if show_progress { ProgressBar::new(chunks.len() as u64) } else { ProgressBar::hidden() };
	match ProgressStyle::default_bar().template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} chunks ({percent}%) {msg}") {
		Ok(style) => pb.set_style(style.progress_chars("#>-")),
		Err(e) => warn!("Invalid progress template: {}", e),
	}
	let mut processed = 0usize;
	for batch in chunks.chunks(batch_size.max(1)) {
		let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();
		let embeddings = embedder.embed_batch(&texts).await?;
		store.insert(batch, &embeddings).await?;
		processed += batch.len();
		pb.set_position(processed as u64);
		pb.set_message(format!("{}", embedder.embedder_id()));
	}
	pb.finish_with_message("embedded");
	info!("Embedded {} chunks with {} in {:?}", processed, embedder.embedder_id(), start.elapsed());
	Ok(processed)
}

/// Open an empty store of the configured backend. `table` names the LanceDB
/// table; the in-memory backend ignores it.
pub async fn open_store(settings: &VectorSettings, table: &str, dim: usize) -> Result<Arc<dyn VectorStore>> {
	match settings.backend {
		VectorBackend::Memory => Ok(Arc::new(MemoryVectorStore::new(dim))),
		VectorBackend::LanceDb => {
			let uri = kidsafe_core::config::expand_path(&settings.uri);
			Ok(Arc::new(LanceVectorStore::create(&uri.to_string_lossy(), table, dim).await?))
		}
	}
}
