use anyhow::{anyhow, Result};
use arrow_array::{Array, FixedSizeListArray, Float32Array, Int32Array, RecordBatch, RecordBatchIterator, StringArray};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{DistanceType, Table};
use std::sync::Arc;
use tracing::debug;

use kidsafe_core::traits::VectorStore;
use kidsafe_core::types::{DocumentChunk, SearchHit};

use crate::memory::check_batch;
use crate::schema::build_arrow_schema;
use crate::table::{open_db, reset_table};

/// Vector store persisted in a LanceDB table, searched by cosine distance.
pub struct LanceVectorStore {
	table: Table,
	dim: usize,
}

impl LanceVectorStore {
	/// Connect to `uri` and open `table_name` empty for a fresh build.
	pub async fn create(uri: &str, table_name: &str, dim: usize) -> Result<Self> {
		let conn = open_db(uri).await?;
		let table = reset_table(&conn, table_name, dim as i32).await?;
		Ok(Self { table, dim })
	}

	fn to_record_batch(&self, chunks: &[Arc<DocumentChunk>], embeddings: &[Vec<f32>]) -> Result<RecordBatch> {
		let vectors: Vec<Option<Vec<Option<f32>>>> = embeddings.iter().map(|v| Some(v.iter().map(|&x| Some(x)).collect())).collect();
		let record_batch = RecordBatch::try_new(build_arrow_schema(self.dim as i32), vec![
			Arc::new(StringArray::from(chunks.iter().map(|c| c.id.clone()).collect::<Vec<_>>())),
			Arc::new(StringArray::from(chunks.iter().map(|c| c.source.clone()).collect::<Vec<_>>())),
			Arc::new(Int32Array::from(chunks.iter().map(|c| c.page as i32).collect::<Vec<_>>())),
			Arc::new(Int32Array::from(chunks.iter().map(|c| c.chunk_index as i32).collect::<Vec<_>>())),
			Arc::new(StringArray::from(chunks.iter().map(|c| c.content.clone()).collect::<Vec<_>>())),
			Arc::new(FixedSizeListArray::from_iter_primitive::<arrow_array::types::Float32Type, _, _>(vectors.into_iter(), self.dim as i32)),
		])?;
		Ok(record_batch)
	}
}

#[async_trait]
impl VectorStore for LanceVectorStore {
	async fn insert(&self, chunks: &[Arc<DocumentChunk>], embeddings: &[Vec<f32>]) -> Result<()> {
		check_batch(self.dim, chunks, embeddings)?;
		if chunks.is_empty() { return Ok(()); }
		let record_batch = self.to_record_batch(chunks, embeddings)?;
		let schema = record_batch.schema();
		let reader = Box::new(RecordBatchIterator::new(vec![Ok(record_batch)].into_iter(), schema));
		self.table.add(reader).execute().await?;
		debug!("Inserted {} rows into LanceDB", chunks.len());
		Ok(())
	}

	async fn search_vec(&self, query_vec: &[f32], k: usize) -> Result<Vec<SearchHit>> {
		if k == 0 { return Ok(Vec::new()); }
		let mut stream = self.table.vector_search(query_vec.to_vec())?.distance_type(DistanceType::Cosine).limit(k).execute().await?;
		let mut hits = Vec::new();
		while let Some(batch) = stream.try_next().await? {
			let ids = batch.column_by_name("id").and_then(|c| c.as_any().downcast_ref::<StringArray>()).ok_or_else(|| anyhow!("LanceDB result is missing the id column"))?;
			let distances = batch.column_by_name("_distance").and_then(|c| c.as_any().downcast_ref::<Float32Array>());
			for i in 0..batch.num_rows() {
				// Cosine distance is 1 - similarity.
				let score = distances.filter(|d| d.is_valid(i)).map_or(0.0, |d| 1.0 - d.value(i));
				hits.push(SearchHit { id: ids.value(i).to_string(), score });
			}
		}
		hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
		hits.truncate(k);
		Ok(hits)
	}

	async fn count(&self) -> Result<usize> { Ok(self.table.count_rows(None).await?) }
}
