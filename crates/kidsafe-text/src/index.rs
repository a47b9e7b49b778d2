use anyhow::Result;
use std::time::Instant;
use tantivy::collector::TopDocs;
use tantivy::query::QueryParser;
use tantivy::schema::{Field, Value};
use tantivy::{doc, Index, IndexReader, ReloadPolicy, TantivyDocument};
use tracing::info;

use kidsafe_core::types::{DocumentChunk, SearchHit};

use crate::tantivy_utils::{build_schema, parse_query_lenient, register_tokenizer};

/// BM25 index over chunk texts, held in RAM and written once.
pub struct Bm25Index {
	index: Index,
	reader: IndexReader,
	id_field: Field,
	text_field: Field,
	num_docs: u64,
}

impl Bm25Index {
	pub fn build<'a, I>(chunks: I) -> Result<Self>
	where
		I: IntoIterator<Item = &'a DocumentChunk>,
	{
		let start = Instant::now();
		let schema = build_schema();
		let index = Index::create_in_ram(schema.clone());
		register_tokenizer(&index);
		let id_field = schema.get_field("id")?;
		let text_field = schema.get_field("text")?;

		let mut index_writer = index.writer(50_000_000)?;
		for c in chunks {
			index_writer.add_document(doc!(id_field => c.id.clone(), text_field => c.content.clone()))?;
		}
		index_writer.commit()?;

		let reader = index.reader_builder().reload_policy(ReloadPolicy::Manual).try_into()?;
		let num_docs = reader.searcher().num_docs();
		info!("Built BM25 index: {} chunks in {:?}", num_docs, start.elapsed());
		Ok(Self { index, reader, id_field, text_field, num_docs })
	}

	pub fn num_docs(&self) -> u64 { self.num_docs }

	pub fn search(&self, query: &str, k: usize) -> Result<Vec<SearchHit>> {
		// tantivy sizes its heap from the limit, so never ask for more than exists.
		let k = k.min(usize::try_from(self.num_docs).unwrap_or(usize::MAX));
		if query.trim().is_empty() || k == 0 { return Ok(Vec::new()); }
		let searcher = self.reader.searcher();
		let qp = QueryParser::for_index(&self.index, vec![self.text_field]);
		let q = parse_query_lenient(&qp, query);
		let top_docs = searcher.search(&q, &TopDocs::with_limit(k))?;
		let mut hits = Vec::with_capacity(top_docs.len());
		for (score, addr) in top_docs {
			let doc: TantivyDocument = searcher.doc(addr)?;
			if let Some(id) = doc.get_first(self.id_field).and_then(|v| v.as_str()) {
				hits.push(SearchHit { id: id.to_string(), score });
			}
		}
		Ok(hits)
	}
}
