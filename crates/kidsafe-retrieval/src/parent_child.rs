//! Small-to-big retrieval: match small child chunks, return their parents.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

use kidsafe_core::data_processor::{doc_id, ChunkingConfig, DataProcessor};
use kidsafe_core::traits::{Embedder, Retriever, VectorStore};
use kidsafe_core::types::{Corpus, DocumentChunk, ScoredChunk, SourcePage, StrategyKind};
use kidsafe_vector::embed_into;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HierarchyConfig {
    pub parent: ChunkingConfig,
    pub child: ChunkingConfig,
    /// Children fetched per requested parent.
    pub fanout: usize,
}

impl Default for HierarchyConfig {
    fn default() -> Self {
        Self { parent: ChunkingConfig { chunk_size: 1000, chunk_overlap: 200 }, child: ChunkingConfig { chunk_size: 400, chunk_overlap: 50 }, fanout: 3 }
    }
}

/// Split pages into parents (`{doc}:parent:{i}`) and each parent into
/// children (`{parent}:child:{j}`) that record their parent id.
pub fn split_hierarchy(pages: &[SourcePage], cfg: &HierarchyConfig) -> (Vec<DocumentChunk>, Vec<DocumentChunk>) {
    let parent_splitter = DataProcessor::new(cfg.parent);
    let child_splitter = DataProcessor::new(cfg.child);
    let mut parents = Vec::new();
    let mut children = Vec::new();
    for page in pages {
        let doc = doc_id(&page.source);
        for (offset, content) in parent_splitter.split_with_offsets(&page.text) {
            let parent_id = format!("{doc}:parent:{}", parents.len());
            for (j, (child_offset, child_content)) in child_splitter.split_with_offsets(&content).into_iter().enumerate() {
                children.push(DocumentChunk {
                    id: format!("{parent_id}:child:{j}"),
                    source: page.source.clone(),
                    page: page.page,
                    offset: offset + child_offset,
                    chunk_index: children.len(),
                    parent_id: Some(parent_id.clone()),
                    content: child_content,
                });
            }
            parents.push(DocumentChunk { id: parent_id, source: page.source.clone(), page: page.page, offset, chunk_index: parents.len(), parent_id: None, content });
        }
    }
    (parents, children)
}

pub struct ParentChildRetriever {
    parents: Corpus,
    children: Corpus,
    embedder: Arc<dyn Embedder>,
    child_store: Arc<dyn VectorStore>,
    fanout: usize,
}

impl ParentChildRetriever {
    /// Split `pages`, embed the children into `child_store` and keep parents in memory.
    pub async fn build(pages: &[SourcePage], cfg: HierarchyConfig, embedder: Arc<dyn Embedder>, child_store: Arc<dyn VectorStore>, batch_size: usize) -> Result<Self> {
        let (parents, children) = split_hierarchy(pages, &cfg);
        let parents = Corpus::new(pages.to_vec(), parents);
        let children = Corpus::new(Vec::new(), children);
        embed_into(child_store.as_ref(), embedder.as_ref(), children.chunks(), batch_size, false).await?;
        info!("Parent/child index: {} parents, {} children", parents.len(), children.len());
        Ok(Self { parents, children, embedder, child_store, fanout: cfg.fanout.max(1) })
    }

    pub fn parents(&self) -> &Corpus { &self.parents }

    pub fn children(&self) -> &Corpus { &self.children }
}

#[async_trait]
impl Retriever for ParentChildRetriever {
    fn kind(&self) -> StrategyKind { StrategyKind::ParentChild }

    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<ScoredChunk>> {
        let k = k.min(self.parents.len());
        if k == 0 { return Ok(Vec::new()); }
        let q_vec = self.embedder.embed_query(query).await?;
        let fetch = k.saturating_mul(self.fanout).min(self.children.len());
        let child_hits = self.child_store.search_vec(&q_vec, fetch).await?;
        let mut seen = HashSet::new();
        let mut out = Vec::with_capacity(k);
        // Hits arrive best first, so the first child seen for a parent carries its best score.
        for hit in self.children.resolve(child_hits) {
            let Some(parent_id) = hit.chunk.parent_id.as_deref() else { continue };
            if !seen.insert(parent_id.to_string()) { continue; }
            if let Some(parent) = self.parents.get(parent_id) {
                out.push(ScoredChunk::new(Arc::clone(parent), hit.score));
            }
            if out.len() == k { break; }
        }
        debug!("parent_child: {} parents for {:?}", out.len(), query);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn children_point_at_their_parents() {
        let pages = vec![SourcePage { source: "data/guide.pdf".into(), page: 2, text: "word ".repeat(300) }];
        let cfg = HierarchyConfig {
            parent: ChunkingConfig::new(500, 100).unwrap(),
            child: ChunkingConfig::new(120, 20).unwrap(),
            fanout: 3,
        };
        let (parents, children) = split_hierarchy(&pages, &cfg);
        assert!(parents.len() > 1);
        assert!(children.len() > parents.len());
        assert_eq!(parents[0].id, "guide:parent:0");
        assert_eq!(children[0].id, "guide:parent:0:child:0");
        for child in &children {
            let parent_id = child.parent_id.as_deref().unwrap();
            let parent = parents.iter().find(|p| p.id == parent_id).unwrap();
            assert!(parent.content.contains(&child.content));
            assert!(child.content.chars().count() <= 120);
            assert_eq!(child.page, 2);
        }
    }
}
