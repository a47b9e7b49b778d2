//! Contextual compression: over-fetch from a base strategy, rerank down.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use kidsafe_core::error::Error;
use kidsafe_core::http::JsonClient;
use kidsafe_core::traits::{Reranker, Retriever};
use kidsafe_core::types::{Availability, ScoredChunk, StrategyKind};

pub struct CompressionRetriever {
    base: Arc<dyn Retriever>,
    reranker: Arc<dyn Reranker>,
    fetch_multiplier: usize,
}

impl CompressionRetriever {
    pub fn new(base: Arc<dyn Retriever>, reranker: Arc<dyn Reranker>, fetch_multiplier: usize) -> Self {
        Self { base, reranker, fetch_multiplier: fetch_multiplier.max(1) }
    }

    pub fn reranker_name(&self) -> &str { self.reranker.name() }
}

#[async_trait]
impl Retriever for CompressionRetriever {
    fn kind(&self) -> StrategyKind { StrategyKind::Compression }

    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<ScoredChunk>> {
        if k == 0 { return Ok(Vec::new()); }
        let candidates = self.base.retrieve(query, k.saturating_mul(self.fetch_multiplier)).await?;
        debug!("compression: reranking {} candidates with {}", candidates.len(), self.reranker.name());
        self.reranker.rerank(query, candidates, k).await
    }
}

#[derive(Serialize)]
struct RerankRequest<'a> {
    model: &'a str,
    query: &'a str,
    documents: Vec<&'a str>,
    top_n: usize,
}

#[derive(Deserialize)]
struct RerankResponse {
    results: Vec<RerankResult>,
}

#[derive(Deserialize)]
struct RerankResult {
    index: usize,
    relevance_score: f32,
}

/// Hosted Cohere rerank (`POST {base_url}/rerank`).
pub struct CohereReranker {
    client: JsonClient,
    model: String,
}

impl CohereReranker {
    /// `Unavailable` without a credential; the caller decides whether that is fatal.
    pub fn connect(base_url: &str, api_key: Option<&str>, model: &str, timeout: Duration) -> Result<Availability<Self>> {
        let Some(key) = api_key else {
            warn!("Cohere API key not configured; the Cohere reranker is unavailable");
            return Ok(Availability::unavailable("COHERE_API_KEY is not set"));
        };
        let client = JsonClient::new(base_url, key, timeout)?;
        Ok(Availability::Available(Self { client, model: model.to_string() }))
    }
}

#[async_trait]
impl Reranker for CohereReranker {
    fn name(&self) -> &str { &self.model }

    async fn rerank(&self, query: &str, candidates: Vec<ScoredChunk>, top_n: usize) -> Result<Vec<ScoredChunk>> {
        if candidates.is_empty() || top_n == 0 { return Ok(Vec::new()); }
        let body = RerankRequest { model: &self.model, query, documents: candidates.iter().map(|c| c.content()).collect(), top_n: top_n.min(candidates.len()) };
        let resp: RerankResponse = self.client.post("rerank", &body).await?;
        apply_rerank(&candidates, resp, top_n)
    }
}

/// Map rerank results back onto the candidates they index. Repeated indices
/// keep their first result; an index past the candidates is an error.
fn apply_rerank(candidates: &[ScoredChunk], resp: RerankResponse, top_n: usize) -> Result<Vec<ScoredChunk>> {
    let mut used = HashSet::new();
    let mut out = Vec::with_capacity(resp.results.len());
    for r in resp.results {
        let Some(candidate) = candidates.get(r.index) else {
            return Err(Error::Operation(format!("rerank result index {} out of range for {} documents", r.index, candidates.len())).into());
        };
        if used.insert(r.index) {
            out.push(ScoredChunk::new(Arc::clone(&candidate.chunk), r.relevance_score));
        }
    }
    out.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    out.truncate(top_n);
    Ok(out)
}

/// Deterministic local reranker: `0.7 × base score + 0.3 × query-term coverage`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LexicalReranker;

pub fn query_terms(query: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    query
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .filter(|w| !w.is_empty() && seen.insert(w.clone()))
        .collect()
}

#[async_trait]
impl Reranker for LexicalReranker {
    fn name(&self) -> &str { "lexical" }

    async fn rerank(&self, query: &str, candidates: Vec<ScoredChunk>, top_n: usize) -> Result<Vec<ScoredChunk>> {
        let terms = query_terms(query);
        let mut scored: Vec<ScoredChunk> = candidates
            .into_iter()
            .map(|c| {
                let content_lower = c.content().to_lowercase();
                let coverage = if terms.is_empty() { 0.0 } else { terms.iter().filter(|t| content_lower.contains(t.as_str())).count() as f32 / terms.len() as f32 };
                let score = c.score * 0.7 + coverage * 0.3;
                ScoredChunk::new(c.chunk, score)
            })
            .collect();
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_n);
        Ok(scored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kidsafe_core::types::DocumentChunk;

    fn sc(id: &str, content: &str, score: f32) -> ScoredChunk {
        ScoredChunk::new(Arc::new(DocumentChunk { id: id.into(), source: "s".into(), page: 1, offset: 0, chunk_index: 0, parent_id: None, content: content.into() }), score)
    }

    #[tokio::test]
    async fn lexical_rerank_rewards_term_coverage() {
        let candidates = vec![
            sc("a", "Whole grain oats provide fiber.", 0.60),
            sc("b", "BHT is a synthetic preservative.", 0.55),
            sc("c", "Vitamin D fortification.", 0.50),
        ];
        let out = LexicalReranker.rerank("BHT preservative", candidates, 2).await.unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].id(), "b");
        assert!((out[0].score - (0.55 * 0.7 + 0.3)).abs() < 1e-6);
        assert_eq!(out[1].id(), "a");
    }

    #[test]
    fn query_terms_are_normalized_and_unique() {
        assert_eq!(query_terms("Sugar, sugar (RED 40)!"), vec!["sugar", "red", "40"]);
    }

    fn response(json: &str) -> RerankResponse { serde_json::from_str(json).unwrap() }

    #[test]
    fn rerank_results_map_onto_candidates_by_index() {
        let candidates = vec![sc("a", "oats", 0.9), sc("b", "BHT", 0.8), sc("c", "Red 40", 0.7)];
        let resp = response(r#"{"id":"x","results":[{"index":2,"relevance_score":0.41},{"index":1,"relevance_score":0.93},{"index":2,"relevance_score":0.99}]}"#);
        let out = apply_rerank(&candidates, resp, 5).unwrap();
        let got: Vec<(&str, f32)> = out.iter().map(|c| (c.id(), c.score)).collect();
        assert_eq!(got, vec![("b", 0.93), ("c", 0.41)], "a repeated index keeps its first score");
    }

    #[test]
    fn rerank_results_are_cut_to_top_n() {
        let candidates = vec![sc("a", "oats", 0.9), sc("b", "BHT", 0.8), sc("c", "Red 40", 0.7)];
        let resp = response(r#"{"results":[{"index":0,"relevance_score":0.2},{"index":1,"relevance_score":0.6},{"index":2,"relevance_score":0.4}]}"#);
        let out = apply_rerank(&candidates, resp, 2).unwrap();
        assert_eq!(out.iter().map(|c| c.id()).collect::<Vec<_>>(), vec!["b", "c"]);
    }

    #[test]
    fn out_of_range_rerank_index_is_an_error() {
        let candidates = vec![sc("a", "oats", 0.9)];
        let resp = response(r#"{"results":[{"index":3,"relevance_score":0.5}]}"#);
        let err = apply_rerank(&candidates, resp, 1).unwrap_err();
        assert!(err.to_string().contains("out of range"));
    }

    #[test]
    fn cohere_without_key_is_unavailable() {
        let r = CohereReranker::connect("https://api.cohere.com/v2", None, "rerank-english-v3.0", Duration::from_secs(5)).unwrap();
        assert!(!r.is_available());
    }
}
