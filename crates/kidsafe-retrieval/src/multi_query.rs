//! Query expansion: a chat model rewrites the query, each rewrite is run
//! against a base strategy, and the results are unioned.

use anyhow::Result;
use async_trait::async_trait;
use futures::future::try_join_all;
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

use kidsafe_core::traits::{ChatMessage, ChatModel, Retriever};
use kidsafe_core::types::{ScoredChunk, StrategyKind};
use std::sync::Arc;

pub struct MultiQueryRetriever {
    chat: Arc<dyn ChatModel>,
    base: Arc<dyn Retriever>,
    variants: usize,
    include_original: bool,
    temperature: f32,
}

impl MultiQueryRetriever {
    pub fn new(chat: Arc<dyn ChatModel>, base: Arc<dyn Retriever>, variants: usize) -> Self {
        Self { chat, base, variants: variants.max(1), include_original: false, temperature: 0.0 }
    }

    pub fn include_original(mut self, yes: bool) -> Self { self.include_original = yes; self }

    pub fn temperature(mut self, temperature: f32) -> Self { self.temperature = temperature; self }

    /// The queries that will actually be run for `query`.
    pub async fn expand(&self, query: &str) -> Result<Vec<String>> {
        let prompt = rewrite_prompt(query, self.variants);
        let text = self.chat.complete(&[ChatMessage::user(prompt)], self.temperature).await?;
        let mut queries = parse_rewrites(&text, self.variants);
        if self.include_original && !queries.iter().any(|q| q == query.trim()) {
            queries.insert(0, query.trim().to_string());
        }
        if queries.is_empty() {
            warn!("No usable rewrites from {}; falling back to the original query", self.chat.model());
            queries.push(query.trim().to_string());
        }
        debug!("multi_query expanded into {:?}", queries);
        Ok(queries)
    }
}

fn rewrite_prompt(query: &str, n: usize) -> String {
    format!(
        "Generate {n} different versions of the following question to retrieve relevant passages \
         from a food labeling guideline. Vary the wording and perspective so that together they \
         overcome the limits of similarity search. Write one question per line with no numbering.\n\
         Original question: {query}"
    )
}

/// One rewrite per non-empty line, numbering and bullets stripped, duplicates
/// dropped, at most `n`.
pub fn parse_rewrites(text: &str, n: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    text.lines()
        .map(strip_marker)
        .filter(|l| !l.is_empty())
        .filter(|l| seen.insert(l.to_lowercase()))
        .map(str::to_string)
        .take(n)
        .collect()
}

fn strip_marker(line: &str) -> &str {
    let line = line.trim();
    let line = line.trim_start_matches(['-', '*', '•']).trim_start();
    let digits = line.chars().take_while(char::is_ascii_digit).count();
    match line[digits..].strip_prefix(['.', ')', ':']) {
        Some(rest) if digits > 0 => rest.trim(),
        _ => line,
    }
}

/// Union of ranked lists by chunk id: ordered by best rank across lists, ties
/// by first appearance; each chunk keeps its highest score.
pub fn union_by_best_rank(lists: Vec<Vec<ScoredChunk>>, k: usize) -> Vec<ScoredChunk> {
    // (chunk, best rank, first-seen position)
    let mut merged: Vec<(ScoredChunk, usize, usize)> = Vec::new();
    let mut slot: HashMap<String, usize> = HashMap::new();
    for list in lists {
        for (rank, hit) in list.into_iter().enumerate() {
            match slot.get(hit.id()) {
                Some(&i) => {
                    let entry = &mut merged[i];
                    entry.1 = entry.1.min(rank);
                    if hit.score > entry.0.score { entry.0.score = hit.score; }
                }
                None => {
                    slot.insert(hit.id().to_string(), merged.len());
                    let seen = merged.len();
                    merged.push((hit, rank, seen));
                }
            }
        }
    }
    merged.sort_by_key(|(_, rank, seen)| (*rank, *seen));
    merged.into_iter().take(k).map(|(hit, _, _)| hit).collect()
}

#[async_trait]
impl Retriever for MultiQueryRetriever {
    fn kind(&self) -> StrategyKind { StrategyKind::MultiQuery }

    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<ScoredChunk>> {
        let queries = self.expand(query).await?;
        let lists = try_join_all(queries.iter().map(|q| self.base.retrieve(q, k))).await?;
        Ok(union_by_best_rank(lists, k))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rewrites_lose_numbering_bullets_and_duplicates() {
        let text = "1. Is Red 40 safe for kids?\n\n2) What are the risks of artificial dyes?\n- is red 40 safe for kids?\n* How do food colorings affect children?\n3: extra line";
        let got = parse_rewrites(text, 3);
        assert_eq!(got, vec![
            "Is Red 40 safe for kids?".to_string(),
            "What are the risks of artificial dyes?".to_string(),
            "How do food colorings affect children?".to_string(),
        ]);
    }

    fn hits(list: &[(&str, f32)]) -> Vec<ScoredChunk> {
        list.iter()
            .map(|(id, score)| {
                let chunk = kidsafe_core::types::DocumentChunk { id: id.to_string(), source: "guide.pdf".into(), page: 1, offset: 0, chunk_index: 0, parent_id: None, content: id.to_string() };
                ScoredChunk::new(Arc::new(chunk), *score)
            })
            .collect()
    }

    fn ids_and_scores(v: &[ScoredChunk]) -> Vec<(String, f32)> { v.iter().map(|c| (c.id().to_string(), c.score)).collect() }

    #[test]
    fn union_orders_by_best_rank_then_first_appearance() {
        let a = hits(&[("oats", 0.9), ("sugar", 0.8), ("red40", 0.3)]);
        let b = hits(&[("red40", 0.95), ("bht", 0.5)]);
        let out = union_by_best_rank(vec![a, b], 10);
        // red40 is rank 2 in the first list but rank 0 in the second.
        assert_eq!(ids_and_scores(&out), vec![
            ("oats".to_string(), 0.9),
            ("red40".to_string(), 0.95),
            ("sugar".to_string(), 0.8),
            ("bht".to_string(), 0.5),
        ]);
    }

    #[test]
    fn union_keeps_best_score_and_truncates() {
        let a = hits(&[("oats", 0.9), ("sugar", 0.8)]);
        let b = hits(&[("bht", 0.7), ("salt", 0.6), ("whey", 0.5), ("oats", 0.2)]);
        let out = union_by_best_rank(vec![a, b], 3);
        assert_eq!(ids_and_scores(&out), vec![("oats".to_string(), 0.9), ("bht".to_string(), 0.7), ("sugar".to_string(), 0.8)]);
    }

    #[test]
    fn leading_number_without_marker_is_kept() {
        assert_eq!(strip_marker("40 grams of sugar"), "40 grams of sugar");
    }
}
