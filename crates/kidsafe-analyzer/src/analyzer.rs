use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

use kidsafe_core::error::Error;
use kidsafe_core::traits::{ChatMessage, ChatModel, Retriever};
use kidsafe_core::types::{ScoredChunk, StrategyKind};

use crate::prompt::{analysis_prompt, follow_up_prompt, format_context, retrieval_question};
use crate::verdict::{extract_verdict, Verdict};

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub product: String,
    pub ingredients: String,
    pub strategy: StrategyKind,
    pub analysis: String,
    pub verdict: Verdict,
    pub sources: Vec<ScoredChunk>,
}

/// A question about a product that was already analyzed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FollowUp {
    pub product: String,
    pub ingredients: String,
    pub previous_analysis: String,
    #[serde(default)]
    pub history: Vec<ChatMessage>,
    pub question: String,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnalyzerOptions {
    pub k: usize,
    pub analysis_temperature: f32,
    pub chat_temperature: f32,
}

impl Default for AnalyzerOptions {
    fn default() -> Self { Self { k: 5, analysis_temperature: 0.3, chat_temperature: 0.7 } }
}

/// Retrieve once, generate once.
pub struct IngredientAnalyzer {
    retriever: Arc<dyn Retriever>,
    chat: Arc<dyn ChatModel>,
    options: AnalyzerOptions,
}

impl IngredientAnalyzer {
    pub fn new(retriever: Arc<dyn Retriever>, chat: Arc<dyn ChatModel>, options: AnalyzerOptions) -> Self {
        Self { retriever, chat, options }
    }

    pub fn strategy(&self) -> StrategyKind { self.retriever.kind() }

    pub async fn analyze(&self, product: &str, ingredients: &str) -> Result<AnalysisReport> {
        let (product, ingredients) = (product.trim(), ingredients.trim());
        if product.is_empty() || ingredients.is_empty() {
            return Err(Error::InvalidInput("product name and ingredients are required".into()).into());
        }
        let start = Instant::now();
        let strategy = self.strategy();
        info!("Analyzing {} with {} retrieval", product, strategy);

        let question = retrieval_question(ingredients);
        let sources = self.retriever.retrieve(&question, self.options.k).await.with_context(|| format!("{strategy} retrieval failed"))?;
        if sources.is_empty() {
            return Err(Error::NotFound(format!("no supporting context retrieved for {product}")).into());
        }
        debug!("Retrieved {} sources", sources.len());

        let prompt = analysis_prompt(product, ingredients, &question, &format_context(&sources));
        let analysis = self.chat.complete(&[ChatMessage::user(prompt)], self.options.analysis_temperature).await.context("analysis generation failed")?;
        let verdict = extract_verdict(&analysis);
        info!("{} -> {} in {:?}", product, verdict, start.elapsed());

        Ok(AnalysisReport { product: product.to_string(), ingredients: ingredients.to_string(), strategy, analysis, verdict, sources })
    }

    pub async fn follow_up(&self, req: &FollowUp) -> Result<String> {
        if req.question.trim().is_empty() {
            return Err(Error::InvalidInput("question is required".into()).into());
        }
        info!("Follow-up question for {}", req.product);
        let prompt = follow_up_prompt(&req.product, &req.ingredients, &req.previous_analysis, &req.history, req.question.trim());
        self.chat.complete(&[ChatMessage::user(prompt)], self.options.chat_temperature).await.context("follow-up generation failed")
    }
}
