//! Hosted OpenAI embeddings (`POST /embeddings`).

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use kidsafe_core::http::JsonClient;
use kidsafe_core::traits::Embedder;

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

pub struct OpenAiEmbedder {
    client: JsonClient,
    model: String,
    dim: usize,
    batch_size: usize,
    id: String,
}

impl OpenAiEmbedder {
    pub fn new(base_url: &str, api_key: &str, model: &str, batch_size: usize, timeout: Duration) -> Result<Self> {
        let client = JsonClient::new(base_url, api_key, timeout)?;
        Ok(Self { client, model: model.to_string(), dim: model_dim(model), batch_size: batch_size.max(1), id: format!("openai:{model}") })
    }

    async fn embed_chunk(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let resp: EmbeddingResponse = self.client.post("embeddings", &EmbeddingRequest { model: &self.model, input: texts }).await?;
        let mut data = resp.data;
        if data.len() != texts.len() {
            return Err(anyhow!("embedding response has {} vectors for {} inputs", data.len(), texts.len()));
        }
        data.sort_by_key(|d| d.index);
        Ok(data.into_iter().map(|d| d.embedding).collect())
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn embedder_id(&self) -> &str { &self.id }
    fn dim(&self) -> usize { self.dim }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            debug!("Embedding batch of {} texts with {}", batch.len(), self.model);
            out.extend(self.embed_chunk(batch).await?);
        }
        Ok(out)
    }
}

/// Output width of the known OpenAI embedding models.
pub fn model_dim(model: &str) -> usize {
    match model {
        "text-embedding-3-large" => 3072,
        _ => 1536,
    }
}
