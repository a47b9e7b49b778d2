//! BGE-M3 (XLM-RoBERTa) embeddings computed locally through candle.
//!
//! Every batch runs on tokio's blocking pool.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::xlm_roberta::{Config as XLMRobertaConfig, XLMRobertaModel};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokenizers::Tokenizer;
use tracing::{debug, info};

use kidsafe_core::error::Error;
use kidsafe_core::traits::Embedder;

use crate::encode::{encode_batch, masked_mean_l2};

pub const BGE_M3_DIM: usize = 1024;
const MAX_LEN: usize = 256;

struct BgeM3 {
    model: XLMRobertaModel,
    tokenizer: Tokenizer,
    device: Device,
}

impl BgeM3 {
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let start = Instant::now();
        let batch = encode_batch(&self.tokenizer, texts, MAX_LEN, &self.device)?;
        let hidden = self.model.forward(&batch.input_ids, &batch.attention_mask, &batch.token_type_ids, None, None, None)?;
        let pooled = masked_mean_l2(&hidden, &batch.attention_mask)?;
        let vectors: Vec<Vec<f32>> = pooled.to_device(&Device::Cpu)?.to_vec2()?;
        if let Some(bad) = vectors.iter().find(|v| v.len() != BGE_M3_DIM) {
            return Err(anyhow!("expected {} dims, model produced {}", BGE_M3_DIM, bad.len()));
        }
        debug!("Embedded {} texts in {:?}", texts.len(), start.elapsed());
        Ok(vectors)
    }
}

pub struct LocalEmbedder {
    inner: Arc<BgeM3>,
    id: String,
}

impl LocalEmbedder {
    pub fn load(model_dir: Option<&str>) -> Result<Self> {
        let device = embedding_device();
        let model_dir = resolve_model_dir(model_dir)?;
        info!("Loading BGE-M3 model from {}", model_dir.display());
        let tokenizer_path = model_dir.join("tokenizer.json");
        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow!("Failed to load tokenizer from {}: {}", tokenizer_path.display(), e))?;
        let config_path = model_dir.join("config.json");
        let config: XLMRobertaConfig = serde_json::from_str(&std::fs::read_to_string(&config_path).with_context(|| format!("Failed to read {}", config_path.display()))?)?;
        let weights_path = model_dir.join("pytorch_model.bin");
        let weights = candle_core::pickle::read_all(&weights_path).with_context(|| format!("Failed to read weights {}", weights_path.display()))?;
        let weights_map: std::collections::HashMap<String, Tensor> = weights.into_iter().collect();
        let vb = VarBuilder::from_tensors(weights_map, DType::F32, &device);
        let model = XLMRobertaModel::new(&config, vb)?;
        info!("BGE-M3 model loaded");
        Ok(Self { inner: Arc::new(BgeM3 { model, tokenizer, device }), id: format!("local:bge-m3:d{BGE_M3_DIM}") })
    }
}

#[async_trait]
impl Embedder for LocalEmbedder {
    fn embedder_id(&self) -> &str { &self.id }
    fn dim(&self) -> usize { BGE_M3_DIM }
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() { return Ok(Vec::new()); }
        let inner = Arc::clone(&self.inner);
        let texts = texts.to_vec();
        off_runtime(move || inner.embed(&texts)).await
    }
}

/// Run blocking work on the blocking pool and await its result.
pub(crate) fn off_runtime<T, F>(work: F) -> impl Future<Output = Result<T>>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    let handle = tokio::task::spawn_blocking(work);
    async move { handle.await.map_err(|e| Error::Operation(format!("embedding task failed: {e}")))? }
}

fn resolve_model_dir(configured: Option<&str>) -> Result<PathBuf> {
    if let Some(dir) = configured {
        let p = kidsafe_core::config::expand_path(dir);
        if p.exists() { return Ok(p); }
        return Err(anyhow!("Configured model dir {} does not exist", p.display()));
    }
    for var in ["APP_MODEL_DIR", "MODEL_DIR"] {
        if let Ok(dir) = std::env::var(var) { let p = PathBuf::from(&dir); if p.exists() { debug!("Using {}: {}", var, p.display()); return Ok(p); } }
    }
    for candidate in ["../models/bge-m3", "models/bge-m3"] {
        let p = Path::new(candidate); if p.exists() { return Ok(p.to_path_buf()); }
    }
    Err(anyhow!("Could not locate BGE-M3 model directory"))
}

fn embedding_device() -> Device {
    #[cfg(feature = "metal")]
    {
        if let Ok(dev) = Device::new_metal(0) { info!("Embedding device: Metal (MPS)"); return dev; }
    }
    info!("Embedding device: CPU");
    Device::Cpu
}
