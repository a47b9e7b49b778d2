pub mod encode;
pub mod fake;
pub mod local;
pub mod openai;

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use kidsafe_core::config::{EmbeddingProvider, Settings};
use kidsafe_core::error::Error;
use kidsafe_core::traits::Embedder;

pub use fake::FakeEmbedder;
pub use local::LocalEmbedder;
pub use openai::OpenAiEmbedder;
pub use encode::masked_mean_l2;

/// `APP_USE_FAKE_EMBEDDINGS=1` forces the hashing embedder whatever the config says.
pub fn fake_embeddings_forced() -> bool {
    std::env::var("APP_USE_FAKE_EMBEDDINGS").ok().map(|v| v == "1" || v.eq_ignore_ascii_case("true")).unwrap_or(false)
}

pub fn get_default_embedder(settings: &Settings) -> Result<Arc<dyn Embedder>> {
    let emb = &settings.embeddings;
    if fake_embeddings_forced() || emb.provider == EmbeddingProvider::Fake {
        info!("Using FakeEmbedder (dim {})", emb.fake_dim);
        return Ok(Arc::new(FakeEmbedder::new(emb.fake_dim)));
    }
    match emb.provider {
        EmbeddingProvider::Local => Ok(Arc::new(LocalEmbedder::load(emb.model_dir.as_deref())?)),
        EmbeddingProvider::OpenAi => {
            let key = settings.credentials.openai().ok_or_else(|| Error::InvalidConfig("OPENAI_API_KEY is required for openai embeddings".into()))?;
            info!("Using OpenAI embeddings ({})", emb.model);
            let timeout = Duration::from_secs(settings.llm.request_timeout_secs);
            Ok(Arc::new(OpenAiEmbedder::new(&settings.llm.base_url, key, &emb.model, emb.batch_size, timeout)?))
        }
        EmbeddingProvider::Fake => Ok(Arc::new(FakeEmbedder::new(emb.fake_dim))),
    }
}
