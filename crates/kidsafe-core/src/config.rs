use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::Error;
use crate::types::StrategyKind;

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::from(Serialized::defaults(Settings::default())).merge(Toml::file("config.toml"));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        let config = Self { figment };
        config.validate_for_env(&env_name)?;
        Ok(config)
    }

    /// Build from an explicit figment (tests, embedding applications).
    pub fn from_figment(figment: Figment) -> Self {
        Self { figment: Figment::from(Serialized::defaults(Settings::default())).merge(figment) }
    }

    pub fn get<T>(&self, key: &str) -> anyhow::Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| anyhow::anyhow!("Failed to get '{}': {}", key, e))
    }

    /// Typed settings with credentials filled from the conventional env vars
    /// when the config sources did not set them.
    pub fn settings(&self) -> anyhow::Result<Settings> {
        let mut settings: Settings = self.figment.extract().map_err(|e| Error::InvalidConfig(e.to_string()))?;
        settings.credentials.fill_from_env();
        settings.validate()?;
        Ok(settings)
    }

    fn validate_for_env(&self, env: &str) -> anyhow::Result<()> {
        match env {
            "prod" | "production" => {
                // Fake embeddings make retrieval meaningless; refuse them outside dev/test.
                let provider: EmbeddingProvider = self.get("embeddings.provider")?;
                if provider == EmbeddingProvider::Fake {
                    return Err(Error::InvalidConfig("embeddings.provider = \"fake\" is not allowed in production".into()).into());
                }
            }
            "dev" | "development" | "test" | "testing" => {}
            _ => {}
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub source: SourceSettings,
    pub embeddings: EmbeddingSettings,
    pub vector: VectorSettings,
    pub retrieval: RetrievalSettings,
    pub llm: LlmSettings,
    pub credentials: Credentials,
}

impl Settings {
    pub fn validate(&self) -> anyhow::Result<()> {
        let s = &self.source;
        if s.chunk_size == 0 || s.chunk_overlap >= s.chunk_size {
            return Err(Error::InvalidConfig(format!("source.chunk_overlap ({}) must be smaller than a non-zero source.chunk_size ({})", s.chunk_overlap, s.chunk_size)).into());
        }
        if self.retrieval.k == 0 {
            return Err(Error::InvalidConfig("retrieval.k must be at least 1".into()).into());
        }
        if self.retrieval.retry.max_attempts == 0 {
            return Err(Error::InvalidConfig("retrieval.retry.max_attempts must be at least 1".into()).into());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceSettings {
    pub path: String,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self { path: "data/Food-Labeling-Guide.pdf".into(), chunk_size: 1000, chunk_overlap: 200 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// Deterministic hashing embedder; no model, no network.
    Fake,
    /// BGE-M3 loaded from local files through candle.
    Local,
    /// Hosted OpenAI embeddings endpoint.
    OpenAi,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub provider: EmbeddingProvider,
    pub model: String,
    pub batch_size: usize,
    pub model_dir: Option<String>,
    pub fake_dim: usize,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self { provider: EmbeddingProvider::OpenAi, model: "text-embedding-3-small".into(), batch_size: 64, model_dir: None, fake_dim: 256 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VectorBackend {
    Memory,
    LanceDb,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorSettings {
    pub backend: VectorBackend,
    pub uri: String,
    pub table: String,
}

impl Default for VectorSettings {
    fn default() -> Self {
        Self { backend: VectorBackend::Memory, uri: "data/indexes/lancedb".into(), table: "food_safety_knowledge".into() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    pub strategy: StrategyKind,
    pub k: usize,
    /// Ensemble composition in order; `compression` is dropped when unavailable.
    pub ensemble: Vec<StrategyKind>,
    pub weights: Option<Vec<f32>>,
    pub rank_constant: f32,
    /// Per-strategy timeout inside the ensemble; 0 disables it.
    pub strategy_timeout_ms: u64,
    pub multi_query: MultiQuerySettings,
    pub parent_child: ParentChildSettings,
    pub compression: CompressionSettings,
    pub retry: RetrySettings,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            strategy: StrategyKind::Ensemble,
            k: 5,
            ensemble: vec![StrategyKind::Dense, StrategyKind::Sparse, StrategyKind::Compression],
            weights: None,
            rank_constant: 0.0,
            strategy_timeout_ms: 10_000,
            multi_query: MultiQuerySettings::default(),
            parent_child: ParentChildSettings::default(),
            compression: CompressionSettings::default(),
            retry: RetrySettings::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MultiQuerySettings {
    pub variants: usize,
    pub include_original: bool,
    pub temperature: f32,
}

impl Default for MultiQuerySettings {
    fn default() -> Self { Self { variants: 3, include_original: false, temperature: 0.0 } }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ParentChildSettings {
    pub parent_chunk_size: usize,
    pub parent_overlap: usize,
    pub child_chunk_size: usize,
    pub child_overlap: usize,
    /// Children fetched per requested parent.
    pub fanout: usize,
}

impl Default for ParentChildSettings {
    fn default() -> Self { Self { parent_chunk_size: 1000, parent_overlap: 200, child_chunk_size: 400, child_overlap: 50, fanout: 3 } }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RerankerKind {
    Cohere,
    Lexical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionSettings {
    pub reranker: RerankerKind,
    pub model: String,
    pub base_url: String,
    /// Candidates over-fetched per requested result.
    pub fetch_multiplier: usize,
}

impl Default for CompressionSettings {
    fn default() -> Self {
        Self { reranker: RerankerKind::Cohere, model: "rerank-english-v3.0".into(), base_url: "https://api.cohere.com/v2".into(), fetch_multiplier: 2 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self { Self { max_attempts: 3, initial_backoff_ms: 200, max_backoff_ms: 2_000 } }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    pub base_url: String,
    pub chat_model: String,
    pub analysis_temperature: f32,
    pub chat_temperature: f32,
    pub request_timeout_secs: u64,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self { base_url: "https://api.openai.com/v1".into(), chat_model: "gpt-4o-mini".into(), analysis_temperature: 0.3, chat_temperature: 0.7, request_timeout_secs: 60 }
    }
}

#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Credentials {
    pub openai_api_key: Option<String>,
    pub cohere_api_key: Option<String>,
}

impl Credentials {
    fn fill_from_env(&mut self) {
        if usable_key(self.openai_api_key.as_deref()).is_none() { self.openai_api_key = env::var("OPENAI_API_KEY").ok(); }
        if usable_key(self.cohere_api_key.as_deref()).is_none() { self.cohere_api_key = env::var("COHERE_API_KEY").ok(); }
    }

    pub fn openai(&self) -> Option<&str> { usable_key(self.openai_api_key.as_deref()) }

    pub fn cohere(&self) -> Option<&str> { usable_key(self.cohere_api_key.as_deref()) }
}

/// Blank values and `.env` template placeholders count as "not configured".
fn usable_key(key: Option<&str>) -> Option<&str> {
    key.map(str::trim).filter(|k| !k.is_empty() && !(k.starts_with("your_") && k.ends_with("_here")))
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mask = |k: Option<&str>| if k.is_some() { "<set>" } else { "<unset>" };
        f.debug_struct("Credentials")
            .field("openai_api_key", &mask(self.openai()))
            .field("cohere_api_key", &mask(self.cohere()))
            .finish()
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
/// If `p` is absolute, it's returned as-is; otherwise `base.join(p)` is returned.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_mirror_the_reference_pipeline() {
        let s = Settings::default();
        assert_eq!(s.source.chunk_size, 1000);
        assert_eq!(s.source.chunk_overlap, 200);
        assert_eq!(s.retrieval.k, 5);
        assert_eq!(s.retrieval.strategy, StrategyKind::Ensemble);
        assert!(s.validate().is_ok());
    }

    #[test]
    fn toml_overrides_nested_sections() {
        let figment = Figment::new().merge(Toml::string(
            r#"
            [retrieval]
            strategy = "bm25"
            k = 7
            weights = [0.7, 0.3]

            [retrieval.compression]
            reranker = "lexical"
            "#,
        ));
        let settings = Config::from_figment(figment).settings().unwrap();
        assert_eq!(settings.retrieval.strategy, StrategyKind::Sparse);
        assert_eq!(settings.retrieval.k, 7);
        assert_eq!(settings.retrieval.weights, Some(vec![0.7, 0.3]));
        assert_eq!(settings.retrieval.compression.reranker, RerankerKind::Lexical);
        assert_eq!(settings.source.chunk_size, 1000, "untouched sections keep defaults");
    }

    #[test]
    fn bad_chunking_is_rejected() {
        let figment = Figment::new().merge(Toml::string("[source]\nchunk_size = 100\nchunk_overlap = 100\n"));
        let err = Config::from_figment(figment).settings().unwrap_err();
        assert!(crate::error::is_config_error(&err));
    }

    #[test]
    fn placeholder_keys_are_ignored() {
        let creds = Credentials { openai_api_key: Some("your_openai_api_key_here".into()), cohere_api_key: Some("  ".into()) };
        assert!(creds.openai().is_none());
        assert!(creds.cohere().is_none());
        assert!(!format!("{creds:?}").contains("your_openai"));
    }

    #[test]
    fn resolve_keeps_absolute_paths() {
        let base = Path::new("/srv/kidsafe");
        assert_eq!(resolve_with_base(base, "data/guide.pdf"), PathBuf::from("/srv/kidsafe/data/guide.pdf"));
        assert_eq!(resolve_with_base(base, "/tmp/guide.pdf"), PathBuf::from("/tmp/guide.pdf"));
    }
}
