use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use kidsafe_core::config::{EmbeddingProvider, RerankerKind, Settings, VectorBackend};
use kidsafe_core::data_processor::{ChunkingConfig, DataProcessor};
use kidsafe_core::error::is_config_error;
use kidsafe_core::traits::{ChatMessage, ChatModel, Embedder, Retriever};
use kidsafe_core::types::{Corpus, ScoredChunk, StrategyKind};
use kidsafe_embed::FakeEmbedder;
use kidsafe_retrieval::{MultiQueryRetriever, RetrievalManager, RunOutcome};

fn fixture_corpus() -> Arc<Corpus> {
    let root = PathBuf::from(env!("CARGO_MANIFEST_DIR")).ancestors().nth(2).unwrap().to_path_buf();
    let processor = DataProcessor::new(ChunkingConfig::new(200, 40).unwrap());
    Arc::new(processor.build(&root.join("test_data/food_labeling_excerpt.txt")).expect("build corpus"))
}

fn offline_settings() -> Settings {
    let mut s = Settings::default();
    s.embeddings.provider = EmbeddingProvider::Fake;
    s.embeddings.fake_dim = 256;
    s.vector.backend = VectorBackend::Memory;
    s.retrieval.compression.reranker = RerankerKind::Lexical;
    s.retrieval.parent_child.parent_chunk_size = 300;
    s.retrieval.parent_child.parent_overlap = 60;
    s.retrieval.parent_child.child_chunk_size = 100;
    s.retrieval.parent_child.child_overlap = 20;
    s.credentials.openai_api_key = None;
    s.credentials.cohere_api_key = None;
    s
}

fn manager(settings: Settings, chat: Option<Arc<dyn ChatModel>>) -> RetrievalManager {
    let embedder: Arc<dyn Embedder> = Arc::new(FakeEmbedder::new(settings.embeddings.fake_dim));
    RetrievalManager::new(settings, fixture_corpus(), embedder, chat)
}

fn key(r: &[ScoredChunk]) -> Vec<(String, f32)> { r.iter().map(|c| (c.id().to_string(), c.score)).collect() }

/// Replies with a canned completion and records the prompts it saw.
struct ScriptedChat {
    reply: String,
    prompts: Mutex<Vec<String>>,
}

#[async_trait]
impl ChatModel for ScriptedChat {
    fn model(&self) -> &str { "scripted" }
    async fn complete(&self, messages: &[ChatMessage], _temperature: f32) -> anyhow::Result<String> {
        self.prompts.lock().unwrap().extend(messages.iter().map(|m| m.content.clone()));
        Ok(self.reply.clone())
    }
}

#[tokio::test]
async fn local_strategies_are_idempotent() {
    let m = manager(offline_settings(), None);
    for kind in [StrategyKind::Dense, StrategyKind::Sparse, StrategyKind::ParentChild, StrategyKind::Compression] {
        let r = m.strategy(kind).await.unwrap().into_option().expect("available offline");
        assert_eq!(r.kind(), kind);
        let a = r.retrieve("added sugars high fructose corn syrup", 3).await.unwrap();
        let b = r.retrieve("added sugars high fructose corn syrup", 3).await.unwrap();
        assert!(!a.is_empty(), "{kind} returned nothing");
        assert!(a.len() <= 3);
        assert_eq!(key(&a), key(&b), "{kind} is not deterministic");
    }
}

#[tokio::test]
async fn oversized_k_is_clamped_by_every_local_strategy() {
    let m = manager(offline_settings(), None);
    let total = m.corpus().len();
    for kind in [StrategyKind::Dense, StrategyKind::Sparse, StrategyKind::ParentChild, StrategyKind::Compression, StrategyKind::Ensemble] {
        let r = m.strategy(kind).await.unwrap().into_option().expect("available offline");
        let out = r.retrieve("whole grain oats", usize::MAX).await.unwrap_or_else(|e| panic!("{kind}: {e:#}"));
        assert!(!out.is_empty(), "{kind} returned nothing");
        assert!(out.len() <= total, "{kind} returned {} of {total}", out.len());
    }
}

#[tokio::test]
async fn parent_child_returns_distinct_parents() {
    let m = manager(offline_settings(), None);
    let r = m.strategy(StrategyKind::ParentChild).await.unwrap().into_option().unwrap();
    let out = r.retrieve("whole grain oats fiber", 3).await.unwrap();
    let mut ids: Vec<&str> = out.iter().map(|c| c.id()).collect();
    assert!(ids.iter().all(|id| id.contains(":parent:") && !id.contains(":child:")));
    let n = ids.len();
    ids.dedup();
    assert_eq!(ids.len(), n);
    for pair in out.windows(2) { assert!(pair[0].score >= pair[1].score); }
}

#[tokio::test]
async fn cohere_without_key_is_unavailable_and_left_out_of_the_ensemble() {
    let mut s = offline_settings();
    s.retrieval.compression.reranker = RerankerKind::Cohere;
    s.retrieval.ensemble = vec![StrategyKind::Dense, StrategyKind::Sparse, StrategyKind::Compression];
    let m = manager(s, None);
    assert!(!m.strategy(StrategyKind::Compression).await.unwrap().is_available());
    let ensemble = m.ensemble().await.unwrap();
    let kinds: Vec<StrategyKind> = ensemble.members().iter().map(|x| x.kind).collect();
    assert_eq!(kinds, vec![StrategyKind::Dense, StrategyKind::Sparse]);
    assert!(!ensemble.retrieve("Red 40", 5).await.unwrap().is_empty());
}

#[tokio::test]
async fn selecting_an_unavailable_strategy_is_a_config_error() {
    let mut s = offline_settings();
    s.retrieval.strategy = StrategyKind::MultiQuery;
    let err = manager(s, None).active().await.err().expect("multi_query without chat");
    assert!(is_config_error(&err));
}

#[tokio::test]
async fn ensemble_weights_must_match_members() {
    let mut s = offline_settings();
    s.retrieval.ensemble = vec![StrategyKind::Dense, StrategyKind::Sparse];
    s.retrieval.weights = Some(vec![0.2, 0.3, 0.5]);
    let err = manager(s, None).ensemble().await.unwrap_err();
    assert!(is_config_error(&err));
}

#[tokio::test]
async fn multi_query_runs_each_rewrite_and_unions() {
    let chat = Arc::new(ScriptedChat {
        reply: "1. Which preservatives like BHT are used in cereal?\n2. Are artificial colors such as Red 40 harmful?\n3. Which preservatives like BHT are used in cereal?".into(),
        prompts: Mutex::new(Vec::new()),
    });
    let m = manager(offline_settings(), Some(chat.clone() as Arc<dyn ChatModel>));
    let dense = m.strategy(StrategyKind::Dense).await.unwrap().into_option().unwrap();
    let mq = MultiQueryRetriever::new(chat.clone(), dense, 3).include_original(true);

    let queries = mq.expand("Is this cereal safe?").await.unwrap();
    assert_eq!(queries.len(), 3, "original plus two distinct rewrites: {queries:?}");
    assert_eq!(queries[0], "Is this cereal safe?");

    let out = mq.retrieve("Is this cereal safe?", 4).await.unwrap();
    assert!(out.len() <= 4);
    let mut ids: Vec<&str> = out.iter().map(|c| c.id()).collect();
    let n = ids.len();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), n, "union must not repeat chunks");
    assert!(chat.prompts.lock().unwrap().iter().any(|p| p.contains("Is this cereal safe?")));
}

#[tokio::test]
async fn compare_reports_every_strategy() {
    let m = manager(offline_settings(), None);
    let runs = m.compare("BHT preservative", 3).await;
    assert_eq!(runs.len(), StrategyKind::ALL.len());
    for run in &runs {
        match (&run.kind, &run.outcome) {
            (StrategyKind::MultiQuery, RunOutcome::Unavailable { .. }) => {}
            (_, RunOutcome::Ok { chunks, .. }) => assert!(!chunks.is_empty(), "{} empty", run.kind),
            (kind, other) => panic!("{kind}: unexpected {other:?}"),
        }
    }
}
