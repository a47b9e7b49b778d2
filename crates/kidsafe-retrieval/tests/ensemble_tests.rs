use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use kidsafe_core::error::{is_config_error, Error};
use kidsafe_core::traits::Retriever;
use kidsafe_core::types::{Availability, DocumentChunk, ScoredChunk, StrategyKind};
use kidsafe_retrieval::{EnsembleConfig, EnsembleRetriever, RetryPolicy, Retrying};

fn chunk(id: &str) -> Arc<DocumentChunk> {
    Arc::new(DocumentChunk { id: id.into(), source: "guide.pdf".into(), page: 1, offset: 0, chunk_index: 0, parent_id: None, content: format!("content of {id}") })
}

/// Returns a fixed ranking, optionally after a delay.
struct Fixed {
    kind: StrategyKind,
    ids: Vec<&'static str>,
    delay: Option<Duration>,
}

#[async_trait]
impl Retriever for Fixed {
    fn kind(&self) -> StrategyKind { self.kind }
    async fn retrieve(&self, _query: &str, k: usize) -> anyhow::Result<Vec<ScoredChunk>> {
        if let Some(d) = self.delay { tokio::time::sleep(d).await; }
        Ok(self.ids.iter().take(k).enumerate().map(|(i, id)| ScoredChunk::new(chunk(id), 1.0 - i as f32 * 0.1)).collect())
    }
}

fn fixed(kind: StrategyKind, ids: Vec<&'static str>) -> (StrategyKind, Availability<Arc<dyn Retriever>>) {
    (kind, Availability::Available(Arc::new(Fixed { kind, ids, delay: None }) as Arc<dyn Retriever>))
}

fn ids(v: &[ScoredChunk]) -> Vec<String> { v.iter().map(|c| c.id().to_string()).collect() }

fn config(weights: Option<Vec<f32>>) -> EnsembleConfig { EnsembleConfig { weights, ..EnsembleConfig::default() } }

#[tokio::test]
async fn worked_example_fuses_in_expected_order() {
    let ensemble = EnsembleRetriever::new(
        vec![fixed(StrategyKind::Dense, vec!["c1", "c2", "c3"]), fixed(StrategyKind::Sparse, vec!["c3", "c1", "c4"])],
        config(Some(vec![0.5, 0.5])),
    )
    .unwrap();
    let out = ensemble.retrieve("sugar", 3).await.unwrap();
    assert_eq!(ids(&out), vec!["c1", "c3", "c2"]);
    assert!((out[0].score - 0.75).abs() < 1e-6);
}

#[test]
fn weight_count_mismatch_fails_at_construction() {
    let err = EnsembleRetriever::new(
        vec![fixed(StrategyKind::Dense, vec!["a"]), fixed(StrategyKind::Sparse, vec!["b"])],
        config(Some(vec![1.0])),
    )
    .unwrap_err();
    assert!(is_config_error(&err));
}

#[test]
fn bad_weights_and_single_strategy_are_rejected() {
    let two = || vec![fixed(StrategyKind::Dense, vec!["a"]), fixed(StrategyKind::Sparse, vec!["b"])];
    assert!(is_config_error(&EnsembleRetriever::new(two(), config(Some(vec![-0.5, 1.5]))).unwrap_err()));
    assert!(is_config_error(&EnsembleRetriever::new(two(), config(Some(vec![f32::NAN, 1.0]))).unwrap_err()));
    assert!(is_config_error(&EnsembleRetriever::new(two(), config(Some(vec![0.0, 0.0]))).unwrap_err()));
    assert!(is_config_error(&EnsembleRetriever::new(vec![fixed(StrategyKind::Dense, vec!["a"])], config(None)).unwrap_err()));
}

#[tokio::test]
async fn chunks_absent_everywhere_never_appear_and_unanimous_top_wins() {
    let ensemble = EnsembleRetriever::new(
        vec![
            fixed(StrategyKind::Dense, vec!["top", "x", "y"]),
            fixed(StrategyKind::Sparse, vec!["top", "y", "z"]),
            fixed(StrategyKind::ParentChild, vec!["top", "z", "x"]),
        ],
        config(None),
    )
    .unwrap();
    let out = ensemble.retrieve("q", 10).await.unwrap();
    assert_eq!(out[0].id(), "top");
    assert!(!ids(&out).contains(&"never".to_string()));
    assert_eq!(out.len(), 4);
}

#[tokio::test]
async fn adding_a_same_pattern_strategy_keeps_equal_weight_order() {
    let base = EnsembleRetriever::new(
        vec![fixed(StrategyKind::Dense, vec!["a", "b", "c"]), fixed(StrategyKind::Sparse, vec!["b", "c", "a"])],
        config(None),
    )
    .unwrap();
    let extended = EnsembleRetriever::new(
        vec![
            fixed(StrategyKind::Dense, vec!["a", "b", "c"]),
            fixed(StrategyKind::Sparse, vec!["b", "c", "a"]),
            fixed(StrategyKind::ParentChild, vec!["a", "b", "c"]),
            fixed(StrategyKind::Compression, vec!["b", "c", "a"]),
        ],
        config(None),
    )
    .unwrap();
    assert_eq!(ids(&base.retrieve("q", 3).await.unwrap()), ids(&extended.retrieve("q", 3).await.unwrap()));
}

#[tokio::test]
async fn unavailable_members_are_excluded_and_inspectable() {
    let ensemble = EnsembleRetriever::new(
        vec![
            fixed(StrategyKind::Dense, vec!["a", "b"]),
            fixed(StrategyKind::Sparse, vec!["b", "a"]),
            (StrategyKind::Compression, Availability::unavailable("COHERE_API_KEY is not set")),
        ],
        config(Some(vec![0.4, 0.4, 0.2])),
    )
    .unwrap();
    let kinds: Vec<StrategyKind> = ensemble.members().iter().map(|m| m.kind).collect();
    assert_eq!(kinds, vec![StrategyKind::Dense, StrategyKind::Sparse]);
    assert_eq!(ensemble.members()[0].weight, 0.4);
    assert_eq!(ensemble.retrieve("q", 2).await.unwrap().len(), 2);
}

#[tokio::test]
async fn slow_member_times_out_and_others_still_fuse() {
    let slow: Arc<dyn Retriever> = Arc::new(Fixed { kind: StrategyKind::MultiQuery, ids: vec!["slow"], delay: Some(Duration::from_secs(5)) });
    let ensemble = EnsembleRetriever::new(
        vec![fixed(StrategyKind::Dense, vec!["a", "b"]), (StrategyKind::MultiQuery, Availability::Available(slow))],
        EnsembleConfig { weights: None, rank_constant: 0.0, timeout: Some(Duration::from_millis(50)) },
    )
    .unwrap();
    let out = ensemble.retrieve("q", 5).await.unwrap();
    assert_eq!(ids(&out), vec!["a", "b"]);
}

struct Failing;

#[async_trait]
impl Retriever for Failing {
    fn kind(&self) -> StrategyKind { StrategyKind::Sparse }
    async fn retrieve(&self, _query: &str, _k: usize) -> anyhow::Result<Vec<ScoredChunk>> {
        Err(Error::Operation("index corrupted".into()).into())
    }
}

#[tokio::test]
async fn a_failing_member_fails_the_query() {
    let ensemble = EnsembleRetriever::new(
        vec![fixed(StrategyKind::Dense, vec!["a"]), (StrategyKind::Sparse, Availability::Available(Arc::new(Failing) as Arc<dyn Retriever>))],
        config(None),
    )
    .unwrap();
    assert!(ensemble.retrieve("q", 3).await.is_err());
}

/// Fails with the given error until `succeed_after` calls have been made.
struct Flaky {
    calls: AtomicUsize,
    succeed_after: usize,
    transient: bool,
}

#[async_trait]
impl Retriever for Flaky {
    fn kind(&self) -> StrategyKind { StrategyKind::Compression }
    async fn retrieve(&self, _query: &str, _k: usize) -> anyhow::Result<Vec<ScoredChunk>> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if n > self.succeed_after { return Ok(vec![ScoredChunk::new(chunk("ok"), 1.0)]); }
        if self.transient { Err(Error::Transient("HTTP 503".into()).into()) } else { Err(Error::InvalidConfig("credential rejected".into()).into()) }
    }
}

fn fast_policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy { max_attempts, initial_backoff: Duration::from_millis(1), max_backoff: Duration::from_millis(4) }
}

#[tokio::test]
async fn transient_errors_are_retried_up_to_the_limit() {
    let flaky = Arc::new(Flaky { calls: AtomicUsize::new(0), succeed_after: 2, transient: true });
    let r = Retrying::new(Arc::clone(&flaky), fast_policy(3));
    assert_eq!(r.retrieve("q", 1).await.unwrap().len(), 1);
    assert_eq!(flaky.calls.load(Ordering::SeqCst), 3);

    let exhausted = Arc::new(Flaky { calls: AtomicUsize::new(0), succeed_after: 10, transient: true });
    let r = Retrying::new(Arc::clone(&exhausted), fast_policy(3));
    assert!(r.retrieve("q", 1).await.is_err());
    assert_eq!(exhausted.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn config_errors_are_not_retried() {
    let broken = Arc::new(Flaky { calls: AtomicUsize::new(0), succeed_after: 10, transient: false });
    let r = Retrying::new(Arc::clone(&broken), fast_policy(3));
    let err = r.retrieve("q", 1).await.unwrap_err();
    assert!(is_config_error(&err));
    assert_eq!(broken.calls.load(Ordering::SeqCst), 1);
}
