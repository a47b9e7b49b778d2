//! Composite strategy: run every member concurrently, fuse with weighted RRF.

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use kidsafe_core::error::Error;
use kidsafe_core::traits::Retriever;
use kidsafe_core::types::{Availability, ScoredChunk, StrategyKind};

use crate::fusion::weighted_rrf;

#[derive(Debug, Clone, PartialEq)]
pub struct EnsembleConfig {
    /// One weight per candidate strategy; `None` means equal weights.
    pub weights: Option<Vec<f32>>,
    pub rank_constant: f32,
    /// Per-member time limit; `None` waits indefinitely.
    pub timeout: Option<Duration>,
}

impl Default for EnsembleConfig {
    fn default() -> Self { Self { weights: None, rank_constant: 0.0, timeout: Some(Duration::from_secs(10)) } }
}

/// One active member of an ensemble, as reported by [`EnsembleRetriever::members`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Member {
    pub kind: StrategyKind,
    pub weight: f32,
}

pub struct EnsembleRetriever {
    members: Vec<Member>,
    strategies: Vec<Arc<dyn Retriever>>,
    rank_constant: f32,
    timeout: Option<Duration>,
}

impl std::fmt::Debug for EnsembleRetriever {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnsembleRetriever").field("members", &self.members).field("rank_constant", &self.rank_constant).field("timeout", &self.timeout).finish()
    }
}

impl EnsembleRetriever {
    /// Validate the composition and drop unavailable candidates.
    ///
    /// Fails with [`Error::InvalidConfig`] when fewer than two candidates are
    /// given, the weight count differs from the candidate count, a weight is
    /// negative or non-finite, no candidate is available, or the available
    /// members' weights sum to zero.
    pub fn new(candidates: Vec<(StrategyKind, Availability<Arc<dyn Retriever>>)>, config: EnsembleConfig) -> Result<Self> {
        let n = candidates.len();
        if n < 2 {
            return Err(Error::InvalidConfig(format!("an ensemble needs at least two strategies, got {n}")).into());
        }
        let weights = match config.weights {
            Some(w) if w.len() != n => {
                return Err(Error::InvalidConfig(format!("{} weights given for {} strategies", w.len(), n)).into());
            }
            Some(w) => w,
            None => vec![1.0 / n as f32; n],
        };
        if let Some(bad) = weights.iter().find(|w| !w.is_finite() || **w < 0.0) {
            return Err(Error::InvalidConfig(format!("ensemble weights must be finite and non-negative, got {bad}")).into());
        }
        if !config.rank_constant.is_finite() || config.rank_constant < 0.0 {
            return Err(Error::InvalidConfig(format!("rank constant must be finite and non-negative, got {}", config.rank_constant)).into());
        }

        let mut members = Vec::new();
        let mut strategies = Vec::new();
        for ((kind, candidate), weight) in candidates.into_iter().zip(weights) {
            match candidate {
                Availability::Available(strategy) => {
                    members.push(Member { kind, weight });
                    strategies.push(strategy);
                }
                Availability::Unavailable { reason } => warn!("Ensemble excludes {}: {}", kind, reason),
            }
        }
        if members.is_empty() {
            return Err(Error::InvalidConfig("no ensemble strategy is available".into()).into());
        }
        if members.iter().map(|m| m.weight).sum::<f32>() <= 0.0 {
            return Err(Error::InvalidConfig("ensemble weights of the available strategies sum to zero".into()).into());
        }
        if members.len() == 1 {
            warn!("Ensemble has a single available member ({}); fusion passes its ranking through", members[0].kind);
        }

        let composition: Vec<String> = members.iter().map(|m| format!("{}={:.3}", m.kind, m.weight)).collect();
        info!("Ensemble composition: [{}], rank constant {}, timeout {:?}", composition.join(", "), config.rank_constant, config.timeout);
        Ok(Self { members, strategies, rank_constant: config.rank_constant, timeout: config.timeout })
    }

    /// Active members and their weights, in fusion order.
    pub fn members(&self) -> &[Member] { &self.members }
}

#[async_trait]
impl Retriever for EnsembleRetriever {
    fn kind(&self) -> StrategyKind { StrategyKind::Ensemble }

    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<ScoredChunk>> {
        let start = Instant::now();
        let handles: Vec<_> = self
            .strategies
            .iter()
            .zip(&self.members)
            .map(|(strategy, member)| {
                let strategy = Arc::clone(strategy);
                let query = query.to_string();
                let kind = member.kind;
                let timeout = self.timeout;
                tokio::spawn(async move {
                    let fut = strategy.retrieve(&query, k);
                    match timeout {
                        Some(limit) => match tokio::time::timeout(limit, fut).await {
                            Ok(res) => res,
                            Err(_) => {
                                warn!("{} exceeded {:?}; contributing no results", kind, limit);
                                Ok(Vec::new())
                            }
                        },
                        None => fut.await,
                    }
                })
            })
            .collect();

        let mut lists = Vec::with_capacity(handles.len());
        for (joined, member) in join_all(handles).await.into_iter().zip(&self.members) {
            let list = joined
                .map_err(|e| Error::Operation(format!("{} task failed: {e}", member.kind)))?
                .with_context(|| format!("{} retrieval failed", member.kind))?;
            debug!("{} returned {} chunks", member.kind, list.len());
            lists.push(list);
        }

        let weights: Vec<f32> = self.members.iter().map(|m| m.weight).collect();
        let fused = weighted_rrf(&lists, &weights, self.rank_constant, k);
        debug!("Ensemble fused {} chunks in {:?}", fused.len(), start.elapsed());
        Ok(fused)
    }
}
