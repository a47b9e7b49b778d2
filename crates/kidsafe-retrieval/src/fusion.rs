//! Weighted reciprocal rank fusion.
//!
//! `fused(d) = Σ_i w_i / (c + 1 + rank_i(d))` with 0-based ranks, summed over
//! the lists that contain `d`. Chunks are identified by id.

use std::collections::HashMap;
use std::sync::Arc;

use kidsafe_core::types::{DocumentChunk, ScoredChunk};

/// Fuse ranked lists, best first, keeping at most `k`.
///
/// `weights` is parallel to `lists`. Equal fused scores keep first-seen order:
/// list order first, then rank within the list.
pub fn weighted_rrf(lists: &[Vec<ScoredChunk>], weights: &[f32], rank_constant: f32, k: usize) -> Vec<ScoredChunk> {
    let mut order: Vec<(Arc<DocumentChunk>, f64)> = Vec::new();
    let mut slot: HashMap<&str, usize> = HashMap::new();

    for (list, &weight) in lists.iter().zip(weights) {
        for (rank, hit) in list.iter().enumerate() {
            let contribution = weight as f64 / (rank_constant as f64 + 1.0 + rank as f64);
            match slot.get(hit.id()) {
                Some(&i) => order[i].1 += contribution,
                None => {
                    slot.insert(hit.id(), order.len());
                    order.push((Arc::clone(&hit.chunk), contribution));
                }
            }
        }
    }

    // Stable sort: ties stay in first-seen order.
    order.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    order.into_iter().take(k).map(|(chunk, score)| ScoredChunk::new(chunk, score as f32)).collect()
}
