//! Cross-frame cluster correspondence.
//!
//! Blade identity is carried between consecutive frames by matching the two
//! frames' cluster sets on center distance: generate every (previous,
//! current) index pair, sort by distance ascending, and greedily accept the
//! closest pair whose endpoints are both still free. The result is a partial
//! injective matching — each side is used at most once, and with unequal set
//! sizes the excess clusters simply stay unmatched.
//!
//! Greedy nearest-neighbor is not globally optimal (no backtracking); with
//! at most three blades per side the trade-off buys simplicity and latency
//! and loses nothing in practice.

use crate::cluster::GaussianCluster;

/// Match `previous` against `current` clusters by center distance.
///
/// Returns `(previous index, current index)` pairs forming a 1:1 matching.
/// Pairs are ordered by previous index.
pub fn match_clusters(
    previous: &[GaussianCluster],
    current: &[GaussianCluster],
) -> Vec<(usize, usize)> {
    let mut candidates: Vec<(usize, usize, f64)> =
        Vec::with_capacity(previous.len() * current.len());
    for (i, prev) in previous.iter().enumerate() {
        for (j, cur) in current.iter().enumerate() {
            candidates.push((i, j, prev.distance_to(cur)));
        }
    }

    candidates.sort_by(|a, b| a.2.partial_cmp(&b.2).unwrap_or(std::cmp::Ordering::Equal));

    let mut previous_used = vec![false; previous.len()];
    let mut current_used = vec![false; current.len()];
    let mut matches = Vec::with_capacity(previous.len().min(current.len()));

    for (i, j, _) in candidates {
        if previous_used[i] || current_used[j] {
            continue;
        }
        previous_used[i] = true;
        current_used[j] = true;
        matches.push((i, j));
    }

    matches.sort_unstable();
    matches
}
