// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Top-k selection over a dense score vector
//!
//! Uses a bounded min-heap so selection is O(n log k). Ties at equal score
//! go to the lower index, and NaN ranks below every other score, so the
//! result is deterministic for any input.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

#[derive(Debug, Clone, Copy)]
struct Candidate {
    index: usize,
    score: f32,
}

impl Ord for Candidate {
    /// `Greater` means ranked higher
    fn cmp(&self, other: &Self) -> Ordering {
        let by_score = match (self.score.is_nan(), other.score.is_nan()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            (false, false) => self
                .score
                .partial_cmp(&other.score)
                .unwrap_or(Ordering::Equal),
        };
        by_score.then_with(|| other.index.cmp(&self.index))
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

/// The `k` best `(index, score)` pairs, best first
pub fn select_top_k_with_scores(scores: &[f32], k: usize) -> Vec<(usize, f32)> {
    let k = k.min(scores.len());
    if k == 0 {
        return Vec::new();
    }

    // Worst kept candidate sits on top
    let mut heap: BinaryHeap<Reverse<Candidate>> = BinaryHeap::with_capacity(k + 1);
    for (index, &score) in scores.iter().enumerate() {
        let candidate = Candidate { index, score };
        if heap.len() < k {
            heap.push(Reverse(candidate));
        } else if let Some(Reverse(worst)) = heap.peek() {
            if candidate > *worst {
                heap.pop();
                heap.push(Reverse(candidate));
            }
        }
    }

    // Ascending order of Reverse is descending rank
    heap.into_sorted_vec()
        .into_iter()
        .map(|Reverse(c)| (c.index, c.score))
        .collect()
}

/// Indices of the `k` highest scores, best first
pub fn select_top_k(scores: &[f32], k: usize) -> Vec<usize> {
    select_top_k_with_scores(scores, k)
        .into_iter()
        .map(|(index, _)| index)
        .collect()
}
