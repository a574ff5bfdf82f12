// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Sequential batch queue
//!
//! Splits work into fixed-size batches and runs them one at a time, in order.
//! At most one batch is in flight, which bounds the payload a single storage
//! call has to carry.

use futures::stream::{self, StreamExt, TryStreamExt};
use std::future::Future;
use tracing::debug;

/// Batches in flight at once
const MAX_IN_FLIGHT: usize = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequentialBatchQueue {
    batch_size: usize,
}

impl SequentialBatchQueue {
    /// A zero batch size is treated as 1
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn batch_count(&self, items: usize) -> usize {
        items.div_ceil(self.batch_size)
    }

    /// Run `task` over each batch of `items` in order and concatenate the results.
    ///
    /// Stops at the first failing batch; later batches are never started.
    pub async fn run<'a, T, R, E, F, Fut>(&self, items: &'a [T], mut task: F) -> Result<Vec<R>, E>
    where
        F: FnMut(&'a [T]) -> Fut,
        Fut: Future<Output = Result<Vec<R>, E>>,
    {
        let total = self.batch_count(items.len());

        let batches: Vec<Vec<R>> = stream::iter(items.chunks(self.batch_size).enumerate())
            .map(|(i, batch)| {
                debug!("Dispatching batch {}/{} ({} items)", i + 1, total, batch.len());
                task(batch)
            })
            .buffered(MAX_IN_FLIGHT)
            .try_collect()
            .await?;

        Ok(batches.into_iter().flatten().collect())
    }
}
