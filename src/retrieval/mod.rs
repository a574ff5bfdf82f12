// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Retrieval across the chat and screen collections: top-k selection,
//! sequential batch fetching and merging.

pub mod batch;
pub mod orchestrator;
pub mod top_k;

pub use batch::SequentialBatchQueue;
pub use orchestrator::{
    keep_for_session, DualInsertSummary, InsertSummary, RetrievalOptions, Retriever,
    SearchRequest, DEFAULT_CHAT_TOP_K, DEFAULT_SCREEN_BATCH_SIZE, DEFAULT_SCREEN_TOP_K,
};
pub use top_k::{select_top_k, select_top_k_with_scores};
