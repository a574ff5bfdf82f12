// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Retrieval Orchestrator
//!
//! Turns query vectors into a merged list of records from the chat and
//! screen collections. Chat records always come first; nothing is re-ranked
//! across the two collections.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use super::batch::SequentialBatchQueue;
use super::top_k::select_top_k_with_scores;
use crate::vector::{
    CollectionKind, SourceType, VectorRecord, VectorStoreClient, VectorStoreError, NO_SESSION,
};

pub const DEFAULT_CHAT_TOP_K: usize = 7;
pub const DEFAULT_SCREEN_TOP_K: usize = 3;
pub const DEFAULT_SCREEN_BATCH_SIZE: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalOptions {
    pub chat_top_k: usize,
    pub screen_top_k: usize,
    pub screen_batch_size: usize,
}

impl Default for RetrievalOptions {
    fn default() -> Self {
        Self {
            chat_top_k: DEFAULT_CHAT_TOP_K,
            screen_top_k: DEFAULT_SCREEN_TOP_K,
            screen_batch_size: DEFAULT_SCREEN_BATCH_SIZE,
        }
    }
}

/// One search across both collections. Unset top-k values fall back to
/// [`RetrievalOptions`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchRequest {
    pub chat_vector: Option<Vec<f32>>,
    pub chat_top_k: Option<usize>,
    pub screen_vector: Option<Vec<f32>>,
    pub screen_top_k: Option<usize>,
    pub exclude_session_id: Option<i64>,
}

impl SearchRequest {
    pub fn chat(vector: Vec<f32>) -> Self {
        Self {
            chat_vector: Some(vector),
            ..Default::default()
        }
    }

    pub fn screen(vector: Vec<f32>) -> Self {
        Self {
            screen_vector: Some(vector),
            ..Default::default()
        }
    }

    pub fn with_screen(mut self, vector: Vec<f32>) -> Self {
        self.screen_vector = Some(vector);
        self
    }

    pub fn with_chat_top_k(mut self, k: usize) -> Self {
        self.chat_top_k = Some(k);
        self
    }

    pub fn with_screen_top_k(mut self, k: usize) -> Self {
        self.screen_top_k = Some(k);
        self
    }

    pub fn excluding_session(mut self, session_id: i64) -> Self {
        self.exclude_session_id = Some(session_id);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsertSummary {
    pub inserted_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DualInsertSummary {
    pub chat_insert_count: usize,
    pub screen_insert_count: usize,
}

/// Records outside the excluded session, plus every record with no session
pub fn keep_for_session(record: &VectorRecord, exclude_session_id: i64) -> bool {
    record.session_id == NO_SESSION || record.session_id != exclude_session_id
}

pub struct Retriever {
    client: Arc<VectorStoreClient>,
    options: RetrievalOptions,
    screen_queue: SequentialBatchQueue,
}

impl Retriever {
    pub fn new(client: Arc<VectorStoreClient>) -> Self {
        Self::with_options(client, RetrievalOptions::default())
    }

    pub fn with_options(client: Arc<VectorStoreClient>, options: RetrievalOptions) -> Self {
        Self {
            client,
            screen_queue: SequentialBatchQueue::new(options.screen_batch_size),
            options,
        }
    }

    pub fn client(&self) -> &Arc<VectorStoreClient> {
        &self.client
    }

    pub fn options(&self) -> &RetrievalOptions {
        &self.options
    }

    pub async fn insert_chat_data(
        &self,
        records: &[VectorRecord],
    ) -> Result<InsertSummary, VectorStoreError> {
        self.insert_tagged(CollectionKind::Chat, records).await
    }

    pub async fn insert_screen_data(
        &self,
        records: &[VectorRecord],
    ) -> Result<InsertSummary, VectorStoreError> {
        self.insert_tagged(CollectionKind::Screen, records).await
    }

    /// Insert into both collections concurrently
    pub async fn insert_all(
        &self,
        chat: &[VectorRecord],
        screen: &[VectorRecord],
    ) -> Result<DualInsertSummary, VectorStoreError> {
        let (chat, screen) =
            tokio::try_join!(self.insert_chat_data(chat), self.insert_screen_data(screen))?;
        Ok(DualInsertSummary {
            chat_insert_count: chat.inserted_count,
            screen_insert_count: screen.inserted_count,
        })
    }

    async fn insert_tagged(
        &self,
        kind: CollectionKind,
        records: &[VectorRecord],
    ) -> Result<InsertSummary, VectorStoreError> {
        let source = match kind {
            CollectionKind::Chat => SourceType::Chat,
            CollectionKind::Screen => SourceType::Screen,
        };
        let tagged: Vec<VectorRecord> = records
            .iter()
            .cloned()
            .map(|mut record| {
                record.source_type.get_or_insert(source);
                record
            })
            .collect();

        let inserted_count = self.client.insert(kind, &tagged).await?;
        Ok(InsertSummary { inserted_count })
    }

    pub async fn search_and_query(
        &self,
        request: &SearchRequest,
    ) -> Result<Vec<VectorRecord>, VectorStoreError> {
        let chat_k = request.chat_top_k.unwrap_or(self.options.chat_top_k);
        let screen_k = request.screen_top_k.unwrap_or(self.options.screen_top_k);

        let (chat_indices, screen_indices) = tokio::try_join!(
            self.select(CollectionKind::Chat, request.chat_vector.as_deref(), chat_k),
            self.select(CollectionKind::Screen, request.screen_vector.as_deref(), screen_k),
        )?;

        if chat_indices.is_empty() && screen_indices.is_empty() {
            debug!("No candidates selected, skipping retrieval");
            return Ok(Vec::new());
        }

        let (chat_records, screen_records) = tokio::try_join!(
            self.client.retrieve_records(CollectionKind::Chat, &chat_indices),
            self.retrieve_screen(&screen_indices),
        )?;

        let mut records = chat_records;
        records.extend(screen_records);

        if let Some(exclude) = request.exclude_session_id {
            let before = records.len();
            records.retain(|record| keep_for_session(record, exclude));
            debug!(
                session_id = exclude,
                dropped = before - records.len(),
                "Applied session exclusion"
            );
        }

        info!(
            chat = chat_indices.len(),
            screen = screen_indices.len(),
            returned = records.len(),
            "Retrieved context records"
        );
        Ok(records)
    }

    /// Query one collection and pick its top `k` indices
    async fn select(
        &self,
        kind: CollectionKind,
        vector: Option<&[f32]>,
        k: usize,
    ) -> Result<Vec<u64>, VectorStoreError> {
        let vector = match vector {
            Some(v) if !v.is_empty() && k > 0 => v,
            _ => return Ok(Vec::new()),
        };

        let scores = self.client.query(kind, vector).await?;
        let picked = select_top_k_with_scores(&scores, k);
        debug!(collection = %kind, candidates = scores.len(), "Top-k: {:?}", picked);

        Ok(picked.into_iter().map(|(index, _)| index as u64).collect())
    }

    /// Screen records in fixed-size batches, one request at a time
    async fn retrieve_screen(&self, indices: &[u64]) -> Result<Vec<VectorRecord>, VectorStoreError> {
        self.screen_queue
            .run(indices, |batch| {
                self.client.retrieve_records(CollectionKind::Screen, batch)
            })
            .await
    }
}
