// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Vector Store Client
//!
//! Owns one storage connection and the configuration of the chat and screen
//! collections. The connection and both collection registrations are made
//! together by [`VectorStoreClient::connect`], which every operation calls
//! first; `terminate` drops the connection and the next call recreates it.

use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::backend::{ConnectionHandle, StorageBackend, StorageEndpoint};
use super::collection::{CollectionConfig, CollectionKind, CollectionSet};
use super::errors::VectorStoreError;
use super::record::{decode_payload, encode_payload, DecodedPayload, VectorRecord};

pub struct VectorStoreClient {
    backend: Arc<dyn StorageBackend>,
    endpoint: StorageEndpoint,
    collections: CollectionSet,
    connection: Mutex<Option<ConnectionHandle>>,
}

impl VectorStoreClient {
    pub fn new(backend: Arc<dyn StorageBackend>, endpoint: StorageEndpoint) -> Self {
        Self::with_collections(backend, endpoint, CollectionSet::default())
    }

    pub fn with_collections(
        backend: Arc<dyn StorageBackend>,
        endpoint: StorageEndpoint,
        collections: CollectionSet,
    ) -> Self {
        Self {
            backend,
            endpoint,
            collections,
            connection: Mutex::new(None),
        }
    }

    pub fn collection(&self, kind: CollectionKind) -> &CollectionConfig {
        self.collections.get(kind)
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub async fn is_connected(&self) -> bool {
        self.connection.lock().await.is_some()
    }

    /// Open the connection and register both collections; no-op when already connected
    pub async fn connect(&self) -> Result<ConnectionHandle, VectorStoreError> {
        let mut connection = self.connection.lock().await;
        if let Some(handle) = connection.as_ref() {
            return Ok(handle.clone());
        }

        self.collections.validate()?;

        info!(
            backend = self.backend.name(),
            endpoint = %self.endpoint,
            "Connecting to vector store"
        );
        let handle = self.backend.connect(&self.endpoint).await?;

        for kind in CollectionKind::ALL {
            let config = self.collections.get(kind);
            if let Err(e) = self.backend.setup_collection(&handle, config).await {
                // Leave the client uninitialized so the next call retries the whole setup
                if let Err(close_err) = self.backend.disconnect(&handle).await {
                    warn!("Failed to close connection after setup error: {}", close_err);
                }
                return Err(e);
            }
            debug!(
                collection = %config.name,
                dimension = config.dimension,
                metric = config.metric.as_str(),
                "Collection ready"
            );
        }

        *connection = Some(handle.clone());
        Ok(handle)
    }

    /// Store records in `kind`; returns the number inserted
    pub async fn insert(
        &self,
        kind: CollectionKind,
        records: &[VectorRecord],
    ) -> Result<usize, VectorStoreError> {
        if records.is_empty() {
            return Ok(0);
        }

        let config = self.collections.get(kind);
        let mut vectors = Vec::with_capacity(records.len());
        let mut payloads = Vec::with_capacity(records.len());
        for record in records {
            config.check_dimension(&record.vector)?;
            vectors.push(record.vector.clone());
            payloads.push(encode_payload(record)?);
        }

        self.insert_raw(kind, &vectors, &payloads).await
    }

    /// Store pre-encoded payloads alongside their vectors
    pub async fn insert_raw(
        &self,
        kind: CollectionKind,
        vectors: &[Vec<f32>],
        payloads: &[String],
    ) -> Result<usize, VectorStoreError> {
        if vectors.len() != payloads.len() {
            return Err(VectorStoreError::LengthMismatch {
                vectors: vectors.len(),
                payloads: payloads.len(),
            });
        }
        if vectors.is_empty() {
            return Ok(0);
        }

        let config = self.collections.get(kind);
        for vector in vectors {
            config.check_dimension(vector)?;
        }

        let handle = self.connect().await?;
        let count = self
            .backend
            .insert(&handle, &config.name, vectors, payloads)
            .await?;
        info!(collection = %config.name, count, "Inserted records");
        Ok(count)
    }

    /// Dense scores over every record in `kind`, in index order
    pub async fn query(
        &self,
        kind: CollectionKind,
        vector: &[f32],
    ) -> Result<Vec<f32>, VectorStoreError> {
        let config = self.collections.get(kind);
        config.check_dimension(vector)?;

        let handle = self.connect().await?;
        let scores = self.backend.query(&handle, &config.name, vector).await?;
        debug!(collection = %config.name, records = scores.len(), "Query scored");
        Ok(scores)
    }

    /// Raw payload stored at `index`
    pub async fn retrieve(
        &self,
        kind: CollectionKind,
        index: u64,
    ) -> Result<String, VectorStoreError> {
        let config = self.collections.get(kind);
        let handle = self.connect().await?;
        self.backend.retrieve(&handle, &config.name, index).await
    }

    /// Decoded records for `indices` in one backend call, in the same order.
    ///
    /// Malformed payloads come back as degraded records and are never an error.
    pub async fn retrieve_records(
        &self,
        kind: CollectionKind,
        indices: &[u64],
    ) -> Result<Vec<VectorRecord>, VectorStoreError> {
        if indices.is_empty() {
            return Ok(Vec::new());
        }

        let config = self.collections.get(kind);
        let handle = self.connect().await?;
        let payloads = self
            .backend
            .retrieve_batch(&handle, &config.name, indices)
            .await?;

        Ok(indices
            .iter()
            .zip(payloads)
            .map(|(&index, raw)| match decode_payload(&raw, index) {
                DecodedPayload::Structured(record) => record,
                DecodedPayload::Degraded { record, reason } => {
                    warn!(
                        collection = %config.name,
                        index,
                        "Malformed payload, using raw text: {}",
                        reason
                    );
                    record
                }
            })
            .collect())
    }

    pub async fn drop_collection(&self, kind: CollectionKind) -> Result<(), VectorStoreError> {
        let config = self.collections.get(kind);
        let handle = self.connect().await?;
        self.backend.drop_collection(&handle, &config.name).await?;
        info!(collection = %config.name, "Dropped collection");
        Ok(())
    }

    /// Release the connection. Best effort: teardown errors are logged, never returned.
    pub async fn terminate(&self) {
        let Some(handle) = self.connection.lock().await.take() else {
            return;
        };

        match self.backend.disconnect(&handle).await {
            Ok(()) => info!(endpoint = %handle.endpoint, "Vector store connection closed"),
            Err(e) => warn!("Error while terminating vector store connection: {}", e),
        }
    }
}
