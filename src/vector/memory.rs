// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! In-process storage backend
//!
//! Keeps vectors and payloads in memory and scores queries with the
//! collection's metric over every stored vector. Used for local runs and
//! tests; data outlives individual connections.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use super::backend::{ConnectionHandle, StorageBackend, StorageEndpoint};
use super::collection::CollectionConfig;
use super::errors::VectorStoreError;

struct MemoryCollection {
    config: CollectionConfig,
    vectors: Vec<Vec<f32>>,
    payloads: Vec<String>,
}

#[derive(Default)]
pub struct MemoryBackend {
    collections: Arc<RwLock<HashMap<String, MemoryCollection>>>,
    connections: Arc<RwLock<HashSet<Uuid>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records stored in `collection`
    pub async fn len(&self, collection: &str) -> usize {
        self.collections
            .read()
            .await
            .get(collection)
            .map(|c| c.vectors.len())
            .unwrap_or(0)
    }

    pub async fn open_connections(&self) -> usize {
        self.connections.read().await.len()
    }

    async fn ensure_connected(&self, handle: &ConnectionHandle) -> Result<(), VectorStoreError> {
        if self.connections.read().await.contains(&handle.id) {
            Ok(())
        } else {
            Err(VectorStoreError::BackendUnavailable(format!(
                "connection {} is closed",
                handle.id
            )))
        }
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn connect(&self, endpoint: &StorageEndpoint) -> Result<ConnectionHandle, VectorStoreError> {
        let handle = ConnectionHandle::new(endpoint.clone());
        self.connections.write().await.insert(handle.id);
        Ok(handle)
    }

    async fn setup_collection(
        &self,
        handle: &ConnectionHandle,
        config: &CollectionConfig,
    ) -> Result<(), VectorStoreError> {
        self.ensure_connected(handle).await?;
        let mut collections = self.collections.write().await;

        if let Some(existing) = collections.get(&config.name) {
            if existing.config.dimension != config.dimension {
                return Err(VectorStoreError::DimensionMismatch {
                    collection: config.name.clone(),
                    expected: existing.config.dimension,
                    actual: config.dimension,
                });
            }
            return Ok(());
        }

        debug!(
            collection = %config.name,
            dimension = config.dimension,
            metric = config.metric.as_str(),
            "Creating in-memory collection"
        );
        collections.insert(
            config.name.clone(),
            MemoryCollection {
                config: config.clone(),
                vectors: Vec::new(),
                payloads: Vec::new(),
            },
        );
        Ok(())
    }

    async fn drop_collection(
        &self,
        handle: &ConnectionHandle,
        collection: &str,
    ) -> Result<(), VectorStoreError> {
        self.ensure_connected(handle).await?;
        self.collections.write().await.remove(collection);
        Ok(())
    }

    async fn insert(
        &self,
        handle: &ConnectionHandle,
        collection: &str,
        vectors: &[Vec<f32>],
        payloads: &[String],
    ) -> Result<usize, VectorStoreError> {
        self.ensure_connected(handle).await?;
        if vectors.len() != payloads.len() {
            return Err(VectorStoreError::LengthMismatch {
                vectors: vectors.len(),
                payloads: payloads.len(),
            });
        }

        let mut collections = self.collections.write().await;
        let target = collections
            .get_mut(collection)
            .ok_or_else(|| VectorStoreError::UnknownCollection(collection.to_string()))?;

        for vector in vectors {
            target.config.check_dimension(vector)?;
        }

        target.vectors.extend_from_slice(vectors);
        target.payloads.extend_from_slice(payloads);
        Ok(vectors.len())
    }

    async fn query(
        &self,
        handle: &ConnectionHandle,
        collection: &str,
        vector: &[f32],
    ) -> Result<Vec<f32>, VectorStoreError> {
        self.ensure_connected(handle).await?;
        let collections = self.collections.read().await;
        let target = collections
            .get(collection)
            .ok_or_else(|| VectorStoreError::UnknownCollection(collection.to_string()))?;

        target.config.check_dimension(vector)?;

        let metric = target.config.metric;
        Ok(target
            .vectors
            .iter()
            .map(|stored| metric.score(vector, stored))
            .collect())
    }

    async fn retrieve(
        &self,
        handle: &ConnectionHandle,
        collection: &str,
        index: u64,
    ) -> Result<String, VectorStoreError> {
        self.ensure_connected(handle).await?;
        let collections = self.collections.read().await;
        let target = collections
            .get(collection)
            .ok_or_else(|| VectorStoreError::UnknownCollection(collection.to_string()))?;

        usize::try_from(index)
            .ok()
            .and_then(|i| target.payloads.get(i))
            .cloned()
            .ok_or_else(|| VectorStoreError::RecordNotFound {
                collection: collection.to_string(),
                index,
            })
    }

    async fn disconnect(&self, handle: &ConnectionHandle) -> Result<(), VectorStoreError> {
        self.connections.write().await.remove(&handle.id);
        Ok(())
    }
}
