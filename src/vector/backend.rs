// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Storage backend seam
//!
//! The vector index, its encryption of query vectors and its transport are
//! opaque to this crate. A backend only has to register collections, append
//! vector/payload pairs, score a query against every stored vector and hand
//! back payloads by index.

use async_trait::async_trait;
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::collection::CollectionConfig;
use super::errors::VectorStoreError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageEndpoint {
    pub host: String,
    pub port: u16,
}

impl StorageEndpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl Default for StorageEndpoint {
    fn default() -> Self {
        Self::new("127.0.0.1", 8765)
    }
}

impl std::fmt::Display for StorageEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Open connection to a storage backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionHandle {
    pub id: Uuid,
    pub endpoint: StorageEndpoint,
}

impl ConnectionHandle {
    pub fn new(endpoint: StorageEndpoint) -> Self {
        Self {
            id: Uuid::new_v4(),
            endpoint,
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StorageBackend: Send + Sync {
    fn name(&self) -> &'static str;

    async fn connect(&self, endpoint: &StorageEndpoint) -> Result<ConnectionHandle, VectorStoreError>;

    /// Register a collection; registering an existing collection is a no-op
    async fn setup_collection(
        &self,
        handle: &ConnectionHandle,
        config: &CollectionConfig,
    ) -> Result<(), VectorStoreError>;

    async fn drop_collection(
        &self,
        handle: &ConnectionHandle,
        collection: &str,
    ) -> Result<(), VectorStoreError>;

    /// Append positionally paired vectors and payloads; returns the count stored
    async fn insert(
        &self,
        handle: &ConnectionHandle,
        collection: &str,
        vectors: &[Vec<f32>],
        payloads: &[String],
    ) -> Result<usize, VectorStoreError>;

    /// One score per stored record, in index order
    async fn query(
        &self,
        handle: &ConnectionHandle,
        collection: &str,
        vector: &[f32],
    ) -> Result<Vec<f32>, VectorStoreError>;

    async fn retrieve(
        &self,
        handle: &ConnectionHandle,
        collection: &str,
        index: u64,
    ) -> Result<String, VectorStoreError>;

    /// Payloads for `indices`, in the same order
    async fn retrieve_batch(
        &self,
        handle: &ConnectionHandle,
        collection: &str,
        indices: &[u64],
    ) -> Result<Vec<String>, VectorStoreError> {
        try_join_all(
            indices
                .iter()
                .map(|&index| self.retrieve(handle, collection, index)),
        )
        .await
    }

    async fn disconnect(&self, handle: &ConnectionHandle) -> Result<(), VectorStoreError>;
}
