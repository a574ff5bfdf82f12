// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! JSON-over-HTTP storage backend
//!
//! Talks to a storage server exposing `/collections/*` routes. Query vectors
//! are sent as-is; encrypting them is the server's concern.

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use super::backend::{ConnectionHandle, StorageBackend, StorageEndpoint};
use super::collection::CollectionConfig;
use super::errors::VectorStoreError;

pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

#[derive(Serialize)]
struct SetupRequest<'a> {
    collection_name: &'a str,
    dimension: usize,
    metric: &'a str,
    query_encrypted: bool,
}

#[derive(Serialize)]
struct InsertRequest<'a> {
    collection_name: &'a str,
    vectors: &'a [Vec<f32>],
    payloads: &'a [String],
}

#[derive(Deserialize)]
struct InsertResponse {
    insert_count: usize,
}

#[derive(Serialize)]
struct QueryRequest<'a> {
    collection_name: &'a str,
    vector: &'a [f32],
}

#[derive(Deserialize)]
struct QueryResponse {
    scores: Vec<f32>,
}

#[derive(Serialize)]
struct RetrieveRequest<'a> {
    collection_name: &'a str,
    indices: &'a [u64],
}

#[derive(Deserialize)]
struct RetrieveResponse {
    payloads: Vec<String>,
}

pub struct HttpBackend {
    client: Client,
}

impl HttpBackend {
    pub fn new(timeout: Duration) -> Result<Self, VectorStoreError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    fn base_url(endpoint: &StorageEndpoint) -> Result<String, VectorStoreError> {
        let base = format!("http://{}:{}", endpoint.host, endpoint.port);
        reqwest::Url::parse(&base)
            .map_err(|e| VectorStoreError::InvalidConfig(format!("Invalid URL {}: {}", base, e)))?;
        Ok(base)
    }

    async fn check(response: Response, action: &str) -> Result<Response, VectorStoreError> {
        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(VectorStoreError::BackendUnavailable(format!(
                "{} failed with status {}: {}",
                action, status, error_text
            )));
        }
        Ok(response)
    }

    async fn post<B: Serialize + Sync, R: DeserializeOwned>(
        &self,
        handle: &ConnectionHandle,
        path: &str,
        body: &B,
        action: &str,
    ) -> Result<R, VectorStoreError> {
        let url = format!("{}{}", Self::base_url(&handle.endpoint)?, path);
        let response = self.client.post(&url).json(body).send().await?;
        let response = Self::check(response, action).await?;
        Ok(response.json::<R>().await?)
    }
}

#[async_trait]
impl StorageBackend for HttpBackend {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn connect(&self, endpoint: &StorageEndpoint) -> Result<ConnectionHandle, VectorStoreError> {
        Self::base_url(endpoint)?;
        debug!(endpoint = %endpoint, "Opening storage connection");
        Ok(ConnectionHandle::new(endpoint.clone()))
    }

    async fn setup_collection(
        &self,
        handle: &ConnectionHandle,
        config: &CollectionConfig,
    ) -> Result<(), VectorStoreError> {
        let body = SetupRequest {
            collection_name: &config.name,
            dimension: config.dimension,
            metric: config.metric.as_str(),
            query_encrypted: config.query_encrypted,
        };
        let url = format!("{}/collections/setup", Self::base_url(&handle.endpoint)?);
        let response = self.client.post(&url).json(&body).send().await?;
        Self::check(response, "Collection setup").await?;
        Ok(())
    }

    async fn drop_collection(
        &self,
        handle: &ConnectionHandle,
        collection: &str,
    ) -> Result<(), VectorStoreError> {
        let url = format!(
            "{}/collections/{}",
            Self::base_url(&handle.endpoint)?,
            collection
        );
        let response = self.client.delete(&url).send().await?;
        Self::check(response, "Collection drop").await?;
        Ok(())
    }

    async fn insert(
        &self,
        handle: &ConnectionHandle,
        collection: &str,
        vectors: &[Vec<f32>],
        payloads: &[String],
    ) -> Result<usize, VectorStoreError> {
        let body = InsertRequest {
            collection_name: collection,
            vectors,
            payloads,
        };
        let result: InsertResponse = self
            .post(handle, "/collections/insert", &body, "Insert")
            .await?;
        Ok(result.insert_count)
    }

    async fn query(
        &self,
        handle: &ConnectionHandle,
        collection: &str,
        vector: &[f32],
    ) -> Result<Vec<f32>, VectorStoreError> {
        let body = QueryRequest {
            collection_name: collection,
            vector,
        };
        let result: QueryResponse = self
            .post(handle, "/collections/query", &body, "Query")
            .await?;
        Ok(result.scores)
    }

    async fn retrieve(
        &self,
        handle: &ConnectionHandle,
        collection: &str,
        index: u64,
    ) -> Result<String, VectorStoreError> {
        self.retrieve_batch(handle, collection, &[index])
            .await?
            .pop()
            .ok_or_else(|| VectorStoreError::RecordNotFound {
                collection: collection.to_string(),
                index,
            })
    }

    async fn retrieve_batch(
        &self,
        handle: &ConnectionHandle,
        collection: &str,
        indices: &[u64],
    ) -> Result<Vec<String>, VectorStoreError> {
        let body = RetrieveRequest {
            collection_name: collection,
            indices,
        };
        let result: RetrieveResponse = self
            .post(handle, "/collections/retrieve", &body, "Retrieve")
            .await?;

        if result.payloads.len() != indices.len() {
            warn!(
                requested = indices.len(),
                returned = result.payloads.len(),
                "Storage server returned a partial batch"
            );
            return Err(VectorStoreError::BackendUnavailable(format!(
                "requested {} payloads, received {}",
                indices.len(),
                result.payloads.len()
            )));
        }
        Ok(result.payloads)
    }

    async fn disconnect(&self, handle: &ConnectionHandle) -> Result<(), VectorStoreError> {
        let url = format!("{}/terminate", Self::base_url(&handle.endpoint)?);
        let response = self.client.post(&url).send().await?;
        Self::check(response, "Terminate").await?;
        Ok(())
    }
}
