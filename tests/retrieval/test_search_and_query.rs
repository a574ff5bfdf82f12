// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! End-to-end search tests over the in-memory backend, with a wrapper that
//! records every query and batch retrieval the orchestrator issues.

use async_trait::async_trait;
use context_recall::retrieval::{RetrievalOptions, Retriever, SearchRequest};
use context_recall::vector::{
    CollectionConfig, CollectionKind, ConnectionHandle, MemoryBackend, StorageBackend,
    StorageEndpoint, VectorRecord, VectorStoreClient, VectorStoreError, CHAT_COLLECTION_NAME,
    CHAT_DIMENSION, SCREEN_COLLECTION_NAME, SCREEN_DIMENSION,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Barrier;

#[derive(Default)]
struct RecordingBackend {
    inner: MemoryBackend,
    queries: Mutex<Vec<String>>,
    batches: Mutex<Vec<(String, Vec<u64>)>>,
}

impl RecordingBackend {
    fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }

    fn batches_for(&self, collection: &str) -> Vec<Vec<u64>> {
        self.batches
            .lock()
            .unwrap()
            .iter()
            .filter(|(c, _)| c == collection)
            .map(|(_, indices)| indices.clone())
            .collect()
    }
}

#[async_trait]
impl StorageBackend for RecordingBackend {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn connect(&self, endpoint: &StorageEndpoint) -> Result<ConnectionHandle, VectorStoreError> {
        self.inner.connect(endpoint).await
    }

    async fn setup_collection(
        &self,
        handle: &ConnectionHandle,
        config: &CollectionConfig,
    ) -> Result<(), VectorStoreError> {
        self.inner.setup_collection(handle, config).await
    }

    async fn drop_collection(
        &self,
        handle: &ConnectionHandle,
        collection: &str,
    ) -> Result<(), VectorStoreError> {
        self.inner.drop_collection(handle, collection).await
    }

    async fn insert(
        &self,
        handle: &ConnectionHandle,
        collection: &str,
        vectors: &[Vec<f32>],
        payloads: &[String],
    ) -> Result<usize, VectorStoreError> {
        self.inner.insert(handle, collection, vectors, payloads).await
    }

    async fn query(
        &self,
        handle: &ConnectionHandle,
        collection: &str,
        vector: &[f32],
    ) -> Result<Vec<f32>, VectorStoreError> {
        self.queries.lock().unwrap().push(collection.to_string());
        self.inner.query(handle, collection, vector).await
    }

    async fn retrieve(
        &self,
        handle: &ConnectionHandle,
        collection: &str,
        index: u64,
    ) -> Result<String, VectorStoreError> {
        self.inner.retrieve(handle, collection, index).await
    }

    async fn retrieve_batch(
        &self,
        handle: &ConnectionHandle,
        collection: &str,
        indices: &[u64],
    ) -> Result<Vec<String>, VectorStoreError> {
        self.batches
            .lock()
            .unwrap()
            .push((collection.to_string(), indices.to_vec()));
        self.inner.retrieve_batch(handle, collection, indices).await
    }

    async fn disconnect(&self, handle: &ConnectionHandle) -> Result<(), VectorStoreError> {
        self.inner.disconnect(handle).await
    }
}

/// Backend whose batch retrievals only complete once two are in flight
struct RendezvousBackend {
    inner: MemoryBackend,
    barrier: Barrier,
}

impl RendezvousBackend {
    fn new() -> Self {
        Self {
            inner: MemoryBackend::new(),
            barrier: Barrier::new(2),
        }
    }
}

#[async_trait]
impl StorageBackend for RendezvousBackend {
    fn name(&self) -> &'static str {
        "rendezvous"
    }

    async fn connect(&self, endpoint: &StorageEndpoint) -> Result<ConnectionHandle, VectorStoreError> {
        self.inner.connect(endpoint).await
    }

    async fn setup_collection(
        &self,
        handle: &ConnectionHandle,
        config: &CollectionConfig,
    ) -> Result<(), VectorStoreError> {
        self.inner.setup_collection(handle, config).await
    }

    async fn drop_collection(
        &self,
        handle: &ConnectionHandle,
        collection: &str,
    ) -> Result<(), VectorStoreError> {
        self.inner.drop_collection(handle, collection).await
    }

    async fn insert(
        &self,
        handle: &ConnectionHandle,
        collection: &str,
        vectors: &[Vec<f32>],
        payloads: &[String],
    ) -> Result<usize, VectorStoreError> {
        self.inner.insert(handle, collection, vectors, payloads).await
    }

    async fn query(
        &self,
        handle: &ConnectionHandle,
        collection: &str,
        vector: &[f32],
    ) -> Result<Vec<f32>, VectorStoreError> {
        self.inner.query(handle, collection, vector).await
    }

    async fn retrieve(
        &self,
        handle: &ConnectionHandle,
        collection: &str,
        index: u64,
    ) -> Result<String, VectorStoreError> {
        self.inner.retrieve(handle, collection, index).await
    }

    async fn retrieve_batch(
        &self,
        handle: &ConnectionHandle,
        collection: &str,
        indices: &[u64],
    ) -> Result<Vec<String>, VectorStoreError> {
        self.barrier.wait().await;
        self.inner.retrieve_batch(handle, collection, indices).await
    }

    async fn disconnect(&self, handle: &ConnectionHandle) -> Result<(), VectorStoreError> {
        self.inner.disconnect(handle).await
    }
}

/// Vector whose inner product / cosine with `probe(dimension)` is `score`
fn scored_vector(dimension: usize, score: f32) -> Vec<f32> {
    let mut v = vec![0.0; dimension];
    v[0] = score;
    v[1] = (1.0 - score * score).max(0.0).sqrt();
    v
}

fn probe(dimension: usize) -> Vec<f32> {
    let mut v = vec![0.0; dimension];
    v[0] = 1.0;
    v
}

struct Fixture {
    backend: Arc<RecordingBackend>,
    retriever: Retriever,
}

fn fixture() -> Fixture {
    let backend = Arc::new(RecordingBackend::default());
    let client = Arc::new(VectorStoreClient::new(backend.clone(), StorageEndpoint::default()));
    Fixture {
        backend,
        retriever: Retriever::new(client),
    }
}

async fn seed_chat(retriever: &Retriever, scores: &[f32], sessions: &[i64]) {
    let records: Vec<VectorRecord> = scores
        .iter()
        .zip(sessions)
        .enumerate()
        .map(|(i, (&score, &session))| {
            VectorRecord::new(scored_vector(CHAT_DIMENSION, score), format!("chat {}", i), session, "user")
        })
        .collect();
    retriever.insert_chat_data(&records).await.unwrap();
}

async fn seed_screen(retriever: &Retriever, scores: &[f32], sessions: &[i64]) {
    let records: Vec<VectorRecord> = scores
        .iter()
        .zip(sessions)
        .enumerate()
        .map(|(i, (&score, &session))| {
            VectorRecord::new(scored_vector(SCREEN_DIMENSION, score), format!("screen {}", i), session, "screen")
        })
        .collect();
    retriever.insert_screen_data(&records).await.unwrap();
}

#[tokio::test]
async fn test_top_k_picks_highest_scores() {
    let f = fixture();
    seed_chat(&f.retriever, &[0.1, 0.9, 0.5, 0.9, 0.2], &[1; 5]).await;

    let request = SearchRequest::chat(probe(CHAT_DIMENSION)).with_chat_top_k(2);
    let records = f.retriever.search_and_query(&request).await.unwrap();

    let ids: Vec<u64> = records.iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![1, 3]);
    assert_eq!(f.backend.batches_for(CHAT_COLLECTION_NAME), vec![vec![1, 3]]);
}

#[tokio::test]
async fn test_chat_only_issues_no_screen_queries() {
    let f = fixture();
    seed_chat(&f.retriever, &[0.3, 0.6], &[1, 1]).await;
    seed_screen(&f.retriever, &[0.8], &[1]).await;

    let records = f
        .retriever
        .search_and_query(&SearchRequest::chat(probe(CHAT_DIMENSION)))
        .await
        .unwrap();

    assert_eq!(f.backend.queries(), vec![CHAT_COLLECTION_NAME.to_string()]);
    assert!(f.backend.batches_for(SCREEN_COLLECTION_NAME).is_empty());
    assert!(records.iter().all(|r| r.content.starts_with("chat")));
    assert_eq!(records.len(), 2);
}

#[tokio::test]
async fn test_screen_batches_of_three_in_index_order() {
    let f = fixture();
    let scores = [0.10, 0.20, 0.30, 0.40, 0.50, 0.60, 0.70, 0.05];
    seed_screen(&f.retriever, &scores, &[1; 8]).await;

    let request = SearchRequest::screen(probe(SCREEN_DIMENSION)).with_screen_top_k(7);
    let records = f.retriever.search_and_query(&request).await.unwrap();

    let batches = f.backend.batches_for(SCREEN_COLLECTION_NAME);
    let sizes: Vec<usize> = batches.iter().map(Vec::len).collect();
    assert_eq!(sizes, vec![3, 3, 1]);
    assert_eq!(batches.concat(), vec![6, 5, 4, 3, 2, 1, 0]);

    let ids: Vec<u64> = records.iter().map(|r| r.id).collect();
    assert_eq!(ids, batches.concat());
}

#[tokio::test]
async fn test_chat_results_come_before_screen_results() {
    let f = fixture();
    seed_chat(&f.retriever, &[0.4, 0.2], &[1, 1]).await;
    seed_screen(&f.retriever, &[0.99, 0.7], &[1, 1]).await;

    let request = SearchRequest::chat(probe(CHAT_DIMENSION)).with_screen(probe(SCREEN_DIMENSION));
    let records = f.retriever.search_and_query(&request).await.unwrap();

    let contents: Vec<&str> = records.iter().map(|r| r.content.as_str()).collect();
    assert_eq!(contents, vec!["chat 0", "chat 1", "screen 0", "screen 1"]);
}

#[tokio::test]
async fn test_session_exclusion_keeps_sentinel() {
    let f = fixture();
    seed_chat(&f.retriever, &[0.9, 0.8, 0.7], &[0, 5, 7]).await;

    let request = SearchRequest::chat(probe(CHAT_DIMENSION)).excluding_session(5);
    let records = f.retriever.search_and_query(&request).await.unwrap();

    let sessions: Vec<i64> = records.iter().map(|r| r.session_id).collect();
    assert_eq!(sessions, vec![0, 7]);
}

#[tokio::test]
async fn test_no_exclusion_returns_every_session() {
    let f = fixture();
    seed_chat(&f.retriever, &[0.9, 0.8, 0.7], &[0, 5, 7]).await;

    let records = f
        .retriever
        .search_and_query(&SearchRequest::chat(probe(CHAT_DIMENSION)))
        .await
        .unwrap();

    let sessions: Vec<i64> = records.iter().map(|r| r.session_id).collect();
    assert_eq!(sessions, vec![0, 5, 7]);
}

#[tokio::test]
async fn test_zero_top_k_retrieves_nothing() {
    let f = fixture();
    seed_chat(&f.retriever, &[0.9], &[1]).await;
    seed_screen(&f.retriever, &[0.9], &[1]).await;

    let request = SearchRequest::chat(probe(CHAT_DIMENSION))
        .with_chat_top_k(0)
        .with_screen(probe(SCREEN_DIMENSION))
        .with_screen_top_k(0);
    let records = f.retriever.search_and_query(&request).await.unwrap();

    assert!(records.is_empty());
    assert!(f.backend.queries().is_empty());
    assert!(f.backend.batches.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_empty_collections_return_empty() {
    let f = fixture();

    let request = SearchRequest::chat(probe(CHAT_DIMENSION)).with_screen(probe(SCREEN_DIMENSION));
    let records = f.retriever.search_and_query(&request).await.unwrap();

    assert!(records.is_empty());
    assert_eq!(f.backend.queries().len(), 2);
    assert!(f.backend.batches.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_malformed_screen_payload_is_returned_degraded() {
    let f = fixture();
    f.retriever
        .client()
        .insert_raw(
            CollectionKind::Screen,
            &[scored_vector(SCREEN_DIMENSION, 0.9)],
            &["{not json".to_string()],
        )
        .await
        .unwrap();

    let request = SearchRequest::screen(probe(SCREEN_DIMENSION)).excluding_session(3);
    let records = f.retriever.search_and_query(&request).await.unwrap();

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].content, "{not json");
    assert_eq!(records[0].session_id, 0);
    assert_eq!(records[0].role, "conversation");
}

#[tokio::test]
async fn test_custom_batch_size() {
    let backend = Arc::new(RecordingBackend::default());
    let client = Arc::new(VectorStoreClient::new(backend.clone(), StorageEndpoint::default()));
    let retriever = Retriever::with_options(
        client,
        RetrievalOptions {
            screen_batch_size: 2,
            ..Default::default()
        },
    );
    seed_screen(&retriever, &[0.1, 0.2, 0.3, 0.4, 0.5], &[1; 5]).await;

    let request = SearchRequest::screen(probe(SCREEN_DIMENSION)).with_screen_top_k(5);
    retriever.search_and_query(&request).await.unwrap();

    let sizes: Vec<usize> = backend
        .batches_for(SCREEN_COLLECTION_NAME)
        .iter()
        .map(Vec::len)
        .collect();
    assert_eq!(sizes, vec![2, 2, 1]);
}

#[tokio::test]
async fn test_chat_and_screen_fetches_overlap() {
    let backend = Arc::new(RendezvousBackend::new());
    let client = Arc::new(VectorStoreClient::new(backend.clone(), StorageEndpoint::default()));
    let retriever = Retriever::new(client);
    seed_chat(&retriever, &[0.9, 0.4], &[1, 1]).await;
    seed_screen(&retriever, &[0.8, 0.6], &[1, 1]).await;

    let request = SearchRequest::chat(probe(CHAT_DIMENSION)).with_screen(probe(SCREEN_DIMENSION));
    let records = tokio::time::timeout(Duration::from_secs(5), retriever.search_and_query(&request))
        .await
        .expect("chat and screen retrieval did not run together")
        .unwrap();

    let contents: Vec<&str> = records.iter().map(|r| r.content.as_str()).collect();
    assert_eq!(contents, vec!["chat 0", "chat 1", "screen 0", "screen 1"]);
}

#[tokio::test]
async fn test_mistyped_field_keeps_session_for_exclusion() {
    let f = fixture();
    let client = f.retriever.client();
    client
        .insert_raw(
            CollectionKind::Chat,
            &[
                scored_vector(CHAT_DIMENSION, 0.9),
                scored_vector(CHAT_DIMENSION, 0.8),
            ],
            &[
                r#"{"content":"from session five","session_id":5,"role":null,"message_ids":["m1"]}"#
                    .to_string(),
                r#"{"content":"from session seven","session_id":7,"role":"user"}"#.to_string(),
            ],
        )
        .await
        .unwrap();

    let all = f
        .retriever
        .search_and_query(&SearchRequest::chat(probe(CHAT_DIMENSION)))
        .await
        .unwrap();
    assert_eq!(all[0].content, "from session five");
    assert_eq!(all[0].session_id, 5);

    let request = SearchRequest::chat(probe(CHAT_DIMENSION)).excluding_session(5);
    let records = f.retriever.search_and_query(&request).await.unwrap();

    let contents: Vec<&str> = records.iter().map(|r| r.content.as_str()).collect();
    assert_eq!(contents, vec!["from session seven"]);
}
