// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Embedding manager lifecycle tests against a scripted inference backend
//!
//! The fake tokenizer exposes `input_ids` only through the backend-specific
//! buffer and `attention_mask` only through `data`, so every forward pass
//! exercises the tensor fixup.

use async_trait::async_trait;
use context_recall::embeddings::{
    BackendSettings, EmbeddingError, EmbeddingManager, EncoderModel, EncoderPaths,
    InferenceBackend, LoadOptions, ModelInputs, ModelOutput, RawTensor, TensorLocation,
    TextTokenizer, TokenizeOptions, TokenizerOutput,
};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

struct FakeTokenizer;

#[async_trait]
impl TextTokenizer for FakeTokenizer {
    async fn tokenize(
        &self,
        text: &str,
        options: TokenizeOptions,
    ) -> Result<TokenizerOutput, EmbeddingError> {
        assert!(options.padding && options.truncation);
        let ids: Vec<i64> = text.bytes().map(i64::from).collect();
        let len = ids.len();

        let mut output = TokenizerOutput::new();
        output.insert("input_ids".into(), RawTensor::with_cpu_data(vec![1, len], ids));
        output.insert(
            "attention_mask".into(),
            RawTensor::with_data(vec![1, len], vec![1; len]),
        );
        Ok(output)
    }
}

struct FakeEncoder {
    name: String,
    hidden: Vec<f32>,
    seen: Arc<Mutex<Vec<ModelInputs>>>,
    disposed: Arc<AtomicUsize>,
}

#[async_trait]
impl EncoderModel for FakeEncoder {
    fn name(&self) -> &str {
        &self.name
    }

    async fn forward(&self, inputs: ModelInputs) -> Result<ModelOutput, EmbeddingError> {
        self.seen.lock().unwrap().push(inputs);
        Ok(ModelOutput {
            last_hidden_state: RawTensor::with_cpu_data(vec![1, 2, 4], self.hidden.clone()),
        })
    }

    fn supports_dispose(&self) -> bool {
        true
    }

    async fn dispose(&self) -> Result<(), EmbeddingError> {
        self.disposed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
struct FakeBackend {
    settings: Mutex<Option<BackendSettings>>,
    loaded: Mutex<Vec<String>>,
    seen: Arc<Mutex<Vec<ModelInputs>>>,
    disposed: Arc<AtomicUsize>,
    fail_model: Option<String>,
}

#[async_trait]
impl InferenceBackend for FakeBackend {
    fn configure(&self, settings: BackendSettings) -> Result<(), EmbeddingError> {
        *self.settings.lock().unwrap() = Some(settings);
        Ok(())
    }

    async fn load_tokenizer(
        &self,
        model_name: &str,
        options: LoadOptions,
    ) -> Result<Arc<dyn TextTokenizer>, EmbeddingError> {
        assert!(options.local_only);
        // Suspend so a concurrent initialize can interleave
        tokio::task::yield_now().await;
        self.loaded.lock().unwrap().push(format!("tokenizer:{}", model_name));
        Ok(Arc::new(FakeTokenizer))
    }

    async fn load_model(
        &self,
        model_name: &str,
        options: LoadOptions,
    ) -> Result<Arc<dyn EncoderModel>, EmbeddingError> {
        assert!(options.local_only);
        if self.fail_model.as_deref() == Some(model_name) {
            return Err(EmbeddingError::model_load(model_name, "weights missing"));
        }
        self.loaded.lock().unwrap().push(format!("model:{}", model_name));

        let hidden = if model_name.contains("query") {
            vec![10.0, 20.0, 30.0, 40.0, 50.0, 60.0, 70.0, 80.0]
        } else {
            vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]
        };
        Ok(Arc::new(FakeEncoder {
            name: model_name.to_string(),
            hidden,
            seen: self.seen.clone(),
            disposed: self.disposed.clone(),
        }))
    }
}

fn paths() -> EncoderPaths {
    EncoderPaths::new("/models/dragon-query", "/models/dragon-context")
}

#[tokio::test]
async fn test_embed_before_initialize_fails() {
    let manager = EmbeddingManager::new(Arc::new(FakeBackend::default()));

    let query = manager.embed_query("hello").await;
    assert!(matches!(query, Err(EmbeddingError::NotInitialized { .. })));

    let context = manager.embed_context("hello").await;
    assert!(matches!(context, Err(EmbeddingError::NotInitialized { .. })));

    assert!(!manager.is_ready().await);
}

#[tokio::test]
async fn test_initialize_configures_local_only_root() {
    let backend = Arc::new(FakeBackend::default());
    let manager = EmbeddingManager::new(backend.clone());

    manager.initialize(&paths()).await.unwrap();
    assert!(manager.is_ready().await);

    let settings = backend.settings.lock().unwrap().clone().unwrap();
    assert_eq!(settings.local_model_root, PathBuf::from("/models"));
    assert!(!settings.allow_remote_models);
    assert!(!settings.use_file_cache);
    assert_eq!(settings.num_threads, 1);

    assert_eq!(
        *backend.loaded.lock().unwrap(),
        vec![
            "tokenizer:dragon-query".to_string(),
            "model:dragon-query".to_string(),
            "model:dragon-context".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_second_initialize_is_noop() {
    let backend = Arc::new(FakeBackend::default());
    let manager = EmbeddingManager::new(backend.clone());

    manager.initialize(&paths()).await.unwrap();
    manager.initialize(&paths()).await.unwrap();

    assert_eq!(backend.loaded.lock().unwrap().len(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_initialize_loads_once() {
    let backend = Arc::new(FakeBackend::default());
    let manager = Arc::new(EmbeddingManager::new(backend.clone()));

    let (first, second) = tokio::join!(
        {
            let manager = manager.clone();
            async move { manager.initialize(&paths()).await }
        },
        {
            let manager = manager.clone();
            async move { manager.initialize(&paths()).await }
        }
    );
    first.unwrap();
    second.unwrap();

    assert!(manager.is_ready().await);
    assert_eq!(backend.loaded.lock().unwrap().len(), 3);
}

#[tokio::test]
async fn test_embeddings_take_sequence_position_zero() {
    let manager = EmbeddingManager::new(Arc::new(FakeBackend::default()));
    manager.initialize(&paths()).await.unwrap();

    assert_eq!(
        manager.embed_query("hi").await.unwrap(),
        vec![10.0, 20.0, 30.0, 40.0]
    );
    assert_eq!(
        manager.embed_context("hi").await.unwrap(),
        vec![1.0, 2.0, 3.0, 4.0]
    );
}

#[tokio::test]
async fn test_model_sees_normalized_tensors() {
    let backend = Arc::new(FakeBackend::default());
    let manager = EmbeddingManager::new(backend.clone());
    manager.initialize(&paths()).await.unwrap();

    manager.embed_query("ab").await.unwrap();

    let seen = backend.seen.lock().unwrap();
    let inputs = &seen[0];
    assert_eq!(inputs.len(), 2);

    let ids = &inputs["input_ids"];
    assert_eq!(ids.data, vec![97, 98]);
    assert_eq!(ids.location, TensorLocation::Cpu);
    assert_eq!(ids.dims, vec![1, 2]);

    let mask = &inputs["attention_mask"];
    assert_eq!(mask.data, vec![1, 1]);
    assert_eq!(mask.location, TensorLocation::Cpu);
}

#[tokio::test]
async fn test_embed_contexts_keeps_order() {
    let backend = Arc::new(FakeBackend::default());
    let manager = EmbeddingManager::new(backend.clone());
    manager.initialize(&paths()).await.unwrap();

    let texts = vec!["one".to_string(), "three".to_string()];
    let vectors = manager.embed_contexts(&texts).await.unwrap();

    assert_eq!(vectors.len(), 2);
    let seen = backend.seen.lock().unwrap();
    assert_eq!(seen[0]["input_ids"].dims, vec![1, 3]);
    assert_eq!(seen[1]["input_ids"].dims, vec![1, 5]);
}

#[tokio::test]
async fn test_cleanup_is_idempotent() {
    let backend = Arc::new(FakeBackend::default());
    let manager = EmbeddingManager::new(backend.clone());
    manager.initialize(&paths()).await.unwrap();

    manager.cleanup().await;
    assert!(!manager.is_ready().await);
    assert_eq!(backend.disposed.load(Ordering::SeqCst), 2);

    manager.cleanup().await;
    assert!(!manager.is_ready().await);
    assert_eq!(backend.disposed.load(Ordering::SeqCst), 2);

    let after = manager.embed_query("hello").await;
    assert!(matches!(after, Err(EmbeddingError::NotInitialized { .. })));
}

#[tokio::test]
async fn test_failed_model_load_names_the_model() {
    let backend = Arc::new(FakeBackend {
        fail_model: Some("dragon-context".to_string()),
        ..Default::default()
    });
    let manager = EmbeddingManager::new(backend);

    let err = manager.initialize(&paths()).await.unwrap_err();
    assert!(err.to_string().contains("dragon-context"));
    assert!(!manager.is_ready().await);
}

#[tokio::test]
async fn test_query_path_without_parent_is_rejected() {
    let manager = EmbeddingManager::new(Arc::new(FakeBackend::default()));
    let result = manager
        .initialize(&EncoderPaths::new("dragon-query", "dragon-context"))
        .await;
    assert!(matches!(result, Err(EmbeddingError::InvalidConfig(_))));
}
