// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Embedding Manager
//!
//! Owns the query encoder, the context encoder and the tokenizer they share.
//! Both encoders live under one local model root (the parent directory of the
//! query encoder path) and are loaded by their directory names.
//!
//! Lifecycle: empty -> [`EmbeddingManager::initialize`] -> ready ->
//! [`EmbeddingManager::cleanup`] -> not ready. Initializing a ready manager is
//! a no-op; concurrent `initialize` calls are serialized by the state lock.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::backend::{
    BackendSettings, EncoderModel, InferenceBackend, LoadOptions, TextTokenizer, TokenizeOptions,
};
use super::errors::EmbeddingError;
use super::tensor::{extract_cls_embedding, normalize_inputs};

/// Paths to the two encoder directories
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderPaths {
    pub query_encoder_path: PathBuf,
    pub context_encoder_path: PathBuf,
}

impl EncoderPaths {
    pub fn new(query: impl Into<PathBuf>, context: impl Into<PathBuf>) -> Self {
        Self {
            query_encoder_path: query.into(),
            context_encoder_path: context.into(),
        }
    }
}

/// Which encoder an embedding comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncoderKind {
    Query,
    Context,
}

impl EncoderKind {
    fn label(self) -> &'static str {
        match self {
            EncoderKind::Query => "query encoder",
            EncoderKind::Context => "context encoder",
        }
    }
}

#[derive(Default)]
struct EncoderState {
    tokenizer: Option<Arc<dyn TextTokenizer>>,
    query: Option<Arc<dyn EncoderModel>>,
    context: Option<Arc<dyn EncoderModel>>,
}

impl EncoderState {
    fn is_ready(&self) -> bool {
        self.tokenizer.is_some() && self.query.is_some() && self.context.is_some()
    }
}

pub struct EmbeddingManager {
    backend: Arc<dyn InferenceBackend>,
    state: Mutex<EncoderState>,
}

impl std::fmt::Debug for EmbeddingManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingManager").finish_non_exhaustive()
    }
}

impl EmbeddingManager {
    pub fn new(backend: Arc<dyn InferenceBackend>) -> Self {
        Self {
            backend,
            state: Mutex::new(EncoderState::default()),
        }
    }

    /// Load the tokenizer and both encoders.
    ///
    /// The backend is configured for local-only resolution rooted at the
    /// parent of `query_encoder_path`, with remote fetching and file caching
    /// disabled and a single intra-op thread. The tokenizer is loaded under the
    /// query encoder's name.
    pub async fn initialize(&self, paths: &EncoderPaths) -> Result<(), EmbeddingError> {
        let mut state = self.state.lock().await;
        if state.is_ready() {
            debug!("Embedding manager already initialized, skipping");
            return Ok(());
        }

        let root = model_root(&paths.query_encoder_path)?;
        let query_name = model_name(&paths.query_encoder_path)?;
        let context_name = model_name(&paths.context_encoder_path)?;

        if paths.context_encoder_path.parent() != Some(root.as_path()) {
            warn!(
                root = %root.display(),
                context = %paths.context_encoder_path.display(),
                "Context encoder is outside the query encoder's model root; resolving by name under the root"
            );
        }

        info!(
            root = %root.display(),
            query = %query_name,
            context = %context_name,
            "Initializing embedding manager"
        );

        self.backend.configure(BackendSettings::local_only(&root))?;

        let options = LoadOptions { local_only: true };
        let tokenizer = self.backend.load_tokenizer(&query_name, options).await?;
        let query = self.backend.load_model(&query_name, options).await?;
        let context = self.backend.load_model(&context_name, options).await?;

        *state = EncoderState {
            tokenizer: Some(tokenizer),
            query: Some(query),
            context: Some(context),
        };

        info!("Embedding manager ready");
        Ok(())
    }

    /// Embed a search query with the query encoder
    pub async fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.embed(EncoderKind::Query, text).await
    }

    /// Embed a passage with the context encoder
    pub async fn embed_context(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.embed(EncoderKind::Context, text).await
    }

    /// Embed passages one at a time with the context encoder, in input order
    pub async fn embed_contexts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for text in texts {
            embeddings.push(self.embed_context(text).await?);
        }
        Ok(embeddings)
    }

    pub async fn embed(&self, kind: EncoderKind, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let (tokenizer, model) = {
            let state = self.state.lock().await;
            let model = match kind {
                EncoderKind::Query => state.query.clone(),
                EncoderKind::Context => state.context.clone(),
            };
            let model = model.ok_or_else(|| EmbeddingError::not_initialized(kind.label()))?;
            let tokenizer = state
                .tokenizer
                .clone()
                .ok_or_else(|| EmbeddingError::not_initialized("tokenizer"))?;
            (tokenizer, model)
        };

        let tokens = tokenizer.tokenize(text, TokenizeOptions::default()).await?;
        let inputs = normalize_inputs(tokens)?;
        let output = model.forward(inputs).await?;
        let embedding = extract_cls_embedding(&output.last_hidden_state)?;

        debug!(
            encoder = kind.label(),
            dimension = embedding.len(),
            "Generated embedding"
        );
        Ok(embedding)
    }

    /// True once both encoders and the tokenizer are loaded and not disposed
    pub async fn is_ready(&self) -> bool {
        self.state.lock().await.is_ready()
    }

    /// Dispose both encoders and drop the tokenizer. Safe to call repeatedly.
    pub async fn cleanup(&self) {
        let mut state = self.state.lock().await;
        let previous = std::mem::take(&mut *state);

        for model in [previous.query, previous.context].into_iter().flatten() {
            if !model.supports_dispose() {
                continue;
            }
            if let Err(e) = model.dispose().await {
                warn!(model = model.name(), error = %e, "Failed to dispose encoder");
            }
        }

        if previous.tokenizer.is_some() {
            info!("Embedding manager cleaned up");
        }
    }
}

fn model_root(query_path: &Path) -> Result<PathBuf, EmbeddingError> {
    query_path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .ok_or_else(|| {
            EmbeddingError::InvalidConfig(format!(
                "query encoder path has no parent directory: {}",
                query_path.display()
            ))
        })
}

fn model_name(path: &Path) -> Result<String, EmbeddingError> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .ok_or_else(|| {
            EmbeddingError::InvalidConfig(format!("encoder path has no basename: {}", path.display()))
        })
}
