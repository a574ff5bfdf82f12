// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Inference backend seam
//!
//! The embedding manager never touches model weights directly. It asks an
//! [`InferenceBackend`] for a tokenizer and for encoder models, then drives
//! them through [`TextTokenizer::tokenize`] and [`EncoderModel::forward`].

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;

use super::errors::EmbeddingError;
use super::tensor::{ModelInputs, RawTensor, TokenizerOutput};

/// Process-level backend configuration applied once before loading
#[derive(Debug, Clone, PartialEq)]
pub struct BackendSettings {
    /// Directory that model names resolve against
    pub local_model_root: PathBuf,
    pub allow_remote_models: bool,
    pub use_file_cache: bool,
    /// Intra-op threads for the numeric backend; 1 keeps execution single-threaded
    pub num_threads: usize,
}

impl BackendSettings {
    /// Local-only, uncached, single-threaded settings rooted at `root`
    pub fn local_only(root: impl Into<PathBuf>) -> Self {
        Self {
            local_model_root: root.into(),
            allow_remote_models: false,
            use_file_cache: false,
            num_threads: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadOptions {
    pub local_only: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self { local_only: true }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenizeOptions {
    pub padding: bool,
    pub truncation: bool,
}

impl Default for TokenizeOptions {
    fn default() -> Self {
        Self {
            padding: true,
            truncation: true,
        }
    }
}

/// Output of an encoder forward pass
#[derive(Debug, Clone)]
pub struct ModelOutput {
    /// `[batch, sequence, hidden]`
    pub last_hidden_state: RawTensor<f32>,
}

#[async_trait]
pub trait TextTokenizer: Send + Sync {
    async fn tokenize(
        &self,
        text: &str,
        options: TokenizeOptions,
    ) -> Result<TokenizerOutput, EmbeddingError>;
}

#[async_trait]
pub trait EncoderModel: Send + Sync {
    fn name(&self) -> &str;

    async fn forward(&self, inputs: ModelInputs) -> Result<ModelOutput, EmbeddingError>;

    /// Whether [`EncoderModel::dispose`] releases anything
    fn supports_dispose(&self) -> bool {
        false
    }

    async fn dispose(&self) -> Result<(), EmbeddingError> {
        Ok(())
    }
}

#[async_trait]
pub trait InferenceBackend: Send + Sync {
    fn configure(&self, settings: BackendSettings) -> Result<(), EmbeddingError>;

    async fn load_tokenizer(
        &self,
        model_name: &str,
        options: LoadOptions,
    ) -> Result<Arc<dyn TextTokenizer>, EmbeddingError>;

    async fn load_model(
        &self,
        model_name: &str,
        options: LoadOptions,
    ) -> Result<Arc<dyn EncoderModel>, EmbeddingError>;
}
