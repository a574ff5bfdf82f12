// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Error types for the embedding pipeline

use thiserror::Error;

/// Errors raised while loading encoders or producing embeddings
#[derive(Error, Debug)]
pub enum EmbeddingError {
    /// An embed call was made before the named component was loaded
    #[error("{component} is not initialized")]
    NotInitialized { component: String },

    /// Encoder paths or backend settings are unusable
    #[error("Invalid embedding configuration: {0}")]
    InvalidConfig(String),

    /// Model or tokenizer failed to load
    #[error("Failed to load {model}: {reason}")]
    ModelLoad { model: String, reason: String },

    #[error("Tokenization failed: {0}")]
    Tokenization(String),

    #[error("Inference failed: {0}")]
    Inference(String),

    /// Tensor exposes neither `data` nor the backend-specific buffer
    #[error("Tensor field '{field}' has no data buffer")]
    MissingTensorData { field: String },

    #[error("Invalid tensor shape: {0}")]
    InvalidShape(String),
}

impl EmbeddingError {
    pub fn not_initialized(component: impl Into<String>) -> Self {
        Self::NotInitialized {
            component: component.into(),
        }
    }

    pub fn model_load(model: impl Into<String>, reason: impl ToString) -> Self {
        Self::ModelLoad {
            model: model.into(),
            reason: reason.to_string(),
        }
    }
}

impl From<ort::Error> for EmbeddingError {
    fn from(err: ort::Error) -> Self {
        EmbeddingError::Inference(err.to_string())
    }
}
