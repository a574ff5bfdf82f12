// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Error types for the vector store client and its backends

use thiserror::Error;

#[derive(Error, Debug)]
pub enum VectorStoreError {
    /// Connecting to or calling the storage backend failed
    #[error("Storage backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Vector width does not match the collection's fixed dimension
    #[error("Dimension mismatch for {collection}: expected {expected}, got {actual}")]
    DimensionMismatch {
        collection: String,
        expected: usize,
        actual: usize,
    },

    /// Vectors and payloads are positionally paired and must be equal length
    #[error("Length mismatch: {vectors} vectors, {payloads} payloads")]
    LengthMismatch { vectors: usize, payloads: usize },

    #[error("Unknown collection: {0}")]
    UnknownCollection(String),

    #[error("Record {index} not found in {collection}")]
    RecordNotFound { collection: String, index: u64 },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl From<reqwest::Error> for VectorStoreError {
    fn from(err: reqwest::Error) -> Self {
        VectorStoreError::BackendUnavailable(err.to_string())
    }
}
