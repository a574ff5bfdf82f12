// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod cli;
pub mod config;
pub mod embeddings;
pub mod retrieval;
pub mod vector;

pub use config::RetrievalConfig;
pub use embeddings::{EmbeddingError, EmbeddingManager, EncoderPaths, OnnxBackend};
pub use retrieval::{Retriever, RetrievalOptions, SearchRequest};
pub use vector::{
    CollectionKind, MemoryBackend, StorageBackend, VectorRecord, VectorStoreClient,
    VectorStoreError,
};
