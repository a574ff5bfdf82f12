// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Runtime configuration
//!
//! Defaults match the fixed collection layout (768-d inner product chat,
//! 512-d cosine screen). Values can come from a TOML file or from the
//! environment; `validate` runs before anything is built from them.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::embeddings::{EncoderPaths, DEFAULT_MAX_LENGTH};
use crate::retrieval::RetrievalOptions;
use crate::vector::http::DEFAULT_TIMEOUT_MS;
use crate::vector::{
    CollectionSet, HttpBackend, MemoryBackend, StorageBackend, StorageEndpoint, VectorStoreClient,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Memory,
    Http,
}

impl FromStr for BackendKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(BackendKind::Memory),
            "http" => Ok(BackendKind::Http),
            other => Err(anyhow!("Unknown vector store backend: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorStoreSettings {
    pub backend: BackendKind,
    pub host: String,
    pub port: u16,
    pub timeout_ms: u64,
}

impl Default for VectorStoreSettings {
    fn default() -> Self {
        let endpoint = StorageEndpoint::default();
        Self {
            backend: BackendKind::Memory,
            host: endpoint.host,
            port: endpoint.port,
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderSettings {
    pub query_encoder_path: PathBuf,
    pub context_encoder_path: PathBuf,
    pub max_sequence_length: usize,
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self {
            query_encoder_path: PathBuf::from("./models/dragon-plus-query-encoder"),
            context_encoder_path: PathBuf::from("./models/dragon-plus-context-encoder"),
            max_sequence_length: DEFAULT_MAX_LENGTH,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub vector_store: VectorStoreSettings,
    pub encoders: EncoderSettings,
    pub retrieval: RetrievalOptions,
    pub collections: CollectionSet,
}

impl RetrievalConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: RetrievalConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    /// Defaults overridden by whichever environment variables are set
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(backend) = env_parse::<BackendKind>("VECTOR_STORE_BACKEND") {
            config.vector_store.backend = backend;
        }
        if let Ok(host) = std::env::var("VECTOR_STORE_HOST") {
            config.vector_store.host = host;
        }
        if let Some(port) = env_parse("VECTOR_STORE_PORT") {
            config.vector_store.port = port;
        }
        if let Some(timeout) = env_parse("VECTOR_STORE_TIMEOUT_MS") {
            config.vector_store.timeout_ms = timeout;
        }
        if let Ok(path) = std::env::var("QUERY_ENCODER_PATH") {
            config.encoders.query_encoder_path = PathBuf::from(path);
        }
        if let Ok(path) = std::env::var("CONTEXT_ENCODER_PATH") {
            config.encoders.context_encoder_path = PathBuf::from(path);
        }
        if let Some(len) = env_parse("MAX_SEQUENCE_LENGTH") {
            config.encoders.max_sequence_length = len;
        }
        if let Some(k) = env_parse("CHAT_TOP_K") {
            config.retrieval.chat_top_k = k;
        }
        if let Some(k) = env_parse("SCREEN_TOP_K") {
            config.retrieval.screen_top_k = k;
        }
        if let Some(size) = env_parse("SCREEN_BATCH_SIZE") {
            config.retrieval.screen_batch_size = size;
        }

        config
    }

    pub fn validate(&self) -> Result<()> {
        self.collections.validate()?;

        if self.retrieval.screen_batch_size == 0 {
            return Err(anyhow!("screen_batch_size must be greater than 0"));
        }
        if self.encoders.max_sequence_length == 0 {
            return Err(anyhow!("max_sequence_length must be greater than 0"));
        }
        if self.vector_store.backend == BackendKind::Http && self.vector_store.host.is_empty() {
            return Err(anyhow!("vector store host is required for the http backend"));
        }
        if self.vector_store.timeout_ms == 0 {
            return Err(anyhow!("timeout_ms must be greater than 0"));
        }
        Ok(())
    }

    pub fn endpoint(&self) -> StorageEndpoint {
        StorageEndpoint::new(self.vector_store.host.clone(), self.vector_store.port)
    }

    pub fn encoder_paths(&self) -> EncoderPaths {
        EncoderPaths::new(
            self.encoders.query_encoder_path.clone(),
            self.encoders.context_encoder_path.clone(),
        )
    }

    pub fn build_backend(&self) -> Result<Arc<dyn StorageBackend>> {
        let backend: Arc<dyn StorageBackend> = match self.vector_store.backend {
            BackendKind::Memory => Arc::new(MemoryBackend::new()),
            BackendKind::Http => Arc::new(HttpBackend::new(Duration::from_millis(
                self.vector_store.timeout_ms,
            ))?),
        };
        Ok(backend)
    }

    pub fn build_client(&self) -> Result<VectorStoreClient> {
        Ok(VectorStoreClient::with_collections(
            self.build_backend()?,
            self.endpoint(),
            self.collections.clone(),
        ))
    }
}

fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Ignoring unparseable {}={}", name, raw);
            None
        }
    }
}
