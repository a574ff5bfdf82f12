// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod backend;
pub mod client;
pub mod collection;
pub mod errors;
pub mod http;
pub mod memory;
pub mod record;

pub use backend::{ConnectionHandle, StorageBackend, StorageEndpoint};
pub use client::VectorStoreClient;
pub use collection::{
    CollectionConfig, CollectionKind, CollectionSet, DistanceMetric, CHAT_COLLECTION_NAME,
    CHAT_DIMENSION, SCREEN_COLLECTION_NAME, SCREEN_DIMENSION,
};
pub use errors::VectorStoreError;
pub use http::HttpBackend;
pub use memory::MemoryBackend;
pub use record::{
    decode_payload, encode_payload, DecodedPayload, MediaInfo, SourceType, VectorRecord,
    FALLBACK_ROLE, NO_SESSION,
};
