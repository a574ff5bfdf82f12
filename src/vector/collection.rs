// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Collection configuration for the chat and screen collections

use serde::{Deserialize, Serialize};

use super::errors::VectorStoreError;

pub const CHAT_COLLECTION_NAME: &str = "chat_collection";
pub const SCREEN_COLLECTION_NAME: &str = "screen_collection";
pub const CHAT_DIMENSION: usize = 768;
pub const SCREEN_DIMENSION: usize = 512;

/// Similarity function used to score stored vectors against a query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DistanceMetric {
    #[serde(rename = "IP")]
    InnerProduct,
    #[serde(rename = "COSINE")]
    Cosine,
    #[serde(rename = "L2")]
    L2,
}

impl DistanceMetric {
    /// Score `candidate` against `query`; higher always means more similar.
    ///
    /// L2 is reported as the negated squared distance so every metric ranks
    /// in descending order.
    pub fn score(self, query: &[f32], candidate: &[f32]) -> f32 {
        match self {
            DistanceMetric::InnerProduct => dot(query, candidate),
            DistanceMetric::Cosine => {
                let norm_q = dot(query, query).sqrt();
                let norm_c = dot(candidate, candidate).sqrt();
                if norm_q == 0.0 || norm_c == 0.0 {
                    0.0
                } else {
                    dot(query, candidate) / (norm_q * norm_c)
                }
            }
            DistanceMetric::L2 => -query
                .iter()
                .zip(candidate)
                .map(|(a, b)| (a - b) * (a - b))
                .sum::<f32>(),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DistanceMetric::InnerProduct => "IP",
            DistanceMetric::Cosine => "COSINE",
            DistanceMetric::L2 => "L2",
        }
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// The two fixed collections
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectionKind {
    Chat,
    Screen,
}

impl CollectionKind {
    pub const ALL: [CollectionKind; 2] = [CollectionKind::Chat, CollectionKind::Screen];
}

impl std::fmt::Display for CollectionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CollectionKind::Chat => write!(f, "chat"),
            CollectionKind::Screen => write!(f, "screen"),
        }
    }
}

impl std::str::FromStr for CollectionKind {
    type Err = VectorStoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "chat" => Ok(CollectionKind::Chat),
            "screen" | "video" => Ok(CollectionKind::Screen),
            other => Err(VectorStoreError::UnknownCollection(other.to_string())),
        }
    }
}

/// Name, width and metric of one collection; fixed for its lifetime
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionConfig {
    pub name: String,
    pub dimension: usize,
    pub metric: DistanceMetric,
    pub query_encrypted: bool,
}

impl CollectionConfig {
    pub fn chat() -> Self {
        Self {
            name: CHAT_COLLECTION_NAME.to_string(),
            dimension: CHAT_DIMENSION,
            metric: DistanceMetric::InnerProduct,
            query_encrypted: true,
        }
    }

    pub fn screen() -> Self {
        Self {
            name: SCREEN_COLLECTION_NAME.to_string(),
            dimension: SCREEN_DIMENSION,
            metric: DistanceMetric::Cosine,
            query_encrypted: true,
        }
    }

    /// Reject a vector whose width differs from the collection's dimension
    pub fn check_dimension(&self, vector: &[f32]) -> Result<(), VectorStoreError> {
        if vector.len() != self.dimension {
            return Err(VectorStoreError::DimensionMismatch {
                collection: self.name.clone(),
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        Ok(())
    }
}

/// Configuration of both collections, indexed by [`CollectionKind`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionSet {
    pub chat: CollectionConfig,
    pub screen: CollectionConfig,
}

impl Default for CollectionSet {
    fn default() -> Self {
        Self {
            chat: CollectionConfig::chat(),
            screen: CollectionConfig::screen(),
        }
    }
}

impl CollectionSet {
    pub fn get(&self, kind: CollectionKind) -> &CollectionConfig {
        match kind {
            CollectionKind::Chat => &self.chat,
            CollectionKind::Screen => &self.screen,
        }
    }

    pub fn validate(&self) -> Result<(), VectorStoreError> {
        for kind in CollectionKind::ALL {
            let config = self.get(kind);
            if config.dimension == 0 {
                return Err(VectorStoreError::InvalidConfig(format!(
                    "{} dimension must be greater than 0",
                    config.name
                )));
            }
            if config.name.is_empty() {
                return Err(VectorStoreError::InvalidConfig(format!(
                    "{} collection name must not be empty",
                    kind
                )));
            }
        }
        if self.chat.name == self.screen.name {
            return Err(VectorStoreError::InvalidConfig(
                "chat and screen collections must have distinct names".into(),
            ));
        }
        Ok(())
    }
}
