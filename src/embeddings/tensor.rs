// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Tensor normalization and CLS extraction
//!
//! Tokenizers hand back tensor-like values whose numeric payload may live in
//! either `data` or a backend-specific raw buffer (`cpu_data`), and which may
//! not carry an execution location. Nothing raw crosses into a model call:
//! every field is turned into a [`Tensor`] pinned to the CPU first.

use std::collections::BTreeMap;

use super::errors::EmbeddingError;

/// Where a tensor's buffer lives when handed to the model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TensorLocation {
    Cpu,
}

/// Tensor as produced by a tokenizer or model, before normalization
#[derive(Debug, Clone, PartialEq)]
pub struct RawTensor<T> {
    pub dims: Vec<usize>,
    /// Canonical buffer field
    pub data: Option<Vec<T>>,
    /// Backend-specific raw buffer field
    pub cpu_data: Option<Vec<T>>,
    pub location: Option<TensorLocation>,
}

impl<T> RawTensor<T> {
    /// Tensor whose payload is only exposed through `data`
    pub fn with_data(dims: Vec<usize>, data: Vec<T>) -> Self {
        Self {
            dims,
            data: Some(data),
            cpu_data: None,
            location: None,
        }
    }

    /// Tensor whose payload is only exposed through the backend-specific buffer
    pub fn with_cpu_data(dims: Vec<usize>, cpu_data: Vec<T>) -> Self {
        Self {
            dims,
            data: None,
            cpu_data: Some(cpu_data),
            location: None,
        }
    }

    /// Flat buffer, preferring `data` over `cpu_data`
    pub fn buffer(&self) -> Option<&[T]> {
        self.data.as_deref().or(self.cpu_data.as_deref())
    }
}

/// Normalized tensor: explicit CPU location and a populated `data` buffer
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor<T> {
    pub dims: Vec<usize>,
    pub data: Vec<T>,
    pub location: TensorLocation,
}

/// Named tensors returned by a tokenizer (`input_ids`, `attention_mask`, ...)
pub type TokenizerOutput = BTreeMap<String, RawTensor<i64>>;

/// Named, normalized tensors fed to an encoder
pub type ModelInputs = BTreeMap<String, Tensor<i64>>;

/// Normalize a single field
pub fn normalize_tensor<T>(field: &str, raw: RawTensor<T>) -> Result<Tensor<T>, EmbeddingError> {
    let RawTensor {
        dims,
        data,
        cpu_data,
        ..
    } = raw;

    let data = data
        .or(cpu_data)
        .ok_or_else(|| EmbeddingError::MissingTensorData {
            field: field.to_string(),
        })?;

    Ok(Tensor {
        dims,
        data,
        location: TensorLocation::Cpu,
    })
}

/// Normalize every field of a tokenizer output, not a fixed subset
pub fn normalize_inputs(output: TokenizerOutput) -> Result<ModelInputs, EmbeddingError> {
    output
        .into_iter()
        .map(|(field, raw)| {
            let tensor = normalize_tensor(&field, raw)?;
            Ok((field, tensor))
        })
        .collect()
}

/// Extract the sequence-position-0 embedding from a `[batch, seq, hidden]` tensor.
///
/// Returns `data[0..hidden]` regardless of sequence length.
pub fn extract_cls_embedding(hidden_state: &RawTensor<f32>) -> Result<Vec<f32>, EmbeddingError> {
    if hidden_state.dims.len() != 3 {
        return Err(EmbeddingError::InvalidShape(format!(
            "expected [batch, sequence, hidden], got {:?}",
            hidden_state.dims
        )));
    }

    let hidden = hidden_state.dims[2];
    let buffer = hidden_state
        .buffer()
        .ok_or_else(|| EmbeddingError::MissingTensorData {
            field: "last_hidden_state".to_string(),
        })?;

    if hidden == 0 || buffer.len() < hidden {
        return Err(EmbeddingError::InvalidShape(format!(
            "hidden size {} with buffer of {} elements",
            hidden,
            buffer.len()
        )));
    }

    Ok(buffer[..hidden].to_vec())
}
