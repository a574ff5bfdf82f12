// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Embedding pipeline: query/context encoders, tokenizer tensor fixup and
//! CLS-position extraction.

pub mod backend;
pub mod errors;
pub mod manager;
pub mod onnx;
pub mod tensor;

pub use backend::{
    BackendSettings, EncoderModel, InferenceBackend, LoadOptions, ModelOutput, TextTokenizer,
    TokenizeOptions,
};
pub use errors::EmbeddingError;
pub use manager::{EmbeddingManager, EncoderKind, EncoderPaths};
pub use onnx::{OnnxBackend, DEFAULT_MAX_LENGTH};
pub use tensor::{
    extract_cls_embedding, normalize_inputs, normalize_tensor, ModelInputs, RawTensor, Tensor,
    TensorLocation, TokenizerOutput,
};
