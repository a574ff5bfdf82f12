// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! ONNX Runtime inference backend
//!
//! Loads BERT-style encoders exported for feature extraction and their
//! HuggingFace tokenizer from a local model root:
//!
//! ```text
//! <root>/<model-name>/tokenizer.json
//! <root>/<model-name>/onnx/model.onnx      (or model_quantized.onnx)
//! <root>/<model-name>/model.onnx           (flat layout)
//! ```
//!
//! Nothing is fetched remotely and nothing is cached on disk. Sessions run on
//! the CPU execution provider with a fixed intra-op thread count so results
//! are deterministic.

use async_trait::async_trait;
use ndarray::{ArrayD, IxDyn};
use ort::execution_providers::CPUExecutionProvider;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::{Session, SessionInputValue};
use ort::value::Value;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};
use tokenizers::{PaddingParams, Tokenizer, TruncationParams};
use tracing::{debug, info};

use super::backend::{
    BackendSettings, EncoderModel, InferenceBackend, LoadOptions, ModelOutput, TextTokenizer,
    TokenizeOptions,
};
use super::errors::EmbeddingError;
use super::tensor::{ModelInputs, RawTensor, TokenizerOutput};

/// Default maximum sequence length for DRAGON-style encoders
pub const DEFAULT_MAX_LENGTH: usize = 512;

const MODEL_CANDIDATES: [&str; 3] = ["onnx/model.onnx", "onnx/model_quantized.onnx", "model.onnx"];

/// ONNX Runtime + HuggingFace tokenizers backend
pub struct OnnxBackend {
    settings: RwLock<Option<BackendSettings>>,
    max_length: usize,
}

impl OnnxBackend {
    pub fn new(max_length: usize) -> Self {
        Self {
            settings: RwLock::new(None),
            max_length,
        }
    }

    fn model_dir(&self, model_name: &str, options: LoadOptions) -> Result<(PathBuf, BackendSettings), EmbeddingError> {
        let settings = self
            .settings
            .read()
            .map_err(|_| EmbeddingError::InvalidConfig("backend settings lock poisoned".into()))?
            .clone()
            .ok_or_else(|| EmbeddingError::not_initialized("inference backend configuration"))?;

        if !options.local_only && settings.allow_remote_models {
            return Err(EmbeddingError::InvalidConfig(
                "remote model resolution is not supported".into(),
            ));
        }

        let dir = settings.local_model_root.join(model_name);
        if !dir.is_dir() {
            return Err(EmbeddingError::model_load(
                model_name,
                format!("model directory not found: {}", dir.display()),
            ));
        }
        Ok((dir, settings))
    }
}

impl Default for OnnxBackend {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LENGTH)
    }
}

#[async_trait]
impl InferenceBackend for OnnxBackend {
    fn configure(&self, settings: BackendSettings) -> Result<(), EmbeddingError> {
        if settings.num_threads == 0 {
            return Err(EmbeddingError::InvalidConfig(
                "num_threads must be greater than 0".into(),
            ));
        }
        debug!(
            root = %settings.local_model_root.display(),
            threads = settings.num_threads,
            "Configuring ONNX backend"
        );
        *self
            .settings
            .write()
            .map_err(|_| EmbeddingError::InvalidConfig("backend settings lock poisoned".into()))? =
            Some(settings);
        Ok(())
    }

    async fn load_tokenizer(
        &self,
        model_name: &str,
        options: LoadOptions,
    ) -> Result<Arc<dyn TextTokenizer>, EmbeddingError> {
        let (dir, _) = self.model_dir(model_name, options)?;
        let tokenizer_path = dir.join("tokenizer.json");

        let mut tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| EmbeddingError::model_load(format!("{} tokenizer", model_name), e))?;
        tokenizer.with_padding(Some(PaddingParams::default()));
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: self.max_length,
                ..Default::default()
            }))
            .map_err(|e| EmbeddingError::model_load(format!("{} tokenizer", model_name), e))?;

        info!(model = model_name, "Tokenizer loaded");
        Ok(Arc::new(OnnxTokenizer { tokenizer }))
    }

    async fn load_model(
        &self,
        model_name: &str,
        options: LoadOptions,
    ) -> Result<Arc<dyn EncoderModel>, EmbeddingError> {
        let (dir, settings) = self.model_dir(model_name, options)?;
        let model_path = resolve_model_file(&dir).ok_or_else(|| {
            EmbeddingError::model_load(
                model_name,
                format!("no ONNX model file under {}", dir.display()),
            )
        })?;

        let encoder = OnnxEncoder::load(model_name, &model_path, settings.num_threads)?;
        info!(
            model = model_name,
            path = %model_path.display(),
            inputs = ?encoder.input_names,
            "Encoder loaded"
        );
        Ok(Arc::new(encoder))
    }
}

fn resolve_model_file(dir: &Path) -> Option<PathBuf> {
    MODEL_CANDIDATES
        .iter()
        .map(|candidate| dir.join(candidate))
        .find(|path| path.is_file())
}

/// HuggingFace tokenizer producing `input_ids`, `attention_mask` and `token_type_ids`
pub struct OnnxTokenizer {
    tokenizer: Tokenizer,
}

#[async_trait]
impl TextTokenizer for OnnxTokenizer {
    async fn tokenize(
        &self,
        text: &str,
        options: TokenizeOptions,
    ) -> Result<TokenizerOutput, EmbeddingError> {
        let encoding = if options == TokenizeOptions::default() {
            self.tokenizer.encode(text, true)
        } else {
            let mut tokenizer = self.tokenizer.clone();
            if !options.padding {
                tokenizer.with_padding(None);
            }
            if !options.truncation {
                tokenizer
                    .with_truncation(None)
                    .map_err(|e| EmbeddingError::Tokenization(e.to_string()))?;
            }
            tokenizer.encode(text, true)
        }
        .map_err(|e| EmbeddingError::Tokenization(e.to_string()))?;

        let len = encoding.get_ids().len();
        let widen = |values: &[u32]| values.iter().map(|&v| v as i64).collect::<Vec<i64>>();

        // The raw buffers land in the backend-specific field; the manager
        // normalizes them before the forward pass.
        let mut output = TokenizerOutput::new();
        output.insert(
            "input_ids".to_string(),
            RawTensor::with_cpu_data(vec![1, len], widen(encoding.get_ids())),
        );
        output.insert(
            "attention_mask".to_string(),
            RawTensor::with_cpu_data(vec![1, len], widen(encoding.get_attention_mask())),
        );
        output.insert(
            "token_type_ids".to_string(),
            RawTensor::with_cpu_data(vec![1, len], widen(encoding.get_type_ids())),
        );
        Ok(output)
    }
}

/// Encoder session; `None` once disposed
pub struct OnnxEncoder {
    name: String,
    session: Mutex<Option<Session>>,
    input_names: Vec<String>,
}

impl OnnxEncoder {
    fn load(name: &str, model_path: &Path, threads: usize) -> Result<Self, EmbeddingError> {
        let session = Session::builder()
            .map_err(|e| EmbeddingError::model_load(name, e))?
            .with_execution_providers([CPUExecutionProvider::default().build()])
            .map_err(|e| EmbeddingError::model_load(name, e))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| EmbeddingError::model_load(name, e))?
            .with_intra_threads(threads)
            .map_err(|e| EmbeddingError::model_load(name, e))?
            .commit_from_file(model_path)
            .map_err(|e| EmbeddingError::model_load(name, e))?;

        let input_names = session.inputs.iter().map(|input| input.name.clone()).collect();

        Ok(Self {
            name: name.to_string(),
            session: Mutex::new(Some(session)),
            input_names,
        })
    }
}

#[async_trait]
impl EncoderModel for OnnxEncoder {
    fn name(&self) -> &str {
        &self.name
    }

    async fn forward(&self, inputs: ModelInputs) -> Result<ModelOutput, EmbeddingError> {
        // Feed only the tensors the graph declares; encoders differ in
        // whether they take token_type_ids.
        let mut feeds: Vec<(String, SessionInputValue<'static>)> = Vec::with_capacity(inputs.len());
        for (field, tensor) in inputs {
            if !self.input_names.iter().any(|name| name == &field) {
                continue;
            }
            let array = ArrayD::from_shape_vec(IxDyn(&tensor.dims), tensor.data)
                .map_err(|e| EmbeddingError::InvalidShape(format!("{}: {}", field, e)))?;
            let value = Value::from_array(array)?;
            feeds.push((field, SessionInputValue::from(value)));
        }

        let mut guard = self
            .session
            .lock()
            .map_err(|_| EmbeddingError::Inference(format!("{} session lock poisoned", self.name)))?;
        let session = guard
            .as_mut()
            .ok_or_else(|| EmbeddingError::not_initialized(format!("{} (disposed)", self.name)))?;

        let outputs = session.run(feeds)?;

        // Use index [0]: exported feature-extraction graphs put
        // last_hidden_state first, but the name varies between exports.
        let hidden = outputs[0]
            .try_extract_array::<f32>()
            .map_err(|e| EmbeddingError::Inference(format!("failed to extract output tensor: {}", e)))?;

        Ok(ModelOutput {
            last_hidden_state: RawTensor::with_data(
                hidden.shape().to_vec(),
                hidden.iter().copied().collect(),
            ),
        })
    }

    fn supports_dispose(&self) -> bool {
        true
    }

    async fn dispose(&self) -> Result<(), EmbeddingError> {
        let mut guard = self
            .session
            .lock()
            .map_err(|_| EmbeddingError::Inference(format!("{} session lock poisoned", self.name)))?;
        guard.take();
        debug!(model = %self.name, "Encoder session released");
        Ok(())
    }
}
