// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Error types for the invoker stages
//!
//! Every failure is fatal: errors are propagated to the binary unchanged,
//! which logs them and exits non-zero. Nothing here is retried.

use thiserror::Error;

use crate::hub::ModelSource;
use crate::vision::encoded::ModelInstanceId;
pub use crate::vision::image_utils::ImageError;

/// Model or tokenizer acquisition failure
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Failed to fetch {file} for {model}: {reason}")]
    Hub {
        model: ModelSource,
        file: String,
        reason: String,
    },

    #[error("Failed to load weights for {model}: {reason}")]
    Weights { model: ModelSource, reason: String },

    #[error("Failed to load tokenizer for {model}: {reason}")]
    Tokenizer { model: ModelSource, reason: String },

    #[error("Failed to build Hugging Face Hub client: {0}")]
    HubClient(String),

    #[error("VLM sidecar at {endpoint} is unavailable: {reason}")]
    Sidecar { endpoint: String, reason: String },

    #[error("Failed to initialise compute device: {0}")]
    Device(String),
}

/// Failure while encoding an image or answering a question
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("Failed to encode image: {0}")]
    Encode(String),

    #[error("Text generation failed: {0}")]
    Generation(String),

    #[error("Encoded image belongs to model instance {found}, not {expected}")]
    ForeignEncoding {
        expected: ModelInstanceId,
        found: ModelInstanceId,
    },

    #[error("Tokenizer for {tokenizer} cannot be used with model {model}")]
    TokenizerMismatch {
        model: ModelSource,
        tokenizer: ModelSource,
    },

    #[error("Tokenizer error: {0}")]
    Tokenizer(String),

    #[error("VLM sidecar request failed: {0}")]
    Sidecar(String),
}

impl From<candle_core::Error> for InferenceError {
    fn from(e: candle_core::Error) -> Self {
        InferenceError::Generation(e.to_string())
    }
}

/// Any failure of the five-stage invocation
#[derive(Debug, Error)]
pub enum InvokeError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Image(#[from] ImageError),

    #[error(transparent)]
    Inference(#[from] InferenceError),
}

/// Configuration loading failure
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("Unsupported backend: {0}")]
    UnsupportedBackend(String),
}
