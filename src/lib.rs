// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod cli;
pub mod config;
pub mod error;
pub mod hub;
pub mod invoker;
pub mod tokenizer;
pub mod version;
pub mod vision;

// Re-export main types
pub use config::{BackendKind, InvokerConfig};
pub use error::{ConfigError, InferenceError, InvokeError, LoadError};
pub use hub::{HubConfig, ModelHub, ModelSource};
pub use invoker::{invoke, Answer, Invocation, StageTimings};
pub use tokenizer::QuestionTokenizer;
pub use vision::{
    EncodedImage, ImageError, ModelInstanceId, ModelProvider, MoondreamProvider,
    SidecarProvider, VisionLanguageModel,
};
