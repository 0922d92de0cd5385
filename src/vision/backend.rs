// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Plugin boundary between the invoker and a vision-language model
//!
//! A backend is reached only through a request/response interface: an image
//! goes in through [`VisionLanguageModel::encode_image`], text comes out of
//! [`VisionLanguageModel::answer_question`]. No model-supplied code runs in
//! this process.

use async_trait::async_trait;
use image::DynamicImage;

use crate::error::{InferenceError, LoadError};
use crate::hub::ModelSource;
use crate::tokenizer::QuestionTokenizer;
use crate::vision::encoded::{EncodedImage, ModelInstanceId};

/// A loaded vision-language model
#[async_trait]
pub trait VisionLanguageModel: Send {
    /// Snapshot this instance was loaded from
    fn source(&self) -> &ModelSource;

    /// Identity used to tie encoded images to this instance
    fn instance_id(&self) -> ModelInstanceId;

    /// Convert a decoded image into this model's opaque representation
    fn encode_image(&mut self, image: &DynamicImage) -> Result<EncodedImage, InferenceError>;

    /// Ask a question about an image this instance encoded
    ///
    /// The answer is returned as produced; its format is not checked.
    async fn answer_question(
        &mut self,
        image: &EncodedImage,
        question: &str,
        tokenizer: &QuestionTokenizer,
    ) -> Result<String, InferenceError>;
}

/// Acquires models and their tokenizers
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Resolve and load the model for `source`
    async fn acquire_model(
        &self,
        source: &ModelSource,
    ) -> Result<Box<dyn VisionLanguageModel>, LoadError>;

    /// Resolve and load the tokenizer for `source`
    async fn acquire_tokenizer(&self, source: &ModelSource)
        -> Result<QuestionTokenizer, LoadError>;
}
